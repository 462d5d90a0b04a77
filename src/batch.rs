//! Sequential batch operations over many files.
//!
//! A [`Job`] combines up to three steps, run per file in this order:
//!
//! ```text
//! strip    remove embedded EXIF/XMP            (metadata::strip_metadata)
//! apply    write a template                    (metadata::write_metadata)
//! rename   resolve a naming pattern and move   (naming::BatchNamer)
//! ```
//!
//! Files are handled one after another. A failure is recorded in that file's
//! [`FileOutcome`] and the batch moves on; nothing is rolled back. Progress is
//! streamed as [`BatchEvent`]s through an optional channel so the CLI can
//! print while the batch runs.
//!
//! With `dry_run` no file is touched. The strip and apply steps run for real
//! on a scratch copy of the image and its sidecar, so every error a real run
//! would hit is still reported, and rename targets are resolved from the
//! metadata the file would have after those steps.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use tempfile::TempDir;

use crate::error::{MetaError, Result};
use crate::exif;
use crate::metadata::{self, WriteOptions};
use crate::naming::{BatchNamer, DateSource, NamingContext, NamingPattern};
use crate::normalize::NormalizeOptions;
use crate::template::Template;
use crate::xmp;

/// What to do with each file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Job<'a> {
    pub strip: bool,
    pub template: Option<&'a Template>,
    pub rename: Option<&'a NamingPattern>,
}

/// Naming inputs shared by every file in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NamingOptions {
    pub date_source: DateSource,
    /// Sequence number given to the first file.
    pub sequence_start: u32,
    /// Overrides the login name for `{userId}`.
    pub user_id: Option<String>,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            date_source: DateSource::Now,
            sequence_start: 1,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub write: WriteOptions,
    pub read: NormalizeOptions,
    pub naming: NamingOptions,
    pub dry_run: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            write: WriteOptions::default(),
            read: exif::default_read_options(),
            naming: NamingOptions::default(),
            dry_run: false,
        }
    }
}

/// Result for one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub source: PathBuf,
    /// New location when the job renamed (or, in a dry run, would rename) it.
    pub target: Option<PathBuf>,
    pub result: Result<()>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<FileOutcome>,
    pub dry_run: bool,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Progress events sent while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        total: usize,
        dry_run: bool,
    },
    /// `index` is 1-based.
    FileDone {
        index: usize,
        total: usize,
        source: PathBuf,
        target: Option<PathBuf>,
        error: Option<String>,
    },
}

/// Run `job` over `files` in order.
pub fn run(
    files: &[PathBuf],
    job: Job<'_>,
    opts: &BatchOptions,
    progress: Option<Sender<BatchEvent>>,
) -> BatchSummary {
    let total = files.len();
    if let Some(tx) = &progress {
        tx.send(BatchEvent::Started {
            total,
            dry_run: opts.dry_run,
        })
        .ok();
    }

    let mut namer = BatchNamer::new();
    let mut outcomes = Vec::with_capacity(total);

    for (i, source) in files.iter().enumerate() {
        let sequence = opts.naming.sequence_start.saturating_add(i as u32);
        let mut target = None;
        let result = process_file(source, sequence, job, opts, &mut namer, &mut target);

        match &result {
            Ok(()) => tracing::debug!(file = %source.display(), "done"),
            Err(e) => tracing::warn!(file = %source.display(), error = %e, "failed"),
        }
        if let Some(tx) = &progress {
            tx.send(BatchEvent::FileDone {
                index: i + 1,
                total,
                source: source.clone(),
                target: target.clone(),
                error: result.as_ref().err().map(|e| e.to_string()),
            })
            .ok();
        }
        outcomes.push(FileOutcome {
            source: source.clone(),
            target,
            result,
        });
    }

    BatchSummary {
        outcomes,
        dry_run: opts.dry_run,
    }
}

fn process_file(
    source: &Path,
    sequence: u32,
    job: Job<'_>,
    opts: &BatchOptions,
    namer: &mut BatchNamer,
    target: &mut Option<PathBuf>,
) -> Result<()> {
    if !source.is_file() {
        return Err(MetaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a file", source.display()),
        )));
    }

    let scratch = if opts.dry_run && (job.strip || job.template.is_some()) {
        Some(Scratch::copy_of(source)?)
    } else {
        None
    };
    let working = scratch.as_ref().map_or(source, |s| s.image.as_path());

    if job.strip {
        metadata::strip_metadata(working)?;
    }

    if let Some(template) = job.template {
        metadata::write_metadata(working, template, opts.write)?;
    }

    if let Some(pattern) = job.rename {
        let record = metadata::read_metadata(working, &opts.read)?;
        let mut ctx = NamingContext::for_file(source, sequence);
        ctx.date_source = opts.naming.date_source;
        if let Some(user) = &opts.naming.user_id {
            ctx.user_id = user.clone();
        }
        let dest = namer.claim(pattern, &record, &ctx, source);
        if !opts.dry_run && dest != source {
            move_with_sidecar(source, &dest)?;
        }
        *target = Some(dest);
    }

    Ok(())
}

/// Copy of an image and its sidecar in a temporary directory, for dry runs.
/// Removed on drop.
struct Scratch {
    _dir: TempDir,
    image: PathBuf,
}

impl Scratch {
    fn copy_of(source: &Path) -> Result<Self> {
        let dir = TempDir::new()?;
        let name = source.file_name().ok_or_else(|| {
            MetaError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", source.display()),
            ))
        })?;
        let image = dir.path().join(name);
        fs::copy(source, &image)?;
        if let Some(sidecar) = xmp::find_sidecar(source) {
            if let Some(sidecar_name) = sidecar.file_name() {
                fs::copy(&sidecar, dir.path().join(sidecar_name))?;
            }
        }
        tracing::debug!(file = %source.display(), scratch = %image.display(), "dry run on copy");
        Ok(Self { _dir: dir, image })
    }
}

/// Move `source` to `dest`, taking its XMP sidecar along in the same form
/// (`photo.xmp` or `photo.jpg.xmp`).
fn move_with_sidecar(source: &Path, dest: &Path) -> Result<()> {
    let sidecar = xmp::find_sidecar(source);
    fs::rename(source, dest)?;
    tracing::info!(from = %source.display(), to = %dest.display(), "renamed");

    let Some(sidecar) = sidecar else {
        return Ok(());
    };
    let sidecar_dest = if sidecar == xmp::sidecar_path(source) {
        xmp::sidecar_path(dest)
    } else {
        let mut appended = dest.as_os_str().to_owned();
        appended.push(".xmp");
        PathBuf::from(appended)
    };
    if sidecar_dest.exists() {
        tracing::warn!(
            sidecar = %sidecar.display(),
            blocked_by = %sidecar_dest.display(),
            "sidecar left in place"
        );
        return Ok(());
    }
    fs::rename(&sidecar, &sidecar_dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::ifd::ByteOrder;
    use crate::test_helpers::{exif_jpeg, minimal_jpeg, write_photo};
    use crate::types::NormalizedValue;
    use std::sync::mpsc;

    fn artist_template(artist: &str) -> Template {
        let mut t = Template {
            name: "t".into(),
            ..Default::default()
        };
        t.exif.insert("Artist".into(), artist.into());
        t
    }

    fn pattern(p: &str) -> NamingPattern {
        NamingPattern::parse(p).unwrap()
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // =========================================================================
    // Apply
    // =========================================================================

    #[test]
    fn apply_writes_every_file() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            write_photo(tmp.path(), "a.jpg", &minimal_jpeg()),
            write_photo(tmp.path(), "b.jpg", &exif_jpeg(ByteOrder::Big)),
        ];
        let t = artist_template("Jane");
        let job = Job {
            template: Some(&t),
            ..Default::default()
        };
        let summary = run(&files, job, &BatchOptions::default(), None);

        assert_eq!(summary.succeeded(), 2);
        for f in &files {
            let record = crate::exif::read_exif(f).unwrap();
            assert_eq!(record.get("Artist"), Some(&NormalizedValue::text("Jane")));
        }
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            write_photo(tmp.path(), "a.png", b"\x89PNG\r\n\x1a\n"),
            write_photo(tmp.path(), "b.jpg", &minimal_jpeg()),
        ];
        let t = artist_template("Jane");
        let job = Job {
            template: Some(&t),
            ..Default::default()
        };
        let summary = run(&files, job, &BatchOptions::default(), None);

        assert_eq!(summary.failed(), 1);
        assert!(matches!(
            summary.outcomes[0].result,
            Err(MetaError::UnsupportedFormat(_))
        ));
        assert!(summary.outcomes[1].is_ok());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "a.jpg", &minimal_jpeg())];
        let t = artist_template("Jane");
        let p = pattern("renamed");
        let job = Job {
            strip: true,
            template: Some(&t),
            rename: Some(&p),
        };
        let opts = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = run(&files, job, &opts, None);

        assert!(summary.outcomes[0].is_ok());
        assert_eq!(
            summary.outcomes[0].target.as_deref(),
            Some(tmp.path().join("renamed.jpg").as_path())
        );
        assert_eq!(names(tmp.path()), vec!["a.jpg"]);
        assert_eq!(fs::read(&files[0]).unwrap(), minimal_jpeg());
    }

    #[test]
    fn dry_run_still_reports_bad_templates() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "a.jpg", &minimal_jpeg())];
        let mut t = Template::default();
        t.exif.insert("FNumber".into(), "2.8".into());
        let job = Job {
            template: Some(&t),
            ..Default::default()
        };
        let opts = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = run(&files, job, &opts, None);
        assert!(matches!(
            summary.outcomes[0].result,
            Err(MetaError::UnsupportedTag(_))
        ));
    }

    #[test]
    fn dry_run_target_matches_real_run() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "x.jpg", &minimal_jpeg())];
        let mut t = Template::default();
        t.exif.insert("Model".into(), "X100V".into());
        t.xmp.insert("title".into(), "Sunset".into());
        let p = pattern("{cameraModel}_{title}");
        let job = Job {
            template: Some(&t),
            rename: Some(&p),
            ..Default::default()
        };
        let opts = BatchOptions {
            dry_run: true,
            ..Default::default()
        };

        let preview = run(&files, job, &opts, None);
        let expected = tmp.path().join("X100V_Sunset.jpg");
        assert_eq!(preview.outcomes[0].target.as_deref(), Some(expected.as_path()));
        assert_eq!(names(tmp.path()), vec!["x.jpg"]);

        let real = run(&files, job, &BatchOptions::default(), None);
        assert_eq!(real.outcomes[0].target, preview.outcomes[0].target);
        assert!(expected.is_file());
    }

    #[test]
    fn dry_run_sees_existing_sidecar() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "x.jpg", &minimal_jpeg())];
        let mut sidecar = crate::types::XmpRecord::new();
        let (name, prop) = xmp::property("title", NormalizedValue::text("Harbour")).unwrap();
        sidecar.insert(name, prop);
        let sidecar_path = tmp.path().join("x.xmp");
        xmp::write_sidecar(&sidecar_path, &sidecar.into()).unwrap();
        let before = fs::read(&sidecar_path).unwrap();

        let mut t = Template::default();
        t.xmp.insert("City".into(), "Faro".into());
        let p = pattern("{title}");
        let job = Job {
            template: Some(&t),
            rename: Some(&p),
            ..Default::default()
        };
        let opts = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = run(&files, job, &opts, None);

        assert_eq!(
            summary.outcomes[0].target.as_deref(),
            Some(tmp.path().join("Harbour.jpg").as_path())
        );
        assert_eq!(names(tmp.path()), vec!["x.jpg", "x.xmp"]);
        assert_eq!(fs::read(&sidecar_path).unwrap(), before);
    }

    // =========================================================================
    // Rename
    // =========================================================================

    #[test]
    fn rename_uses_sequence_and_avoids_collisions() {
        let tmp = TempDir::new().unwrap();
        write_photo(tmp.path(), "trip_0002.jpg", &minimal_jpeg());
        let files = vec![
            write_photo(tmp.path(), "x.jpg", &minimal_jpeg()),
            write_photo(tmp.path(), "y.jpg", &minimal_jpeg()),
        ];
        let p = pattern("trip_{sequence:04d}");
        let job = Job {
            rename: Some(&p),
            ..Default::default()
        };
        let summary = run(&files, job, &BatchOptions::default(), None);

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(
            names(tmp.path()),
            vec!["trip_0001.jpg", "trip_0002.jpg", "trip_0003.jpg"]
        );
    }

    #[test]
    fn rename_without_sequence_appends_counter() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            write_photo(tmp.path(), "x.jpg", &minimal_jpeg()),
            write_photo(tmp.path(), "y.jpg", &minimal_jpeg()),
        ];
        let p = pattern("holiday");
        let job = Job {
            rename: Some(&p),
            ..Default::default()
        };
        run(&files, job, &BatchOptions::default(), None);
        assert_eq!(names(tmp.path()), vec!["holiday.jpg", "holiday_1.jpg"]);
    }

    #[test]
    fn rename_moves_sidecar_along() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "x.jpg", &minimal_jpeg())];
        let mut sidecar = crate::types::XmpRecord::new();
        let (name, prop) = xmp::property("City", NormalizedValue::text("Faro")).unwrap();
        sidecar.insert(name, prop);
        xmp::write_sidecar(&tmp.path().join("x.xmp"), &sidecar.into()).unwrap();
        let p = pattern("{originalName}_done");
        let job = Job {
            rename: Some(&p),
            ..Default::default()
        };
        run(&files, job, &BatchOptions::default(), None);
        assert_eq!(names(tmp.path()), vec!["x_done.jpg", "x_done.xmp"]);
    }

    #[test]
    fn rename_sees_template_just_applied() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "x.jpg", &minimal_jpeg())];
        let mut t = Template::default();
        t.xmp.insert("title".into(), "Sunset".into());
        let p = pattern("{title}");
        let job = Job {
            template: Some(&t),
            rename: Some(&p),
            ..Default::default()
        };
        run(&files, job, &BatchOptions::default(), None);
        assert!(tmp.path().join("Sunset.jpg").is_file());
        assert!(tmp.path().join("Sunset.xmp").is_file());
    }

    #[test]
    fn user_id_override_is_used() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "x.jpg", &minimal_jpeg())];
        let p = pattern("{userId}");
        let job = Job {
            rename: Some(&p),
            ..Default::default()
        };
        let opts = BatchOptions {
            naming: NamingOptions {
                user_id: Some("jdoe".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        run(&files, job, &opts, None);
        assert!(tmp.path().join("jdoe.jpg").is_file());
    }

    // =========================================================================
    // Strip and progress
    // =========================================================================

    #[test]
    fn strip_rejects_non_jpeg_in_dry_run() {
        let tmp = TempDir::new().unwrap();
        let files = vec![write_photo(tmp.path(), "a.png", b"\x89PNG\r\n\x1a\n")];
        let opts = BatchOptions {
            dry_run: true,
            ..Default::default()
        };
        let job = Job {
            strip: true,
            ..Default::default()
        };
        let summary = run(&files, job, &opts, None);
        assert!(matches!(
            summary.outcomes[0].result,
            Err(MetaError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let files = vec![tmp.path().join("gone.jpg")];
        let job = Job {
            strip: true,
            ..Default::default()
        };
        let summary = run(&files, job, &BatchOptions::default(), None);
        assert!(matches!(summary.outcomes[0].result, Err(MetaError::Io(_))));
    }

    #[test]
    fn progress_events_are_sent_in_order() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            write_photo(tmp.path(), "a.jpg", &exif_jpeg(ByteOrder::Little)),
            write_photo(tmp.path(), "b.png", b"\x89PNG\r\n\x1a\n"),
        ];
        let (tx, rx) = mpsc::channel();
        let job = Job {
            strip: true,
            ..Default::default()
        };
        run(&files, job, &BatchOptions::default(), Some(tx));

        let events: Vec<BatchEvent> = rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            BatchEvent::Started {
                total: 2,
                dry_run: false
            }
        );
        assert!(matches!(
            &events[1],
            BatchEvent::FileDone { index: 1, error: None, .. }
        ));
        assert!(matches!(
            &events[2],
            BatchEvent::FileDone { index: 2, error: Some(_), .. }
        ));
    }
}
