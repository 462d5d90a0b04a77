use clap::{Parser, Subcommand};
use photo_meta::batch::{self, Job};
use photo_meta::config::{self, ToolConfig};
use photo_meta::exif::WriteMode;
use photo_meta::metadata::{self, XmpTarget};
use photo_meta::naming::NamingPattern;
use photo_meta::output;
use photo_meta::template::{FieldValue, Template};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

/// Extensions picked up when a directory is given.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff", "png"];

#[derive(Parser)]
#[command(name = "photo-meta")]
#[command(about = "Read and edit EXIF and XMP metadata in photos")]
#[command(long_about = "\
Read and edit EXIF and XMP metadata in photos

EXIF is read from JPEG and TIFF files and written to JPEG. XMP is read from
an embedded packet or a sidecar (photo.xmp / photo.jpg.xmp) and written to a
sidecar, or embedded into JPEGs with --embed.

Templates are JSON documents:

  {
    \"name\": \"Studio\",
    \"exif\": { \"Artist\": \"Jane Doe\", \"XPKeywords\": \"studio; portrait\" },
    \"xmp\":  { \"dc:creator\": [\"Jane Doe\"], \"City\": \"Lisbon\" }
  }

Rename patterns use tokens: {date} {datetime} {title} {cameraModel}
{sequence} {originalName} {userId}, e.g. \"{date:%Y%m%d}_{sequence:04d}\".

Directories are expanded to the image files they contain.
Run 'photo-meta gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Files and directories to operate on.
#[derive(clap::Args, Clone)]
struct Targets {
    /// Image files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Recurse into subdirectories
    #[arg(long, short)]
    recursive: bool,
}

/// Flags shared by commands that change files.
#[derive(clap::Args, Clone)]
struct ChangeArgs {
    /// Show what would happen without writing anything
    #[arg(long)]
    dry_run: bool,
}

/// Overrides for the `[exif]` / `[xmp]` config sections.
#[derive(clap::Args, Clone)]
struct WriteArgs {
    /// Discard existing metadata instead of merging
    #[arg(long)]
    overwrite: bool,

    /// Embed XMP in JPEGs instead of writing a sidecar
    #[arg(long)]
    embed: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show EXIF and XMP metadata
    Read {
        #[command(flatten)]
        targets: Targets,
        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
    /// Set individual EXIF tags and XMP properties
    Write {
        #[command(flatten)]
        targets: Targets,
        /// EXIF tag, e.g. --exif Artist="Jane Doe" (repeatable)
        #[arg(long = "exif", value_name = "TAG=VALUE", value_parser = parse_assignment)]
        exif: Vec<(String, String)>,
        /// XMP property; ';' separates list items (repeatable)
        #[arg(long = "xmp", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        xmp: Vec<(String, String)>,
        #[command(flatten)]
        write: WriteArgs,
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// Apply a JSON template, optionally renaming afterwards
    Apply {
        #[command(flatten)]
        targets: Targets,
        /// Template file
        #[arg(long, short)]
        template: PathBuf,
        /// Rename with this pattern after applying
        #[arg(long, value_name = "PATTERN")]
        rename: Option<String>,
        #[command(flatten)]
        write: WriteArgs,
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// Rename files from a token pattern
    Rename {
        #[command(flatten)]
        targets: Targets,
        /// Pattern (defaults to naming.pattern from config)
        #[arg(long, short)]
        pattern: Option<String>,
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// Remove embedded EXIF and XMP from JPEGs
    Strip {
        #[command(flatten)]
        targets: Targets,
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photo_meta=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }
    let mut config = config::load_config(&cli.config_dir)?;

    match cli.command {
        Command::Read { targets, json } => {
            let files = expand(&targets);
            let opts = config.read_options();
            let mut records = BTreeMap::new();
            let mut failed = 0;
            for file in &files {
                match metadata::read_metadata(file, &opts) {
                    Ok(record) if json => {
                        records.insert(file.display().to_string(), record);
                    }
                    Ok(record) => output::print_record(file, &record),
                    Err(e) => {
                        tracing::warn!(file = %file.display(), error = %e, "could not read metadata");
                        failed += 1;
                    }
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            if failed > 0 {
                return Err(format!("{failed} of {} files could not be read", files.len()).into());
            }
        }
        Command::Write {
            targets,
            exif,
            xmp,
            write,
            change,
        } => {
            let template = Template {
                name: "command line".to_string(),
                exif: exif.into_iter().map(|(k, v)| (k, FieldValue::Text(v))).collect(),
                xmp: xmp.into_iter().map(|(k, v)| (k, xmp_value(&v))).collect(),
            };
            if template.is_empty() {
                return Err("nothing to write: pass --exif and/or --xmp".into());
            }
            apply_overrides(&mut config, &write);
            let job = Job {
                template: Some(&template),
                ..Default::default()
            };
            run_batch(&targets, job, &config, &change)?;
        }
        Command::Apply {
            targets,
            template,
            rename,
            write,
            change,
        } => {
            let template = Template::load(&template)?;
            let pattern = rename.as_deref().map(NamingPattern::parse).transpose()?;
            apply_overrides(&mut config, &write);
            let job = Job {
                template: Some(&template),
                rename: pattern.as_ref(),
                ..Default::default()
            };
            run_batch(&targets, job, &config, &change)?;
        }
        Command::Rename {
            targets,
            pattern,
            change,
        } => {
            let pattern = NamingPattern::parse(pattern.as_deref().unwrap_or(&config.naming.pattern))?;
            let job = Job {
                rename: Some(&pattern),
                ..Default::default()
            };
            run_batch(&targets, job, &config, &change)?;
        }
        Command::Strip { targets, change } => {
            let job = Job {
                strip: true,
                ..Default::default()
            };
            run_batch(&targets, job, &config, &change)?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Run a batch, printing progress as it happens.
fn run_batch(
    targets: &Targets,
    job: Job<'_>,
    config: &ToolConfig,
    change: &ChangeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = expand(targets);
    if files.is_empty() {
        return Err("no image files found".into());
    }
    let opts = config.batch_options(change.dry_run);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    let summary = batch::run(&files, job, &opts, Some(tx));
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    output::print_summary(&summary);

    if summary.failed() > 0 {
        return Err(format!("{} of {} files failed", summary.failed(), files.len()).into());
    }
    Ok(())
}

fn apply_overrides(config: &mut ToolConfig, write: &WriteArgs) {
    if write.overwrite {
        config.exif.write_mode = WriteMode::Overwrite;
    }
    if write.embed {
        config.xmp.target = XmpTarget::Embedded;
    }
}

/// Expand directories to the image files inside them, sorted by path.
/// Files named explicitly are kept whatever their extension.
fn expand(targets: &Targets) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in &targets.paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let depth = if targets.recursive { usize::MAX } else { 1 };
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .max_depth(depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

fn xmp_value(value: &str) -> FieldValue {
    if value.contains(';') {
        FieldValue::List(value.split(';').map(|s| s.trim().to_string()).collect())
    } else {
        FieldValue::Text(value.to_string())
    }
}
