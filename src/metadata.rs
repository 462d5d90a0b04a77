//! Whole-file metadata: both codecs behind one read and one write.
//!
//! ## Reading
//!
//! [`read_metadata`] runs the EXIF codec over the file's own bytes and the XMP
//! codec over the embedded packet or, failing that, the sidecar. The two halves
//! are independent; neither overrides the other.
//!
//! ## Writing
//!
//! [`write_metadata`] applies a [`Template`]:
//!
//! 1. Every EXIF name is checked against the whitelist and every XMP name is
//!    qualified *before* anything is written, so an unsupported field leaves
//!    the image and its sidecar untouched.
//! 2. EXIF goes into the JPEG itself. A non-JPEG with EXIF fields fails with
//!    `UnsupportedFormat`.
//! 3. XMP goes to the sidecar, or into the JPEG when the target is
//!    [`XmpTarget::Embedded`]. Embedding falls back to the sidecar for formats
//!    that cannot carry a packet.
//!
//! In [`WriteMode::Merge`] existing XMP properties survive unless the template
//! names them, including everything in namespaces this crate does not model
//! (`crs`, `xmpMM`, editor histories). In [`WriteMode::Overwrite`] the
//! document holds only the template's properties.
//!
//! Each file write is atomic. The EXIF and XMP writes are not one transaction:
//! if the XMP write fails after the EXIF write succeeded, the EXIF change stays.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::atomic;
use crate::error::{MetaError, Result};
use crate::exif::{self, WriteMode, tags};
use crate::jpeg::{self, EXIF_SIGNATURE, XMP_SIGNATURE};
use crate::normalize::NormalizeOptions;
use crate::template::Template;
use crate::types::{MetadataRecord, NormalizedValue, XmpRecord};
use crate::xmp::{self, XmpDocument};

/// Where XMP properties are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XmpTarget {
    #[default]
    Sidecar,
    Embedded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub mode: WriteMode,
    pub xmp_target: XmpTarget,
}

/// Read EXIF and XMP for `path`.
pub fn read_metadata(path: &Path, opts: &NormalizeOptions) -> Result<MetadataRecord> {
    let exif = exif::read_exif_with(path, opts)?;
    let xmp = xmp::read_for_image(path)?.unwrap_or_default();
    Ok(MetadataRecord { exif, xmp })
}

fn prepare(template: &Template) -> Result<(BTreeMap<String, NormalizedValue>, XmpRecord)> {
    let exif_entries = template.exif_entries();
    if let Some(name) = exif_entries.keys().find(|n| tags::writable_tag(n).is_none()) {
        return Err(MetaError::UnsupportedTag(name.clone()));
    }
    let mut incoming = XmpRecord::new();
    for (name, value) in template.xmp_entries() {
        let (qualified, property) = xmp::property(&name, value)?;
        incoming.insert(qualified, property);
    }
    Ok((exif_entries, incoming))
}

/// Apply `template` to the image at `path`.
pub fn write_metadata(path: &Path, template: &Template, opts: WriteOptions) -> Result<()> {
    let (exif_entries, incoming) = prepare(template)?;

    if !exif_entries.is_empty() {
        exif::write_exif(path, &exif_entries, opts.mode)?;
    }
    if !incoming.is_empty() {
        write_xmp(path, incoming, opts)?;
    }

    tracing::info!(
        file = %path.display(),
        template = %template.name,
        exif = exif_entries.len(),
        "applied metadata"
    );
    Ok(())
}

fn write_xmp(path: &Path, incoming: XmpRecord, opts: WriteOptions) -> Result<()> {
    let embed = opts.xmp_target == XmpTarget::Embedded && jpeg::is_jpeg(&fs::read(path)?);
    if opts.xmp_target == XmpTarget::Embedded && !embed {
        tracing::debug!(file = %path.display(), "cannot embed XMP in this format, using sidecar");
    }

    let mut doc = match opts.mode {
        WriteMode::Overwrite => XmpDocument::default(),
        WriteMode::Merge if embed => {
            let data = fs::read(path)?;
            xmp::load_embedded(&data, path)?.unwrap_or_default()
        }
        WriteMode::Merge => match xmp::find_sidecar(path) {
            Some(existing) => xmp::load_sidecar(&existing)?.unwrap_or_default(),
            None => XmpDocument::default(),
        },
    };
    doc.record.extend(incoming);

    if embed {
        xmp::write_embedded(path, &doc)
    } else {
        let target = xmp::find_sidecar(path).unwrap_or_else(|| xmp::sidecar_path(path));
        xmp::write_sidecar(&target, &doc)
    }
}

/// Remove the EXIF and XMP segments from a JPEG. Sidecars are left alone.
///
/// Returns `false` when there was nothing to remove; the file is then not
/// rewritten.
pub fn strip_metadata(path: &Path) -> Result<bool> {
    let data = fs::read(path)?;
    if !jpeg::is_jpeg(&data) {
        return Err(MetaError::UnsupportedFormat(path.to_path_buf()));
    }
    let had_exif = jpeg::find_app1(&data, EXIF_SIGNATURE)?.is_some();
    let had_xmp = jpeg::find_app1(&data, XMP_SIGNATURE)?.is_some();
    if !had_exif && !had_xmp {
        return Ok(false);
    }

    let stripped = jpeg::rewrite_app1(&data, EXIF_SIGNATURE, None)?;
    let stripped = jpeg::rewrite_app1(&stripped, XMP_SIGNATURE, None)?;
    atomic::replace_file(path, &stripped)?;
    tracing::info!(file = %path.display(), had_exif, had_xmp, "stripped metadata");
    Ok(true)
}
