//! EXIF codec: binary tag structures in JPEG and TIFF files.
//!
//! Reading walks every IFD (Image, Exif, GPS, Interop, Thumbnail), names each
//! tag, routes the special encodings through [`encoding`] and normalizes the
//! rest. Writing accepts the tags in [`tags::WRITABLE_TAGS`] only, rebuilds
//! the TIFF structure and swaps it into the JPEG's APP1 segment.
//!
//! ```text
//! read_exif(path)
//!   └─ locate TIFF blob (JPEG APP1 "Exif\0\0" | bare TIFF)
//!       └─ ifd::parse ─→ fields ─→ encoding / normalize ─→ ExifRecord
//!
//! write_exif(path, entries, mode)
//!   ├─ every name on the whitelist? otherwise UnsupportedTag, file untouched
//!   ├─ Merge: start from the existing IFDs / Overwrite: start empty
//!   ├─ encoding::encode each entry into its section
//!   └─ ifd::encode ─→ jpeg::rewrite_app1 ─→ atomic::replace_file
//! ```

pub mod encoding;
pub mod ifd;
pub mod tags;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::atomic;
use crate::error::{MetaError, Result};
use crate::jpeg::{self, EXIF_SIGNATURE};
use crate::normalize::{NormalizeOptions, normalize_coordinate, normalize_with};
use crate::types::{ExifRecord, NormalizedValue, RawValue, Section, TagEntry};
use ifd::{ByteOrder, Field, TiffTables};
use tags::WritableTag;

/// What happens to tags already in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Keep existing tags; incoming tags replace same-named ones.
    #[default]
    Merge,
    /// Discard every existing tag, thumbnail included.
    Overwrite,
}

/// Free-text tags are not split on `,` / `;`; keyword tags are.
pub fn default_read_options() -> NormalizeOptions {
    NormalizeOptions::default().scalar()
}

pub fn read_exif(path: &Path) -> Result<ExifRecord> {
    read_exif_with(path, &default_read_options())
}

/// Read with explicit normalization options. `opts.split_multi_value` governs
/// free-text tags; list-like tags (`XPKeywords`, `XPSubject`) always split.
pub fn read_exif_with(path: &Path, opts: &NormalizeOptions) -> Result<ExifRecord> {
    let data = fs::read(path)?;
    read_exif_bytes(&data, opts)
}

/// Decode EXIF from an in-memory file. Formats without an EXIF container give
/// an empty record.
pub fn read_exif_bytes(data: &[u8], opts: &NormalizeOptions) -> Result<ExifRecord> {
    match locate_tiff(data)? {
        Some(tiff) => Ok(to_record(&ifd::parse(tiff)?, opts)),
        None => Ok(ExifRecord::new()),
    }
}

fn locate_tiff(data: &[u8]) -> Result<Option<&[u8]>> {
    if jpeg::is_jpeg(data) {
        jpeg::find_app1(data, EXIF_SIGNATURE)
    } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        Ok(Some(data))
    } else {
        Ok(None)
    }
}

fn to_record(tables: &TiffTables, opts: &NormalizeOptions) -> ExifRecord {
    let list_opts = NormalizeOptions {
        split_multi_value: true,
        ..*opts
    };
    let mut record = ExifRecord::new();

    for (&section, ifd) in &tables.ifds {
        for field in ifd.fields.values() {
            let field_opts = if tags::is_list_like(section, field.tag) {
                &list_opts
            } else {
                opts
            };
            let value = match encoding::special_encoding(section, field.tag) {
                Some(enc) => normalize_with(&encoding::decode_special(enc, &field.data), field_opts),
                None => match coordinate_ref(section, field.tag) {
                    Some(ref_tag) => normalize_coordinate(
                        &field.raw_value(tables.order),
                        hemisphere(tables, ref_tag).as_deref(),
                    ),
                    None => normalize_field(field, tables.order, field_opts),
                },
            };
            record.insert(TagEntry {
                section,
                tag: field.tag,
                name: tags::tag_name(section, field.tag),
                value,
            });
        }
    }

    if let Some(thumb) = &tables.thumbnail {
        tracing::trace!(bytes = thumb.len(), "thumbnail present");
    }
    record
}

/// Numeric arrays (`BitsPerSample`, `YCbCrSubSampling`) are normalized item
/// by item so they stay numbers; only BYTE and UNDEFINED payloads reach the
/// byte decoder.
fn normalize_field(field: &Field, order: ByteOrder, opts: &NormalizeOptions) -> NormalizedValue {
    match field.raw_value(order) {
        RawValue::Seq(items) => {
            NormalizedValue::List(items.iter().map(|item| normalize_with(item, opts)).collect())
        }
        raw => normalize_with(&raw, opts),
    }
}

fn coordinate_ref(section: Section, tag: u16) -> Option<u16> {
    if section != Section::Gps {
        return None;
    }
    tags::GPS_COORDINATES
        .iter()
        .find(|(coord, _)| *coord == tag)
        .map(|(_, reference)| *reference)
}

fn hemisphere(tables: &TiffTables, ref_tag: u16) -> Option<String> {
    let field = tables.field(Section::Gps, ref_tag)?;
    Some(
        String::from_utf8_lossy(&field.data)
            .trim_end_matches('\0')
            .trim()
            .to_string(),
    )
}

// ============================================================================
// Writing
// ============================================================================

/// Resolve every name against the whitelist before anything is read.
fn resolve_entries(
    entries: &BTreeMap<String, NormalizedValue>,
) -> Result<Vec<(&'static WritableTag, &NormalizedValue)>> {
    entries
        .iter()
        .map(|(name, value)| {
            tags::writable_tag(name)
                .map(|tag| (tag, value))
                .ok_or_else(|| MetaError::UnsupportedTag(name.clone()))
        })
        .collect()
}

/// Write `entries` into the JPEG at `path`.
///
/// Any name outside the whitelist fails the whole call with
/// [`MetaError::UnsupportedTag`] before the file is opened. The file is
/// replaced atomically; on error it is left as it was.
pub fn write_exif(
    path: &Path,
    entries: &BTreeMap<String, NormalizedValue>,
    mode: WriteMode,
) -> Result<()> {
    resolve_entries(entries)?;
    if entries.is_empty() {
        return Ok(());
    }
    let data = fs::read(path)?;
    if !jpeg::is_jpeg(&data) {
        return Err(MetaError::UnsupportedFormat(path.to_path_buf()));
    }
    let updated = encode_into_jpeg(&data, entries, mode)?;
    atomic::replace_file(path, &updated)?;
    tracing::debug!(file = %path.display(), tags = entries.len(), ?mode, "wrote EXIF");
    Ok(())
}

/// Pure half of [`write_exif`]: returns the new file contents.
pub fn encode_into_jpeg(
    data: &[u8],
    entries: &BTreeMap<String, NormalizedValue>,
    mode: WriteMode,
) -> Result<Vec<u8>> {
    let resolved = resolve_entries(entries)?;

    let mut tables = match mode {
        WriteMode::Merge => match jpeg::find_app1(data, EXIF_SIGNATURE)? {
            Some(tiff) => ifd::parse(tiff)?,
            None => TiffTables::new(ByteOrder::Big),
        },
        WriteMode::Overwrite => TiffTables::new(ByteOrder::Big),
    };

    for (tag, value) in resolved {
        let field: Field = encoding::encode(tag, value)?;
        tables.set(tag.section, field);
    }

    jpeg::rewrite_app1(data, EXIF_SIGNATURE, Some(&ifd::encode(&tables)))
}
