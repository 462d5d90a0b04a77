//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Read
//!
//! ```text
//! IMG_0001.jpg
//!     EXIF (4 tags)
//!         Image
//!             Make: Canon
//!             XPKeywords: sea; dusk
//!         GPS
//!             GPSLatitude: 40.446111
//!     XMP (2 properties)
//!         dc:creator [seq]: Jane Doe
//!         photoshop:City: Lisbon
//! ```
//!
//! ## Batch
//!
//! ```text
//! Processing 3 files
//! 001/003 IMG_0001.jpg → 2025-01-01_0001.jpg
//! 002/003 IMG_0002.png
//!     Error: Unsupported file format for this operation: IMG_0002.png
//! 003/003 IMG_0003.jpg → 2025-01-01_0002.jpg
//! Done: 2 succeeded, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use std::path::Path;

use crate::batch::{BatchEvent, BatchSummary};
use crate::types::{MetadataRecord, Section, XmpShape};

/// Long values (maker notes, hex dumps) are cut to this many characters.
const MAX_VALUE_CHARS: usize = 120;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_value(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Read
// ============================================================================

/// Format a metadata record as an indented listing.
pub fn format_record(path: &Path, record: &MetadataRecord) -> Vec<String> {
    let mut lines = vec![path.display().to_string()];

    if record.exif.is_empty() && record.xmp.is_empty() {
        lines.push(format!("{}No metadata", indent(1)));
        return lines;
    }

    if !record.exif.is_empty() {
        lines.push(format!(
            "{}EXIF ({})",
            indent(1),
            plural(record.exif.len(), "tag", "tags")
        ));
        let mut current: Option<Section> = None;
        for entry in record.exif.entries() {
            if current != Some(entry.section) {
                lines.push(format!("{}{}", indent(2), entry.section.label()));
                current = Some(entry.section);
            }
            lines.push(format!(
                "{}{}: {}",
                indent(3),
                entry.name,
                truncate_value(&entry.value.to_string(), MAX_VALUE_CHARS)
            ));
        }
    }

    if !record.xmp.is_empty() {
        lines.push(format!(
            "{}XMP ({})",
            indent(1),
            plural(record.xmp.len(), "property", "properties")
        ));
        for (name, prop) in record.xmp.iter() {
            let shape = match prop.shape {
                XmpShape::Scalar => String::new(),
                XmpShape::Bag => " [bag]".to_string(),
                XmpShape::Seq => " [seq]".to_string(),
                XmpShape::Alt => " [alt]".to_string(),
            };
            lines.push(format!(
                "{}{}{}: {}",
                indent(2),
                name,
                shape,
                truncate_value(&prop.value.to_string(), MAX_VALUE_CHARS)
            ));
        }
    }

    lines
}

/// Print a metadata record to stdout.
pub fn print_record(path: &Path, record: &MetadataRecord) {
    for line in format_record(path, record) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { total, dry_run } => {
            let files = plural(*total, "file", "files");
            if *dry_run {
                vec![format!("Dry run: {files} (nothing will be written)")]
            } else {
                vec![format!("Processing {files}")]
            }
        }
        BatchEvent::FileDone {
            index,
            total,
            source,
            target,
            error,
        } => {
            let position = format!("{}/{}", format_index(*index), format_index(*total));
            let mut header = format!("{} {}", position, file_name(source));
            if let Some(target) = target.as_deref().filter(|t| *t != source.as_path()) {
                header.push_str(&format!(" → {}", file_name(target)));
            }
            let mut lines = vec![header];
            if let Some(error) = error {
                lines.push(format!("{}Error: {}", indent(1), error));
            }
            lines
        }
    }
}

/// Format the closing line of a batch.
pub fn format_summary(summary: &BatchSummary) -> Vec<String> {
    let mut line = format!(
        "Done: {} succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );
    if summary.dry_run {
        line.push_str(" (dry run)");
    }
    vec![line]
}

pub fn print_summary(summary: &BatchSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}
