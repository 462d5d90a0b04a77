//! # photo-meta
//!
//! Read and edit the metadata embedded in photographs: EXIF tag tables inside
//! JPEG and TIFF files, and XMP documents either beside the image (sidecars)
//! or inside it. Batches apply metadata templates and rename files from
//! token patterns.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────── metadata ────────────┐
//!  file ──bytes──▶   │  exif (TIFF IFDs)   xmp (RDF/XML)│ ──▶ MetadataRecord
//!                    └───────┬──────────────────┬───────┘
//!                            └──── normalize ───┘
//!
//!  MetadataRecord + pattern ──▶ naming ──▶ new file name
//!  files + Job ──▶ batch ──▶ FileOutcome per file (+ progress events)
//! ```
//!
//! Every value read from a file, whatever its raw form (bytes in some text
//! encoding, rationals, nested sequences), goes through [`normalize`] and
//! comes out as a [`types::NormalizedValue`]: text, a finite number, a list or
//! a map. Normalization never fails; bytes that are not recognizably text come
//! out as a hex string.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`normalize`] | Raw value → canonical value (text decoding, rationals, GPS) |
//! | [`exif`] | TIFF/IFD parsing and encoding, tag names, write whitelist |
//! | [`xmp`] | RDF/XML sidecar and embedded-packet reading and writing |
//! | [`naming`] | `{token}` patterns → file names, batch collision avoidance |
//! | [`metadata`] | Both codecs behind one read, template write and strip |
//! | [`template`] | JSON templates: name plus EXIF and XMP field mappings |
//! | [`batch`] | Sequential strip/apply/rename over many files |
//! | [`jpeg`] | JPEG header segments and APP1 replacement |
//! | [`atomic`] | Temp-file-and-rename file replacement |
//! | [`config`] | `config.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting |
//! | [`types`] | Shared value and record types |
//! | [`error`] | Per-file error taxonomy |
//!
//! # Design Decisions
//!
//! ## Writes Are Whitelisted
//!
//! Only a fixed set of EXIF tags can be written (see
//! [`exif::tags::WRITABLE_TAGS`]), each with a known encoding: plain text,
//! UTF-16LE for the Windows `XP*` tags, or a character-code prefix for
//! `UserComment`. A request naming any other tag fails before the file is
//! opened.
//!
//! ## Atomic Replacement
//!
//! New file contents are written to a temporary file in the same directory
//! and renamed over the original. A crash or error mid-write leaves the
//! original intact.
//!
//! ## Per-File Failures
//!
//! A batch never aborts. Each file gets its own `Result`, and nothing already
//! written is rolled back when a later file fails.

pub mod atomic;
pub mod batch;
pub mod config;
pub mod error;
pub mod exif;
pub mod jpeg;
pub mod metadata;
pub mod naming;
pub mod normalize;
pub mod output;
pub mod template;
pub mod types;
pub mod xmp;

#[cfg(test)]
pub(crate) mod test_helpers;
