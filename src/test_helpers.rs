//! Shared test utilities for the photo-meta test suite.
//!
//! Builds small in-memory JPEG and EXIF fixtures so codec tests never need
//! binary files checked into the repository.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let photo = write_photo(tmp.path(), "a.jpg", &exif_jpeg(ByteOrder::Big));
//! let record = read_exif(&photo).unwrap();
//! assert_eq!(record.get("Make"), Some(&NormalizedValue::text("Canon")));
//! ```

use std::path::{Path, PathBuf};

use crate::exif::ifd::{self, ASCII, ByteOrder, Field, RATIONAL, SHORT, TiffTables};
use crate::jpeg::{self, EXIF_SIGNATURE};
use crate::types::Section;

// =========================================================================
// JPEG fixtures
// =========================================================================

/// Smallest stream the segment parser accepts: SOI, APP0/JFIF, SOS, a few
/// bytes of scan data, EOI.
pub fn minimal_jpeg() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(&[
        0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01, 0x00,
        0x01, 0x00, 0x00,
    ]);
    data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    data.extend_from_slice(&[0x00, 0x11, 0x22]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// A camera-style EXIF block in the given byte order:
///
/// - Image: `Make = "Canon"`, `Model = "EOS R5"`, `Orientation = 1`
/// - Exif: `ExposureTime = 1/250`, `DateTimeOriginal = 2024:05:01 10:30:00`,
///   unknown tag `0xC000 = 7`
/// - GPS: 40°26'46" N, 79°58'56" W
pub fn exif_jpeg(order: ByteOrder) -> Vec<u8> {
    let mut tables = TiffTables::new(order);
    tables.set(Section::Image, ascii(0x010F, "Canon"));
    tables.set(Section::Image, ascii(0x0110, "EOS R5"));
    tables.set(Section::Image, short(0x0112, 1, order));
    tables.set(Section::Exif, rationals(0x829A, &[(1, 250)], order));
    tables.set(
        Section::Exif,
        ascii(0x9003, "2024:05:01 10:30:00"),
    );
    tables.set(Section::Exif, short(0xC000, 7, order));
    tables.set(Section::Gps, ascii(0x0001, "N"));
    tables.set(
        Section::Gps,
        rationals(0x0002, &[(40, 1), (26, 1), (46, 1)], order),
    );
    tables.set(Section::Gps, ascii(0x0003, "W"));
    tables.set(
        Section::Gps,
        rationals(0x0004, &[(79, 1), (58, 1), (56, 1)], order),
    );

    let tiff = ifd::encode(&tables);
    jpeg::rewrite_app1(&minimal_jpeg(), EXIF_SIGNATURE, Some(&tiff)).unwrap()
}

/// Write `data` to `dir/name` and return the path.
pub fn write_photo(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

// =========================================================================
// Field builders
// =========================================================================

fn ascii(tag: u16, value: &str) -> Field {
    let mut data = value.as_bytes().to_vec();
    data.push(0);
    Field {
        tag,
        field_type: ASCII,
        count: data.len() as u32,
        data,
    }
}

fn short(tag: u16, value: u16, order: ByteOrder) -> Field {
    Field {
        tag,
        field_type: SHORT,
        count: 1,
        data: order.u16_bytes(value).to_vec(),
    }
}

fn rationals(tag: u16, values: &[(u32, u32)], order: ByteOrder) -> Field {
    Field {
        tag,
        field_type: RATIONAL,
        count: values.len() as u32,
        data: values
            .iter()
            .flat_map(|(n, d)| [order.u32_bytes(*n), order.u32_bytes(*d)].concat())
            .collect(),
    }
}
