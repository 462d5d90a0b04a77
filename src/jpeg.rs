//! JPEG segment plumbing.
//!
//! Metadata lives in APP1 segments ahead of the scan data:
//!
//! ```text
//! FF D8                      SOI
//! FF E0 len "JFIF\0" ...     APP0 (optional)
//! FF E1 len "Exif\0\0" TIFF  APP1 / EXIF
//! FF E1 len "http://ns.adobe.com/xap/1.0/\0" XML   APP1 / XMP
//! ...                        DQT, SOF, DHT, ...
//! FF DA ...                  SOS, entropy-coded data until EOI
//! ```
//!
//! Only the header (everything before SOS) is parsed; the rest of the file is
//! copied through untouched.

use crate::error::{MetaError, Result};

pub const EXIF_SIGNATURE: &[u8] = b"Exif\0\0";
pub const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Largest payload a segment can carry (length field minus its own two bytes).
pub const MAX_SEGMENT_PAYLOAD: usize = 0xFFFF - 2;

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8])
}

struct Segment<'a> {
    marker: u8,
    /// Whole segment including the `FF xx` marker and length field.
    raw: &'a [u8],
    payload: &'a [u8],
}

impl Segment<'_> {
    fn is_app1(&self, signature: &[u8]) -> bool {
        self.marker == APP1 && self.payload.starts_with(signature)
    }
}

/// Split the header into segments. Returns the segments and the offset where
/// the untouched tail (SOS onwards) starts.
fn header_segments(data: &[u8]) -> Result<(Vec<Segment<'_>>, usize)> {
    if !is_jpeg(data) {
        return Err(MetaError::MalformedExif("not a JPEG stream".into()));
    }
    let mut segments = Vec::new();
    let mut pos = 2;

    while pos < data.len() {
        if data[pos] != 0xFF {
            return Err(MetaError::MalformedExif(format!(
                "expected JPEG marker at offset {pos}"
            )));
        }
        // Fill bytes before a marker
        if pos + 1 < data.len() && data[pos + 1] == 0xFF {
            pos += 1;
            continue;
        }
        let Some(&marker) = data.get(pos + 1) else {
            break;
        };
        if marker == SOS || marker == EOI {
            return Ok((segments, pos));
        }
        // Markers without a length field
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        if pos + 4 > data.len() {
            return Err(MetaError::MalformedExif("truncated JPEG segment header".into()));
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > data.len() {
            return Err(MetaError::MalformedExif(format!(
                "JPEG segment at offset {pos} overruns the file"
            )));
        }
        segments.push(Segment {
            marker,
            raw: &data[pos..end],
            payload: &data[pos + 4..end],
        });
        pos = end;
    }

    Ok((segments, data.len()))
}

/// Payload of the first APP1 segment carrying `signature`, signature removed.
pub fn find_app1<'a>(data: &'a [u8], signature: &[u8]) -> Result<Option<&'a [u8]>> {
    let (segments, _) = header_segments(data)?;
    Ok(segments
        .into_iter()
        .find(|s| s.is_app1(signature))
        .map(|s| &s.payload[signature.len()..]))
}

/// Rebuild the file with every APP1 segment carrying `signature` removed and,
/// when `body` is given, one new segment `signature + body` inserted.
///
/// New EXIF goes right after SOI / APP0; new XMP goes after the EXIF segment.
pub fn rewrite_app1(data: &[u8], signature: &[u8], body: Option<&[u8]>) -> Result<Vec<u8>> {
    let (segments, tail) = header_segments(data)?;
    let kept: Vec<&Segment> = segments.iter().filter(|s| !s.is_app1(signature)).collect();

    let new_segment = match body {
        Some(body) => {
            let payload_len = signature.len() + body.len();
            if payload_len > MAX_SEGMENT_PAYLOAD {
                return Err(MetaError::Encoding {
                    tag: "APP1".into(),
                    reason: format!(
                        "segment payload of {payload_len} bytes exceeds {MAX_SEGMENT_PAYLOAD}"
                    ),
                });
            }
            let mut seg = Vec::with_capacity(payload_len + 4);
            seg.extend_from_slice(&[0xFF, APP1]);
            seg.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
            seg.extend_from_slice(signature);
            seg.extend_from_slice(body);
            Some(seg)
        }
        None => None,
    };

    let insert_at = kept
        .iter()
        .take_while(|s| {
            s.marker == APP0 || (signature != EXIF_SIGNATURE && s.is_app1(EXIF_SIGNATURE))
        })
        .count();

    let mut out = Vec::with_capacity(data.len() + new_segment.as_ref().map_or(0, Vec::len));
    out.extend_from_slice(&data[..2]);
    for (i, seg) in kept.iter().enumerate() {
        if i == insert_at {
            if let Some(new) = &new_segment {
                out.extend_from_slice(new);
            }
        }
        out.extend_from_slice(seg.raw);
    }
    if insert_at == kept.len() {
        if let Some(new) = &new_segment {
            out.extend_from_slice(new);
        }
    }
    out.extend_from_slice(&data[tail..]);
    Ok(out)
}
