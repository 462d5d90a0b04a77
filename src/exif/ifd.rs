//! TIFF structure: header, IFD walking and re-serialization.
//!
//! ```text
//! "II" | "MM"   byte order
//! 42            magic (u16)
//! offset        first IFD (u32)
//!
//! IFD:  count (u16), count x 12-byte entries, next-IFD offset (u32)
//! entry: tag (u16) type (u16) count (u32) value-or-offset (u32)
//! ```
//!
//! Values of four bytes or less sit inline in the entry; larger ones are stored
//! elsewhere and referenced by offset. Sub-IFDs hang off pointer tags in IFD0
//! (Exif, GPS) and the Exif IFD (Interop); IFD1 is IFD0's next-IFD link and
//! carries the thumbnail.
//!
//! Field payloads are kept as raw bytes in the file's byte order, so a merge
//! write can carry untouched fields across without understanding them.

use std::collections::BTreeMap;

use crate::error::{MetaError, Result};
use crate::types::{RawValue, Section};

pub const EXIF_IFD_POINTER: u16 = 0x8769;
pub const GPS_IFD_POINTER: u16 = 0x8825;
pub const INTEROP_IFD_POINTER: u16 = 0xA005;
pub const THUMBNAIL_OFFSET: u16 = 0x0201;
pub const THUMBNAIL_LENGTH: u16 = 0x0202;
const STRIP_OFFSETS: u16 = 0x0111;
const STRIP_BYTE_COUNTS: u16 = 0x0117;

pub const BYTE: u16 = 1;
pub const ASCII: u16 = 2;
pub const SHORT: u16 = 3;
pub const LONG: u16 = 4;
pub const RATIONAL: u16 = 5;
pub const SBYTE: u16 = 6;
pub const UNDEFINED: u16 = 7;
pub const SSHORT: u16 = 8;
pub const SLONG: u16 = 9;
pub const SRATIONAL: u16 = 10;
pub const FLOAT: u16 = 11;
pub const DOUBLE: u16 = 12;

/// Bytes per value for a TIFF field type. Unknown types count as bytes.
pub fn type_size(field_type: u16) -> usize {
    match field_type {
        BYTE | ASCII | SBYTE | UNDEFINED => 1,
        SHORT | SSHORT => 2,
        LONG | SLONG | FLOAT => 4,
        RATIONAL | SRATIONAL | DOUBLE => 8,
        _ => 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn u16(self, b: &[u8]) -> u16 {
        let b = [b[0], b[1]];
        match self {
            ByteOrder::Little => u16::from_le_bytes(b),
            ByteOrder::Big => u16::from_be_bytes(b),
        }
    }

    pub fn u32(self, b: &[u8]) -> u32 {
        let b = [b[0], b[1], b[2], b[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => v.to_le_bytes(),
            ByteOrder::Big => v.to_be_bytes(),
        }
    }
}

/// One IFD entry with its payload resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    /// Payload in the owning structure's byte order.
    pub data: Vec<u8>,
}

impl Field {
    /// Undecoded view of the payload. Single numeric values come back as
    /// scalars; counts above one become a sequence.
    pub fn raw_value(&self, order: ByteOrder) -> RawValue {
        let size = type_size(self.field_type);
        let chunks = self.data.chunks_exact(size);
        let mut values: Vec<RawValue> = match self.field_type {
            SHORT => chunks.map(|c| RawValue::Int(order.u16(c) as i64)).collect(),
            SSHORT => chunks
                .map(|c| RawValue::Int(order.u16(c) as i16 as i64))
                .collect(),
            LONG => chunks.map(|c| RawValue::Int(order.u32(c) as i64)).collect(),
            SLONG => chunks
                .map(|c| RawValue::Int(order.u32(c) as i32 as i64))
                .collect(),
            SBYTE => chunks.map(|c| RawValue::Int(c[0] as i8 as i64)).collect(),
            RATIONAL => chunks
                .map(|c| RawValue::Rational(order.u32(c) as i64, order.u32(&c[4..]) as i64))
                .collect(),
            SRATIONAL => chunks
                .map(|c| {
                    RawValue::Rational(
                        order.u32(c) as i32 as i64,
                        order.u32(&c[4..]) as i32 as i64,
                    )
                })
                .collect(),
            FLOAT => chunks
                .map(|c| RawValue::Float(f32::from_bits(order.u32(c)) as f64))
                .collect(),
            DOUBLE => chunks
                .map(|c| {
                    let hi = order.u32(c) as u64;
                    let lo = order.u32(&c[4..]) as u64;
                    let bits = match order {
                        ByteOrder::Big => (hi << 32) | lo,
                        ByteOrder::Little => (lo << 32) | hi,
                    };
                    RawValue::Float(f64::from_bits(bits))
                })
                .collect(),
            // BYTE, ASCII, UNDEFINED and anything unknown
            _ => return RawValue::Bytes(self.data.clone()),
        };
        if values.len() == 1 {
            values.remove(0)
        } else {
            RawValue::Seq(values)
        }
    }
}

/// Fields of one IFD keyed by tag. Pointer and thumbnail-location tags are not
/// stored here; they are rebuilt on encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ifd {
    pub fields: BTreeMap<u16, Field>,
}

/// A whole EXIF structure.
#[derive(Debug, Clone, PartialEq)]
pub struct TiffTables {
    pub order: ByteOrder,
    pub ifds: BTreeMap<Section, Ifd>,
    pub thumbnail: Option<Vec<u8>>,
}

impl TiffTables {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            ifds: BTreeMap::new(),
            thumbnail: None,
        }
    }

    pub fn field(&self, section: Section, tag: u16) -> Option<&Field> {
        self.ifds.get(&section)?.fields.get(&tag)
    }

    pub fn set(&mut self, section: Section, field: Field) {
        self.ifds
            .entry(section)
            .or_default()
            .fields
            .insert(field.tag, field);
    }

    fn has(&self, section: Section) -> bool {
        self.ifds.get(&section).is_some_and(|ifd| !ifd.fields.is_empty())
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a TIFF blob. Structural damage to the header or an IFD directory is
/// an error; an entry whose payload points outside the blob is skipped.
pub fn parse(data: &[u8]) -> Result<TiffTables> {
    if data.len() < 8 {
        return Err(MetaError::MalformedExif("TIFF header truncated".into()));
    }
    let order = match &data[0..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return Err(MetaError::MalformedExif("unknown TIFF byte order".into())),
    };
    if order.u16(&data[2..]) != 42 {
        return Err(MetaError::MalformedExif("bad TIFF magic".into()));
    }

    let mut tables = TiffTables::new(order);
    let ifd0_offset = order.u32(&data[4..]) as usize;
    let (mut ifd0, ifd1_offset) = read_ifd(data, order, ifd0_offset)?;

    let exif_offset = take_pointer(&mut ifd0, EXIF_IFD_POINTER, order);
    let gps_offset = take_pointer(&mut ifd0, GPS_IFD_POINTER, order);
    tables.ifds.insert(Section::Image, ifd0);

    if let Some(offset) = exif_offset {
        let (mut exif, _) = read_ifd(data, order, offset)?;
        let interop_offset = take_pointer(&mut exif, INTEROP_IFD_POINTER, order);
        tables.ifds.insert(Section::Exif, exif);
        if let Some(offset) = interop_offset {
            let (interop, _) = read_ifd(data, order, offset)?;
            tables.ifds.insert(Section::Interop, interop);
        }
    }
    if let Some(offset) = gps_offset {
        let (gps, _) = read_ifd(data, order, offset)?;
        tables.ifds.insert(Section::Gps, gps);
    }

    if ifd1_offset != 0 && ifd1_offset != ifd0_offset {
        let (mut ifd1, _) = read_ifd(data, order, ifd1_offset)?;
        let thumb_offset = take_pointer(&mut ifd1, THUMBNAIL_OFFSET, order);
        let thumb_len = take_pointer(&mut ifd1, THUMBNAIL_LENGTH, order);
        if let (Some(offset), Some(len)) = (thumb_offset, thumb_len) {
            match data.get(offset..offset.saturating_add(len)) {
                Some(bytes) => tables.thumbnail = Some(bytes.to_vec()),
                None => tracing::debug!(offset, len, "thumbnail outside EXIF blob, dropped"),
            }
        }
        tables.ifds.insert(Section::Thumbnail, ifd1);
    }

    Ok(tables)
}

fn take_pointer(ifd: &mut Ifd, tag: u16, order: ByteOrder) -> Option<usize> {
    let field = ifd.fields.remove(&tag)?;
    match field.raw_value(order) {
        RawValue::Int(v) if v > 0 => Some(v as usize),
        _ => None,
    }
}

/// Read one IFD directory. Returns the IFD and its next-IFD offset.
fn read_ifd(data: &[u8], order: ByteOrder, offset: usize) -> Result<(Ifd, usize)> {
    if offset + 2 > data.len() {
        return Err(MetaError::MalformedExif(format!(
            "IFD offset {offset} outside EXIF blob"
        )));
    }
    let entry_count = order.u16(&data[offset..]) as usize;
    let entries_start = offset + 2;
    let next_pos = entries_start + entry_count * 12;
    if next_pos > data.len() {
        return Err(MetaError::MalformedExif(format!(
            "IFD at {offset} declares {entry_count} entries past the end"
        )));
    }

    let mut ifd = Ifd::default();
    for i in 0..entry_count {
        let entry = &data[entries_start + i * 12..entries_start + (i + 1) * 12];
        let tag = order.u16(entry);
        let field_type = order.u16(&entry[2..]);
        let count = order.u32(&entry[4..]);

        let Some(byte_len) = (count as usize).checked_mul(type_size(field_type)) else {
            tracing::debug!(tag, count, "entry size overflows, skipped");
            continue;
        };
        let payload = if byte_len <= 4 {
            Some(&entry[8..8 + byte_len])
        } else {
            let value_offset = order.u32(&entry[8..]) as usize;
            data.get(value_offset..value_offset.saturating_add(byte_len))
        };
        let Some(payload) = payload else {
            tracing::debug!(tag, "entry payload out of range, skipped");
            continue;
        };

        ifd.fields.insert(
            tag,
            Field {
                tag,
                field_type,
                count,
                data: payload.to_vec(),
            },
        );
    }

    let next = if next_pos + 4 <= data.len() {
        order.u32(&data[next_pos..]) as usize
    } else {
        0
    };
    Ok((ifd, next))
}

// ============================================================================
// Encoding
// ============================================================================

fn pointer_field(tag: u16, order: ByteOrder) -> Field {
    Field {
        tag,
        field_type: LONG,
        count: 1,
        data: order.u32_bytes(0).to_vec(),
    }
}

/// Serialized size of an IFD with `fields`, including out-of-line payloads
/// padded to even length.
fn ifd_size(fields: &[Field]) -> usize {
    let payload: usize = fields
        .iter()
        .filter(|f| f.data.len() > 4)
        .map(|f| f.data.len() + f.data.len() % 2)
        .sum();
    2 + fields.len() * 12 + 4 + payload
}

/// Serialize back to a TIFF blob in `tables.order`.
///
/// Layout: header, IFD0, Exif, GPS, Interop, IFD1, thumbnail bytes. Pointer
/// tags are regenerated for whichever sub-IFDs are non-empty.
pub fn encode(tables: &TiffTables) -> Vec<u8> {
    let order = tables.order;
    let has_interop = tables.has(Section::Interop);
    let has_exif = tables.has(Section::Exif) || has_interop;
    let has_thumbnail = tables.has(Section::Thumbnail) || tables.thumbnail.is_some();

    let mut layout: Vec<(Section, Vec<Field>)> = Vec::new();
    for section in Section::ALL {
        let present = match section {
            Section::Image => true,
            Section::Exif => has_exif,
            Section::Thumbnail => has_thumbnail,
            other => tables.has(other),
        };
        if !present {
            continue;
        }
        let mut fields: BTreeMap<u16, Field> = tables
            .ifds
            .get(&section)
            .map(|ifd| ifd.fields.clone())
            .unwrap_or_default();
        match section {
            Section::Image => {
                if has_exif {
                    fields.insert(EXIF_IFD_POINTER, pointer_field(EXIF_IFD_POINTER, order));
                }
                if tables.has(Section::Gps) {
                    fields.insert(GPS_IFD_POINTER, pointer_field(GPS_IFD_POINTER, order));
                }
            }
            Section::Exif if has_interop => {
                fields.insert(
                    INTEROP_IFD_POINTER,
                    pointer_field(INTEROP_IFD_POINTER, order),
                );
            }
            Section::Thumbnail => {
                // Strip-based thumbnails reference data we do not carry
                fields.remove(&STRIP_OFFSETS);
                fields.remove(&STRIP_BYTE_COUNTS);
                if let Some(thumb) = &tables.thumbnail {
                    fields.insert(THUMBNAIL_OFFSET, pointer_field(THUMBNAIL_OFFSET, order));
                    let mut len = pointer_field(THUMBNAIL_LENGTH, order);
                    len.data = order.u32_bytes(thumb.len() as u32).to_vec();
                    fields.insert(THUMBNAIL_LENGTH, len);
                }
            }
            _ => {}
        }
        layout.push((section, fields.into_values().collect()));
    }

    let mut offsets = BTreeMap::new();
    let mut cursor = 8usize;
    for (section, fields) in &layout {
        offsets.insert(*section, cursor);
        cursor += ifd_size(fields);
    }
    let thumbnail_offset = cursor;

    let patch = |fields: &mut Vec<Field>, tag: u16, value: usize| {
        if let Some(f) = fields.iter_mut().find(|f| f.tag == tag) {
            f.data = order.u32_bytes(value as u32).to_vec();
        }
    };
    for (section, fields) in &mut layout {
        match section {
            Section::Image => {
                if let Some(&o) = offsets.get(&Section::Exif) {
                    patch(fields, EXIF_IFD_POINTER, o);
                }
                if let Some(&o) = offsets.get(&Section::Gps) {
                    patch(fields, GPS_IFD_POINTER, o);
                }
            }
            Section::Exif => {
                if let Some(&o) = offsets.get(&Section::Interop) {
                    patch(fields, INTEROP_IFD_POINTER, o);
                }
            }
            Section::Thumbnail => patch(fields, THUMBNAIL_OFFSET, thumbnail_offset),
            _ => {}
        }
    }

    let mut out = Vec::with_capacity(cursor + tables.thumbnail.as_ref().map_or(0, Vec::len));
    out.extend_from_slice(match order {
        ByteOrder::Little => b"II",
        ByteOrder::Big => b"MM",
    });
    out.extend_from_slice(&order.u16_bytes(42));
    out.extend_from_slice(&order.u32_bytes(8));

    for (section, fields) in &layout {
        let next = if *section == Section::Image {
            offsets.get(&Section::Thumbnail).copied().unwrap_or(0)
        } else {
            0
        };
        write_ifd(&mut out, fields, offsets[section], next, order);
    }
    if let Some(thumb) = &tables.thumbnail {
        out.extend_from_slice(thumb);
    }
    out
}

fn write_ifd(out: &mut Vec<u8>, fields: &[Field], offset: usize, next: usize, order: ByteOrder) {
    debug_assert_eq!(out.len(), offset);
    let payload_start = offset + 2 + fields.len() * 12 + 4;
    let mut payload = Vec::new();

    out.extend_from_slice(&order.u16_bytes(fields.len() as u16));
    for field in fields {
        out.extend_from_slice(&order.u16_bytes(field.tag));
        out.extend_from_slice(&order.u16_bytes(field.field_type));
        out.extend_from_slice(&order.u32_bytes(field.count));
        if field.data.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..field.data.len()].copy_from_slice(&field.data);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&order.u32_bytes((payload_start + payload.len()) as u32));
            payload.extend_from_slice(&field.data);
            if payload.len() % 2 == 1 {
                payload.push(0);
            }
        }
    }
    out.extend_from_slice(&order.u32_bytes(next as u32));
    out.extend_from_slice(&payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii(tag: u16, s: &str) -> Field {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        Field {
            tag,
            field_type: ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn short(tag: u16, v: u16, order: ByteOrder) -> Field {
        Field {
            tag,
            field_type: SHORT,
            count: 1,
            data: order.u16_bytes(v).to_vec(),
        }
    }

    // =========================================================================
    // Header
    // =========================================================================

    #[test]
    fn rejects_bad_byte_order() {
        assert!(matches!(
            parse(b"XX\0\x2a\0\0\0\x08\0\0"),
            Err(MetaError::MalformedExif(_))
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        assert!(matches!(
            parse(b"MM\0\x2b\0\0\0\x08\0\0\0\0\0\0"),
            Err(MetaError::MalformedExif(_))
        ));
    }

    #[test]
    fn rejects_truncated_directory() {
        // IFD0 claims 5 entries but the blob ends right after the count
        assert!(parse(b"II\x2a\0\x08\0\0\0\x05\0").is_err());
    }

    // =========================================================================
    // Encode / parse
    // =========================================================================

    #[test]
    fn encoded_structure_parses_back_in_both_byte_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut tables = TiffTables::new(order);
            tables.set(Section::Image, ascii(0x010F, "Canon"));
            tables.set(Section::Image, short(0x0112, 6, order));
            tables.set(Section::Exif, ascii(0x9003, "2024:05:01 10:00:00"));
            tables.set(Section::Gps, ascii(0x0001, "N"));
            tables.set(Section::Interop, ascii(0x0001, "R98"));

            let parsed = parse(&encode(&tables)).unwrap();

            assert_eq!(parsed, tables);
        }
    }

    #[test]
    fn inline_and_offset_payloads_both_survive() {
        let order = ByteOrder::Big;
        let mut tables = TiffTables::new(order);
        tables.set(Section::Image, ascii(0x010F, "Nik")); // 4 bytes, inline
        tables.set(Section::Image, ascii(0x0110, "Long model name")); // offset

        let parsed = parse(&encode(&tables)).unwrap();

        assert_eq!(parsed.field(Section::Image, 0x010F).unwrap().data, b"Nik\0");
        assert_eq!(
            parsed.field(Section::Image, 0x0110).unwrap().data,
            b"Long model name\0"
        );
    }

    #[test]
    fn thumbnail_is_carried_through() {
        let order = ByteOrder::Little;
        let mut tables = TiffTables::new(order);
        tables.set(Section::Image, ascii(0x010F, "Canon"));
        tables.set(Section::Thumbnail, short(0x0103, 6, order));
        tables.thumbnail = Some(vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);

        let parsed = parse(&encode(&tables)).unwrap();

        assert_eq!(parsed.thumbnail, tables.thumbnail);
        assert!(parsed.field(Section::Thumbnail, THUMBNAIL_OFFSET).is_none());
    }

    #[test]
    fn empty_sub_ifds_get_no_pointer() {
        let mut tables = TiffTables::new(ByteOrder::Big);
        tables.set(Section::Image, ascii(0x010F, "Canon"));

        let blob = encode(&tables);
        // count(2) + 1 entry + next(4) + payload "Canon\0"
        assert_eq!(blob.len(), 8 + 2 + 12 + 4 + 6);
        assert_eq!(parse(&blob).unwrap().ifds.len(), 1);
    }

    #[test]
    fn out_of_range_entry_is_skipped() {
        let order = ByteOrder::Big;
        let mut tables = TiffTables::new(order);
        tables.set(Section::Image, ascii(0x010F, "Canon"));
        tables.set(Section::Image, ascii(0x0110, "EOS R5 body"));
        let mut blob = encode(&tables);
        // Point the Model payload far past the end
        let model_entry = 8 + 2 + 12;
        blob[model_entry + 8..model_entry + 12].copy_from_slice(&order.u32_bytes(9999));

        let parsed = parse(&blob).unwrap();

        assert!(parsed.field(Section::Image, 0x010F).is_some());
        assert!(parsed.field(Section::Image, 0x0110).is_none());
    }

    // =========================================================================
    // Raw values
    // =========================================================================

    #[test]
    fn raw_value_shapes() {
        let order = ByteOrder::Little;
        let rational = Field {
            tag: 0x829A,
            field_type: RATIONAL,
            count: 1,
            data: [order.u32_bytes(1), order.u32_bytes(250)].concat(),
        };
        assert_eq!(rational.raw_value(order), RawValue::Rational(1, 250));

        let shorts = Field {
            tag: 0x0102,
            field_type: SHORT,
            count: 3,
            data: [8u16, 8, 8].iter().flat_map(|v| order.u16_bytes(*v)).collect(),
        };
        assert_eq!(
            shorts.raw_value(order),
            RawValue::Seq(vec![RawValue::Int(8), RawValue::Int(8), RawValue::Int(8)])
        );

        let signed = Field {
            tag: 0x9204,
            field_type: SRATIONAL,
            count: 1,
            data: [order.u32_bytes(-1i32 as u32), order.u32_bytes(3)].concat(),
        };
        assert_eq!(signed.raw_value(order), RawValue::Rational(-1, 3));

        assert_eq!(ascii(0x010F, "A").raw_value(order), RawValue::Bytes(b"A\0".to_vec()));
    }

    #[test]
    fn double_respects_byte_order() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let bytes = match order {
                ByteOrder::Little => 1.5f64.to_le_bytes(),
                ByteOrder::Big => 1.5f64.to_be_bytes(),
            };
            let field = Field {
                tag: 1,
                field_type: DOUBLE,
                count: 1,
                data: bytes.to_vec(),
            };
            assert_eq!(field.raw_value(order), RawValue::Float(1.5));
        }
    }
}
