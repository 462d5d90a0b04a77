//! Tags whose byte layout is not plain ASCII.
//!
//! - `XP*` (Windows Explorer fields): UTF-16LE, terminated by a double NUL,
//!   stored as BYTE.
//! - `UserComment`: an 8-byte character-code prefix, then the text, stored as
//!   UNDEFINED.
//!
//! The same dispatch is used for reading and writing so that a value read from
//! a file and written back lands in exactly the same bytes.

use crate::error::{MetaError, Result};
use crate::normalize::decode_utf16le;
use crate::types::{NormalizedValue, RawValue, Section};

use super::ifd::{ASCII, BYTE, Field, UNDEFINED};
use super::tags::WritableTag;

/// How a writable tag's text is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEncoding {
    /// NUL-terminated UTF-8, written as TIFF ASCII.
    Utf8,
    Utf16Xp,
    UserComment,
}

const ASCII_CODE: &[u8; 8] = b"ASCII\0\0\0";
const UNICODE_CODE: &[u8; 8] = b"UNICODE\0";
const JIS_CODE: &[u8; 8] = b"JIS\0\0\0\0\0";
const UNDEFINED_CODE: &[u8; 8] = &[0; 8];
const CHARACTER_CODES: [&[u8; 8]; 4] = [ASCII_CODE, UNICODE_CODE, JIS_CODE, UNDEFINED_CODE];

/// Encoding used when reading `tag` in `section`, if it is not plain.
pub fn special_encoding(section: Section, tag: u16) -> Option<TagEncoding> {
    match (section, tag) {
        (Section::Image | Section::Thumbnail, 0x9C9B..=0x9C9F) => Some(TagEncoding::Utf16Xp),
        (Section::Exif, 0x9286) => Some(TagEncoding::UserComment),
        _ => None,
    }
}

/// Decode a special tag's payload. Anything that fails its dedicated decoder
/// comes back as bytes for the generic decode chain.
pub fn decode_special(encoding: TagEncoding, data: &[u8]) -> RawValue {
    match encoding {
        TagEncoding::Utf8 => RawValue::Bytes(data.to_vec()),
        TagEncoding::Utf16Xp => decode_utf16le(data)
            .map(RawValue::Text)
            .unwrap_or_else(|| RawValue::Bytes(data.to_vec())),
        TagEncoding::UserComment => decode_user_comment(data),
    }
}

fn decode_user_comment(data: &[u8]) -> RawValue {
    let Some((code, body)) = data.split_first_chunk::<8>() else {
        return RawValue::Bytes(data.to_vec());
    };
    if code == UNICODE_CODE {
        decode_utf16le(body)
            .map(RawValue::Text)
            .unwrap_or_else(|| RawValue::Bytes(body.to_vec()))
    } else if CHARACTER_CODES.contains(&code) {
        RawValue::Bytes(body.to_vec())
    } else {
        RawValue::Bytes(data.to_vec())
    }
}

/// Text form of a value for writing. Lists are joined with `"; "`.
fn value_text(tag: &WritableTag, value: &NormalizedValue) -> Result<String> {
    match value {
        NormalizedValue::Text(s) => Ok(s.clone()),
        NormalizedValue::Number(_) => Ok(value.to_string()),
        NormalizedValue::List(_) => Ok(value.items().join("; ")),
        NormalizedValue::Map(_) => Err(MetaError::Encoding {
            tag: tag.name.to_string(),
            reason: "a map cannot be stored in an EXIF tag".into(),
        }),
    }
}

/// Build the IFD field for `value` under `tag`.
pub fn encode(tag: &WritableTag, value: &NormalizedValue) -> Result<Field> {
    let text = value_text(tag, value)?;
    let text = match tag.encoding {
        TagEncoding::UserComment => strip_character_codes(&text),
        _ => text.as_str(),
    };
    if text.contains('\0') {
        return Err(MetaError::Encoding {
            tag: tag.name.to_string(),
            reason: "text contains a NUL character".into(),
        });
    }

    let (field_type, data) = match tag.encoding {
        TagEncoding::Utf8 => {
            let mut data = text.as_bytes().to_vec();
            data.push(0);
            (ASCII, data)
        }
        TagEncoding::Utf16Xp => {
            let mut data = utf16le(&text);
            data.extend_from_slice(&[0, 0]);
            (BYTE, data)
        }
        TagEncoding::UserComment => (UNDEFINED, encode_user_comment(text)),
    };

    Ok(Field {
        tag: tag.tag,
        field_type,
        count: data.len() as u32,
        data,
    })
}

/// Drop any character codes already at the front of `text`, so a value read
/// from a file gets exactly one prefix when written back.
fn strip_character_codes(text: &str) -> &str {
    let mut body = text;
    while let Some(rest) = CHARACTER_CODES
        .iter()
        .find_map(|code| body.as_bytes().strip_prefix(code.as_slice()))
    {
        // Codes are ASCII, so the remainder starts on a char boundary
        body = &body[body.len() - rest.len()..];
    }
    body
}

fn encode_user_comment(body: &str) -> Vec<u8> {
    if body.is_ascii() {
        [ASCII_CODE.as_slice(), body.as_bytes()].concat()
    } else {
        [UNICODE_CODE.as_slice(), &utf16le(body)].concat()
    }
}

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
