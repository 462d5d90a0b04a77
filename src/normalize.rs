//! Value normalizer: raw tag values in, canonical values out.
//!
//! [`normalize`] is total. Anything it cannot represent degrades to a safe
//! value instead of failing:
//!
//! | Input | Output |
//! |-------|--------|
//! | bytes | text via UTF-8 → UTF-16LE → UTF-16BE → Latin-1, else lowercase hex |
//! | rational `(n, d)` | `n / d`, or `0` when `d == 0` |
//! | NaN / infinity | `0` |
//! | list of integers 0–255 | treated as bytes |
//! | other lists / maps | normalized element-wise |
//! | top-level text with `,` or `;` | list of trimmed segments (if more than one) |
//!
//! ## Printable cutoff
//!
//! A decode attempt only counts when at least [`DEFAULT_PRINTABLE_RATIO`] of
//! the decoded characters are printable (trailing NUL padding excluded).
//! ASCII stored as UTF-16 reads as UTF-8 with a NUL after every character,
//! which is exactly one half printable, so the cutoff must sit above 0.5 for
//! the chain to reach the UTF-16 attempts. 0.75 leaves room for real text
//! carrying a few stray control bytes. The value is configurable
//! (`normalize.printable_ratio`).
//!
//! ## UTF-16 without a byte-order mark
//!
//! Almost any even-length byte string is well-formed UTF-16, so a UTF-16
//! attempt without a BOM is only made when at least half of the code units
//! fall in the Latin-1 range. Text in other scripts needs a BOM or an
//! explicit decoder (the EXIF `XP*` and `UNICODE` user-comment paths use
//! [`decode_utf16le`] directly).

use crate::types::{NormalizedValue, RawValue};

/// Minimum share of printable characters for a decode attempt to succeed.
pub const DEFAULT_PRINTABLE_RATIO: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    pub printable_ratio: f64,
    /// Split top-level text on `,` / `;` into a list.
    pub split_multi_value: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            printable_ratio: DEFAULT_PRINTABLE_RATIO,
            split_multi_value: true,
        }
    }
}

impl NormalizeOptions {
    /// Same cutoff, multi-value splitting disabled. Used for free-text fields.
    pub fn scalar(self) -> Self {
        Self {
            split_multi_value: false,
            ..self
        }
    }
}

/// Normalize with the default policy.
pub fn normalize(raw: &RawValue) -> NormalizedValue {
    normalize_with(raw, &NormalizeOptions::default())
}

pub fn normalize_with(raw: &RawValue, opts: &NormalizeOptions) -> NormalizedValue {
    match normalize_inner(raw, opts) {
        NormalizedValue::Text(s) if opts.split_multi_value => split_multi_value(s),
        other => other,
    }
}

/// Combine a degrees/minutes/seconds triplet into signed decimal degrees.
///
/// `hemisphere` is the matching `*Ref` value; `S` and `W` negate. Inputs that
/// are not one to three numbers fall back to [`normalize`].
pub fn normalize_coordinate(raw: &RawValue, hemisphere: Option<&str>) -> NormalizedValue {
    let parts: Option<Vec<f64>> = match raw {
        RawValue::Seq(items) => items.iter().map(numeric).collect(),
        other => numeric(other).map(|n| vec![n]),
    };
    let Some(parts) = parts.filter(|p| !p.is_empty() && p.len() <= 3) else {
        return normalize(raw);
    };

    let divisors = [1.0, 60.0, 3600.0];
    let magnitude: f64 = parts.iter().zip(divisors).map(|(v, d)| v / d).sum();
    let negative = hemisphere
        .map(|h| h.trim().to_ascii_uppercase())
        .is_some_and(|h| h.starts_with('S') || h.starts_with('W'));

    NormalizedValue::Number(finite(if negative { -magnitude } else { magnitude }))
}

fn normalize_inner(raw: &RawValue, opts: &NormalizeOptions) -> NormalizedValue {
    match raw {
        RawValue::Bytes(bytes) => NormalizedValue::Text(decode_bytes(bytes, opts.printable_ratio)),
        RawValue::Text(s) => NormalizedValue::Text(clean_text(s)),
        RawValue::Int(i) => NormalizedValue::Number(*i as f64),
        RawValue::Float(f) => NormalizedValue::Number(finite(*f)),
        RawValue::Rational(n, d) => NormalizedValue::Number(rational(*n, *d)),
        RawValue::Seq(items) => match as_byte_list(items) {
            Some(bytes) => NormalizedValue::Text(decode_bytes(&bytes, opts.printable_ratio)),
            None => NormalizedValue::List(items.iter().map(|v| normalize_inner(v, opts)).collect()),
        },
        RawValue::Map(map) => NormalizedValue::Map(
            map.iter()
                .map(|(k, v)| (clean_text(k), normalize_inner(v, opts)))
                .collect(),
        ),
    }
}

fn numeric(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Int(i) => Some(*i as f64),
        RawValue::Rational(n, d) => Some(rational(*n, *d)),
        RawValue::Float(f) => Some(finite(*f)),
        _ => None,
    }
}

fn rational(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        finite(numerator as f64 / denominator as f64)
    }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// A list made only of integers 0–255 is a byte string in disguise.
fn as_byte_list(items: &[RawValue]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|item| match item {
            RawValue::Int(i) => u8::try_from(*i).ok(),
            _ => None,
        })
        .collect()
}

fn split_multi_value(s: String) -> NormalizedValue {
    if !s.contains([',', ';']) {
        return NormalizedValue::Text(s);
    }
    let parts: Vec<&str> = s
        .split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() > 1 {
        NormalizedValue::List(parts.into_iter().map(NormalizedValue::text).collect())
    } else {
        NormalizedValue::Text(s)
    }
}

// ---------------------------------------------------------------------------
// Byte decoding
// ---------------------------------------------------------------------------

type DecodeAttempt = fn(&[u8]) -> Option<String>;

/// Tried in order; the first attempt yielding mostly printable text wins.
const DECODE_CHAIN: [(&str, DecodeAttempt); 4] = [
    ("utf-8", decode_utf8),
    ("utf-16le", decode_utf16le_hinted),
    ("utf-16be", decode_utf16be_hinted),
    ("latin-1", decode_latin1),
];

/// Decode a byte string to clean text, or its hex digits when nothing fits.
pub fn decode_bytes(bytes: &[u8], printable_ratio: f64) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    DECODE_CHAIN
        .iter()
        .find_map(|(label, attempt)| {
            attempt(bytes)
                .filter(|s| is_mostly_printable(s, printable_ratio))
                .inspect(|_| tracing::trace!(encoding = label, "decoded byte value"))
        })
        .map(|s| clean_text(&s))
        .unwrap_or_else(|| {
            tracing::debug!(len = bytes.len(), "byte value not decodable as text, using hex");
            hex::encode(bytes)
        })
}

/// Strict UTF-16LE with an optional BOM and trailing NUL terminators removed.
pub fn decode_utf16le(bytes: &[u8]) -> Option<String> {
    decode_utf16(bytes, true, false)
}

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes)
        .ok()
        .map(|s| s.trim_end_matches('\0').to_string())
}

fn decode_utf16le_hinted(bytes: &[u8]) -> Option<String> {
    decode_utf16(bytes, true, true)
}

fn decode_utf16be_hinted(bytes: &[u8]) -> Option<String> {
    decode_utf16(bytes, false, true)
}

fn decode_latin1(bytes: &[u8]) -> Option<String> {
    let s: String = bytes.iter().map(|&b| b as char).collect();
    Some(s.trim_end_matches('\0').to_string())
}

fn decode_utf16(bytes: &[u8], little_endian: bool, require_latin_hint: bool) -> Option<String> {
    let (has_bom, body) = match bytes {
        [0xFF, 0xFE, rest @ ..] if little_endian => (true, rest),
        [0xFE, 0xFF, rest @ ..] if !little_endian => (true, rest),
        _ => (false, bytes),
    };
    if body.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    if require_latin_hint && !has_bom {
        let latin = units.iter().filter(|&&u| u <= 0xFF).count();
        if units.is_empty() || latin * 2 < units.len() {
            return None;
        }
    }

    let decoded = String::from_utf16(&units).ok()?;
    let decoded = decoded.trim_end_matches('\0');
    // Interior NULs mean this was not really UTF-16 text.
    if decoded.contains('\0') {
        return None;
    }
    Some(decoded.to_string())
}

fn is_printable(c: char) -> bool {
    !c.is_control() || matches!(c, '\t' | '\n' | '\r')
}

fn is_mostly_printable(s: &str, ratio: f64) -> bool {
    let total = s.chars().count();
    if total == 0 {
        return true;
    }
    let printable = s.chars().filter(|&c| is_printable(c)).count();
    printable as f64 / total as f64 >= ratio
}

/// Drop control characters other than tab and newline, then trim.
pub fn clean_text(s: &str) -> String {
    s.chars()
        .filter(|&c| !c.is_control() || c == '\t' || c == '\n')
        .collect::<String>()
        .trim()
        .to_string()
}
