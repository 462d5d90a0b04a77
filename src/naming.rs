//! Filename patterns and batch-scoped collision avoidance.
//!
//! A pattern is literal text with `{token}` or `{token:spec}` segments:
//!
//! | Token | Value | Spec |
//! |-------|-------|------|
//! | `date` | capture or current date | strftime, default `%Y-%m-%d` |
//! | `datetime` | capture or current date and time | strftime, default `%Y-%m-%dT%H:%M:%S` |
//! | `title` | `dc:title`, else `ImageDescription`, else `XPTitle` | |
//! | `cameraModel` | EXIF `Model` | |
//! | `sequence` | running number within the batch | zero-pad width: `04d`, `%04d` or `4` |
//! | `originalName` | source file stem | |
//! | `userId` | configured id, else `$USER` / `$USERNAME` | |
//!
//! `camera_model`, `original_name` and `userid` / `user_id` are accepted as
//! aliases. Tokens that resolve to nothing, including unknown ones, become
//! empty text.
//!
//! The resolved stem is sanitized (path separators, NUL, control characters
//! and `: * ? " < > |` become `_`) and the source extension is appended. An
//! empty stem falls back to the original name.
//!
//! ## Collisions
//!
//! [`BatchNamer`] remembers every name it hands out. A candidate is free when
//! nothing else sits at that path (the source file itself does not count) and
//! it has not already been claimed in this batch. If the pattern contains
//! `{sequence}` the sequence is bumped until the name is free; otherwise `_1`,
//! `_2`, ... is appended to the stem.

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::types::{MetadataRecord, NormalizedValue};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("unclosed '{{' at position {0}")]
    Unclosed(usize),
    #[error("empty token at position {0}")]
    EmptyToken(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Date,
    DateTime,
    Title,
    CameraModel,
    Sequence,
    OriginalName,
    UserId,
    Unknown(String),
}

impl Token {
    fn from_name(name: &str) -> Self {
        match name {
            "date" => Token::Date,
            "datetime" => Token::DateTime,
            "title" => Token::Title,
            "cameraModel" | "camera_model" => Token::CameraModel,
            "sequence" => Token::Sequence,
            "originalName" | "original_name" => Token::OriginalName,
            "userId" | "userid" | "user_id" => Token::UserId,
            other => Token::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Token { token: Token, spec: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPattern {
    segments: Vec<Segment>,
}

impl NamingPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or(PatternError::Unclosed(offset + open))?;
            let inner = &after[..close];
            if inner.contains('{') {
                return Err(PatternError::Unclosed(offset + open));
            }
            let (name, spec) = match inner.split_once(':') {
                Some((name, spec)) => (name.trim(), Some(spec.to_string())),
                None => (inner.trim(), None),
            };
            if name.is_empty() {
                return Err(PatternError::EmptyToken(offset + open));
            }

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Token {
                token: Token::from_name(name),
                spec,
            });

            let consumed = open + 1 + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_sequence(&self) -> bool {
        self.segments.iter().any(|s| {
            matches!(
                s,
                Segment::Token {
                    token: Token::Sequence,
                    ..
                }
            )
        })
    }
}

impl FromStr for NamingPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Which clock feeds `{date}` and `{datetime}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    #[default]
    Now,
    /// EXIF capture time when present, otherwise now.
    Capture,
}

/// Per-file inputs to [`resolve`] that do not come from the metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct NamingContext {
    /// Source file stem.
    pub original_name: String,
    /// Source extension without the dot; empty when there is none.
    pub extension: String,
    pub now: NaiveDateTime,
    pub sequence: u32,
    pub user_id: String,
    pub date_source: DateSource,
}

impl NamingContext {
    /// Context for `source` with the current local time and the login name.
    pub fn for_file(source: &Path, sequence: u32) -> Self {
        Self {
            original_name: source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: source
                .extension()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            now: Local::now().naive_local(),
            sequence,
            user_id: login_name(),
            date_source: DateSource::Now,
        }
    }
}

/// `$USER`, falling back to `$USERNAME`, else empty.
pub fn login_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

/// Resolve `pattern` to a file name (stem plus the source extension).
pub fn resolve(pattern: &NamingPattern, record: &MetadataRecord, ctx: &NamingContext) -> String {
    let mut stem = String::new();
    for segment in &pattern.segments {
        match segment {
            Segment::Literal(text) => stem.push_str(text),
            Segment::Token { token, spec } => {
                stem.push_str(&resolve_token(token, spec.as_deref(), record, ctx))
            }
        }
    }

    let mut stem = sanitize(&stem);
    if stem.is_empty() {
        stem = sanitize(&ctx.original_name);
    }
    if ctx.extension.is_empty() {
        stem
    } else {
        format!("{stem}.{}", ctx.extension)
    }
}

fn resolve_token(
    token: &Token,
    spec: Option<&str>,
    record: &MetadataRecord,
    ctx: &NamingContext,
) -> String {
    match token {
        Token::Date => format_time(&timestamp(record, ctx), spec, DEFAULT_DATE_FORMAT),
        Token::DateTime => format_time(&timestamp(record, ctx), spec, DEFAULT_DATETIME_FORMAT),
        Token::Title => title(record).unwrap_or_default(),
        Token::CameraModel => record
            .exif
            .get("Model")
            .map(first_text)
            .unwrap_or_default(),
        Token::Sequence => match spec.and_then(pad_width) {
            Some(width) => format!("{:0width$}", ctx.sequence),
            None => ctx.sequence.to_string(),
        },
        Token::OriginalName => ctx.original_name.clone(),
        Token::UserId => ctx.user_id.clone(),
        Token::Unknown(name) => {
            tracing::debug!(token = %name, "unknown naming token resolves to empty");
            String::new()
        }
    }
}

/// Width from `04d`, `%04d` or `4`.
fn pad_width(spec: &str) -> Option<usize> {
    spec.trim()
        .trim_start_matches('%')
        .trim_end_matches('d')
        .parse()
        .ok()
}

fn format_time(time: &NaiveDateTime, spec: Option<&str>, default: &str) -> String {
    let spec = spec.unwrap_or(default);
    let valid = !StrftimeItems::new(spec).any(|item| matches!(item, Item::Error));
    let mut out = String::new();
    if valid && write!(out, "{}", time.format(spec)).is_ok() {
        return out;
    }
    tracing::debug!(spec, "unusable date format, using default");
    out.clear();
    // The defaults contain no offset fields, so formatting a naive time cannot fail
    let _ = write!(out, "{}", time.format(default));
    out
}

fn timestamp(record: &MetadataRecord, ctx: &NamingContext) -> NaiveDateTime {
    match ctx.date_source {
        DateSource::Now => ctx.now,
        DateSource::Capture => capture_time(record).unwrap_or(ctx.now),
    }
}

/// Capture time from EXIF (`DateTimeOriginal`, `DateTimeDigitized`,
/// `DateTime`) or XMP (`photoshop:DateCreated`, `xmp:CreateDate`).
pub fn capture_time(record: &MetadataRecord) -> Option<NaiveDateTime> {
    let exif = ["DateTimeOriginal", "DateTimeDigitized", "DateTime"]
        .iter()
        .filter_map(|name| record.exif.get(name)?.as_text())
        .find_map(|s| NaiveDateTime::parse_from_str(s.trim(), EXIF_DATETIME_FORMAT).ok());
    exif.or_else(|| {
        ["photoshop:DateCreated", "xmp:CreateDate"]
            .iter()
            .filter_map(|name| record.xmp.value(name))
            .map(first_text)
            .find_map(|s| {
                let prefix = s.get(..19)?;
                NaiveDateTime::parse_from_str(prefix, DEFAULT_DATETIME_FORMAT).ok()
            })
    })
}

fn first_text(value: &NormalizedValue) -> String {
    match value {
        NormalizedValue::List(items) => items.first().map(|v| v.to_string()).unwrap_or_default(),
        other => other.to_string(),
    }
}

fn title(record: &MetadataRecord) -> Option<String> {
    let xmp = record.xmp.value("dc:title").map(first_text);
    let exif = ["ImageDescription", "XPTitle"]
        .iter()
        .filter_map(|name| record.exif.get(name))
        .map(first_text);
    xmp.into_iter().chain(exif).find(|t| !t.trim().is_empty())
}

/// Replace characters that are illegal or dangerous in file names with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

// ============================================================================
// Batch collision avoidance
// ============================================================================

/// Hands out target paths for one batch without ever giving out the same
/// path twice.
#[derive(Debug, Default)]
pub struct BatchNamer {
    claimed: HashSet<PathBuf>,
}

impl BatchNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target path beside `source` for the resolved pattern, made unique.
    pub fn claim(
        &mut self,
        pattern: &NamingPattern,
        record: &MetadataRecord,
        ctx: &NamingContext,
        source: &Path,
    ) -> PathBuf {
        let dir = source.parent().unwrap_or(Path::new(""));

        let chosen = if pattern.has_sequence() {
            let mut ctx = ctx.clone();
            loop {
                let candidate = dir.join(resolve(pattern, record, &ctx));
                if self.is_free(&candidate, source) {
                    break candidate;
                }
                ctx.sequence += 1;
            }
        } else {
            let name = resolve(pattern, record, ctx);
            let candidate = dir.join(&name);
            if self.is_free(&candidate, source) {
                candidate
            } else {
                let (stem, ext) = split_extension(&name);
                (1u32..)
                    .map(|n| dir.join(format!("{stem}_{n}{ext}")))
                    .find(|c| self.is_free(c, source))
                    .unwrap_or(candidate)
            }
        };

        self.claimed.insert(chosen.clone());
        chosen
    }

    fn is_free(&self, candidate: &Path, source: &Path) -> bool {
        !self.claimed.contains(candidate) && (candidate == source || !candidate.exists())
    }
}

/// `("photo", ".jpg")` from `photo.jpg`; the extension part keeps its dot.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExifRecord, Section, TagEntry, XmpProperty, XmpShape};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap()
    }

    fn ctx(name: &str, sequence: u32) -> NamingContext {
        let mut ctx = NamingContext::for_file(Path::new(name), sequence);
        ctx.now = fixed_time();
        ctx.user_id = "jdoe".into();
        ctx
    }

    fn exif(pairs: &[(&str, u16, &str)]) -> ExifRecord {
        let mut record = ExifRecord::new();
        for (name, tag, value) in pairs {
            let section = if name.starts_with("DateTimeO") {
                Section::Exif
            } else {
                Section::Image
            };
            record.insert(TagEntry {
                section,
                tag: *tag,
                name: name.to_string(),
                value: NormalizedValue::text(*value),
            });
        }
        record
    }

    fn pattern(s: &str) -> NamingPattern {
        NamingPattern::parse(s).unwrap()
    }

    fn render(p: &str, record: &MetadataRecord, ctx: &NamingContext) -> String {
        resolve(&pattern(p), record, ctx)
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn parses_literals_tokens_and_specs() {
        let p = pattern("IMG_{date:%Y}-{sequence:03d}");
        assert_eq!(
            p.segments(),
            &[
                Segment::Literal("IMG_".into()),
                Segment::Token {
                    token: Token::Date,
                    spec: Some("%Y".into())
                },
                Segment::Literal("-".into()),
                Segment::Token {
                    token: Token::Sequence,
                    spec: Some("03d".into())
                },
            ]
        );
        assert!(p.has_sequence());
        assert!(!pattern("{date}").has_sequence());
    }

    #[test]
    fn spec_may_contain_colons() {
        let p = pattern("{datetime:%H:%M}");
        assert_eq!(
            p.segments(),
            &[Segment::Token {
                token: Token::DateTime,
                spec: Some("%H:%M".into())
            }]
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(NamingPattern::parse("a{date"), Err(PatternError::Unclosed(1)));
        assert_eq!(NamingPattern::parse("{a{b}"), Err(PatternError::Unclosed(0)));
        assert_eq!(NamingPattern::parse("x{}"), Err(PatternError::EmptyToken(1)));
        assert!("plain-name".parse::<NamingPattern>().is_ok());
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    #[test]
    fn date_tokens_default_and_custom_formats() {
        let rec = MetadataRecord::default();
        let c = ctx("a.jpg", 1);
        assert_eq!(render("{date}", &rec, &c), "2025-01-01.jpg");
        assert_eq!(render("{date:%d.%m.%Y}", &rec, &c), "01.01.2025.jpg");
        assert_eq!(render("{datetime}", &rec, &c), "2025-01-01T09_30_15.jpg");
    }

    #[test]
    fn invalid_date_format_falls_back_to_default() {
        let rec = MetadataRecord::default();
        let c = ctx("a.jpg", 1);
        assert_eq!(render("{date:%Q}", &rec, &c), "2025-01-01.jpg");
    }

    #[test]
    fn capture_date_source_uses_exif_time() {
        let rec = MetadataRecord {
            exif: exif(&[("DateTimeOriginal", 0x9003, "2019:07:14 18:02:03")]),
            ..Default::default()
        };
        let mut c = ctx("a.jpg", 1);
        assert_eq!(render("{date}", &rec, &c), "2025-01-01.jpg");
        c.date_source = DateSource::Capture;
        assert_eq!(render("{date}", &rec, &c), "2019-07-14.jpg");

        // No capture time: falls back to now
        assert_eq!(
            render("{date}", &MetadataRecord::default(), &c),
            "2025-01-01.jpg"
        );
    }

    #[test]
    fn capture_time_from_xmp_when_exif_lacks_it() {
        let mut rec = MetadataRecord::default();
        rec.xmp.insert(
            "xmp:CreateDate",
            XmpProperty {
                shape: XmpShape::Scalar,
                value: NormalizedValue::text("2021-03-04T05:06:07+01:00"),
            },
        );
        assert_eq!(
            capture_time(&rec),
            NaiveDate::from_ymd_opt(2021, 3, 4).unwrap().and_hms_opt(5, 6, 7)
        );
    }

    #[test]
    fn title_prefers_xmp_then_description_then_xp_title() {
        let c = ctx("a.jpg", 1);
        let mut rec = MetadataRecord {
            exif: exif(&[("XPTitle", 0x9C9B, "xp"), ("ImageDescription", 0x010E, "desc")]),
            ..Default::default()
        };
        assert_eq!(render("{title}", &rec, &c), "desc.jpg");

        rec.xmp.insert(
            "dc:title",
            XmpProperty {
                shape: XmpShape::Alt,
                value: NormalizedValue::List(vec![NormalizedValue::text("Sunset")]),
            },
        );
        assert_eq!(render("{title}", &rec, &c), "Sunset.jpg");

        let only_xp = MetadataRecord {
            exif: exif(&[("XPTitle", 0x9C9B, "xp")]),
            ..Default::default()
        };
        assert_eq!(render("{title}", &only_xp, &c), "xp.jpg");
    }

    #[test]
    fn camera_user_and_original_name_with_aliases() {
        let rec = MetadataRecord {
            exif: exif(&[("Model", 0x0110, "EOS R5")]),
            ..Default::default()
        };
        let c = ctx("/photos/IMG_0001.JPG", 1);
        assert_eq!(
            render("{cameraModel}_{camera_model}_{userId}_{userid}_{originalName}", &rec, &c),
            "EOS R5_EOS R5_jdoe_jdoe_IMG_0001.JPG"
        );
        assert_eq!(render("{original_name}", &rec, &c), "IMG_0001.JPG");
    }

    #[test]
    fn sequence_padding_forms() {
        let rec = MetadataRecord::default();
        let c = ctx("a.jpg", 7);
        assert_eq!(render("{sequence}", &rec, &c), "7.jpg");
        assert_eq!(render("{sequence:04d}", &rec, &c), "0007.jpg");
        assert_eq!(render("{sequence:%03d}", &rec, &c), "007.jpg");
        assert_eq!(render("{sequence:2}", &rec, &c), "07.jpg");
    }

    #[test]
    fn unknown_and_missing_tokens_are_empty() {
        let rec = MetadataRecord::default();
        let c = ctx("a.jpg", 1);
        assert_eq!(render("x{bogus}y{title}z", &rec, &c), "xyz.jpg");
    }

    #[test]
    fn empty_result_falls_back_to_original_name() {
        let rec = MetadataRecord::default();
        assert_eq!(render("{title}", &rec, &ctx("holiday.jpg", 1)), "holiday.jpg");
    }

    #[test]
    fn no_extension_means_bare_stem() {
        let rec = MetadataRecord::default();
        assert_eq!(render("{date}", &rec, &ctx("README", 1)), "2025-01-01");
    }

    #[test]
    fn illegal_characters_are_replaced() {
        assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j\0k\u{7}l"), "a_b_c_d_e_f_g_h_i_j_k_l");
        let rec = MetadataRecord {
            exif: exif(&[("ImageDescription", 0x010E, "Paris/Lyon: day 1")]),
            ..Default::default()
        };
        assert_eq!(
            render("{title}", &rec, &ctx("a.jpg", 1)),
            "Paris_Lyon_ day 1.jpg"
        );
    }

    // =========================================================================
    // Collisions
    // =========================================================================

    #[test]
    fn sequence_advances_past_claimed_names() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("2025-01-01_0001.jpg");
        let second = tmp.path().join("b.jpg");
        std::fs::write(&first, b"a").unwrap();
        std::fs::write(&second, b"b").unwrap();

        let p = pattern("{date}_{sequence:04d}");
        let rec = MetadataRecord::default();
        let mut namer = BatchNamer::new();

        let mut c = ctx("2025-01-01_0001.jpg", 1);
        let a = namer.claim(&p, &rec, &c, &first);
        c = ctx("b.jpg", 1);
        let b = namer.claim(&p, &rec, &c, &second);

        assert_eq!(a, tmp.path().join("2025-01-01_0001.jpg"));
        assert_eq!(b, tmp.path().join("2025-01-01_0002.jpg"));
    }

    #[test]
    fn existing_files_are_skipped_by_sequence() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("trip_01.jpg"), b"x").unwrap();
        let source = tmp.path().join("new.jpg");
        std::fs::write(&source, b"y").unwrap();

        let mut namer = BatchNamer::new();
        let got = namer.claim(
            &pattern("trip_{sequence:02d}"),
            &MetadataRecord::default(),
            &ctx("new.jpg", 1),
            &source,
        );
        assert_eq!(got, tmp.path().join("trip_02.jpg"));
    }

    #[test]
    fn without_sequence_a_numeric_suffix_is_appended() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("2025-01-01.jpg"), b"x").unwrap();
        let mut namer = BatchNamer::new();
        let p = pattern("{date}");
        let rec = MetadataRecord::default();

        let sources: Vec<PathBuf> = ["a.jpg", "b.jpg"]
            .iter()
            .map(|n| tmp.path().join(n))
            .collect();
        let got: Vec<PathBuf> = sources
            .iter()
            .map(|s| {
                let name = s.file_name().unwrap().to_str().unwrap();
                namer.claim(&p, &rec, &ctx(name, 1), s)
            })
            .collect();

        assert_eq!(
            got,
            vec![
                tmp.path().join("2025-01-01_1.jpg"),
                tmp.path().join("2025-01-01_2.jpg"),
            ]
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let rec = MetadataRecord::default();
        let c = ctx("a.jpg", 3);
        let p = pattern("{date}_{sequence:03d}_{originalName}");
        assert_eq!(resolve(&p, &rec, &c), resolve(&p, &rec, &c));
    }
}
