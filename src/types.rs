//! Shared value and record types.
//!
//! `RawValue` is what the binary and XML layers hand to the normalizer;
//! `NormalizedValue` is what callers and the naming engine see. Records are
//! plain owned data: codecs build them per call and never keep them.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Untyped value extracted from a file before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Bytes(Vec<u8>),
    Int(i64),
    /// Numerator, denominator.
    Rational(i64, i64),
    Seq(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
    /// Already-decoded text (XML leaves, caller input).
    Text(String),
    /// Already-numeric value (caller input, re-normalization).
    Float(f64),
}

impl From<&NormalizedValue> for RawValue {
    fn from(value: &NormalizedValue) -> Self {
        match value {
            NormalizedValue::Text(s) => RawValue::Text(s.clone()),
            NormalizedValue::Number(n) => RawValue::Float(*n),
            NormalizedValue::List(items) => RawValue::Seq(items.iter().map(RawValue::from).collect()),
            NormalizedValue::Map(map) => RawValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), RawValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Canonical metadata value.
///
/// Never holds NaN, raw control characters other than tab and newline, or
/// undecoded bytes. Serializes as a bare JSON string, number, array or object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Text(String),
    Number(f64),
    List(Vec<NormalizedValue>),
    Map(BTreeMap<String, NormalizedValue>),
}

impl NormalizedValue {
    pub fn text(s: impl Into<String>) -> Self {
        NormalizedValue::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            NormalizedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            NormalizedValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// True for an empty string or an empty container.
    pub fn is_empty(&self) -> bool {
        match self {
            NormalizedValue::Text(s) => s.is_empty(),
            NormalizedValue::Number(_) => false,
            NormalizedValue::List(items) => items.is_empty(),
            NormalizedValue::Map(map) => map.is_empty(),
        }
    }

    /// Flatten into display strings: one per list element, one for anything else.
    /// Empty strings are dropped.
    pub fn items(&self) -> Vec<String> {
        match self {
            NormalizedValue::List(items) => items
                .iter()
                .map(|v| v.to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            other => {
                let s = other.to_string();
                if s.is_empty() { Vec::new() } else { vec![s] }
            }
        }
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Text(s) => f.write_str(s),
            NormalizedValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            NormalizedValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            NormalizedValue::Map(map) => {
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// EXIF
// ============================================================================

/// One IFD of the EXIF structure. Declaration order is lookup priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Section {
    Image,
    Exif,
    Gps,
    Interop,
    Thumbnail,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Image,
        Section::Exif,
        Section::Gps,
        Section::Interop,
        Section::Thumbnail,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Section::Image => "Image",
            Section::Exif => "Exif",
            Section::Gps => "GPS",
            Section::Interop => "Interop",
            Section::Thumbnail => "Thumbnail",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single normalized EXIF tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagEntry {
    pub section: Section,
    pub tag: u16,
    /// Symbolic name, or `0xNNNN` when the tag is not in the name tables.
    pub name: String,
    pub value: NormalizedValue,
}

/// Normalized EXIF tags keyed by (section, tag id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifRecord {
    entries: BTreeMap<(Section, u16), TagEntry>,
}

impl ExifRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any previous entry for the same section and tag.
    pub fn insert(&mut self, entry: TagEntry) {
        self.entries.insert((entry.section, entry.tag), entry);
    }

    /// First value named `name`, searching sections in priority order.
    pub fn get(&self, name: &str) -> Option<&NormalizedValue> {
        self.entries
            .values()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    pub fn get_in(&self, section: Section, name: &str) -> Option<&NormalizedValue> {
        self.entries
            .values()
            .find(|e| e.section == section && e.name == name)
            .map(|e| &e.value)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TagEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ExifRecord {
    /// `{ "Image": { "Artist": ... }, "Exif": { ... } }`
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut grouped: BTreeMap<Section, BTreeMap<&str, &NormalizedValue>> = BTreeMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.section)
                .or_default()
                .insert(entry.name.as_str(), &entry.value);
        }
        let mut map = serializer.serialize_map(Some(grouped.len()))?;
        for (section, tags) in &grouped {
            map.serialize_entry(section.label(), tags)?;
        }
        map.end()
    }
}

// ============================================================================
// XMP
// ============================================================================

/// How a property's value is laid out in RDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XmpShape {
    Scalar,
    /// Unordered set (`rdf:Bag`).
    Bag,
    /// Ordered sequence (`rdf:Seq`).
    Seq,
    /// Language alternative (`rdf:Alt`).
    Alt,
}

impl XmpShape {
    /// Local name of the RDF container element, if any.
    pub fn container(self) -> Option<&'static str> {
        match self {
            XmpShape::Scalar => None,
            XmpShape::Bag => Some("Bag"),
            XmpShape::Seq => Some("Seq"),
            XmpShape::Alt => Some("Alt"),
        }
    }

    pub fn from_container(local_name: &str) -> Option<Self> {
        match local_name {
            "Bag" => Some(XmpShape::Bag),
            "Seq" => Some(XmpShape::Seq),
            "Alt" => Some(XmpShape::Alt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XmpProperty {
    pub shape: XmpShape,
    pub value: NormalizedValue,
}

/// XMP properties keyed by qualified name (`dc:creator`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct XmpRecord {
    properties: BTreeMap<String, XmpProperty>,
}

impl XmpRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, property: XmpProperty) {
        self.properties.insert(name.into(), property);
    }

    pub fn get(&self, name: &str) -> Option<&XmpProperty> {
        self.properties.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&NormalizedValue> {
        self.properties.get(name).map(|p| &p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &XmpProperty)> {
        self.properties.iter()
    }

    /// Fold `other` into `self`; properties in `other` win.
    pub fn extend(&mut self, other: XmpRecord) {
        self.properties.extend(other.properties);
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Everything read from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub exif: ExifRecord,
    pub xmp: XmpRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_display_drops_integral_fraction() {
        assert_eq!(NormalizedValue::Number(4.0).to_string(), "4");
        assert_eq!(NormalizedValue::Number(0.75).to_string(), "0.75");
    }

    #[test]
    fn list_display_joins_with_semicolons() {
        let v = NormalizedValue::List(vec![
            NormalizedValue::text("nature"),
            NormalizedValue::text("landscape"),
        ]);
        assert_eq!(v.to_string(), "nature; landscape");
    }

    #[test]
    fn exif_record_keeps_one_entry_per_section_and_tag() {
        let mut record = ExifRecord::new();
        for value in ["first", "second"] {
            record.insert(TagEntry {
                section: Section::Image,
                tag: 0x013B,
                name: "Artist".into(),
                value: NormalizedValue::text(value),
            });
        }
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("Artist"), Some(&NormalizedValue::text("second")));
    }

    #[test]
    fn exif_record_get_prefers_image_section() {
        let mut record = ExifRecord::new();
        record.insert(TagEntry {
            section: Section::Thumbnail,
            tag: 0x0132,
            name: "DateTime".into(),
            value: NormalizedValue::text("thumb"),
        });
        record.insert(TagEntry {
            section: Section::Image,
            tag: 0x0132,
            name: "DateTime".into(),
            value: NormalizedValue::text("main"),
        });
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("DateTime"), Some(&NormalizedValue::text("main")));
        assert_eq!(
            record.get_in(Section::Thumbnail, "DateTime"),
            Some(&NormalizedValue::text("thumb"))
        );
    }

    #[test]
    fn exif_record_serializes_grouped_by_section() {
        let mut record = ExifRecord::new();
        record.insert(TagEntry {
            section: Section::Gps,
            tag: 0x0002,
            name: "GPSLatitude".into(),
            value: NormalizedValue::Number(40.5),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["GPS"]["GPSLatitude"], serde_json::json!(40.5));
    }

    #[test]
    fn normalized_value_deserializes_untagged() {
        let v: NormalizedValue = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(
            v,
            NormalizedValue::List(vec![NormalizedValue::text("a"), NormalizedValue::text("b")])
        );
        let n: NormalizedValue = serde_json::from_str("3").unwrap();
        assert_eq!(n, NormalizedValue::Number(3.0));
    }
}
