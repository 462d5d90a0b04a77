//! Metadata templates: a name plus EXIF and XMP field mappings.
//!
//! Templates travel as JSON documents so they can be shared between machines
//! and edited by hand:
//!
//! ```json
//! {
//!   "name": "Studio",
//!   "exif": { "Artist": "Jane Doe", "XPKeywords": "studio; portrait" },
//!   "xmp":  { "dc:creator": ["Jane Doe"], "City": "Lisbon" }
//! }
//! ```
//!
//! Top-level keys are accepted in lowercase, capitalized or uppercase form
//! (`exif`, `Exif`, `EXIF`). XMP keys may be qualified (`dc:creator`) or bare
//! (`creator`); bare names are qualified when the template is applied, so an
//! unknown name surfaces as `UnsupportedProperty` for the file it was applied to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::types::NormalizedValue;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid template JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Template has no fields to apply")]
    Empty,
}

/// A single template value as written in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
}

impl FieldValue {
    pub fn to_normalized(&self) -> NormalizedValue {
        match self {
            FieldValue::Text(s) => NormalizedValue::text(s.trim()),
            FieldValue::Number(n) => NormalizedValue::Number(*n),
            FieldValue::List(items) => NormalizedValue::List(
                items
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(NormalizedValue::text)
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default, alias = "Name", alias = "NAME")]
    pub name: String,
    #[serde(default, alias = "Exif", alias = "EXIF")]
    pub exif: BTreeMap<String, FieldValue>,
    #[serde(default, alias = "Xmp", alias = "XMP")]
    pub xmp: BTreeMap<String, FieldValue>,
}

impl Template {
    pub fn from_json(text: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a template file. A template with neither EXIF nor XMP fields is
    /// rejected so a typo in a top-level key does not silently apply nothing.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let template = Self::from_json(&std::fs::read_to_string(path)?)?;
        if template.exif.is_empty() && template.xmp.is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(template)
    }

    pub fn to_json(&self) -> Result<String, TemplateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// EXIF entries ready for the writer. Empty values are skipped.
    pub fn exif_entries(&self) -> BTreeMap<String, NormalizedValue> {
        non_empty(&self.exif)
    }

    /// XMP entries keyed as written in the template. Empty values are skipped.
    pub fn xmp_entries(&self) -> BTreeMap<String, NormalizedValue> {
        non_empty(&self.xmp)
    }

    pub fn is_empty(&self) -> bool {
        self.exif_entries().is_empty() && self.xmp_entries().is_empty()
    }
}

fn non_empty(fields: &BTreeMap<String, FieldValue>) -> BTreeMap<String, NormalizedValue> {
    fields
        .iter()
        .map(|(k, v)| (k.trim().to_string(), v.to_normalized()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}
