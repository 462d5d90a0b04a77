//! Tool configuration.
//!
//! Handles loading and validating `config.toml`. Every key has a stock
//! default; a user `config.toml` overrides any subset of them.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [normalize]
//! printable_ratio = 0.75      # Share of printable chars for a byte decode to count
//! split_free_text = false     # Split EXIF free text on ',' / ';' when reading
//!
//! [exif]
//! write_mode = "merge"        # "merge" keeps existing tags, "overwrite" discards them
//!
//! [xmp]
//! target = "sidecar"          # "sidecar" (photo.xmp) or "embedded" (JPEG APP1)
//!
//! [naming]
//! pattern = "{date}_{sequence:04d}"
//! date_source = "now"         # "now" or "capture"
//! sequence_start = 1
//! # user_id = "jdoe"          # Defaults to the login name
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [naming]
//! date_source = "capture"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::batch::{BatchOptions, NamingOptions};
use crate::exif::WriteMode;
use crate::metadata::{WriteOptions, XmpTarget};
use crate::naming::{DateSource, NamingPattern};
use crate::normalize::{DEFAULT_PRINTABLE_RATIO, NormalizeOptions};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Value decoding when reading.
    pub normalize: NormalizeConfig,
    pub exif: ExifConfig,
    pub xmp: XmpConfig,
    /// Rename patterns and their inputs.
    pub naming: NamingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeConfig {
    pub printable_ratio: f64,
    pub split_free_text: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            printable_ratio: DEFAULT_PRINTABLE_RATIO,
            split_free_text: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExifConfig {
    pub write_mode: WriteMode,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XmpConfig {
    pub target: XmpTarget,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    pub pattern: String,
    pub date_source: DateSource,
    pub sequence_start: u32,
    /// When absent, `{userId}` is the login name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            pattern: "{date}_{sequence:04d}".to_string(),
            date_source: DateSource::Now,
            sequence_start: 1,
            user_id: None,
        }
    }
}

impl ToolConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.normalize.printable_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::Validation(
                "normalize.printable_ratio must be in (0, 1]".into(),
            ));
        }
        NamingPattern::parse(&self.naming.pattern)
            .map_err(|e| ConfigError::Validation(format!("naming.pattern: {e}")))?;
        Ok(())
    }

    pub fn read_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            printable_ratio: self.normalize.printable_ratio,
            split_multi_value: self.normalize.split_free_text,
        }
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            mode: self.exif.write_mode,
            xmp_target: self.xmp.target,
        }
    }

    pub fn batch_options(&self, dry_run: bool) -> BatchOptions {
        BatchOptions {
            write: self.write_options(),
            read: self.read_options(),
            naming: NamingOptions {
                date_source: self.naming.date_source,
                sequence_start: self.naming.sequence_start,
                user_id: self.naming.user_id.clone(),
            },
            dry_run,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Load `config.toml` from `dir`. Keys the file leaves out, or the whole file
/// when there is none, take their stock defaults.
pub fn load_config(dir: &Path) -> Result<ToolConfig, ConfigError> {
    let config: ToolConfig = match fs::read_to_string(dir.join("config.toml")) {
        Ok(content) => toml::from_str(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ToolConfig::default(),
        Err(e) => return Err(e.into()),
    };
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# photo-meta configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# The file is read from the directory given by --config-dir (default: the
# current directory). Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Reading
# ---------------------------------------------------------------------------
[normalize]
# Minimum share of printable characters for raw bytes to be shown as text.
# Below it, the bytes are shown as a hex string.
printable_ratio = 0.75

# Split EXIF free-text fields on ',' and ';' into lists when reading.
# XPKeywords and XPSubject are always split.
split_free_text = false

# ---------------------------------------------------------------------------
# EXIF writing
# ---------------------------------------------------------------------------
[exif]
# "merge" keeps tags already in the file and replaces only the ones written.
# "overwrite" starts from an empty EXIF block (thumbnail included).
write_mode = "merge"

# ---------------------------------------------------------------------------
# XMP writing
# ---------------------------------------------------------------------------
[xmp]
# "sidecar" writes photo.xmp next to photo.jpg.
# "embedded" writes the packet into the JPEG; other formats use a sidecar.
target = "sidecar"

# ---------------------------------------------------------------------------
# Renaming
# ---------------------------------------------------------------------------
[naming]
# Tokens: {date} {datetime} {title} {cameraModel} {sequence} {originalName}
# {userId}. Formats: {date:%Y%m%d}, {datetime:%H%M%S}, {sequence:04d}.
# The source extension is appended.
pattern = "{date}_{sequence:04d}"

# "now" uses the current time for {date}/{datetime}.
# "capture" uses the EXIF/XMP capture time when the file has one.
date_source = "now"

# Sequence number of the first file in a batch.
sequence_start = 1

# Value of {userId}. Omit to use the login name.
# user_id = "jdoe"
"##
}
