//! Tool configuration.
//!
//! Handles loading, validating, and merging `widepix.toml`. User values are
//! layered over the stock defaults, so a file only needs the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! jpeg_quality = 90         # 1-100
//! png_compression = 6       # 0 (fastest) - 9 (smallest)
//!
//! [palette]
//! max_colors = 256          # Palette size when converting to indexed color
//! match_palette = false     # Refit palette entries to the pixels they cover
//! # dither = true           # Omit to dither only images with transparency
//!
//! [resize]
//! fit = "inside"            # inside | outside | fill
//! scale = "any"             # any | down | up
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::mapper::SaveOptions;
use crate::operation::resize::{Fit, Scale};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE: &str = "widepix.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WidepixConfig {
    /// Encoder settings used when saving.
    pub output: OutputConfig,
    /// True-color to palette conversion.
    pub palette: PaletteConfig,
    /// Defaults for `resize` steps that don't name a fit or scale.
    pub resize: ResizeConfig,
    pub processing: ProcessingConfig,
}

impl WidepixConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::Validation(
                "output.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.output.png_compression > 9 {
            return Err(ConfigError::Validation(
                "output.png_compression must be 0-9".into(),
            ));
        }
        if !(1..=256).contains(&self.palette.max_colors) {
            return Err(ConfigError::Validation(
                "palette.max_colors must be 1-256".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub jpeg_quality: u32,
    pub png_compression: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            png_compression: 6,
        }
    }
}

impl OutputConfig {
    pub fn save_options(&self) -> SaveOptions {
        SaveOptions::default()
            .with_quality(self.jpeg_quality)
            .with_compression(self.png_compression)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaletteConfig {
    pub max_colors: usize,
    /// `None` dithers only images that have transparency.
    pub dither: Option<bool>,
    pub match_palette: bool,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            max_colors: 256,
            dither: None,
            match_palette: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub fit: Fit,
    pub scale: Scale,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Stock defaults as a `toml::Value::Table`, the base layer for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(WidepixConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<WidepixConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: WidepixConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a specific config file.
pub fn load_config_file(path: &Path) -> Result<WidepixConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    resolve_config(Some(toml::from_str(&content)?))
}

/// Load `widepix.toml` from `dir`, or the stock defaults when there is none.
pub fn load_config(dir: &Path) -> Result<WidepixConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return resolve_config(None);
    }
    load_config_file(&path)
}

/// Returns a fully-commented stock `widepix.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# widepix configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Encoders
# ---------------------------------------------------------------------------
[output]
# JPEG quality (1 = worst, 100 = best).
jpeg_quality = 90

# PNG compression (0 = fastest, 9 = smallest).
png_compression = 6

# ---------------------------------------------------------------------------
# Palette conversion (GIF output, `as_palette`)
# ---------------------------------------------------------------------------
[palette]
# Maximum palette entries, including the transparent slot.
max_colors = 256

# Move each palette entry to the average of the pixels mapped to it.
match_palette = false

# Error-diffusion dithering. Leave unset to dither only images that have
# transparency.
# dither = true

# ---------------------------------------------------------------------------
# Resize defaults
# ---------------------------------------------------------------------------
[resize]
# inside: fit within the box; outside: cover the box; fill: exact box.
fit = "inside"

# any: always resize; down: never enlarge; up: never shrink.
scale = "any"

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of parallel workers for `batch`. Omit for auto (= CPU cores).
# Values larger than the core count are clamped down.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = WidepixConfig::default();
        assert_eq!(config.output.jpeg_quality, 90);
        assert_eq!(config.output.png_compression, 6);
        assert_eq!(config.palette.max_colors, 256);
        assert_eq!(config.palette.dither, None);
        assert_eq!(config.resize.fit, Fit::Inside);
        assert_eq!(config.resize.scale, Scale::Any);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[palette]
dither = false

[resize]
fit = "outside"
"#;
        let config: WidepixConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.palette.dither, Some(false));
        assert_eq!(config.resize.fit, Fit::Outside);
        // Unspecified defaults preserved
        assert_eq!(config.palette.max_colors, 256);
        assert_eq!(config.output.jpeg_quality, 90);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<WidepixConfig, _> = toml::from_str("[output]\nquality = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_fit_is_rejected() {
        let result: Result<WidepixConfig, _> = toml::from_str("[resize]\nfit = \"stretch\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn save_options_follow_output_section() {
        let output = OutputConfig {
            jpeg_quality: 55,
            png_compression: 2,
        };
        let opts = output.save_options();
        assert_eq!(opts.quality.map(|q| q.value()), Some(55));
        assert_eq!(opts.compression, Some(2));
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, WidepixConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            "[output]\njpeg_quality = 70\n\n[processing]\nmax_processes = 2\n",
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.output.jpeg_quality, 70);
        assert_eq!(config.processing.max_processes, Some(2));
        // Unspecified values should be defaults
        assert_eq!(config.output.png_compression, 6);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();
        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_file_missing_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config_file(&tmp.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    // =========================================================================
    // merge / resolve tests
    // =========================================================================

    #[test]
    fn merge_toml_overrides_leaves_and_keeps_siblings() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n[b]\nz = 4\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"]["x"].as_integer(), Some(1));
        assert_eq!(merged["a"]["y"].as_integer(), Some(3));
        assert_eq!(merged["b"]["z"].as_integer(), Some(4));
    }

    #[test]
    fn resolve_config_with_overlay() {
        let overlay: toml::Value = toml::from_str("[palette]\nmax_colors = 16\n").unwrap();
        let config = resolve_config(Some(overlay)).unwrap();
        assert_eq!(config.palette.max_colors, 16);
        assert!(!config.palette.match_palette);
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        for bad in [
            "[output]\njpeg_quality = 0\n",
            "[output]\npng_compression = 12\n",
            "[palette]\nmax_colors = 300\n",
            "[processing]\nmax_processes = 0\n",
        ] {
            let overlay: toml::Value = toml::from_str(bad).unwrap();
            let result = resolve_config(Some(overlay));
            assert!(matches!(result, Err(ConfigError::Validation(_))), "{bad}");
        }
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        assert_eq!(effective_threads(&config), cores);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
        let one = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&one), 1);
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: WidepixConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, WidepixConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[output]", "[palette]", "[resize]", "[processing]"] {
            assert!(content.contains(section), "{section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        for key in ["output", "palette", "resize", "processing"] {
            assert!(val.get(key).is_some(), "{key}");
        }
    }
}
