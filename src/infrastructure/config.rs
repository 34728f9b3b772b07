use crate::domain::models::{AutotagConfig, CategoryColorMap};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const AUTOTAG_JSON: &str = "autotag.json";
const CONFIG_SCHEMA: u64 = 1;

#[derive(Debug, Serialize)]
struct StoredConfig<'a> {
    schema: u64,
    #[serde(flatten)]
    config: &'a AutotagConfig,
}

/// Any subset of the top-level configuration keys. Missing keys fall back to
/// the defaults when merged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartialConfig {
    schema: Option<u64>,
    categories: Option<CategoryColorMap>,
    days_back: Option<u32>,
    days_forward: Option<u32>,
    interval_minutes: Option<u32>,
    full_width_colors: Option<bool>,
}

impl PartialConfig {
    fn merged_onto(self, defaults: AutotagConfig) -> AutotagConfig {
        AutotagConfig {
            categories: self.categories.unwrap_or(defaults.categories),
            days_back: self.days_back.unwrap_or(defaults.days_back),
            days_forward: self.days_forward.unwrap_or(defaults.days_forward),
            interval_minutes: self.interval_minutes.unwrap_or(defaults.interval_minutes),
            full_width_colors: self.full_width_colors.unwrap_or(defaults.full_width_colors),
        }
    }
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(AUTOTAG_JSON)
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_path(config_dir);
    if !path.exists() {
        write_config(&path, &AutotagConfig::default())?;
    }
    Ok(())
}

pub fn load_config(config_dir: &Path) -> Result<AutotagConfig, InfraError> {
    let path = config_path(config_dir);
    if !path.exists() {
        return Ok(AutotagConfig::default());
    }
    let raw = fs::read_to_string(&path)?;
    let partial = serde_json::from_str::<PartialConfig>(&raw).map_err(|error| {
        InfraError::InvalidConfig(format!("{}: {error}", path.display()))
    })?;
    if let Some(schema) = partial.schema {
        if schema != CONFIG_SCHEMA {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported schema {} in {}",
                schema,
                path.display()
            )));
        }
    }
    let config = partial.merged_onto(AutotagConfig::default());
    config
        .validate()
        .map_err(|message| InfraError::InvalidConfig(format!("{}: {message}", path.display())))?;
    Ok(config)
}

pub fn save_config(config_dir: &Path, config: &AutotagConfig) -> Result<(), InfraError> {
    config.validate().map_err(InfraError::Validation)?;
    write_config(&config_path(config_dir), config)
}

/// Pretty JSON of the configuration object, without storage metadata.
pub fn export_config(config: &AutotagConfig) -> Result<String, InfraError> {
    let formatted = serde_json::to_string_pretty(config)?;
    Ok(format!("{formatted}\n"))
}

/// Parses an exported configuration. `categories` is mandatory; every
/// other missing top-level key takes its default.
pub fn import_config(raw: &str) -> Result<AutotagConfig, InfraError> {
    let partial = serde_json::from_str::<PartialConfig>(raw)
        .map_err(|error| InfraError::Validation(format!("invalid config: {error}")))?;
    if partial.categories.is_none() {
        return Err(InfraError::Validation(
            "invalid config: missing categories".to_string(),
        ));
    }
    let config = partial.merged_onto(AutotagConfig::default());
    config
        .validate()
        .map_err(|message| InfraError::Validation(format!("invalid config: {message}")))?;
    Ok(config)
}

fn write_config(path: &Path, config: &AutotagConfig) -> Result<(), InfraError> {
    let stored = StoredConfig {
        schema: CONFIG_SCHEMA,
        config,
    };
    let formatted = serde_json::to_string_pretty(&stored)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}
