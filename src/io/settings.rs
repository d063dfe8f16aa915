use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SETTINGS_FILE: &str = "load_order.toml";

/// Optional settings file read from the working directory. Every field has
/// a default, so an absent file means default behavior and a partial file
/// overrides only what it names.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug)]
pub struct Settings {
    #[serde(default)]
    /// Fixed plugin directory, bypassing game discovery.
    pub plugin_dir: Option<String>,
    #[serde(default = "default_user_rules")]
    /// Path of the user rule file. Missing file is tolerated.
    pub user_rules: String,
    #[serde(default = "default_base_rules")]
    /// Path of the base rule file. Missing file is fatal.
    pub base_rules: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            user_rules: default_user_rules(),
            base_rules: default_base_rules(),
        }
    }
}

fn default_user_rules() -> String {
    "load_order_user.txt".to_string()
}

fn default_base_rules() -> String {
    "load_order_base.txt".to_string()
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| anyhow!("unable to read settings file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| anyhow!("malformed settings file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.user_rules, "load_order_user.txt");
        assert_eq!(settings.base_rules, "load_order_base.txt");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "plugin_dir = \"/games/morrowind/Data Files\"\n").expect("write");
        let settings = Settings::load(&path).expect("load");
        assert_eq!(
            settings.plugin_dir.as_deref(),
            Some("/games/morrowind/Data Files")
        );
        assert_eq!(settings.base_rules, "load_order_base.txt");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "plugin_dir = [not toml").expect("write");
        assert!(Settings::load(&path).is_err());
    }
}
