//! Engine settings.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::Result;

/// Options that affect parsing and include resolution.
///
/// Every field has a default, so a settings document only needs to name what
/// it changes:
///
/// ```
/// use tessera::Settings;
///
/// let settings = Settings::from_json_str(r#"{"strip_whitespace": false}"#).unwrap();
/// assert!(!settings.strip_whitespace);
/// assert_eq!(settings.template_extension, "tsr");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Remove blank text around directives that take up whole lines.
    pub strip_whitespace: bool,
    /// Directory `{[#include]}` paths are resolved against. Includes fail
    /// when unset.
    pub include_root: Option<PathBuf>,
    /// File extension appended to include paths.
    pub template_extension: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strip_whitespace: true,
            include_root: None,
            template_extension: "tsr".to_string(),
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_include_root(mut self, include_root: impl Into<PathBuf>) -> Self {
        self.include_root = Some(include_root.into());
        self
    }
}
