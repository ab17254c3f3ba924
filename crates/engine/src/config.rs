use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const DEFAULT_URI_BASE: &str = "http://ssds.mbari.org";

/// What to do when a non-unique business-key lookup hits several rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousKeyPolicy {
    /// Take the row with the lowest surrogate id and log a warning.
    #[default]
    FirstMatch,
    /// Fail with `EngineError::AmbiguousBusinessKey`.
    Reject,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Receives a notification for every change.
    pub admin_address: Option<String>,
    /// Also notify the affected person's own address.
    pub send_user_messages: bool,
    /// Prefix of generated URIs for containers and resources.
    pub generated_uri_base: String,
    pub ambiguous_key_policy: AmbiguousKeyPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admin_address: None,
            send_user_messages: false,
            generated_uri_base: DEFAULT_URI_BASE.to_string(),
            ambiguous_key_policy: AmbiguousKeyPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            serde_json::from_str(raw).map_err(|err| EngineError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| EngineError::Config(format!("read {}: {err}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self).map_err(|err| EngineError::Config(err.to_string()))
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.generated_uri_base.trim().is_empty() {
            return Err(EngineError::Config("generated_uri_base is empty".into()));
        }
        if let Some(addr) = &self.admin_address {
            if !addr.contains('@') {
                return Err(EngineError::Config(format!(
                    "admin_address {addr:?} is not an email address"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{"send_user_messages": true}"#).unwrap();
        assert!(config.send_user_messages);
        assert_eq!(config.generated_uri_base, DEFAULT_URI_BASE);
        assert_eq!(config.ambiguous_key_policy, AmbiguousKeyPolicy::FirstMatch);
        assert_eq!(config.admin_address, None);
    }

    #[test]
    fn policy_is_snake_case() {
        let config =
            EngineConfig::from_json_str(r#"{"ambiguous_key_policy": "reject"}"#).unwrap();
        assert_eq!(config.ambiguous_key_policy, AmbiguousKeyPolicy::Reject);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"generated_uri_base": " "}"#),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"admin_address": "nobody"}"#),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_json_str("not json"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig {
            admin_address: Some("ops@mbari.org".into()),
            ..EngineConfig::default()
        };
        fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        assert!(EngineConfig::load(dir.path().join("missing.json")).is_err());
    }
}
