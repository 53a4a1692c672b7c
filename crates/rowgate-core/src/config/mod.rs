//! Configuration types for rowgate.
//!
//! A single YAML document describes the mapped entities, the access rules and
//! evaluation settings. Rules can be inlined or kept in separate rule files:
//!
//! ```yaml
//! principal:
//!   entity: User
//! entities:
//!   - name: Contact
//!     id: [id]
//!     properties:
//!       id: { type: Long }
//!       owner: { type: User, kind: one }
//! rules:
//!   - GRANT READ ACCESS TO Contact c WHERE c.owner = CURRENT_PRINCIPAL
//! rule_files:
//!   - rules/contacts.yaml
//! ```

mod entity;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use entity::{
    EntityConfig, PermitConfig, PropertyConfig, PropertyKindConfig, RolesAllowedConfig,
};

/// Complete rowgate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Mapped entities.
    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    /// GRANT statements.
    #[serde(default)]
    pub rules: Vec<String>,

    /// Files holding further GRANT statements, relative to this file.
    #[serde(default)]
    pub rule_files: Vec<PathBuf>,

    #[serde(default)]
    pub principal: PrincipalConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Typing of the `CURRENT_PRINCIPAL` pseudo-alias.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalConfig {
    /// Entity the principal is an instance of; a plain value when absent.
    #[serde(default)]
    pub entity: Option<String>,
}

/// In-memory evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Escape character for LIKE patterns without an ESCAPE clause.
    #[serde(default)]
    pub like_escape: Option<char>,

    /// Run subselects the in-memory evaluator cannot handle against the
    /// query executor.
    #[serde(default = "default_true")]
    pub delegate_subselects: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            like_escape: None,
            delegate_subselects: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Contents of a rule file.
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<String>,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SecurityConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration and append the rules of every rule file.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        for rule_file in &config.rule_files.clone() {
            let rule_path = if rule_file.is_absolute() {
                rule_file.clone()
            } else {
                base_dir.join(rule_file)
            };

            if !rule_path.exists() {
                return Err(ConfigError::Config(format!(
                    "rule file {} not found",
                    rule_path.display()
                )));
            }
            let content = fs::read_to_string(&rule_path)?;
            let file: RuleFile = serde_yaml::from_str(&content)?;
            tracing::debug!(
                file = %rule_path.display(),
                rules = file.rules.len(),
                "loaded rule file"
            );
            config.rules.extend(file.rules);
        }

        Ok(config)
    }

    /// Get an entity declaration by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for entity in &self.entities {
            for roles in &entity.roles_allowed {
                if roles.roles.is_empty() {
                    return Err(ConfigError::Config(format!(
                        "roles_allowed of entity {} declares no roles",
                        entity.name
                    )));
                }
            }
            for (name, property) in &entity.properties {
                if property.key.is_some() && property.kind != PropertyKindConfig::Map {
                    return Err(ConfigError::Config(format!(
                        "property {}.{} declares a key but is not a map",
                        entity.name, name
                    )));
                }
            }
        }
        if let Some(principal) = &self.principal.entity {
            if self.get_entity(principal).is_none() {
                return Err(ConfigError::Config(format!(
                    "principal entity {principal} is not mapped"
                )));
            }
        }
        Ok(())
    }
}
