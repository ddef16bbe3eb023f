//! Core configuration: bus group, advertised and tracked roles, correlated command names.

use serde::Deserialize;

use crate::peer::{Role, RoleSet};
use crate::protocol::{DEFAULT_GROUP, LOAD_PLATFORM_FROM_PATH};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Broadcast group (default INGESCAPE_PRIVATE).
    #[serde(default = "default_group")]
    pub group: String,
    /// Roles this process declares in its service headers.
    #[serde(default = "default_advertise")]
    pub advertise: Vec<Role>,
    /// Roles whose enter/exit produce role-scoped notifications.
    #[serde(default = "default_tracked_roles")]
    pub tracked_roles: Vec<Role>,
    /// Command names whose status replies are correlated.
    #[serde(default = "default_correlated_commands")]
    pub correlated_commands: Vec<String>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}
fn default_advertise() -> Vec<Role> {
    vec![Role::ExperimentRunner]
}
fn default_tracked_roles() -> Vec<Role> {
    vec![Role::Editor]
}
fn default_correlated_commands() -> Vec<String> {
    vec![LOAD_PLATFORM_FROM_PATH.to_string()]
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            advertise: default_advertise(),
            tracked_roles: default_tracked_roles(),
            correlated_commands: default_correlated_commands(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("group name is empty")]
    EmptyGroup,
    #[error("cannot advertise the unknown role")]
    AdvertiseUnknown,
    #[error("correlated command name {0:?} is empty or contains '=' or whitespace")]
    BadCommandName(String),
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group.trim().is_empty() {
            return Err(ConfigError::EmptyGroup);
        }
        if self.advertise.contains(&Role::Unknown) {
            return Err(ConfigError::AdvertiseUnknown);
        }
        if let Some(bad) = self
            .correlated_commands
            .iter()
            .find(|n| n.is_empty() || n.contains('=') || n.chars().any(char::is_whitespace))
        {
            return Err(ConfigError::BadCommandName(bad.clone()));
        }
        Ok(())
    }

    pub fn advertised_roles(&self) -> RoleSet {
        self.advertise.iter().copied().collect()
    }

    pub fn tracked_role_set(&self) -> RoleSet {
        self.tracked_roles.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = CoreConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.advertised_roles().contains(Role::ExperimentRunner));
        assert!(c.tracked_role_set().contains(Role::Editor));
    }

    #[test]
    fn rejects_bad_values() {
        let mut c = CoreConfig {
            group: " ".to_string(),
            ..CoreConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::EmptyGroup));
        c.group = "G".to_string();
        c.advertise = vec![Role::Unknown];
        assert_eq!(c.validate(), Err(ConfigError::AdvertiseUnknown));
        c.advertise = vec![Role::Editor];
        c.correlated_commands = vec!["A B".to_string()];
        assert_eq!(
            c.validate(),
            Err(ConfigError::BadCommandName("A B".to_string()))
        );
    }
}
