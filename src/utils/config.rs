use std::collections::HashMap;
use std::env;
use tokio::time::Duration;

use crate::utils::error::Error;

pub const FIELD_MANAGER_VAR: &str = "MATTERMOST_OPERATOR_FIELD_MANAGER";
pub const REQUEUE_SECONDS_VAR: &str = "MATTERMOST_OPERATOR_REQUEUE_SECONDS";
pub const ERROR_REQUEUE_SECONDS_VAR: &str = "MATTERMOST_OPERATOR_ERROR_REQUEUE_SECONDS";

/// Settings of the reconcile loop. The materialization core takes none of these.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Field manager used for server-side apply of generated deployments.
    pub field_manager: String,
    /// Delay before a successfully reconciled installation is checked again.
    pub requeue_after: Duration,
    /// Delay before a failed reconciliation is retried.
    pub error_requeue_after: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            field_manager: "mattermost-operator".to_string(),
            requeue_after: Duration::from_secs(60),
            error_requeue_after: Duration::from_secs(5),
        }
    }
}

impl OperatorConfig {
    /// Reads the operator settings from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    fn from_vars(vars: &HashMap<String, String>) -> Result<Self, Error> {
        let mut config = OperatorConfig::default();

        if let Some(field_manager) = vars.get(FIELD_MANAGER_VAR) {
            if field_manager.trim().is_empty() {
                return Err(Error::ConfigError(format!("{} is empty", FIELD_MANAGER_VAR)));
            }
            config.field_manager = field_manager.trim().to_string();
        }

        if let Some(seconds) = vars.get(REQUEUE_SECONDS_VAR) {
            config.requeue_after = parse_seconds(REQUEUE_SECONDS_VAR, seconds)?;
        }

        if let Some(seconds) = vars.get(ERROR_REQUEUE_SECONDS_VAR) {
            config.error_requeue_after = parse_seconds(ERROR_REQUEUE_SECONDS_VAR, seconds)?;
        }

        Ok(config)
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<Duration, Error> {
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err(Error::ConfigError(format!(
            "{} must be a positive number of seconds, got {:?}",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use tokio::time::Duration;

    use super::{OperatorConfig, ERROR_REQUEUE_SECONDS_VAR, FIELD_MANAGER_VAR, REQUEUE_SECONDS_VAR};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_without_environment() {
        let config = OperatorConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, OperatorConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = OperatorConfig::from_vars(&vars(&[
            (FIELD_MANAGER_VAR, "mm-operator"),
            (REQUEUE_SECONDS_VAR, "120"),
            (ERROR_REQUEUE_SECONDS_VAR, "15"),
        ]))
        .unwrap();

        assert_eq!(config.field_manager, "mm-operator");
        assert_eq!(config.requeue_after, Duration::from_secs(120));
        assert_eq!(config.error_requeue_after, Duration::from_secs(15));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(OperatorConfig::from_vars(&vars(&[(REQUEUE_SECONDS_VAR, "soon")])).is_err());
        assert!(OperatorConfig::from_vars(&vars(&[(ERROR_REQUEUE_SECONDS_VAR, "0")])).is_err());
        assert!(OperatorConfig::from_vars(&vars(&[(FIELD_MANAGER_VAR, " ")])).is_err());
    }
}
