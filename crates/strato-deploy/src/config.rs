//! Configuration for strato-deploy.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{DeployError, DeployResult};

/// Deployment configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// Platform region to deploy into.
    #[serde(default = "default_region")]
    pub region: String,

    /// Prefix for the trampoline deployment id.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Human-readable deployment description.
    #[serde(default = "default_description")]
    pub description: String,

    /// Entry point dispatched to by the platform.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Execution timeout in seconds, rendered as `"{n}s"` on the wire.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Memory available to the deployed function, in MiB.
    #[serde(default = "default_available_memory_mb")]
    pub available_memory_mb: u32,

    /// Behaviour when remote deployment creation fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_region() -> String {
    "us-central1".to_owned()
}

fn default_prefix() -> String {
    "strato-trampoline".to_owned()
}

fn default_description() -> String {
    "strato trampoline function".to_owned()
}

fn default_entry_point() -> String {
    "trampoline".to_owned()
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_available_memory_mb() -> u32 {
    256
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            prefix: default_prefix(),
            description: default_description(),
            entry_point: default_entry_point(),
            timeout_secs: default_timeout_secs(),
            available_memory_mb: default_available_memory_mb(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl DeployConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `strato.toml` in the current directory (if present)
    /// 3. Environment variables with `STRATO_DEPLOY_` prefix
    pub fn load() -> DeployResult<Self> {
        Figment::new()
            .merge(Toml::file("strato.toml"))
            .merge(Env::prefixed("STRATO_DEPLOY_").split("__"))
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
    }

    /// The timeout rendered as a platform duration string.
    #[must_use]
    pub fn timeout_string(&self) -> String {
        format!("{}s", self.timeout_secs)
    }
}

/// What to do when remote deployment creation fails.
///
/// The lenient mode reproduces the behaviour of logging and swallowing the
/// failure; strict surfaces it to every caller of the initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Propagate the creation failure to the caller.
    #[default]
    Strict,

    /// Log the failure at `warn` level and continue.
    Lenient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DeployConfig::default();
        assert_eq!(config.region, "us-central1");
        assert_eq!(config.prefix, "strato-trampoline");
        assert_eq!(config.timeout_string(), "60s");
        assert_eq!(config.available_memory_mb, 256);
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
    }

    #[test]
    fn config_from_toml() {
        let toml = r#"
            region = "europe-west1"
            timeout_secs = 120
            failure_policy = "lenient"
        "#;

        let config: DeployConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.region, "europe-west1");
        assert_eq!(config.timeout_string(), "120s");
        assert_eq!(config.failure_policy, FailurePolicy::Lenient);
        // Unspecified fields keep their defaults
        assert_eq!(config.entry_point, "trampoline");
    }

    #[test]
    fn load_layers_file_then_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "strato.toml",
                r#"
                    region = "europe-west1"
                    timeout_secs = 90
                "#,
            )?;
            jail.set_env("STRATO_DEPLOY_TIMEOUT_SECS", "120");
            jail.set_env("STRATO_DEPLOY_PREFIX", "jail-trampoline");

            let config = DeployConfig::load().expect("config should load");
            // File sets the region, env overrides the timeout.
            assert_eq!(config.region, "europe-west1");
            assert_eq!(config.timeout_secs, 120);
            assert_eq!(config.prefix, "jail-trampoline");
            assert_eq!(config.entry_point, "trampoline");
            Ok(())
        });
    }
}
