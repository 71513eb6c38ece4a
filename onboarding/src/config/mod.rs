// Client configuration
//
// Layering (later wins):
//   1. built-in defaults
//   2. `coop-onboarding.toml` next to the executable, then in the user config dir
//      (or an explicit `--config <path>`)
//   3. environment variables `COOP_ONBOARDING_<SECTION>__<KEY>`
//      (e.g. COOP_ONBOARDING_API__BASE_URL)

use crate::utils::path_resolver;
use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "coop-onboarding.toml";
const ENV_PREFIX: &str = "COOP_ONBOARDING";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub payments: PaymentSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaymentSettings {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    /// Business account debited for the penny-drop validation.
    pub source_account_number: String,
    pub currency: String,
    pub checkout_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SessionSettings {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: Option<String>,
    pub level: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.agricoop.in/api".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.razorpay.com/v1".to_string(),
            key_id: String::new(),
            key_secret: String::new(),
            source_account_number: String::new(),
            currency: "INR".to_string(),
            checkout_description: "Cooperative registration fee".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: None,
            level: "debug".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, the first config file found, and the environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = config::Config::builder()
            .set_default("api.base_url", defaults.api.base_url.clone())?
            .set_default("api.timeout_secs", defaults.api.timeout_secs as i64)?
            .set_default("payments.base_url", defaults.payments.base_url.clone())?
            .set_default("payments.currency", defaults.payments.currency.clone())?
            .set_default(
                "payments.checkout_description",
                defaults.payments.checkout_description.clone(),
            )?
            .set_default("logging.level", defaults.logging.level.clone())?;

        match explicit_path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(path) = discover_config_file() {
                    info!("[PHASE: initialization] [STEP: config] Using config file {:?}", path);
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("api.base_url is not a valid URL: {}", self.api.base_url))?;
        url::Url::parse(&self.payments.base_url).with_context(|| {
            format!(
                "payments.base_url is not a valid URL: {}",
                self.payments.base_url
            )
        })?;
        if self.api.timeout_secs == 0 {
            return Err(anyhow::anyhow!("api.timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    /// Whether bank validation / checkout can run (processor credentials configured).
    pub fn payments_configured(&self) -> bool {
        !self.payments.key_id.trim().is_empty() && !self.payments.key_secret.trim().is_empty()
    }

    /// Serialize the defaults as a starter TOML file.
    pub fn write_default(path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(&Settings::default())
            .context("Failed to serialize default configuration")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }
}

fn discover_config_file() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(dir) = path_resolver::resolve_deployment_folder() {
        candidates.push(dir.join(CONFIG_FILE_NAME));
    }
    if let Some(dir) = path_resolver::resolve_config_folder() {
        candidates.push(dir.join(CONFIG_FILE_NAME));
    }
    candidates.into_iter().find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
[api]
base_url = "http://localhost:8080/api"

[payments]
key_id = "rzp_test_key"
key_secret = "secret"
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.api.base_url, "http://localhost:8080/api");
        // Untouched keys keep defaults
        assert_eq!(settings.api.timeout_secs, 30);
        assert_eq!(settings.payments.currency, "INR");
        assert!(settings.payments_configured());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[api]\nbase_url = \"not a url\"\n").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub").join(CONFIG_FILE_NAME);
        Settings::write_default(&path).unwrap();
        let loaded = Settings::load(Some(&path)).unwrap();
        assert_eq!(loaded.api, Settings::default().api);
        assert!(!loaded.payments_configured());
    }
}
