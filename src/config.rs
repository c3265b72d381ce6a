// src/config.rs
//! Application settings.
//!
//! Loaded from the environment with the `VC_` prefix, e.g.
//! `VC_IDENTITY_PROVIDER=https://identity.ic0.app`. A `.env` file is honoured
//! when the binary loads it first.

use crate::error::SettingsError;
use crate::models::credential::IssuerData;
use crate::services::handshake::{HandshakeOptions, DEFAULT_FLOW_TIMEOUT, DEFAULT_POPUP_POLL_INTERVAL};
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Environment};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the identity provider; the flow page is `<url>/vc-flow/`
    pub identity_provider: String,
    pub issuer_origin: String,
    pub issuer_canister_id: Option<String>,
    pub derivation_origin: Option<String>,
    /// Remote validation endpoint. Presentations are only decoded when unset.
    pub validation_url: Option<String>,
    /// Upper bound of one flow in seconds, `0` waits forever
    pub flow_timeout_secs: u64,
    pub popup_poll_interval_ms: u64,
}

impl Settings {
    /// Loads settings from `VC_*` environment variables.
    ///
    /// # Errors
    /// - `SettingsError::Config` if a required key is missing or mistyped
    /// - `SettingsError::Invalid` if a URL does not parse
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_config(
            Self::builder()?
                .add_source(Environment::with_prefix("VC").try_parsing(true))
                .build()?,
        )
    }

    /// Builder preloaded with defaults, for layering further sources.
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        Ok(Config::builder()
            .set_default("flow_timeout_secs", DEFAULT_FLOW_TIMEOUT.as_secs())?
            .set_default("popup_poll_interval_ms", DEFAULT_POPUP_POLL_INTERVAL.as_millis() as u64)?)
    }

    pub fn from_config(config: Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        check_url("identity_provider", &self.identity_provider)?;
        check_url("issuer_origin", &self.issuer_origin)?;
        if let Some(url) = &self.validation_url {
            check_url("validation_url", url)?;
        }
        if self.popup_poll_interval_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "popup_poll_interval_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn handshake_options(&self) -> HandshakeOptions {
        HandshakeOptions {
            timeout: match self.flow_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            popup_poll_interval: Duration::from_millis(self.popup_poll_interval_ms),
        }
    }

    pub fn issuer(&self) -> IssuerData {
        IssuerData {
            origin: self.issuer_origin.clone(),
            canister_id: self.issuer_canister_id.clone(),
        }
    }
}

fn check_url(key: &'static str, value: &str) -> Result<(), SettingsError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| SettingsError::Invalid {
            key,
            reason: format!("{}: {}", value, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::{File, FileFormat};

    fn load(toml: &str) -> Result<Settings, SettingsError> {
        Settings::from_config(
            Settings::builder()
                .unwrap()
                .add_source(File::from_str(toml, FileFormat::Toml))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_defaults_apply() {
        let settings = load(
            r#"
            identity_provider = "https://identity.ic0.app"
            issuer_origin = "https://issuer.example"
            "#,
        )
        .unwrap();
        assert_eq!(settings.flow_timeout_secs, 300);
        assert_eq!(settings.validation_url, None);
        assert_eq!(settings.handshake_options(), HandshakeOptions::default());
        assert_eq!(settings.issuer(), IssuerData::new("https://issuer.example"));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let settings = load(
            r#"
            identity_provider = "https://identity.ic0.app"
            issuer_origin = "https://issuer.example"
            issuer_canister_id = "qdiif-2iaaa-aaaap-ahjaq-cai"
            flow_timeout_secs = 0
            popup_poll_interval_ms = 250
            "#,
        )
        .unwrap();
        let options = settings.handshake_options();
        assert_eq!(options.timeout, None);
        assert_eq!(options.popup_poll_interval, Duration::from_millis(250));
        assert_eq!(
            settings.issuer().canister_id.as_deref(),
            Some("qdiif-2iaaa-aaaap-ahjaq-cai")
        );
    }

    #[test]
    fn test_missing_and_invalid_values() {
        assert!(matches!(
            load(r#"issuer_origin = "https://issuer.example""#),
            Err(SettingsError::Config(_))
        ));
        assert!(matches!(
            load(
                r#"
                identity_provider = "not a url"
                issuer_origin = "https://issuer.example"
                "#
            ),
            Err(SettingsError::Invalid { key: "identity_provider", .. })
        ));
    }
}
