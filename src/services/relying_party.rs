// src/services/relying_party.rs
//! Relying-party credential checks.
//!
//! Composes the three steps a relying party takes to decide whether a user
//! holds a credential: request a presentation through the popup handshake,
//! decode it, and have it validated remotely when a validation endpoint is
//! configured.

use crate::error::ValidationError;
use crate::models::credential::{CredentialRequestParams, CredentialSpec, IssuerData};
use crate::models::presentation::decode_presentation;
use crate::services::handshake::CredentialRequestHandshake;
use crate::services::validator::{CredentialValidator, ValidateVpRequest};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Result of one credential check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCheck {
    pub credential_spec: CredentialSpec,
    pub subject: String,
    pub has_credential: bool,
    pub checked_at: DateTime<Utc>,
    /// Why the credential was not granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CredentialCheck {
    fn granted(spec: &CredentialSpec, subject: &str) -> Self {
        Self {
            credential_spec: spec.clone(),
            subject: subject.to_string(),
            has_credential: true,
            checked_at: Utc::now(),
            reason: None,
        }
    }

    fn denied(spec: &CredentialSpec, subject: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(
            "{} not granted to {}: {}",
            spec.credential_type, subject, reason
        );
        Self {
            credential_spec: spec.clone(),
            subject: subject.to_string(),
            has_credential: false,
            checked_at: Utc::now(),
            reason: Some(reason),
        }
    }
}

/// A relying party asking one identity provider for credentials of one issuer.
pub struct RelyingParty {
    handshake: Arc<CredentialRequestHandshake>,
    identity_provider: String,
    issuer: IssuerData,
    derivation_origin: Option<String>,
    window_opener_features: Option<String>,
    validator: Option<CredentialValidator>,
}

impl RelyingParty {
    /// Creates a relying party.
    ///
    /// # Arguments
    /// * `handshake` - The shared handshake instance (flow ids are unique per instance)
    /// * `identity_provider` - URL of the identity provider
    /// * `issuer` - Issuer of the requested credentials
    pub fn new(
        handshake: Arc<CredentialRequestHandshake>,
        identity_provider: impl Into<String>,
        issuer: IssuerData,
    ) -> Self {
        Self {
            handshake,
            identity_provider: identity_provider.into(),
            issuer,
            derivation_origin: None,
            window_opener_features: None,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: CredentialValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_derivation_origin(mut self, derivation_origin: Option<String>) -> Self {
        self.derivation_origin = derivation_origin;
        self
    }

    pub fn with_window_opener_features(mut self, features: impl Into<String>) -> Self {
        self.window_opener_features = Some(features.into());
        self
    }

    fn request_params(
        &self,
        spec: &CredentialSpec,
        subject: &str,
    ) -> Result<CredentialRequestParams, String> {
        let mut params = CredentialRequestParams::new(
            &self.identity_provider,
            self.issuer.clone(),
            spec.clone(),
            subject,
        )
        .map_err(|e| e.to_string())?;
        params.derivation_origin = self.derivation_origin.clone();
        params.window_opener_features = self.window_opener_features.clone();
        Ok(params)
    }

    /// Checks whether `subject` holds a credential matching `spec`.
    ///
    /// # Returns
    /// - `Ok(check)` with `has_credential` set, and a reason when it is not
    /// - `Err` only when the validation service could not give an answer
    pub async fn check_credential(
        &self,
        spec: &CredentialSpec,
        subject: &str,
    ) -> Result<CredentialCheck, ValidationError> {
        let params = match self.request_params(spec, subject) {
            Ok(params) => params,
            Err(reason) => return Ok(CredentialCheck::denied(spec, subject, reason)),
        };

        let vp_jwt = match self.handshake.request(&params).await {
            Ok(vp_jwt) => vp_jwt,
            Err(e) => return Ok(CredentialCheck::denied(spec, subject, e.to_string())),
        };

        let presentation = match decode_presentation(&vp_jwt) {
            Ok(presentation) => presentation,
            Err(e) => {
                return Ok(CredentialCheck::denied(
                    spec,
                    subject,
                    format!("invalid presentation: {}", e),
                ))
            }
        };
        match presentation.credential() {
            None => {
                return Ok(CredentialCheck::denied(
                    spec,
                    subject,
                    "presentation carries no credential",
                ))
            }
            Some(credential) if credential.is_expired_at(Utc::now()) => {
                return Ok(CredentialCheck::denied(spec, subject, "credential expired"))
            }
            Some(_) => {}
        }

        if let Some(validator) = &self.validator {
            match validator.validate(&ValidateVpRequest::from_flow(&params, vp_jwt)).await {
                Ok(()) => {}
                Err(ValidationError::Rejected(reason)) => {
                    return Ok(CredentialCheck::denied(spec, subject, reason))
                }
                Err(e) => return Err(e),
            }
        }

        info!("{} granted to {}", spec.credential_type, subject);
        Ok(CredentialCheck::granted(spec, subject))
    }

    /// Checks several credentials for one subject, with all flows in flight at once.
    pub async fn check_credentials(
        &self,
        specs: &[CredentialSpec],
        subject: &str,
    ) -> Result<Vec<CredentialCheck>, ValidationError> {
        try_join_all(specs.iter().map(|spec| self.check_credential(spec, subject))).await
    }
}
