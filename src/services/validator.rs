// src/services/validator.rs
//! Client for the remote credential validation service.
//!
//! Signature checks of a verifiable presentation are not done locally. The
//! presentation is posted, together with what was requested, to a validation
//! endpoint that answers `{"Ok": ...}` or `{"Err": "<reason>"}`.

use crate::error::ValidationError;
use crate::models::credential::{CredentialRequestParams, CredentialSpec};
use log::{debug, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a validation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateVpRequest {
    pub vc_subject: String,
    pub issuer_origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_canister_id: Option<String>,
    pub vp_jwt: String,
    pub credential_spec: CredentialSpec,
}

impl ValidateVpRequest {
    /// Builds a validation request from the parameters a presentation was
    /// requested with.
    ///
    /// # Arguments
    /// * `params` - Parameters of the completed flow
    /// * `vp_jwt` - The presentation the flow returned
    pub fn from_flow(params: &CredentialRequestParams, vp_jwt: impl Into<String>) -> Self {
        Self {
            vc_subject: params.credential_subject.clone(),
            issuer_origin: params.issuer.origin.clone(),
            issuer_canister_id: params.issuer.canister_id.clone(),
            vp_jwt: vp_jwt.into(),
            credential_spec: params.credential_spec.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
enum ValidateVpResponse {
    Ok(#[allow(dead_code)] Value),
    Err(String),
}

/// HTTP client of the validation service.
///
/// The service provides:
/// - Presentation signature and expiry checks
/// - Matching of the presented credential against the requested spec
/// - Binding of the credential to the requesting subject
#[derive(Debug, Clone)]
pub struct CredentialValidator {
    client: Client,
    endpoint: Url,
}

impl CredentialValidator {
    /// Creates a validator posting to `endpoint`.
    ///
    /// # Errors
    /// [`ValidationError::Endpoint`] if `endpoint` is not an absolute URL.
    pub fn new(endpoint: &str) -> Result<Self, ValidationError> {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: &str) -> Result<Self, ValidationError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ValidationError::Endpoint(format!("{}: {}", endpoint, e)))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Validates a presentation.
    ///
    /// # Returns
    /// - `Ok(())` if the service accepted the presentation
    /// - `Err(ValidationError::Rejected(reason))` if it answered with `Err`
    /// - `Err` with `Status` or `Transport` when the service could not give an answer
    pub async fn validate(&self, request: &ValidateVpRequest) -> Result<(), ValidationError> {
        debug!(
            "validating {} presentation for {} at {}",
            request.credential_spec.credential_type, request.vc_subject, self.endpoint
        );
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("validation service answered {}", status);
            return Err(ValidationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match response.json::<ValidateVpResponse>().await? {
            ValidateVpResponse::Ok(_) => Ok(()),
            ValidateVpResponse::Err(reason) => Err(ValidationError::Rejected(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::IssuerData;
    use mockito::{mock, Matcher};
    use serde_json::json;

    fn request() -> ValidateVpRequest {
        let params = CredentialRequestParams::new(
            "https://idp.example/",
            IssuerData {
                origin: "https://issuer.example".into(),
                canister_id: Some("qdiif-2iaaa-aaaap-ahjaq-cai".into()),
            },
            CredentialSpec::new("VerifiedAge").with_argument("minAge", 18),
            "subject-principal",
        )
        .unwrap();
        ValidateVpRequest::from_flow(&params, "vp.jwt.sig")
    }

    fn validator(path: &str) -> CredentialValidator {
        CredentialValidator::new(&format!("{}{}", mockito::server_url(), path)).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(request()).unwrap();
        assert_eq!(
            body,
            json!({
                "vcSubject": "subject-principal",
                "issuerOrigin": "https://issuer.example",
                "issuerCanisterId": "qdiif-2iaaa-aaaap-ahjaq-cai",
                "vpJwt": "vp.jwt.sig",
                "credentialSpec": {
                    "credentialType": "VerifiedAge",
                    "arguments": { "minAge": 18 }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_validate_ok() {
        let m = mock("POST", "/validate-ok")
            .match_body(Matcher::PartialJson(json!({
                "vcSubject": "subject-principal",
                "vpJwt": "vp.jwt.sig"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Ok":null}"#)
            .create();

        validator("/validate-ok").validate(&request()).await.unwrap();
        m.assert();
    }

    #[tokio::test]
    async fn test_validate_rejected() {
        let _m = mock("POST", "/validate-err")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Err":"credential expired"}"#)
            .create();

        let err = validator("/validate-err").validate(&request()).await.unwrap_err();
        assert!(matches!(err, ValidationError::Rejected(ref reason) if reason == "credential expired"));
    }

    #[tokio::test]
    async fn test_validate_http_error() {
        let _m = mock("POST", "/validate-down")
            .with_status(503)
            .with_body("unavailable")
            .create();

        let err = validator("/validate-down").validate(&request()).await.unwrap_err();
        match err {
            ValidationError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            CredentialValidator::new("not a url"),
            Err(ValidationError::Endpoint(_))
        ));
    }
}
