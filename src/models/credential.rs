// src/models/credential.rs
//! Credential request data model.
//!
//! Defines the parameterized credential description exchanged with the
//! identity provider and the issuer, together with the helpers a relying
//! party uses to build specs for gated content.

use crate::error::{HandshakeError, SpecError};
use crate::models::message::VC_FLOW_PATH;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Argument key under which the content owner is recorded.
pub const OWNER_ARGUMENT: &str = "owner";

/// Credential type whose argument is chosen from a list of countries.
const VERIFIED_RESIDENCE: &str = "VerifiedResidence";

/// A single credential argument.
///
/// Serialized untagged, so it travels as a bare JSON string or number.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[serde(untagged)]
pub enum ArgumentValue {
    String(String),
    Int(i32),
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::String(value) => f.write_str(value),
            ArgumentValue::Int(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        ArgumentValue::String(value.to_string())
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        ArgumentValue::String(value)
    }
}

impl From<i32> for ArgumentValue {
    fn from(value: i32) -> Self {
        ArgumentValue::Int(value)
    }
}

/// Which kind of user input a credential template asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Number,
    Countries,
}

/// A (type, arguments) pair identifying a parameterized credential.
///
/// Arguments are kept in an ordered map, so two specs are equal exactly when
/// they name the same credential type with the same argument set and values.
///
/// # Example
/// ```
/// use vc_flow::models::credential::CredentialSpec;
///
/// let spec = CredentialSpec::new("VerifiedAge").with_argument("minAge", 18);
/// assert_eq!(spec.predicate(), Some(&18.into()));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSpec {
    /// Example: "VerifiedHumanity"
    pub credential_type: String,

    /// Argument name to value. Empty for credentials without parameters.
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgumentValue>,
}

impl CredentialSpec {
    /// Creates a spec without arguments.
    pub fn new(credential_type: impl Into<String>) -> Self {
        Self {
            credential_type: credential_type.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) one argument.
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Returns the predicate of the spec: the first argument that is not the
    /// owner marker.
    pub fn predicate(&self) -> Option<&ArgumentValue> {
        self.arguments
            .iter()
            .find(|(key, _)| key.as_str() != OWNER_ARGUMENT)
            .map(|(_, value)| value)
    }

    /// Classifies the input a template needs before it can be requested.
    ///
    /// # Returns
    /// - `Ok(None)` when the template takes no argument
    /// - `Ok(Some(InputKind::Countries))` for residence credentials
    /// - `Ok(Some(Number | Text))` depending on the template argument's type
    ///
    /// # Errors
    /// [`SpecError::TooManyArguments`] when the template has more than one argument.
    pub fn input_kind(&self) -> Result<Option<InputKind>, SpecError> {
        let mut arguments = self.arguments.values();
        let first = match arguments.next() {
            Some(first) => first,
            None => return Ok(None),
        };
        if self.credential_type == VERIFIED_RESIDENCE {
            return Ok(Some(InputKind::Countries));
        }
        if arguments.next().is_some() {
            return Err(SpecError::TooManyArguments);
        }
        Ok(Some(match first {
            ArgumentValue::Int(_) => InputKind::Number,
            ArgumentValue::String(_) => InputKind::Text,
        }))
    }

    /// Fills every template argument from a raw user-provided value.
    ///
    /// Int slots require the input to parse as a number; String slots take
    /// the input as is. A template without arguments yields an empty map.
    ///
    /// # Errors
    /// - [`SpecError::EmptyArgument`] for blank input on a template with arguments
    /// - [`SpecError::ExpectedNumber`] when an Int slot receives a non-number
    pub fn convert_argument(&self, raw: &str) -> Result<BTreeMap<String, ArgumentValue>, SpecError> {
        if self.arguments.is_empty() {
            return Ok(BTreeMap::new());
        }
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SpecError::EmptyArgument);
        }
        self.arguments
            .iter()
            .map(|(key, slot)| {
                let value = match slot {
                    ArgumentValue::Int(_) => ArgumentValue::Int(
                        raw.parse::<i32>().map_err(|_| SpecError::ExpectedNumber)?,
                    ),
                    ArgumentValue::String(_) => ArgumentValue::String(raw.to_string()),
                };
                Ok((key.clone(), value))
            })
            .collect()
    }

    /// Builds the spec attached to gated content.
    ///
    /// The template's single argument key receives `predicate`, and an
    /// `owner` argument is appended when `owner` is given.
    ///
    /// # Example
    /// Template `VerifiedResidence { countryName: "<countryName>" }`, owner
    /// `P` and predicate `"Switzerland"` give
    /// `VerifiedResidence { countryName: "Switzerland", owner: "P" }`.
    ///
    /// # Errors
    /// [`SpecError::TooManyArguments`] if the template has more than one argument.
    pub fn content_spec(
        &self,
        owner: Option<&str>,
        predicate: Option<ArgumentValue>,
    ) -> Result<CredentialSpec, SpecError> {
        if self.arguments.len() > 1 {
            return Err(SpecError::TooManyArguments);
        }
        let mut arguments = BTreeMap::new();
        if let (Some(key), Some(predicate)) = (self.arguments.keys().next(), predicate) {
            arguments.insert(key.clone(), predicate);
        }
        if let Some(owner) = owner {
            arguments.insert(OWNER_ARGUMENT.to_string(), ArgumentValue::String(owner.to_string()));
        }
        Ok(CredentialSpec {
            credential_type: self.credential_type.clone(),
            arguments,
        })
    }
}

/// The issuer of the requested credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerData {
    /// URL origin of the issuer's frontend, e.g. "https://issuer.example"
    pub origin: String,

    /// Canister identifier of the issuer, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canister_id: Option<String>,
}

impl IssuerData {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            canister_id: None,
        }
    }
}

/// Input of one credential request. Immutable for the lifetime of the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequestParams {
    pub issuer: IssuerData,
    pub credential_spec: CredentialSpec,
    /// Principal (text form) the credential is about
    pub credential_subject: String,
    /// Origin under which the requester's identity is derived
    pub derivation_origin: Option<String>,
    /// Identity provider whose `vc-flow/` page is opened
    pub identity_provider: Url,
    /// Popup placement and sizing, passed to the window host untouched
    pub window_opener_features: Option<String>,
}

impl CredentialRequestParams {
    /// Builds request parameters, parsing the identity provider URL up front.
    ///
    /// # Errors
    /// [`HandshakeError::InvalidIdentityProvider`] when `identity_provider` is
    /// not a hierarchical URL (no popup is ever opened for it).
    pub fn new(
        identity_provider: &str,
        issuer: IssuerData,
        credential_spec: CredentialSpec,
        credential_subject: impl Into<String>,
    ) -> Result<Self, HandshakeError> {
        let identity_provider = Url::parse(identity_provider)
            .map_err(|e| HandshakeError::InvalidIdentityProvider(format!("{}: {}", identity_provider, e)))?;
        if identity_provider.cannot_be_a_base() {
            return Err(HandshakeError::InvalidIdentityProvider(format!(
                "{}: not a hierarchical URL",
                identity_provider
            )));
        }
        Ok(Self {
            issuer,
            credential_spec,
            credential_subject: credential_subject.into(),
            derivation_origin: None,
            identity_provider,
            window_opener_features: None,
        })
    }

    pub fn with_derivation_origin(mut self, derivation_origin: impl Into<String>) -> Self {
        self.derivation_origin = Some(derivation_origin.into());
        self
    }

    pub fn with_window_opener_features(mut self, features: impl Into<String>) -> Self {
        self.window_opener_features = Some(features.into());
        self
    }

    /// The identity provider's credential-flow page.
    pub fn vc_flow_url(&self) -> Url {
        let mut url = self.identity_provider.clone();
        url.set_path(VC_FLOW_PATH);
        url
    }

    /// Origin every message of the flow must come from.
    pub fn identity_provider_origin(&self) -> String {
        self.identity_provider.origin().ascii_serialization()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residence_template() -> CredentialSpec {
        CredentialSpec::new("VerifiedResidence").with_argument("countryName", "<countryName>")
    }

    #[test]
    fn test_spec_equality_ignores_insertion_order() {
        let a = CredentialSpec::new("VerifiedEmployee")
            .with_argument("employerName", "DFINITY")
            .with_argument(OWNER_ARGUMENT, "aaaaa-aa");
        let b = CredentialSpec::new("VerifiedEmployee")
            .with_argument(OWNER_ARGUMENT, "aaaaa-aa")
            .with_argument("employerName", "DFINITY");
        assert_eq!(a, b);

        let other_value = b.clone().with_argument("employerName", "Acme");
        assert_ne!(a, other_value);
        assert_ne!(a, CredentialSpec::new("VerifiedEmployee"));
    }

    #[test]
    fn test_arguments_serialize_as_bare_values() {
        let spec = CredentialSpec::new("VerifiedAge")
            .with_argument("minAge", 18)
            .with_argument("label", "adult");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "credentialType": "VerifiedAge",
                "arguments": { "label": "adult", "minAge": 18 }
            })
        );

        let parsed: CredentialSpec =
            serde_json::from_str(r#"{"credentialType":"VerifiedHumanity"}"#).unwrap();
        assert!(parsed.arguments.is_empty());
    }

    #[test]
    fn test_content_spec_fills_predicate_and_owner() {
        let spec = residence_template()
            .content_spec(Some("owner-principal"), Some("Switzerland".into()))
            .unwrap();
        assert_eq!(
            spec,
            CredentialSpec::new("VerifiedResidence")
                .with_argument("countryName", "Switzerland")
                .with_argument(OWNER_ARGUMENT, "owner-principal")
        );
        assert_eq!(spec.predicate(), Some(&ArgumentValue::from("Switzerland")));
    }

    #[test]
    fn test_content_spec_without_predicate_or_arguments() {
        let humanity = CredentialSpec::new("VerifiedHumanity");
        assert_eq!(humanity.content_spec(None, Some(3.into())).unwrap(), humanity);

        let spec = residence_template().content_spec(None, None).unwrap();
        assert!(spec.arguments.is_empty());
    }

    #[test]
    fn test_content_spec_rejects_multiple_arguments() {
        let template = residence_template().with_argument("city", "<city>");
        assert_eq!(
            template.content_spec(None, Some("Zurich".into())),
            Err(SpecError::TooManyArguments)
        );
    }

    #[test]
    fn test_input_kind() {
        assert_eq!(CredentialSpec::new("VerifiedHumanity").input_kind(), Ok(None));
        assert_eq!(residence_template().input_kind(), Ok(Some(InputKind::Countries)));
        assert_eq!(
            CredentialSpec::new("VerifiedAge").with_argument("minAge", 0).input_kind(),
            Ok(Some(InputKind::Number))
        );
        assert_eq!(
            CredentialSpec::new("VerifiedEmployee")
                .with_argument("employerName", "")
                .input_kind(),
            Ok(Some(InputKind::Text))
        );
        let two = CredentialSpec::new("VerifiedEmployee")
            .with_argument("a", "")
            .with_argument("b", "");
        assert_eq!(two.input_kind(), Err(SpecError::TooManyArguments));
    }

    #[test]
    fn test_convert_argument() {
        let age = CredentialSpec::new("VerifiedAge").with_argument("minAge", 0);
        assert_eq!(
            age.convert_argument(" 21 ").unwrap().get("minAge"),
            Some(&ArgumentValue::Int(21))
        );
        assert_eq!(age.convert_argument("twenty"), Err(SpecError::ExpectedNumber));
        assert_eq!(age.convert_argument("  "), Err(SpecError::EmptyArgument));

        let converted = residence_template().convert_argument("Spain").unwrap();
        assert_eq!(converted.get("countryName"), Some(&ArgumentValue::from("Spain")));

        assert!(CredentialSpec::new("VerifiedHumanity")
            .convert_argument("")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_request_params_build_flow_url() {
        let params = CredentialRequestParams::new(
            "https://idp.example/some/page?x=1",
            IssuerData::new("https://issuer.example"),
            CredentialSpec::new("VerifiedHumanity"),
            "subject-principal",
        )
        .unwrap();
        assert_eq!(params.vc_flow_url().path(), "/vc-flow/");
        assert_eq!(params.vc_flow_url().host_str(), Some("idp.example"));
        assert_eq!(params.identity_provider_origin(), "https://idp.example");
    }

    #[test]
    fn test_request_params_reject_malformed_identity_provider() {
        for bad in ["not a url", "mailto:someone@example.org"] {
            let err = CredentialRequestParams::new(
                bad,
                IssuerData::new("https://issuer.example"),
                CredentialSpec::new("VerifiedHumanity"),
                "subject",
            )
            .unwrap_err();
            assert!(matches!(err, HandshakeError::InvalidIdentityProvider(_)));
        }
    }
}
