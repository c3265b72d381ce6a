// src/models/message.rs
//! Wire messages of the credential flow.
//!
//! The relying party and the identity provider popup talk over
//! cross-window messaging with three JSON shapes:
//!
//! ```text
//! ReadyMessage   := { method: "vc-flow-ready" }
//! RequestMessage := { id, jsonrpc: "2.0", method: "request_credential", params }
//! ResultMessage  := { id, result?: { verifiablePresentation }, error? }
//! ```
//!
//! Field names and constants must stay byte-exact for interoperability.

use crate::models::credential::{CredentialRequestParams, CredentialSpec, IssuerData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method announced by the popup once it listens for requests.
pub const VC_FLOW_READY: &str = "vc-flow-ready";

/// JSON-RPC method of the credential request.
pub const REQUEST_CREDENTIAL: &str = "request_credential";

pub const JSONRPC_VERSION: &str = "2.0";

/// Path of the identity provider's credential-flow page.
pub const VC_FLOW_PATH: &str = "vc-flow/";

/// Readiness signal posted by the popup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadyMessage {
    pub method: String,
}

impl ReadyMessage {
    pub fn new() -> Self {
        Self {
            method: VC_FLOW_READY.to_string(),
        }
    }
}

impl Default for ReadyMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters of a `request_credential` call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestCredentialParams {
    pub issuer: IssuerData,
    pub credential_spec: CredentialSpec,
    pub credential_subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation_origin: Option<String>,
}

/// The single request sent to the popup per flow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    /// Flow id in decimal string form
    pub id: String,
    pub jsonrpc: String,
    pub method: String,
    pub params: RequestCredentialParams,
}

impl RequestMessage {
    /// Builds the request of flow `flow_id` from the caller's parameters.
    pub fn new(flow_id: u64, params: &CredentialRequestParams) -> Self {
        Self {
            id: flow_id.to_string(),
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: REQUEST_CREDENTIAL.to_string(),
            params: RequestCredentialParams {
                issuer: params.issuer.clone(),
                credential_spec: params.credential_spec.clone(),
                credential_subject: params.credential_subject.clone(),
                derivation_origin: params.derivation_origin.clone(),
            },
        }
    }
}

/// Successful payload of a result message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PresentationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifiable_presentation: Option<String>,
}

/// Final answer of the popup, correlated by `id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResultMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PresentationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultMessage {
    pub fn presentation(id: impl Into<String>, verifiable_presentation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Some(PresentationResult {
                verifiable_presentation: Some(verifiable_presentation.into()),
            }),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Coarse classification of an inbound message, before correlation.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage<'a> {
    Ready,
    /// Anything carrying a string `id`; the body is decoded only once the
    /// id is known to belong to the flow.
    Result { id: &'a str, body: &'a Value },
    Other,
}

impl<'a> InboundMessage<'a> {
    pub fn classify(data: &'a Value) -> Self {
        if data.get("method").and_then(Value::as_str) == Some(VC_FLOW_READY) {
            return InboundMessage::Ready;
        }
        match data.get("id").and_then(Value::as_str) {
            Some(id) => InboundMessage::Result { id, body: data },
            None => InboundMessage::Other,
        }
    }
}
