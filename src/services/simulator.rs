// src/services/simulator.rs
//! Scripted identity provider.
//!
//! Plays the popup side of the credential flow inside the process, so the
//! relying-party flow can run without a browser. Every opened popup is
//! recorded and can be driven by hand (post ready, post results, close), or
//! the simulator can answer on its own with a [`Responder`].

use crate::error::WindowError;
use crate::models::message::{ReadyMessage, RequestMessage, ResultMessage};
use crate::utils::serialization::encode_base64url_json;
use crate::window::{MessageEvent, MessageHub, MessageSource, PopupWindow, WindowOpener};
use chrono::{Duration, Utc};
use log::{debug, info};
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How an auto-responding popup answers a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Responder {
    /// Answers with a generated, unsigned presentation.
    Approve,
    /// Answers with the given error, as when the user declines.
    Decline(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds an unsigned compact JWT (`alg: none`).
fn unsigned_jwt(claims: &Value) -> Result<String, serde_json::Error> {
    let header = encode_base64url_json(&json!({ "alg": "none", "typ": "JWT" }))?;
    let payload = encode_base64url_json(claims)?;
    Ok(format!("{}.{}.", header, payload))
}

/// Generates a presentation shaped like the identity provider's: an id alias
/// credential followed by the requested credential, both unsigned.
///
/// # Arguments
/// * `request` - The request being answered
/// * `identity_provider_origin` - Issuer of the alias credential
pub fn fake_presentation(
    request: &RequestMessage,
    identity_provider_origin: &str,
) -> Result<String, serde_json::Error> {
    let params = &request.params;
    let holder = format!("did:icp:{}", params.credential_subject);
    let alias = format!("did:icp:alias-{}", params.credential_subject);
    let now = Utc::now();
    let expiry = now + Duration::minutes(15);

    let alias_credential = unsigned_jwt(&json!({
        "iss": identity_provider_origin,
        "sub": holder,
        "nbf": now.timestamp(),
        "exp": expiry.timestamp(),
        "vc": {
            "type": ["VerifiableCredential", "InternetIdentityIdAlias"],
            "credentialSubject": { "InternetIdentityIdAlias": { "hasIdAlias": alias } }
        }
    }))?;

    let credential_type = &params.credential_spec.credential_type;
    let requested_credential = unsigned_jwt(&json!({
        "iss": params.issuer.origin,
        "sub": alias,
        "nbf": now.timestamp(),
        "exp": expiry.timestamp(),
        "vc": {
            "type": ["VerifiableCredential", credential_type],
            "credentialSubject": { credential_type: params.credential_spec.arguments }
        }
    }))?;

    unsigned_jwt(&json!({
        "iss": holder,
        "vp": {
            "@context": "https://www.w3.org/2018/credentials/v1",
            "type": "VerifiablePresentation",
            "verifiableCredential": [alias_credential, requested_credential]
        }
    }))
}

/// One popup opened by the simulator.
pub struct SimulatedPopup {
    window_id: u64,
    url: Url,
    features: Option<String>,
    origin: String,
    hub: Arc<MessageHub>,
    responder: Option<Responder>,
    closed: AtomicBool,
    flow_closes: AtomicUsize,
    requests: Mutex<Vec<Value>>,
}

impl SimulatedPopup {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn features(&self) -> Option<&str> {
        self.features.as_deref()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Posts `vc-flow-ready` from this popup.
    ///
    /// # Returns
    /// How many listeners received it
    pub fn send_ready(self: &Arc<Self>) -> usize {
        self.send_ready_from(&self.origin.clone())
    }

    /// Posts `vc-flow-ready` as if this popup had navigated to `origin`.
    pub fn send_ready_from(self: &Arc<Self>, origin: &str) -> usize {
        let data = serde_json::to_value(ReadyMessage::new()).unwrap_or(Value::Null);
        let source: Arc<dyn MessageSource> = Arc::clone(self) as Arc<dyn MessageSource>;
        self.hub
            .post(MessageEvent::new(origin, data).with_source(source))
    }

    /// Posts a result message from this popup.
    pub fn send_result(&self, message: &ResultMessage) -> usize {
        match serde_json::to_value(message) {
            Ok(data) => self.send_raw(data),
            Err(_) => 0,
        }
    }

    /// Posts arbitrary JSON from this popup's origin, without a source.
    pub fn send_raw(&self, data: Value) -> usize {
        self.hub.post(MessageEvent::new(self.origin.clone(), data))
    }

    /// Simulates the user closing the popup.
    pub fn close_by_user(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many times the flow closed this popup.
    pub fn flow_closes(&self) -> usize {
        self.flow_closes.load(Ordering::SeqCst)
    }

    /// Raw messages posted to this popup.
    pub fn requests(&self) -> Vec<Value> {
        lock(&self.requests).clone()
    }

    /// The most recent message posted to this popup, if it was a credential request.
    pub fn last_request(&self) -> Option<RequestMessage> {
        lock(&self.requests)
            .last()
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }

    fn respond(&self, request: &RequestMessage, responder: &Responder) {
        let answer = match responder {
            Responder::Approve => match fake_presentation(request, &self.origin) {
                Ok(presentation) => ResultMessage::presentation(request.id.clone(), presentation),
                Err(e) => ResultMessage::error(request.id.clone(), e.to_string()),
            },
            Responder::Decline(reason) => ResultMessage::error(request.id.clone(), reason.clone()),
        };
        info!("simulated popup {} answers request {}", self.window_id, request.id);
        self.send_result(&answer);
    }
}

impl MessageSource for SimulatedPopup {
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), WindowError> {
        if self.is_closed() {
            return Err(WindowError::Closed);
        }
        if target_origin != self.origin {
            // Browsers drop messages whose target origin does not match.
            debug!(
                "popup {} dropped message for {} (origin is {})",
                self.window_id, target_origin, self.origin
            );
            return Ok(());
        }
        lock(&self.requests).push(message.clone());

        if let Some(responder) = &self.responder {
            if let Ok(request) = serde_json::from_value::<RequestMessage>(message) {
                self.respond(&request, responder);
            }
        }
        Ok(())
    }

    fn window_id(&self) -> Option<u64> {
        Some(self.window_id)
    }
}

/// Handle given to the flow; closing through it is counted.
struct PopupHandle(Arc<SimulatedPopup>);

impl PopupWindow for PopupHandle {
    fn close(&self) {
        if !self.0.closed.swap(true, Ordering::SeqCst) {
            self.0.flow_closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    fn window_id(&self) -> Option<u64> {
        Some(self.0.window_id)
    }
}

/// An identity provider living in-process.
pub struct IdentityProviderSimulator {
    hub: Arc<MessageHub>,
    origin: String,
    responder: Option<Responder>,
    blocked: AtomicBool,
    next_window_id: AtomicU64,
    popups: Mutex<Vec<Arc<SimulatedPopup>>>,
}

impl IdentityProviderSimulator {
    /// Creates a simulator whose popups speak from the origin of `identity_provider`.
    pub fn new(hub: Arc<MessageHub>, identity_provider: &Url) -> Self {
        Self {
            hub,
            origin: identity_provider.origin().ascii_serialization(),
            responder: None,
            blocked: AtomicBool::new(false),
            next_window_id: AtomicU64::new(1),
            popups: Mutex::new(Vec::new()),
        }
    }

    /// Makes every popup announce readiness on open and answer requests.
    pub fn auto_respond(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Refuses to open popups while set.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn opened_count(&self) -> usize {
        lock(&self.popups).len()
    }

    /// The `index`-th opened popup.
    pub fn popup(&self, index: usize) -> Option<Arc<SimulatedPopup>> {
        lock(&self.popups).get(index).cloned()
    }
}

impl WindowOpener for IdentityProviderSimulator {
    fn open(&self, url: &Url, features: Option<&str>) -> Result<Box<dyn PopupWindow>, WindowError> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(WindowError::Blocked);
        }
        let popup = Arc::new(SimulatedPopup {
            window_id: self.next_window_id.fetch_add(1, Ordering::SeqCst),
            url: url.clone(),
            features: features.map(str::to_string),
            origin: self.origin.clone(),
            hub: Arc::clone(&self.hub),
            responder: self.responder.clone(),
            closed: AtomicBool::new(false),
            flow_closes: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });
        lock(&self.popups).push(Arc::clone(&popup));
        debug!("simulated popup {} opened at {}", popup.window_id, url);

        if self.responder.is_some() {
            popup.send_ready();
        }
        Ok(Box::new(PopupHandle(popup)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::{CredentialRequestParams, CredentialSpec, IssuerData};
    use crate::models::presentation::decode_presentation;

    fn request() -> RequestMessage {
        let params = CredentialRequestParams::new(
            "https://idp.example/",
            IssuerData::new("https://issuer.example"),
            CredentialSpec::new("VerifiedAge").with_argument("minAge", 18),
            "subject-principal",
        )
        .unwrap();
        RequestMessage::new(4, &params)
    }

    #[test]
    fn test_fake_presentation_decodes() {
        let vp = fake_presentation(&request(), "https://idp.example").unwrap();
        let decoded = decode_presentation(&vp).unwrap();
        assert_eq!(decoded.holder.as_deref(), Some("did:icp:subject-principal"));
        assert_eq!(decoded.alias().unwrap().issuer(), Some("https://idp.example"));

        let credential = decoded.credential().unwrap();
        assert_eq!(credential.issuer(), Some("https://issuer.example"));
        assert_eq!(
            credential.claims["vc"]["credentialSubject"]["VerifiedAge"]["minAge"],
            json!(18)
        );
        assert!(!credential.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_popup_drops_messages_for_other_origins() {
        let hub = MessageHub::new();
        let url = Url::parse("https://idp.example/").unwrap();
        let simulator = IdentityProviderSimulator::new(hub, &url);
        let handle = simulator.open(&url.join("vc-flow/").unwrap(), None).unwrap();
        let popup = simulator.popup(0).unwrap();

        popup.post_message(json!({ "hello": 1 }), "https://other.example").unwrap();
        assert!(popup.requests().is_empty());

        popup.post_message(json!({ "hello": 2 }), "https://idp.example").unwrap();
        assert_eq!(popup.requests(), vec![json!({ "hello": 2 })]);

        handle.close();
        handle.close();
        assert_eq!(popup.flow_closes(), 1);
        assert_eq!(
            popup.post_message(json!({}), "https://idp.example"),
            Err(WindowError::Closed)
        );
    }

    #[test]
    fn test_blocked_simulator_opens_nothing() {
        let url = Url::parse("https://idp.example/").unwrap();
        let simulator = IdentityProviderSimulator::new(MessageHub::new(), &url);
        simulator.set_blocked(true);
        assert!(matches!(simulator.open(&url, None), Err(WindowError::Blocked)));
        assert_eq!(simulator.opened_count(), 0);
    }
}
