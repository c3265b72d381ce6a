// src/services/handshake.rs
//! Credential request handshake with an identity provider popup.
//!
//! One call to [`CredentialRequestHandshake::request`] drives one flow:
//!
//! 1. allocate a flow id and register a listener for the ready signal
//! 2. open the popup at `<identity provider>/vc-flow/`
//! 3. on `vc-flow-ready`, swap to a result listener and post the request to
//!    the popup, restricted to the popup's origin
//! 4. on the result carrying the flow id, resolve and close the popup
//!
//! Each flow is a [`FlowSession`] state machine
//! (`AwaitingReady -> AwaitingResult -> Finished`) fed by a single dispatch
//! function. Listener registrations are guards, and the session closes its
//! popup on drop, so cleanup holds on success, error, timeout and when the
//! caller drops the future.

use crate::error::{HandshakeError, WindowError};
use crate::models::credential::CredentialRequestParams;
use crate::models::message::{InboundMessage, RequestMessage, ResultMessage};
use crate::window::{MessageEvent, MessageHub, MessageListener, MessageSource, PopupWindow, WindowOpener};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Default upper bound for a whole flow.
pub const DEFAULT_FLOW_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval between checks of whether the user closed the popup.
pub const DEFAULT_POPUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tunables of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// Resolve with [`HandshakeError::Timeout`] after this long. `None` waits forever.
    pub timeout: Option<Duration>,
    /// How often the popup handle is checked for an external close.
    pub popup_poll_interval: Duration,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_FLOW_TIMEOUT),
            popup_poll_interval: DEFAULT_POPUP_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    AwaitingReady,
    AwaitingResult,
    Finished,
}

/// What the driver has to do after one event was dispatched.
enum Transition {
    Ignore,
    /// The popup is ready; reply to `source` at `origin`.
    Ready {
        source: Arc<dyn MessageSource>,
        origin: String,
    },
    Finish(Result<String, HandshakeError>),
}

/// State of one in-flight request. Owns the popup exclusively.
struct FlowSession {
    flow_id: String,
    expected_origin: String,
    request: RequestMessage,
    popup: Box<dyn PopupWindow>,
    state: FlowState,
}

impl FlowSession {
    fn new(flow_id: u64, params: &CredentialRequestParams, popup: Box<dyn PopupWindow>) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            expected_origin: params.identity_provider_origin(),
            request: RequestMessage::new(flow_id, params),
            popup,
            state: FlowState::AwaitingReady,
        }
    }

    fn dispatch(&mut self, event: &MessageEvent) -> Transition {
        if self.state == FlowState::Finished {
            return Transition::Ignore;
        }
        if event.origin != self.expected_origin {
            debug!(
                "flow {}: ignoring message from unexpected origin {}",
                self.flow_id, event.origin
            );
            return Transition::Ignore;
        }

        match (self.state, InboundMessage::classify(&event.data)) {
            (FlowState::AwaitingReady, InboundMessage::Ready) => {
                let source = match &event.source {
                    Some(source) => source,
                    None => {
                        warn!("flow {}: ready signal without a source window", self.flow_id);
                        return Transition::Ignore;
                    }
                };
                if let (Some(ours), Some(theirs)) = (self.popup.window_id(), source.window_id()) {
                    if ours != theirs {
                        debug!("flow {}: ready signal from another popup", self.flow_id);
                        return Transition::Ignore;
                    }
                }
                self.state = FlowState::AwaitingResult;
                Transition::Ready {
                    source: Arc::clone(source),
                    origin: event.origin.clone(),
                }
            }
            (FlowState::AwaitingResult, InboundMessage::Ready) => {
                debug!("flow {}: request already sent, ignoring ready signal", self.flow_id);
                Transition::Ignore
            }
            (FlowState::AwaitingResult, InboundMessage::Result { id, body }) if id == self.flow_id => {
                self.state = FlowState::Finished;
                Transition::Finish(Self::outcome(body))
            }
            (FlowState::AwaitingReady, InboundMessage::Result { id, .. }) => {
                debug!(
                    "flow {}: ignoring result for flow {} received before the ready signal",
                    self.flow_id, id
                );
                Transition::Ignore
            }
            (_, InboundMessage::Result { id, .. }) => {
                debug!("flow {}: ignoring result for flow {}", self.flow_id, id);
                Transition::Ignore
            }
            _ => Transition::Ignore,
        }
    }

    /// Maps a correlated result message onto the flow's outcome. A string
    /// `error` wins over whatever else the message carries.
    fn outcome(body: &Value) -> Result<String, HandshakeError> {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(HandshakeError::Rejected(error.to_string()));
        }
        let message: ResultMessage = serde_json::from_value(body.clone())
            .map_err(|e| HandshakeError::MalformedResult(e.to_string()))?;
        if let Some(error) = message.error {
            return Err(HandshakeError::Rejected(error));
        }
        message
            .result
            .and_then(|result| result.verifiable_presentation)
            .ok_or(HandshakeError::MissingPresentation)
    }

    fn send_request(&self, source: &dyn MessageSource, origin: &str) -> Result<(), HandshakeError> {
        let message = serde_json::to_value(&self.request)
            .map_err(|e| WindowError::PostMessage(e.to_string()))?;
        source.post_message(message, origin).map_err(|e| match e {
            WindowError::Closed => HandshakeError::PopupClosed,
            e => e.into(),
        })?;
        debug!("flow {}: request sent to {}", self.flow_id, origin);
        Ok(())
    }

    fn popup_closed(&self) -> bool {
        self.popup.is_closed()
    }
}

impl Drop for FlowSession {
    fn drop(&mut self) {
        if !self.popup.is_closed() {
            self.popup.close();
        }
    }
}

/// Drives credential requests against identity provider popups.
///
/// Construct one per application and share it; flow ids are unique for the
/// lifetime of the instance, so a fresh instance starts counting at 1.
pub struct CredentialRequestHandshake {
    hub: Arc<MessageHub>,
    opener: Arc<dyn WindowOpener>,
    options: HandshakeOptions,
    next_flow_id: AtomicU64,
}

impl CredentialRequestHandshake {
    /// Creates a handshake with default options.
    ///
    /// # Arguments
    /// * `hub` - Message listener registry of the opener window
    /// * `opener` - Host used to open popups
    pub fn new(hub: Arc<MessageHub>, opener: Arc<dyn WindowOpener>) -> Self {
        Self::with_options(hub, opener, HandshakeOptions::default())
    }

    pub fn with_options(
        hub: Arc<MessageHub>,
        opener: Arc<dyn WindowOpener>,
        options: HandshakeOptions,
    ) -> Self {
        Self {
            hub,
            opener,
            options,
            next_flow_id: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &HandshakeOptions {
        &self.options
    }

    /// Requests a credential and waits for the verifiable presentation.
    ///
    /// # Arguments
    /// * `params` - What to request, from whom, and where to open the popup
    ///
    /// # Returns
    /// - `Ok(presentation)` with the presentation JWT
    /// - `Err(HandshakeError::Rejected(reason))` when the identity provider reports an error
    /// - `Err(HandshakeError::MissingPresentation)` for a result without presentation
    /// - `Err(HandshakeError::PopupBlocked | PopupClosed | Timeout)` for liveness failures
    ///
    /// Every error is returned, never raised; the popup is closed and the
    /// listener removed before this returns.
    pub async fn request(&self, params: &CredentialRequestParams) -> Result<String, HandshakeError> {
        let flow_id = self.next_flow_id.fetch_add(1, Ordering::SeqCst) + 1;
        let url = params.vc_flow_url();

        let listener = self.hub.add_listener();
        let popup = match self.opener.open(&url, params.window_opener_features.as_deref()) {
            Ok(popup) => popup,
            Err(WindowError::Blocked) => {
                warn!("flow {}: popup for {} was blocked", flow_id, url);
                return Err(HandshakeError::PopupBlocked);
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "flow {}: requesting {} for {} at {}",
            flow_id, params.credential_spec.credential_type, params.credential_subject, url
        );

        let mut session = FlowSession::new(flow_id, params, popup);
        let outcome = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.drive(&mut session, listener))
                .await
                .unwrap_or(Err(HandshakeError::Timeout)),
            None => self.drive(&mut session, listener).await,
        };
        drop(session);

        match &outcome {
            Ok(_) => info!("flow {}: received verifiable presentation", flow_id),
            Err(e) => warn!("flow {}: finished without presentation: {}", flow_id, e),
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut FlowSession,
        mut listener: MessageListener,
    ) -> Result<String, HandshakeError> {
        let period = self.options.popup_poll_interval.max(Duration::from_millis(1));
        let mut popup_check = tokio::time::interval(period);
        popup_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = listener.next() => {
                    match session.dispatch(&event) {
                        Transition::Ignore => {}
                        Transition::Ready { source, origin } => {
                            if session.popup_closed() {
                                return Err(HandshakeError::PopupClosed);
                            }
                            // The result listener must exist before the popup can answer.
                            drop(listener);
                            listener = self.hub.add_listener();
                            session.send_request(source.as_ref(), &origin)?;
                        }
                        Transition::Finish(outcome) => return outcome,
                    }
                }
                _ = popup_check.tick() => {
                    if session.popup_closed() {
                        return Err(HandshakeError::PopupClosed);
                    }
                }
            }
        }
    }
}
