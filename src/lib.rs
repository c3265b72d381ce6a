// src/lib.rs
//! # vc-flow
//!
//! Relying-party side of the verifiable credential request flow: open the
//! identity provider in a popup, wait for it to announce readiness, send one
//! credential request, and return the verifiable presentation it answers with.
//!
//! ## Layout
//! 1. **Window layer** (`window`): host traits for popups and cross-window messages
//! 2. **Models** (`models`): credential specs, wire messages, presentation decoding
//! 3. **Services** (`services`): the handshake, remote validation, relying-party checks
//!    and an in-process identity provider

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod window;

pub use error::HandshakeError;
pub use models::credential::{CredentialRequestParams, CredentialSpec, IssuerData};
pub use services::handshake::{CredentialRequestHandshake, HandshakeOptions};
