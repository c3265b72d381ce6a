// src/services/mod.rs
//! Credential flow services.

pub mod handshake;
pub mod relying_party;
pub mod simulator;
pub mod validator;
