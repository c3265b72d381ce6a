// src/models/mod.rs
//! Data structures of the credential flow.

pub mod credential;
pub mod message;
pub mod presentation;
