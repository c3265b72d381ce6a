// src/models/presentation.rs
//! Inspection of verifiable presentations.
//!
//! A presentation arrives as a compact JWS whose `vp.verifiableCredential`
//! claim lists nested credential JWTs. Decoding here only reads claims;
//! signature verification belongs to the validation service.

use crate::error::PresentationError;
use crate::utils::serialization::decode_base64url_json;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Claims of one credential inside a presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialClaims {
    /// The original JWT the claims were decoded from
    pub jwt: String,
    pub claims: Value,
}

impl CredentialClaims {
    /// The `iss` claim, if present.
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// The `sub` claim, if present.
    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    /// Expiry from the `exp` claim (seconds since the epoch).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.claims.get("exp").and_then(Value::as_i64)?;
        Utc.timestamp_opt(exp, 0).single()
    }

    /// Whether the credential is expired at `now`. Credentials without `exp`
    /// never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map_or(false, |exp| exp <= now)
    }
}

/// A decoded (unverified) verifiable presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPresentation {
    /// `iss` of the presentation: the holder
    pub holder: Option<String>,
    pub credentials: Vec<CredentialClaims>,
}

impl DecodedPresentation {
    /// The identity alias credential (first in the list).
    pub fn alias(&self) -> Option<&CredentialClaims> {
        self.credentials.first()
    }

    /// The requested credential (second in the list).
    pub fn credential(&self) -> Option<&CredentialClaims> {
        self.credentials.get(1)
    }
}

/// Splits a compact JWS and decodes its payload claims.
fn decode_claims(jwt: &str) -> Result<Value, PresentationError> {
    let segments: Vec<&str> = jwt.split('.').collect();
    if segments.len() != 3 {
        return Err(PresentationError::SegmentCount(segments.len()));
    }
    decode_base64url_json(segments[1])
}

/// Decodes a presentation JWT and all credentials it carries.
///
/// # Errors
/// - [`PresentationError::SegmentCount`] for a token that is not a compact JWS
/// - [`PresentationError::Base64`] / [`PresentationError::Json`] for a corrupt payload
/// - [`PresentationError::MissingVpClaim`] when there is no `vp` claim
/// - [`PresentationError::CredentialNotString`] when a nested credential is not a JWT string
pub fn decode_presentation(vp_jwt: &str) -> Result<DecodedPresentation, PresentationError> {
    let claims = decode_claims(vp_jwt)?;
    let vp = claims.get("vp").ok_or(PresentationError::MissingVpClaim)?;

    let credentials = match vp.get("verifiableCredential") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let jwt = item
                    .as_str()
                    .ok_or(PresentationError::CredentialNotString { index })?;
                Ok(CredentialClaims {
                    jwt: jwt.to_string(),
                    claims: decode_claims(jwt)?,
                })
            })
            .collect::<Result<Vec<_>, PresentationError>>()?,
        // A single credential may be given without the array wrapper.
        Some(Value::String(jwt)) => vec![CredentialClaims {
            jwt: jwt.clone(),
            claims: decode_claims(jwt)?,
        }],
        Some(_) => return Err(PresentationError::CredentialNotString { index: 0 }),
        None => Vec::new(),
    };

    Ok(DecodedPresentation {
        holder: claims.get("iss").and_then(Value::as_str).map(str::to_string),
        credentials,
    })
}
