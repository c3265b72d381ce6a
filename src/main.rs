// src/main.rs

//! # vc-flow playground
//!
//! Runs one relying-party credential check against the in-process identity
//! provider and prints the outcome as JSON.
//!
//! ## Usage
//! `vc-flow [CREDENTIAL_TYPE] [SUBJECT]` (defaults: `VerifiedHumanity`, `2vxsx-fae`)
//!
//! ## Environment Variables
//! - `VC_IDENTITY_PROVIDER`: identity provider URL
//! - `VC_ISSUER_ORIGIN`: origin of the credential issuer
//! - `VC_ISSUER_CANISTER_ID`: (Optional) issuer canister id
//! - `VC_DERIVATION_ORIGIN`: (Optional) origin the subject's identity is derived for
//! - `VC_VALIDATION_URL`: (Optional) remote validation endpoint
//! - `VC_FLOW_TIMEOUT_SECS`: (Optional) default 300, 0 disables
//! - `VC_POPUP_POLL_INTERVAL_MS`: (Optional) default 500

use anyhow::Context;
use dotenv::dotenv;
use env_logger::Env;
use log::info;
use reqwest::Url;
use std::sync::Arc;
use vc_flow::config::Settings;
use vc_flow::models::credential::CredentialSpec;
use vc_flow::services::handshake::CredentialRequestHandshake;
use vc_flow::services::relying_party::RelyingParty;
use vc_flow::services::simulator::{IdentityProviderSimulator, Responder};
use vc_flow::services::validator::CredentialValidator;
use vc_flow::utils::serialization::serialize;
use vc_flow::window::{popup_center, MessageHub, ScreenGeometry};

/// Screen the playground pretends to run on.
const SCREEN: ScreenGeometry = ScreenGeometry {
    inner_width: 1280,
    inner_height: 800,
    screen_x: 0,
    screen_y: 0,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env().context("failed to load VC_* settings")?;
    let mut args = std::env::args().skip(1);
    let credential_type = args.next().unwrap_or_else(|| "VerifiedHumanity".to_string());
    let subject = args.next().unwrap_or_else(|| "2vxsx-fae".to_string());

    // Every popup shares the opener's message hub.
    let hub = MessageHub::new();
    let identity_provider = Url::parse(&settings.identity_provider)?;
    let simulator = Arc::new(
        IdentityProviderSimulator::new(Arc::clone(&hub), &identity_provider)
            .auto_respond(Responder::Approve),
    );
    let handshake = Arc::new(CredentialRequestHandshake::with_options(
        hub,
        simulator,
        settings.handshake_options(),
    ));

    let mut relying_party = RelyingParty::new(handshake, settings.identity_provider.clone(), settings.issuer())
        .with_derivation_origin(settings.derivation_origin.clone())
        .with_window_opener_features(popup_center(&SCREEN));
    if let Some(url) = &settings.validation_url {
        info!("validating presentations at {}", url);
        relying_party = relying_party.with_validator(CredentialValidator::new(url)?);
    }

    let check = relying_party
        .check_credential(&CredentialSpec::new(credential_type), &subject)
        .await?;
    println!("{}", serialize(&check)?);
    Ok(())
}
