//! Shared fixtures for signature tests

#![allow(dead_code)]

use remote_settings_core::{Record, SignerSettings};
use remote_settings_signature::{ChainBuilder, SignatureVerifier};
use serde_json::json;

pub const X5U: &str = "https://content-signature.example.net/chains/remote-settings.json";
pub const SUBJECT: &str = "remote-settings.content-signature.example.net";

pub fn builder() -> ChainBuilder {
    ChainBuilder::new("Example Root CA", [11; 32], SUBJECT, [33; 32])
        .intermediate("Example Content Signing Intermediate", [22; 32])
}

pub fn settings_for(builder: &ChainBuilder) -> SignerSettings {
    SignerSettings {
        trust_anchor: builder.trust_anchor().to_string(),
        signer_subject: SUBJECT.to_string(),
        allowed_x5u_hosts: vec!["content-signature.example.net".to_string()],
    }
}

pub fn verifier_for(builder: &ChainBuilder) -> SignatureVerifier {
    SignatureVerifier::new(&settings_for(builder)).unwrap()
}

pub fn sample_records() -> Vec<Record> {
    vec![
        Record::new("onecrl-1", 1_700_000_000_100, json!({"issuerName": "MA0xCzAJ", "serialNumber": "AQ=="})),
        Record::new("onecrl-2", 1_700_000_000_200, json!({"enabled": true, "details": {"who": "", "bug": 42}})),
        Record::new("onecrl-3", 1_700_000_000_300, json!({"filter_expression": "env.channel == 'nightly'"})),
    ]
}
