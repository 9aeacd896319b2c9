//! End-to-end verification of signed record sets

mod common;

use chrono::{Duration, Utc};
use common::{builder, sample_records, verifier_for, X5U};
use remote_settings_core::Record;
use remote_settings_signature::{
    signed_message, CertificateChain, ChainBuilder, SignatureError, SignatureMetadata,
};
use serde_json::json;

#[test]
fn test_valid_signature_verifies() {
    let b = builder();
    let chain = b.build();
    let records = sample_records();
    let metadata = b.signer(X5U).sign(&records, 1_700_000_000_300);

    let digest = verifier_for(&b)
        .verify(&records, 1_700_000_000_300, &metadata, &chain, Utc::now())
        .unwrap();
    assert_eq!(digest.len(), 64);
}

#[test]
fn test_record_order_and_tombstones_do_not_matter() {
    let b = builder();
    let chain = b.build();
    let records = sample_records();
    let metadata = b.signer(X5U).sign(&records, 5);

    let mut shuffled = records.clone();
    shuffled.reverse();
    shuffled.push(Record::tombstone("gone", 4));
    assert!(verifier_for(&b).verify(&shuffled, 5, &metadata, &chain, Utc::now()).is_ok());
}

#[test]
fn test_tampered_content_rejected() {
    let b = builder();
    let chain = b.build();
    let mut records = sample_records();
    let metadata = b.signer(X5U).sign(&records, 5);
    let verifier = verifier_for(&b);

    records[0].fields.insert("serialNumber".to_string(), json!("Ag=="));
    assert_eq!(
        verifier.verify(&records, 5, &metadata, &chain, Utc::now()),
        Err(SignatureError::BadSignature)
    );

    // Same records, different timestamp
    let records = sample_records();
    assert_eq!(
        verifier.verify(&records, 6, &metadata, &chain, Utc::now()),
        Err(SignatureError::BadSignature)
    );
}

#[test]
fn test_untrusted_x5u_rejected() {
    let b = builder();
    let chain = b.build();
    let records = sample_records();
    let verifier = verifier_for(&b);

    for x5u in [
        "http://content-signature.example.net/chain.json",
        "https://evil.example.org/chain.json",
    ] {
        let metadata = b.signer(x5u).sign(&records, 5);
        assert!(matches!(
            verifier.verify(&records, 5, &metadata, &chain, Utc::now()),
            Err(SignatureError::UntrustedX5u(_))
        ));
    }
}

#[test]
fn test_unsupported_mode_rejected() {
    let b = builder();
    let records = sample_records();
    let mut metadata = b.signer(X5U).sign(&records, 5);
    metadata.mode = "p384ecdsa".to_string();
    assert_eq!(
        verifier_for(&b).verify(&records, 5, &metadata, &b.build(), Utc::now()),
        Err(SignatureError::UnsupportedMode("p384ecdsa".to_string()))
    );
}

#[test]
fn test_expired_chain_rejected() {
    let now = Utc::now();
    let b = builder().validity(now - Duration::days(30), now - Duration::days(1));
    let records = sample_records();
    let metadata = b.signer(X5U).sign(&records, 5);
    assert!(matches!(
        verifier_for(&b).verify(&records, 5, &metadata, &b.build(), now),
        Err(SignatureError::Expired { .. })
    ));
}

#[test]
fn test_wrong_root_rejected() {
    let trusted = builder();
    let rogue = ChainBuilder::new("Example Root CA", [99; 32], common::SUBJECT, [33; 32]);
    let records = sample_records();
    let metadata = rogue.signer(X5U).sign(&records, 5);
    assert!(matches!(
        verifier_for(&trusted).verify(&records, 5, &metadata, &rogue.build(), Utc::now()),
        Err(SignatureError::UntrustedRoot(_))
    ));
}

#[test]
fn test_wrong_subject_rejected() {
    let impostor = ChainBuilder::new("Example Root CA", [11; 32], "someone-else.example.net", [33; 32]);
    let records = sample_records();
    let metadata = impostor.signer(X5U).sign(&records, 5);
    assert!(matches!(
        verifier_for(&builder()).verify(&records, 5, &metadata, &impostor.build(), Utc::now()),
        Err(SignatureError::SubjectMismatch { .. })
    ));
}

#[test]
fn test_broken_chain_rejected() {
    let b = builder();
    let records = sample_records();
    let metadata = b.signer(X5U).sign(&records, 5);
    let verifier = verifier_for(&b);

    // Drop the intermediate: the leaf is no longer signed by its successor
    let mut chain = b.build();
    chain.certificates.remove(1);
    assert!(matches!(
        verifier.verify(&records, 5, &metadata, &chain, Utc::now()),
        Err(SignatureError::BrokenChain { .. })
    ));

    // Tamper with the leaf validity: its issuer signature no longer matches
    let mut chain = b.build();
    chain.certificates[0].not_after += Duration::days(1);
    assert!(matches!(
        verifier.verify(&records, 5, &metadata, &chain, Utc::now()),
        Err(SignatureError::BrokenChain { .. })
    ));

    let empty = CertificateChain { certificates: Vec::new() };
    assert_eq!(
        verifier.verify(&records, 5, &metadata, &empty, Utc::now()),
        Err(SignatureError::EmptyChain)
    );
}

#[test]
fn test_chain_document_roundtrip() {
    let b = builder();
    let chain = b.build();
    let parsed = CertificateChain::from_json(chain.to_json().as_bytes()).unwrap();
    assert_eq!(parsed, chain);

    let records = sample_records();
    let metadata = b.signer(X5U).sign(&records, 5);
    assert!(verifier_for(&b).verify(&records, 5, &metadata, &parsed, Utc::now()).is_ok());
}

#[test]
fn test_malformed_signature() {
    let b = builder();
    let metadata = SignatureMetadata {
        signature: "not-a-signature".to_string(),
        x5u: X5U.to_string(),
        mode: "ed25519".to_string(),
    };
    let message = signed_message(&sample_records(), 5);
    assert!(matches!(
        verifier_for(&b).verify_message(&message, &metadata, &b.build(), Utc::now()),
        Err(SignatureError::Malformed(_))
    ));
}
