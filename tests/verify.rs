//! Verdicts produced by the trust-anchor verifier.

mod common;

use common::{PKCS_ECDSA_P256_SHA256, PKCS_ED25519};
use rcgen::{BasicConstraints, IsCa, KeyUsagePurpose};
use std::time::SystemTime;
use tls13_handshake::crypto::signature::KeyType;
use tls13_handshake::{
    AlertDescription, CertificateVerdict, CertificateVerifier, Result, TrustAnchorVerifier,
};

#[test]
fn test_valid_leaf_yields_its_key() -> Result<()> {
    let ca = common::ca("Test Root");
    let verifier = TrustAnchorVerifier::new(vec![ca.der.clone()])?;

    let ed = common::leaf(&ca, &["localhost"], &PKCS_ED25519);
    let key = verifier
        .verify(&ed.chain, Some("localhost"), SystemTime::now())
        .expect("trusted Ed25519 leaf");
    assert_eq!(key.key_type, KeyType::Ed25519);
    assert_eq!(key.bytes.len(), 32);

    let ec = common::leaf(&ca, &["localhost"], &PKCS_ECDSA_P256_SHA256);
    let key = verifier
        .verify(&ec.chain, Some("localhost"), SystemTime::now())
        .expect("trusted P-256 leaf");
    assert_eq!(key.key_type, KeyType::EcdsaP256);
    assert_eq!(key.bytes.len(), 65);
    Ok(())
}

#[test]
fn test_chain_through_intermediate() -> Result<()> {
    let root = common::ca("Test Root");
    let intermediate = common::intermediate(&root, "Test Intermediate");
    let verifier = TrustAnchorVerifier::new(vec![root.der.clone()])?;

    let mut issued = common::leaf(&intermediate, &["api.example.com"], &PKCS_ED25519);
    // Leaf alone cannot reach the root.
    assert_eq!(
        verifier
            .verify(&issued.chain, Some("api.example.com"), SystemTime::now())
            .unwrap_err(),
        CertificateVerdict::Untrusted
    );

    issued.chain.push(intermediate.der.clone());
    verifier
        .verify(&issued.chain, Some("api.example.com"), SystemTime::now())
        .expect("chain via intermediate");
    Ok(())
}

#[test]
fn test_hostname_rules() -> Result<()> {
    let ca = common::ca("Test Root");
    let verifier = TrustAnchorVerifier::new(vec![ca.der.clone()])?;
    let issued = common::leaf(&ca, &["*.example.com", "example.com"], &PKCS_ED25519);

    for name in ["example.com", "www.example.com", "WWW.EXAMPLE.COM"] {
        assert!(verifier.verify(&issued.chain, Some(name), SystemTime::now()).is_ok(), "{name}");
    }
    for name in ["a.b.example.com", "example.org", "localhost"] {
        assert_eq!(
            verifier
                .verify(&issued.chain, Some(name), SystemTime::now())
                .unwrap_err(),
            CertificateVerdict::HostnameMismatch,
            "{name}"
        );
    }
    // Client certificates are not checked against a name.
    assert!(verifier.verify(&issued.chain, None, SystemTime::now()).is_ok());
    Ok(())
}

#[test]
fn test_validity_window() -> Result<()> {
    let ca = common::ca("Test Root");
    let verifier = TrustAnchorVerifier::new(vec![ca.der.clone()])?;

    let expired = common::leaf_with(&ca, &["localhost"], &PKCS_ED25519, |params| {
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
    });
    let verdict = verifier
        .verify(&expired.chain, Some("localhost"), SystemTime::now())
        .unwrap_err();
    assert_eq!(verdict, CertificateVerdict::Expired);
    assert_eq!(verdict.alert(), AlertDescription::CertificateExpired);

    let future = common::leaf_with(&ca, &["localhost"], &PKCS_ED25519, |params| {
        params.not_before = rcgen::date_time_ymd(3000, 1, 1);
        params.not_after = rcgen::date_time_ymd(3001, 1, 1);
    });
    assert_eq!(
        verifier
            .verify(&future.chain, Some("localhost"), SystemTime::now())
            .unwrap_err(),
        CertificateVerdict::NotYetValid
    );
    Ok(())
}

#[test]
fn test_forged_issuer_signature() -> Result<()> {
    let ca = common::ca("Test Root");
    // Same subject name, different key.
    let impostor = common::ca("Test Root");
    let verifier = TrustAnchorVerifier::new(vec![ca.der.clone()])?;

    let forged = common::leaf(&impostor, &["localhost"], &PKCS_ED25519);
    let verdict = verifier
        .verify(&forged.chain, Some("localhost"), SystemTime::now())
        .unwrap_err();
    assert_eq!(verdict, CertificateVerdict::SignatureInvalid);
    assert_eq!(verdict.alert(), AlertDescription::BadCertificate);
    Ok(())
}

#[test]
fn test_untrusted_and_malformed() -> Result<()> {
    let ca = common::ca("Test Root");
    let other = common::ca("Other Root");
    let verifier = TrustAnchorVerifier::new(vec![ca.der.clone()])?;

    let stranger = common::leaf(&other, &["localhost"], &PKCS_ED25519);
    let verdict = verifier
        .verify(&stranger.chain, Some("localhost"), SystemTime::now())
        .unwrap_err();
    assert_eq!(verdict, CertificateVerdict::Untrusted);
    assert_eq!(verdict.alert(), AlertDescription::UnknownCa);

    assert_eq!(
        verifier.verify(&[], None, SystemTime::now()).unwrap_err(),
        CertificateVerdict::Malformed
    );
    assert_eq!(
        verifier
            .verify(&[b"not a certificate".to_vec()], None, SystemTime::now())
            .unwrap_err(),
        CertificateVerdict::Malformed
    );
    assert!(TrustAnchorVerifier::new(Vec::new()).is_err());
    Ok(())
}

#[test]
fn test_leaf_cannot_act_as_issuer() -> Result<()> {
    let ca = common::ca("Test Root");
    let verifier = TrustAnchorVerifier::new(vec![ca.der.clone()])?;

    // An ordinary end-entity certificate from the trusted root.
    let holder = common::issuer_with(&ca, "attacker.example", |_| {});
    let forged = common::leaf(&holder, &["localhost"], &PKCS_ED25519);
    let chain = vec![forged.chain[0].clone(), holder.der.clone()];
    assert_eq!(
        verifier
            .verify(&chain, Some("localhost"), SystemTime::now())
            .unwrap_err(),
        CertificateVerdict::Untrusted
    );

    // Explicitly marked as not a CA fares no better.
    let marked = common::issuer_with(&ca, "marked.example", |params| {
        params.is_ca = IsCa::ExplicitNoCa;
    });
    let forged = common::leaf(&marked, &["localhost"], &PKCS_ED25519);
    let chain = vec![forged.chain[0].clone(), marked.der.clone()];
    assert_eq!(
        verifier
            .verify(&chain, Some("localhost"), SystemTime::now())
            .unwrap_err(),
        CertificateVerdict::Untrusted
    );
    Ok(())
}

#[test]
fn test_issuer_needs_cert_sign_usage() -> Result<()> {
    let root = common::ca("Test Root");
    let verifier = TrustAnchorVerifier::new(vec![root.der.clone()])?;

    let signing_only = common::issuer_with(&root, "Signing Only CA", |params| {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    });
    let mut issued = common::leaf(&signing_only, &["localhost"], &PKCS_ED25519);
    issued.chain.push(signing_only.der.clone());
    assert_eq!(
        verifier
            .verify(&issued.chain, Some("localhost"), SystemTime::now())
            .unwrap_err(),
        CertificateVerdict::Untrusted
    );

    let proper = common::issuer_with(&root, "Proper CA", |params| {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::DigitalSignature];
    });
    let mut issued = common::leaf(&proper, &["localhost"], &PKCS_ED25519);
    issued.chain.push(proper.der.clone());
    verifier
        .verify(&issued.chain, Some("localhost"), SystemTime::now())
        .expect("CA with keyCertSign");
    Ok(())
}

#[test]
fn test_path_length_limit() -> Result<()> {
    let root = common::ca("Test Root");
    let verifier = TrustAnchorVerifier::new(vec![root.der.clone()])?;

    let upper = common::issuer_with(&root, "Upper CA", |params| {
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
    });
    let lower = common::intermediate(&upper, "Lower CA");

    // Upper may sign leaves directly.
    let mut direct = common::leaf(&upper, &["localhost"], &PKCS_ED25519);
    direct.chain.push(upper.der.clone());
    verifier
        .verify(&direct.chain, Some("localhost"), SystemTime::now())
        .expect("within path length");

    // But not a further CA beneath it.
    let mut deep = common::leaf(&lower, &["localhost"], &PKCS_ED25519);
    deep.chain.push(lower.der.clone());
    deep.chain.push(upper.der.clone());
    assert_eq!(
        verifier
            .verify(&deep.chain, Some("localhost"), SystemTime::now())
            .unwrap_err(),
        CertificateVerdict::Untrusted
    );
    Ok(())
}
