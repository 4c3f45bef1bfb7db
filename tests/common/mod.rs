//! Test PKI: a throwaway CA and leaf certificates minted with rcgen.
//! 测试用 PKI：使用 rcgen 生成的临时 CA 与叶证书。

#![allow(dead_code)]

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa,
    SignatureAlgorithm,
};

pub use rcgen::{PKCS_ECDSA_P256_SHA256, PKCS_ED25519};

pub struct TestCa {
    pub cert: Certificate,
    pub der: Vec<u8>,
}

pub struct Issued {
    pub chain: Vec<Vec<u8>>,
    pub key: Vec<u8>,
}

fn name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn
}

/// A self-signed Ed25519 CA.
pub fn ca(common_name: &str) -> TestCa {
    let mut params = CertificateParams::new(Vec::<String>::new());
    params.alg = &PKCS_ED25519;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name = name(common_name);
    let cert = Certificate::from_params(params).expect("CA certificate");
    let der = cert.serialize_der().expect("CA DER");
    TestCa { cert, der }
}

/// A CA certificate signed by another CA, for chain tests.
pub fn intermediate(parent: &TestCa, common_name: &str) -> TestCa {
    issuer_with(parent, common_name, |params| {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    })
}

/// A certificate signed by `parent` that tests may use as an issuer, whether
/// or not `tweak` makes it a CA.
pub fn issuer_with(
    parent: &TestCa,
    common_name: &str,
    tweak: impl FnOnce(&mut CertificateParams),
) -> TestCa {
    let mut params = CertificateParams::new(vec![common_name.to_string()]);
    params.alg = &PKCS_ED25519;
    params.distinguished_name = name(common_name);
    tweak(&mut params);
    let cert = Certificate::from_params(params).expect("issuer certificate");
    let der = cert
        .serialize_der_with_signer(&parent.cert)
        .expect("issuer DER");
    TestCa { cert, der }
}

pub fn leaf(ca: &TestCa, names: &[&str], alg: &'static SignatureAlgorithm) -> Issued {
    leaf_with(ca, names, alg, |_| {})
}

/// A leaf signed by `ca`; `tweak` may adjust validity and the like.
pub fn leaf_with(
    ca: &TestCa,
    names: &[&str],
    alg: &'static SignatureAlgorithm,
    tweak: impl FnOnce(&mut CertificateParams),
) -> Issued {
    let mut params = CertificateParams::new(
        names.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
    );
    params.alg = alg;
    params.distinguished_name = name(names.first().copied().unwrap_or("client"));
    tweak(&mut params);
    let cert = Certificate::from_params(params).expect("leaf certificate");
    let der = cert
        .serialize_der_with_signer(&ca.cert)
        .expect("leaf DER");
    Issued {
        chain: vec![der],
        key: cert.serialize_private_key_der(),
    }
}
