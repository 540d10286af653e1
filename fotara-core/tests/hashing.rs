mod common;

use fotara_core::certificate::{CertificateMaterial, clean_pem};
use fotara_core::invoice::transform::{Stylesheet, TransformPipeline};
use fotara_core::invoice::CanonicalXmlHasher;
use fotara_core::keys::KeyAlgorithm;

fn hasher() -> CanonicalXmlHasher {
    CanonicalXmlHasher::new(TransformPipeline::new().expect("pipeline"))
}

#[test]
fn hash_is_deterministic() {
    let hasher = hasher();
    let xml = common::read_invoice("sample-simplified-invoice.xml");
    let first = hasher.compute_hash(&xml, &Stylesheet::HASH).expect("hash");
    for _ in 0..100 {
        assert_eq!(
            hasher.compute_hash(&xml, &Stylesheet::HASH).expect("hash"),
            first
        );
    }
}

#[test]
fn hash_ignores_xml_comments() {
    let hasher = hasher();
    let xml = common::read_invoice("sample-simplified-invoice.xml");
    let commented = xml.replacen(
        "<cbc:ProfileID>",
        "<!-- generated by the billing system --><cbc:ProfileID>",
        1,
    );
    assert_ne!(xml, commented);
    assert_eq!(
        hasher.compute_hash(&xml, &Stylesheet::HASH).expect("hash"),
        hasher.compute_hash(&commented, &Stylesheet::HASH).expect("hash")
    );
}

#[test]
fn different_invoices_hash_differently() {
    let hasher = hasher();
    let a = common::read_invoice("sample-simplified-invoice.xml");
    let b = a.replace("SME00010", "SME00099");
    assert_ne!(
        hasher.compute_hash(&a, &Stylesheet::HASH).expect("hash"),
        hasher.compute_hash(&b, &Stylesheet::HASH).expect("hash")
    );
}

#[test]
fn canonical_form_is_stable() {
    let hasher = hasher();
    let xml = common::read_invoice("sample-simplified-invoice.xml");
    let once = hasher.canonicalize(&xml).expect("canonicalize");
    let twice = hasher.canonicalize(&once).expect("canonicalize again");
    assert_eq!(once, twice);
    assert!(!once.starts_with("<?xml"));
}

#[test]
fn certificate_parses_from_any_pem_layout() {
    let key = common::test_key(KeyAlgorithm::Secp256k1);
    let pem = common::issue_certificate(&key);

    let crlf = pem.replace('\n', "\r\n");
    let bare = clean_pem(&pem);
    let indented = pem
        .lines()
        .map(|line| format!("   {line}  "))
        .collect::<Vec<_>>()
        .join("\n");

    let reference = CertificateMaterial::from_pem(&pem).expect("pem");
    for variant in [crlf.as_str(), bare.as_str(), indented.as_str()] {
        let parsed = CertificateMaterial::from_pem(variant).expect("pem variant");
        assert_eq!(parsed.der(), reference.der());
        assert_eq!(parsed.digest_base64(), reference.digest_base64());
    }
}
