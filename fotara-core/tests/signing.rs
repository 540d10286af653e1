mod common;

use base64ct::{Base64, Encoding};
use fotara_core::certificate::CertificateMaterial;
use fotara_core::invoice::hash::hex_digest_base64;
use fotara_core::invoice::qr;
use fotara_core::invoice::sign::{EInvoiceSigningResult, InvoiceSigner};
use fotara_core::invoice::xml::InvoiceDocument;
use fotara_core::invoice::xml::constants::{
    CERTIFICATE_XPATH, ECDSA_SHA256_URI, INVOICE_DIGEST_XPATH, ISSUER_NAME_XPATH, QR_XPATH,
    RSA_SHA256_URI, SERIAL_NUMBER_XPATH, SIGNATURE_METHOD_XPATH, SIGNATURE_VALUE_XPATH,
    SIGNED_PROPERTIES_DIGEST_XPATH, SIGNED_PROPERTIES_XPATH, SIGNING_TIME_XPATH,
};
use fotara_core::invoice::{InvoiceRequest, SignatureEngine};
use fotara_core::keys::{KeyAlgorithm, SigningKeyMaterial};

const SAMPLE: &str = "sample-simplified-invoice.xml";
const SAMPLE_UUID: &str = "8e6000cf-1a98-4174-b3e7-b5d5954bc10d";
const SAMPLE_WITHOUT_EXT: &str = "sample-invoice-without-ext-namespace.xml";

fn sign_sample(name: &str, algorithm: KeyAlgorithm) -> (SigningKeyMaterial, EInvoiceSigningResult) {
    let key = common::test_key(algorithm);
    let certificate = common::issue_certificate(&key);
    let signer = InvoiceSigner::new().expect("signer");
    let result = signer
        .sign_invoice(&common::read_invoice(name), &key, &certificate)
        .expect("sign invoice");
    (key, result)
}

fn text(doc: &InvoiceDocument, xpath: &str) -> String {
    doc.text(xpath)
        .expect("xpath")
        .unwrap_or_else(|| panic!("no node at {xpath}"))
}

fn signature_method(doc: &InvoiceDocument) -> Option<String> {
    doc.select(SIGNATURE_METHOD_XPATH)
        .expect("signature method xpath")
        .first()
        .and_then(|node| node.get_attribute("Algorithm"))
}

#[test]
fn secp256k1_signing_fills_every_template_value() {
    let (key, result) = sign_sample(SAMPLE, KeyAlgorithm::Secp256k1);

    assert_eq!(result.invoice_hash().len(), 44);
    assert_eq!(result.invoice_uuid(), SAMPLE_UUID);
    assert!(result.signed_xml().starts_with("<?xml"));

    let doc = InvoiceDocument::parse(result.signed_xml()).expect("parse signed xml");
    let signature_value = text(&doc, SIGNATURE_VALUE_XPATH);
    assert_eq!(signature_value, result.signature_base64());
    Base64::decode_vec(&signature_value).expect("signature is base64");

    assert_eq!(text(&doc, INVOICE_DIGEST_XPATH), result.invoice_hash());
    assert_eq!(text(&doc, QR_XPATH), result.qr_code_base64());
    assert_eq!(
        signature_method(&doc).as_deref(),
        Some(ECDSA_SHA256_URI)
    );

    for xpath in [
        CERTIFICATE_XPATH,
        SIGNED_PROPERTIES_DIGEST_XPATH,
        SIGNING_TIME_XPATH,
    ] {
        assert!(!text(&doc, xpath).trim().is_empty(), "{xpath} left empty");
    }
    assert!(!result.signed_xml().contains("TO-BE-REPLACED"));

    let digest = Base64::decode_vec(result.invoice_hash()).expect("hash is base64");
    let valid = SignatureEngine
        .verify_base64(&key.verifying_key(), &digest, result.signature_base64())
        .expect("verify");
    assert!(valid);
}

#[test]
fn signing_hash_matches_standalone_hash() {
    let (_key, result) = sign_sample(SAMPLE, KeyAlgorithm::Secp256k1);
    let signer = InvoiceSigner::new().expect("signer");
    let digest = signer
        .invoice_hash(&common::read_invoice(SAMPLE))
        .expect("hash");
    assert_eq!(digest.to_base64(), result.invoice_hash());
}

#[test]
fn qr_payload_carries_invoice_and_signing_fields() {
    let (_key, result) = sign_sample(SAMPLE, KeyAlgorithm::Secp256k1);

    let raw = Base64::decode_vec(result.qr_code_base64()).expect("qr base64");
    assert_eq!(raw[0], 0x01);

    let fields = qr::decode(result.qr_code_base64()).expect("decode qr");
    let tags: Vec<u8> = fields.iter().map(|f| f.tag()).collect();
    assert_eq!(tags, (1..=9).collect::<Vec<u8>>());

    let value = |tag: u8| {
        String::from_utf8(fields[usize::from(tag) - 1].value().to_vec()).expect("utf8 value")
    };
    assert_eq!(value(1), "Maximum Speed Tech Supply LTD");
    assert_eq!(value(2), "399999999900003");
    assert_eq!(value(3), "2024-01-15T13:30:00");
    assert_eq!(value(4), "4.60");
    assert_eq!(value(5), "0.60");
    assert_eq!(value(6), result.invoice_hash());
    assert_eq!(value(7), result.signature_base64());
}

#[test]
fn missing_issue_time_defaults_to_midnight() {
    let (_key, result) = sign_sample("sample-invoice-no-issue-time.xml", KeyAlgorithm::Secp256k1);
    let fields = qr::decode(result.qr_code_base64()).expect("decode qr");
    assert_eq!(fields[2].value(), b"2024-01-15T00:00:00");
    assert_eq!(result.invoice_uuid(), "16e78469-64af-406d-9cfd-895e724198f0");
}

#[test]
fn certificate_values_land_in_signed_properties() {
    let key = common::test_key(KeyAlgorithm::Secp256k1);
    let pem = common::issue_certificate(&key);
    let certificate = CertificateMaterial::from_pem(&pem).expect("certificate");
    let result = InvoiceSigner::new()
        .expect("signer")
        .sign_invoice(&common::read_invoice(SAMPLE), &key, &pem)
        .expect("sign invoice");

    let doc = InvoiceDocument::parse(result.signed_xml()).expect("parse signed xml");
    assert_eq!(text(&doc, SERIAL_NUMBER_XPATH), "0A1B2C");
    let issuer = text(&doc, ISSUER_NAME_XPATH);
    assert!(issuer.contains("CN=Fotara Test CA"));
    assert!(issuer.contains(", "));
    assert_eq!(text(&doc, CERTIFICATE_XPATH), certificate.cleaned_base64());

    let fields = qr::decode(result.qr_code_base64()).expect("decode qr");
    assert_eq!(fields[7].value(), certificate.public_key_bytes().expect("spk"));
    assert_eq!(fields[8].value(), certificate.der());
}

#[test]
fn signed_document_rehashes_to_its_embedded_digests() {
    let signer = InvoiceSigner::new().expect("signer");
    for name in [SAMPLE, SAMPLE_WITHOUT_EXT] {
        let (_key, result) = sign_sample(name, KeyAlgorithm::Secp256k1);
        let doc = InvoiceDocument::parse(result.signed_xml()).expect("parse signed xml");

        let rehashed = signer
            .invoice_hash(result.signed_xml())
            .expect("hash signed xml")
            .to_base64();
        assert_eq!(rehashed, text(&doc, INVOICE_DIGEST_XPATH), "{name}");
        assert_eq!(rehashed, result.invoice_hash(), "{name}");

        let properties = doc
            .detached_outer_xml(SIGNED_PROPERTIES_XPATH)
            .expect("serialize signed properties")
            .expect("signed properties present");
        assert_eq!(
            hex_digest_base64(properties.as_bytes()),
            text(&doc, SIGNED_PROPERTIES_DIGEST_XPATH),
            "{name}"
        );
    }
}

#[test]
fn root_without_ext_namespace_gains_it_when_signed() {
    let raw = common::read_invoice(SAMPLE_WITHOUT_EXT);
    assert!(!raw.contains("xmlns:ext="));
    let (_key, result) = sign_sample(SAMPLE_WITHOUT_EXT, KeyAlgorithm::Secp256k1);
    assert!(result.signed_xml().contains("xmlns:ext="));

    let signer = InvoiceSigner::new().expect("signer");
    assert_eq!(
        signer.invoice_hash(&raw).expect("hash").to_base64(),
        result.invoice_hash()
    );
}

/// Raw QR bytes that precede the final field's value.
fn tag9_header(qr_base64: &str, certificate_der: &[u8]) -> Vec<u8> {
    let raw = Base64::decode_vec(qr_base64).expect("qr base64");
    assert!(raw.ends_with(certificate_der), "tag 9 is the last field");
    let start = raw.len() - certificate_der.len();
    let header_len = if certificate_der.len() > 0xFF { 4 } else { 3 };
    raw[start - header_len..start].to_vec()
}

#[test]
fn p256_qr_carries_full_size_key_and_certificate() {
    let key = common::test_key(KeyAlgorithm::P256);
    let pem = common::issue_certificate(&key);
    let certificate = CertificateMaterial::from_pem(&pem).expect("certificate");
    let result = InvoiceSigner::new()
        .expect("signer")
        .sign_invoice(&common::read_invoice(SAMPLE), &key, &pem)
        .expect("sign invoice");

    let fields = qr::decode(result.qr_code_base64()).expect("decode qr");
    assert_eq!(fields[7].value().len(), 65, "uncompressed P-256 point");
    assert_eq!(fields[7].value(), certificate.public_key_bytes().expect("spk"));

    let der = certificate.der();
    assert!(der.len() > 0x7F);
    assert_eq!(fields[8].value(), der);
    let len = der.len();
    let expected = if len > 0xFF {
        vec![9, 0x82, (len >> 8) as u8, len as u8]
    } else {
        vec![9, 0x81, len as u8]
    };
    assert_eq!(tag9_header(result.qr_code_base64(), der), expected);
}

#[test]
fn p256_keys_sign_and_verify() {
    let (key, result) = sign_sample(SAMPLE, KeyAlgorithm::P256);
    let digest = Base64::decode_vec(result.invoice_hash()).expect("hash is base64");
    assert!(
        SignatureEngine
            .verify_base64(&key.verifying_key(), &digest, result.signature_base64())
            .expect("verify")
    );
}

#[test]
fn default_rsa_keys_sign_end_to_end() {
    let (key, result) = sign_sample(SAMPLE, KeyAlgorithm::Rsa);
    let doc = InvoiceDocument::parse(result.signed_xml()).expect("parse signed xml");
    assert_eq!(signature_method(&doc).as_deref(), Some(RSA_SHA256_URI));

    let certificate = CertificateMaterial::from_base64(&text(&doc, CERTIFICATE_XPATH))
        .expect("embedded certificate");
    let fields = qr::decode(result.qr_code_base64()).expect("decode qr");
    assert_eq!(fields.len(), 9);
    assert!(fields[7].value().len() > 0xFF, "2048-bit modulus needs a long length");
    assert_eq!(fields[7].value(), certificate.public_key_bytes().expect("spk"));
    assert_eq!(fields[8].value(), certificate.der());

    let digest = Base64::decode_vec(result.invoice_hash()).expect("hash is base64");
    assert!(
        SignatureEngine
            .verify_base64(&key.verifying_key(), &digest, result.signature_base64())
            .expect("verify")
    );
}

#[test]
fn signed_invoice_builds_submission_request() {
    let (_key, result) = sign_sample(SAMPLE, KeyAlgorithm::Secp256k1);

    let from_result = InvoiceRequest::from_signing_result(&result);
    let from_xml = InvoiceRequest::from_signed_xml(result.signed_xml()).expect("request");
    assert_eq!(from_xml.invoice_hash, result.invoice_hash());
    assert_eq!(from_xml.uuid, SAMPLE_UUID);
    assert_eq!(from_result.uuid, from_xml.uuid);

    let json = from_xml.to_json_pretty().expect("json");
    let value: serde_json::Value = serde_json::from_str(&json).expect("parse json");
    assert_eq!(value["uuid"], SAMPLE_UUID);
    assert!(value["invoiceHash"].is_string());
    assert!(value["invoice"].is_string());
}

#[test]
fn invalid_certificate_aborts_signing() {
    let key = common::test_key(KeyAlgorithm::Secp256k1);
    let err = InvoiceSigner::new()
        .expect("signer")
        .sign_invoice(&common::read_invoice(SAMPLE), &key, "not a certificate")
        .expect_err("bad certificate");
    assert!(matches!(
        err,
        fotara_core::invoice::SigningError::Certificate(_)
    ));
}
