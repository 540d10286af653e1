mod common;

use base64ct::{Base64, Encoding};
use fotara_core::config::EnvironmentType;
use fotara_core::csr::{CsrError, CsrProperties, EnrollmentArtifacts, ToBase64String};
use fotara_core::keys::{KeyAlgorithm, SigningKeyMaterial};
use fotara_core::security::Passthrough;
use x509_cert::der::Encode;
use x509_cert::request::CertReq;

const SAN_OID_DER: &[u8] = b"\x06\x03\x55\x1D\x11";
const TEMPLATE_OID_DER: &[u8] = b"\x2b\x06\x01\x04\x01\x82\x37\x14\x02";

fn example_config() -> CsrProperties {
    CsrProperties::parse_csr_config(&common::fixture_path(
        "csr-configs/csr-config-example-EN.properties",
    ))
    .expect("csr config")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn attribute_bytes(csr: &CertReq) -> Vec<u8> {
    csr.info
        .attributes
        .iter()
        .flat_map(|attr| attr.values.iter())
        .flat_map(|value| value.to_der().unwrap_or_default())
        .collect()
}

#[test]
fn parse_csr_config_reads_all_fields() {
    let config = example_config();
    assert_eq!(config.common_name(), "TST-886431145-399999999900003");
    assert_eq!(config.serial_number(), "1-TST|2-TST|3-ed22f1d8-e6a2-1118-9b58-d9a8f11e445f");
    assert_eq!(config.device_id(), "3-ed22f1d8-e6a2-1118-9b58-d9a8f11e445f");
    assert_eq!(config.invoice_type(), "1100");
    assert!(config.issues_standard());
    assert!(config.issues_simplified());
}

#[test]
fn generated_csr_carries_subject_and_extensions() {
    let config = example_config();
    for algorithm in [KeyAlgorithm::Secp256k1, KeyAlgorithm::P256] {
        let (csr, _key) = config
            .generate(algorithm, EnvironmentType::Simulation.certificate_template())
            .expect("csr build");

        let subject = csr.info.subject.to_string();
        assert!(subject.contains("C=SA"), "subject was {subject}");
        assert!(subject.contains("OU=Riyadh Branch"));
        assert!(subject.contains("O=Maximum Speed Tech Supply LTD"));
        assert!(subject.contains("CN=TST-"));

        let attributes = attribute_bytes(&csr);
        assert!(contains(&attributes, SAN_OID_DER), "missing subjectAltName");
        assert!(contains(&attributes, TEMPLATE_OID_DER), "missing template name");
        assert!(contains(&attributes, b"SIM_TEMP"));
        assert!(contains(&attributes, b"1-TST|2-TST|3-ed22f1d8"));
    }
}

#[test]
fn rsa_key_from_pem_signs_request() {
    let key = common::test_key(KeyAlgorithm::Rsa);
    let reloaded = SigningKeyMaterial::from_pem(&key.to_pem().expect("pem"), None).expect("load");
    let csr = example_config()
        .build(&reloaded, EnvironmentType::Production.certificate_template())
        .expect("csr build");
    assert!(contains(&attribute_bytes(&csr), b"PROD_TEMP"));
    assert!(!csr.to_base64_string().expect("der base64").is_empty());
}

#[test]
fn encoded_csr_is_base64_of_pem() {
    let (csr, key) = example_config()
        .generate(
            KeyAlgorithm::Secp256k1,
            EnvironmentType::Development.certificate_template(),
        )
        .expect("csr build");
    let artifacts = EnrollmentArtifacts::new(&csr, &key).expect("artifacts");

    let decoded = Base64::decode_vec(&artifacts.csr_encoded).expect("base64");
    assert_eq!(String::from_utf8(decoded).expect("utf8"), artifacts.csr_pem);
    assert!(artifacts.csr_pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    assert!(artifacts.public_pem.starts_with("-----BEGIN PUBLIC KEY-----"));

    let dir = tempfile::tempdir().expect("tempdir");
    artifacts
        .write_to(dir.path(), &Passthrough)
        .expect("write artifacts");
    let private = std::fs::read_to_string(dir.path().join(EnrollmentArtifacts::PRIVATE_KEY_FILE))
        .expect("private key file");
    let restored = SigningKeyMaterial::from_pem(&private, None).expect("reload key");
    assert_eq!(restored.verifying_key(), key.verifying_key());
}

#[test]
fn invalid_serial_is_rejected() {
    let err = CsrProperties::parse_csr_config(&common::fixture_path(
        "csr-configs/csr-config-invalid-serial.properties",
    ))
    .expect_err("two-part serial");
    assert!(matches!(err, CsrError::Validation { .. }), "{err}");
}

#[test]
fn missing_property_names_the_key() {
    let err = CsrProperties::parse_csr_config(&common::fixture_path(
        "csr-configs/csr-config-missing-field.properties",
    ))
    .expect_err("missing field");
    match err {
        CsrError::MissingProperty { key, .. } => assert_eq!(key, "csr.organization.unit.name"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let err = CsrProperties::parse_csr_config(&common::fixture_path("csr-configs/absent.properties"))
        .expect_err("no such file");
    assert!(matches!(err, CsrError::Io { .. }));
}
