use ecdsa::signature::{Keypair, Signer};
use fotara_core::keys::{KeyAlgorithm, SigningKeyMaterial};
use sha2::Sha256;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::EncodePem;
use x509_cert::der::pem::LineEnding;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{
    DynSignatureAlgorithmIdentifier, EncodePublicKey, SignatureBitStringEncoding,
    SubjectPublicKeyInfoOwned,
};
use x509_cert::time::Validity;

#[allow(dead_code)]
pub const TEST_ISSUER: &str = "CN=Fotara Test CA,O=Fotara,C=JO";
#[allow(dead_code)]
pub const TEST_SERIAL: [u8; 3] = [0x0A, 0x1B, 0x2C];

#[allow(dead_code)]
pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

#[allow(dead_code)]
pub fn read_invoice(name: &str) -> String {
    std::fs::read_to_string(fixture_path(&format!("invoices/{name}"))).expect("read invoice fixture")
}

/// Fresh key at the size production enrollment generates.
#[allow(dead_code)]
pub fn test_key(algorithm: KeyAlgorithm) -> SigningKeyMaterial {
    SigningKeyMaterial::generate(algorithm).expect("key")
}

/// Self-signed certificate for `key`, as PEM.
#[allow(dead_code)]
pub fn issue_certificate(key: &SigningKeyMaterial) -> String {
    let spki_der = key.verifying_key().to_der().expect("spki der");
    let spki = SubjectPublicKeyInfoOwned::try_from(spki_der.as_slice()).expect("spki");
    match key {
        SigningKeyMaterial::Secp256k1(signer) => {
            self_signed::<_, k256::ecdsa::DerSignature>(signer, spki)
        }
        SigningKeyMaterial::P256(signer) => self_signed::<_, p256::ecdsa::DerSignature>(signer, spki),
        SigningKeyMaterial::Rsa(private) => {
            let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private.as_ref().clone());
            self_signed::<_, rsa::pkcs1v15::Signature>(&signer, spki)
        }
    }
}

fn self_signed<S, Sig>(signer: &S, spki: SubjectPublicKeyInfoOwned) -> String
where
    S: Keypair + DynSignatureAlgorithmIdentifier + Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: SignatureBitStringEncoding,
{
    let serial_number = SerialNumber::new(&TEST_SERIAL).expect("serial");
    let validity = Validity::from_now(Duration::from_secs(3600)).expect("validity");
    let subject = Name::from_str(TEST_ISSUER).expect("subject");
    let builder =
        CertificateBuilder::new(Profile::Root, serial_number, validity, subject, spki, signer)
            .expect("builder");
    let cert = builder.build::<Sig>().expect("certificate");
    cert.to_pem(LineEnding::LF).expect("cert pem")
}
