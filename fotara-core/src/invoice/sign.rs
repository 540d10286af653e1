use super::hash::{CanonicalXmlHasher, HashError, InvoiceDigest, hex_digest_base64};
use super::qr::{QrCodeError, QrFields, QrSigningParts};
use super::signature::{SignatureEngine, SignatureError};
use super::transform::{Stylesheet, TransformError, TransformPipeline};
use super::xml::constants::{
    CERT_DIGEST_XPATH, CERTIFICATE_XPATH, ECDSA_SHA256_URI, INVOICE_DIGEST_XPATH,
    ISSUER_NAME_XPATH, QR_XPATH, RSA_SHA256_URI, SERIAL_NUMBER_XPATH, SIGNATURE_METHOD_XPATH,
    SIGNATURE_VALUE_XPATH, SIGNED_PROPERTIES_DIGEST_XPATH, SIGNED_PROPERTIES_XPATH,
    SIGNING_TIME_XPATH, UUID_XPATH,
};
use super::xml::{InvoiceDocument, XmlError};
use crate::certificate::{CertificateError, CertificateMaterial};
use crate::config::{Config, DEFAULT_UTC_OFFSET_HOURS};
use crate::keys::{KeyAlgorithm, SigningKeyMaterial};
use thiserror::Error;
use tracing::{debug, error, info};

const SIGNING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invoice hash failed: {0}")]
    Hash(#[from] HashError),
    #[error("signature template injection failed: {0}")]
    Transform(#[from] TransformError),
    #[error("{stage}: {source}")]
    Xml {
        stage: &'static str,
        #[source]
        source: XmlError,
    },
    #[error("invalid signing certificate: {0}")]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("QR code generation failed: {0}")]
    Qr(#[from] QrCodeError),
    #[error("{what} not found in invoice XML ({xpath})")]
    MissingNode {
        what: &'static str,
        xpath: &'static str,
    },
}

/// Output of a successful [`InvoiceSigner::sign_invoice`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EInvoiceSigningResult {
    invoice_hash: String,
    signature_base64: String,
    qr_code_base64: String,
    signed_xml: String,
    invoice_uuid: String,
}

impl EInvoiceSigningResult {
    pub fn invoice_hash(&self) -> &str {
        &self.invoice_hash
    }

    pub fn signature_base64(&self) -> &str {
        &self.signature_base64
    }

    pub fn qr_code_base64(&self) -> &str {
        &self.qr_code_base64
    }

    pub fn signed_xml(&self) -> &str {
        &self.signed_xml
    }

    pub fn invoice_uuid(&self) -> &str {
        &self.invoice_uuid
    }

    pub fn into_signed_xml(self) -> String {
        self.signed_xml
    }
}

/// Signs raw UBL invoices.
///
/// Holds the loaded templates and cleanup patterns, which are read-only after
/// construction, so one signer can serve any number of invoices.
///
/// # Examples
/// ```rust,no_run
/// use fotara_core::certificate::CertificateMaterial;
/// use fotara_core::invoice::sign::InvoiceSigner;
/// use fotara_core::keys::SigningKeyMaterial;
///
/// let signer = InvoiceSigner::new()?.with_utc_offset(3);
/// let key = SigningKeyMaterial::from_pem(&std::fs::read_to_string("private.pem")?, None)?;
/// let cert = std::fs::read_to_string("cert.pem")?;
/// let xml = std::fs::read_to_string("invoice.xml")?;
///
/// let result = signer.sign_invoice(&xml, &key, &cert)?;
/// println!("{}", result.invoice_hash());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct InvoiceSigner {
    hasher: CanonicalXmlHasher,
    engine: SignatureEngine,
    utc_offset_hours: i32,
}

impl InvoiceSigner {
    pub fn new() -> Result<Self, SigningError> {
        Ok(Self::with_pipeline(TransformPipeline::new()?))
    }

    pub fn with_pipeline(pipeline: TransformPipeline) -> Self {
        Self {
            hasher: CanonicalXmlHasher::new(pipeline),
            engine: SignatureEngine,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, SigningError> {
        Ok(Self::new()?.with_utc_offset(config.utc_offset_hours()))
    }

    pub fn with_utc_offset(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    pub fn utc_offset_hours(&self) -> i32 {
        self.utc_offset_hours
    }

    pub fn hasher(&self) -> &CanonicalXmlHasher {
        &self.hasher
    }

    /// Digest of the invoice with its signature, QR and extension blocks removed.
    pub fn invoice_hash(&self, raw_xml: &str) -> Result<InvoiceDigest, SigningError> {
        Ok(self.hasher.compute_digest(raw_xml, &Stylesheet::HASH)?)
    }

    /// Produces the signed document, its QR payload and metadata.
    ///
    /// Nothing is returned unless every step succeeds.
    pub fn sign_invoice(
        &self,
        raw_xml: &str,
        key: &SigningKeyMaterial,
        certificate_pem: &str,
    ) -> Result<EInvoiceSigningResult, SigningError> {
        let result = self.sign_steps(raw_xml, key, certificate_pem);
        match &result {
            Ok(signed) => info!(uuid = signed.invoice_uuid(), "invoice signed"),
            Err(err) => error!(error = %err, "invoice signing failed"),
        }
        result
    }

    fn sign_steps(
        &self,
        raw_xml: &str,
        key: &SigningKeyMaterial,
        certificate_pem: &str,
    ) -> Result<EInvoiceSigningResult, SigningError> {
        let digest = self.invoice_hash(raw_xml)?;
        let invoice_hash = digest.to_base64();
        debug!(invoice_hash, "computed invoice hash");

        let certificate = CertificateMaterial::from_pem(certificate_pem)?;
        let signature = self.engine.sign(key, digest.as_bytes())?;
        let signature_base64 = signature.signature_base64();
        debug!(algorithm = %key.algorithm(), "signed invoice hash");

        let prepared = self
            .hasher
            .pipeline()
            .apply_all(raw_xml, &Stylesheet::SIGNING)?;
        let cleaned = self.hasher.pipeline().cleaner().clean(&prepared);
        let mut doc = InvoiceDocument::parse(&cleaned).map_err(|source| SigningError::Xml {
            stage: "parse prepared invoice",
            source,
        })?;

        let signing_time = chrono::Local::now().format(SIGNING_TIME_FORMAT).to_string();
        let signed_properties = [
            (CERT_DIGEST_XPATH, certificate.digest_base64()),
            (SIGNING_TIME_XPATH, signing_time),
            (ISSUER_NAME_XPATH, certificate.issuer_name()),
            (SERIAL_NUMBER_XPATH, certificate.serial_hex()),
        ];
        for (xpath, value) in &signed_properties {
            replace(&mut doc, "set signed property", xpath, value)?;
        }

        let properties_xml = doc
            .detached_outer_xml(SIGNED_PROPERTIES_XPATH)
            .map_err(|source| SigningError::Xml {
                stage: "serialize signed properties",
                source,
            })?
            .ok_or(SigningError::MissingNode {
                what: "xades:SignedProperties",
                xpath: SIGNED_PROPERTIES_XPATH,
            })?;
        let properties_digest = hex_digest_base64(properties_xml.as_bytes());

        let signature_values = [
            (SIGNATURE_VALUE_XPATH, signature_base64.as_str()),
            (CERTIFICATE_XPATH, certificate.cleaned_base64()),
            (SIGNED_PROPERTIES_DIGEST_XPATH, properties_digest.as_str()),
            (INVOICE_DIGEST_XPATH, invoice_hash.as_str()),
        ];
        for (xpath, value) in signature_values {
            replace(&mut doc, "set signature value", xpath, value)?;
        }
        let method = match key.algorithm() {
            KeyAlgorithm::Rsa => RSA_SHA256_URI,
            _ => ECDSA_SHA256_URI,
        };
        doc.set_attribute(SIGNATURE_METHOD_XPATH, "Algorithm", method)
            .map_err(|source| SigningError::Xml {
                stage: "set signature method",
                source,
            })?;

        let fields = QrFields::from_document(&doc, self.utc_offset_hours)?;
        let qr_code_base64 = fields.encode(QrSigningParts {
            invoice_hash: &invoice_hash,
            signature: &signature_base64,
            public_key: certificate.public_key_bytes()?,
            certificate: certificate.der(),
        })?;
        replace(&mut doc, "set QR payload", QR_XPATH, &qr_code_base64)?;

        let invoice_uuid = doc
            .text(UUID_XPATH)
            .map_err(|source| SigningError::Xml {
                stage: "read invoice UUID",
                source,
            })?
            .ok_or(SigningError::MissingNode {
                what: "cbc:UUID",
                xpath: UUID_XPATH,
            })?;

        Ok(EInvoiceSigningResult {
            invoice_hash,
            signature_base64,
            qr_code_base64,
            signed_xml: doc.to_xml(),
            invoice_uuid,
        })
    }
}

fn replace(
    doc: &mut InvoiceDocument,
    stage: &'static str,
    xpath: &str,
    value: &str,
) -> Result<(), SigningError> {
    doc.replace_node_text(xpath, value)
        .map(|_| ())
        .map_err(|source| SigningError::Xml { stage, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_signature_blocks() {
        let signer = InvoiceSigner::new().expect("signer");
        let plain = r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"><cbc:ID>1</cbc:ID></Invoice>"#;
        let with_blocks = r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2" xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2" xmlns:ext="urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2"><ext:UBLExtensions/><cbc:ID>1</cbc:ID><cac:Signature/></Invoice>"#;

        let a = signer.invoice_hash(plain).expect("plain hash");
        let b = signer.invoice_hash(with_blocks).expect("hash with blocks");
        assert_eq!(a, b);
        assert_eq!(a.to_base64().len(), 44);
    }

    #[test]
    fn malformed_invoice_is_a_hash_error() {
        let signer = InvoiceSigner::new().expect("signer");
        let key = SigningKeyMaterial::generate(KeyAlgorithm::Secp256k1).expect("key");
        let err = signer
            .sign_invoice("<Invoice>", &key, "")
            .expect_err("malformed input");
        assert!(matches!(err, SigningError::Hash(_)));
    }
}
