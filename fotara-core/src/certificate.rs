//! X.509 certificate material consumed by the signer.
use crate::invoice::hash::hex_digest_base64;
use base64ct::{Base64, Encoding};
use thiserror::Error;
use x509_cert::name::Name;
use x509_cert::{Certificate, der::Decode};

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate is empty")]
    Empty,
    #[error("certificate is not valid base64")]
    InvalidBase64,
    #[error("failed to parse certificate: {0}")]
    Parse(#[from] x509_cert::der::Error),
    #[error("certificate {field} is not byte aligned")]
    UnalignedBitString { field: &'static str },
}

/// Strips PEM armor, line breaks and surrounding whitespace.
///
/// ```rust
/// use fotara_core::certificate::clean_pem;
///
/// let pem = "-----BEGIN CERTIFICATE-----\r\nAAEC\r\nAwQ=\r\n-----END CERTIFICATE-----\r\n";
/// assert_eq!(clean_pem(pem), "AAECAwQ=");
/// ```
pub fn clean_pem(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----BEGIN") && !line.starts_with("-----END"))
        .flat_map(|line| line.split_whitespace())
        .collect()
}

#[derive(Debug, Clone)]
pub struct CertificateMaterial {
    certificate: Certificate,
    cleaned: String,
    der: Vec<u8>,
}

impl CertificateMaterial {
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        Self::from_base64(&clean_pem(pem))
    }

    pub fn from_base64(b64: &str) -> Result<Self, CertificateError> {
        let cleaned = clean_pem(b64);
        if cleaned.is_empty() {
            return Err(CertificateError::Empty);
        }
        let der = Base64::decode_vec(&cleaned).map_err(|_| CertificateError::InvalidBase64)?;
        let certificate = Certificate::from_der(&der)?;
        Ok(Self {
            certificate,
            cleaned,
            der,
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Base64 body without armor, as written into `ds:X509Certificate`.
    pub fn cleaned_base64(&self) -> &str {
        &self.cleaned
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Issuer DN with its RDNs separated by `", "`.
    pub fn issuer_name(&self) -> String {
        display_name(&self.certificate.tbs_certificate.issuer)
    }

    /// Uppercase hex of the serial number bytes.
    pub fn serial_hex(&self) -> String {
        hex::encode_upper(self.certificate.tbs_certificate.serial_number.as_bytes())
    }

    /// Contents of the subjectPublicKey BIT STRING.
    pub fn public_key_bytes(&self) -> Result<&[u8], CertificateError> {
        self.certificate
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .as_bytes()
            .ok_or(CertificateError::UnalignedBitString {
                field: "subjectPublicKey",
            })
    }

    /// `base64(hex(sha256(cleaned base64)))`, the XAdES certificate digest.
    pub fn digest_base64(&self) -> String {
        hex_digest_base64(self.cleaned.as_bytes())
    }
}

/// RFC 4514 order, most specific RDN first. Each RDN keeps its own escaping.
fn display_name(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn issuer_rdns_are_joined_with_comma_space() {
        let name = Name::from_str("CN=Fotara Test CA,O=Fotara,C=JO").expect("name");
        assert_eq!(display_name(&name), "CN=Fotara Test CA, O=Fotara, C=JO");
    }

    #[test]
    fn escaped_commas_stay_inside_their_rdn() {
        let name = Name::from_str(r"CN=Acme\, Inc,O=Fotara,C=JO").expect("name");
        assert_eq!(display_name(&name), r"CN=Acme\, Inc, O=Fotara, C=JO");
    }

    #[test]
    fn clean_pem_handles_line_ending_variants() {
        let body = "MIIBszCCAVmgAwIBAgIG";
        let lf = format!("-----BEGIN CERTIFICATE-----\n{body}\n-----END CERTIFICATE-----\n");
        let crlf = lf.replace('\n', "\r\n");
        let indented =
            "  -----BEGIN CERTIFICATE-----\n  MIIBszCCAV\n  mgAwIBAgIG  \n-----END CERTIFICATE-----";

        assert_eq!(clean_pem(&lf), body);
        assert_eq!(clean_pem(&crlf), body);
        assert_eq!(clean_pem(indented), body);
        assert_eq!(clean_pem(body), body);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            CertificateMaterial::from_pem("-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----"),
            Err(CertificateError::Empty)
        ));
    }

    #[test]
    fn invalid_der_is_rejected() {
        assert!(matches!(
            CertificateMaterial::from_base64("AAECAwQ="),
            Err(CertificateError::Parse(_))
        ));
    }
}
