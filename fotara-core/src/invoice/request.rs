//! JSON body for compliance, clearance and reporting submissions.
use super::sign::EInvoiceSigningResult;
use super::xml::constants::{INVOICE_DIGEST_XPATH, UUID_XPATH};
use super::xml::{InvoiceDocument, XmlCleaner, XmlError};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvoiceRequestError {
    #[error("signed invoice XML is invalid: {0}")]
    Xml(#[from] XmlError),
    #[error("{what} not found in signed invoice ({xpath})")]
    MissingNode {
        what: &'static str,
        xpath: &'static str,
    },
    #[error("failed to serialize invoice request: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub invoice_hash: String,
    pub uuid: String,
    /// Base64 of the signed XML document.
    pub invoice: String,
}

impl InvoiceRequest {
    pub fn from_signing_result(result: &EInvoiceSigningResult) -> Self {
        Self {
            invoice_hash: result.invoice_hash().to_string(),
            uuid: result.invoice_uuid().to_string(),
            invoice: Base64::encode_string(result.signed_xml().as_bytes()),
        }
    }

    /// Rebuilds the request from a document signed earlier.
    ///
    /// The hash is taken from the invoice `ds:Reference` digest rather than
    /// recomputed.
    pub fn from_signed_xml(signed_xml: &str) -> Result<Self, InvoiceRequestError> {
        let cleaned = XmlCleaner::new()?.clean(signed_xml);
        let doc = InvoiceDocument::parse(&cleaned)?;
        let uuid = doc
            .text(UUID_XPATH)?
            .ok_or(InvoiceRequestError::MissingNode {
                what: "cbc:UUID",
                xpath: UUID_XPATH,
            })?;
        let invoice_hash =
            doc.text(INVOICE_DIGEST_XPATH)?
                .ok_or(InvoiceRequestError::MissingNode {
                    what: "invoice digest",
                    xpath: INVOICE_DIGEST_XPATH,
                })?;
        Ok(Self {
            invoice_hash,
            uuid,
            invoice: Base64::encode_string(signed_xml.as_bytes()),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, InvoiceRequestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let request = InvoiceRequest {
            invoice_hash: "aGFzaA==".into(),
            uuid: "3cf5ee18-ee25-44ea-a444-2c37ba7f28be".into(),
            invoice: "PEludm9pY2UvPg==".into(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&request.to_json_pretty().expect("json")).expect("parse");
        assert_eq!(value["invoiceHash"], "aGFzaA==");
        assert_eq!(value["uuid"], "3cf5ee18-ee25-44ea-a444-2c37ba7f28be");
        assert_eq!(value["invoice"], "PEludm9pY2UvPg==");
    }

    #[test]
    fn unsigned_invoice_has_no_digest() {
        let xml = r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"><cbc:UUID>abc</cbc:UUID></Invoice>"#;
        match InvoiceRequest::from_signed_xml(xml) {
            Err(InvoiceRequestError::MissingNode { what, .. }) => {
                assert_eq!(what, "invoice digest")
            }
            other => panic!("expected missing digest, got {other:?}"),
        }
    }
}
