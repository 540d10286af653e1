//! Canonical XML hashing.
use super::transform::{Stylesheet, TransformError, TransformPipeline};
use super::xml::{InvoiceDocument, XmlError};
use base64ct::{Base64, Encoding};
use libxml::tree::c14n;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error};

/// Canonicalization used for every invoice digest.
pub const CANONICALIZATION: c14n::CanonicalizationMode = c14n::CanonicalizationMode::Canonical1_1;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hash transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("failed to parse transformed document: {0}")]
    Parse(#[source] XmlError),
    #[error("failed to canonicalize document")]
    Canonicalize,
}

/// SHA-256 digest of a canonicalized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDigest {
    bytes: [u8; 32],
}

impl InvoiceDigest {
    pub fn of(data: &[u8]) -> Self {
        Self {
            bytes: Sha256::digest(data).into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_base64(&self) -> String {
        Base64::encode_string(&self.bytes)
    }
}

#[derive(Debug, Clone)]
pub struct CanonicalXmlHasher {
    pipeline: TransformPipeline,
}

impl CanonicalXmlHasher {
    pub fn new(pipeline: TransformPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    /// Base64 SHA-256 over the canonical form of `xml` after `transforms`.
    pub fn compute_hash(&self, xml: &str, transforms: &[Stylesheet]) -> Result<String, HashError> {
        Ok(self.compute_digest(xml, transforms)?.to_base64())
    }

    pub fn compute_digest(
        &self,
        xml: &str,
        transforms: &[Stylesheet],
    ) -> Result<InvoiceDigest, HashError> {
        let transformed = self.pipeline.apply_all(xml, transforms)?;
        let canonical = self.canonicalize(&transformed)?;
        debug!(bytes = canonical.len(), "canonicalized document for hashing");
        Ok(InvoiceDigest::of(canonical.as_bytes()))
    }

    /// Inclusive canonical form of `xml`, comments dropped.
    pub fn canonicalize(&self, xml: &str) -> Result<String, HashError> {
        let cleaned = self.pipeline.cleaner().clean(xml);
        let doc = InvoiceDocument::parse(&cleaned).map_err(|e| {
            error!(error = %e, "hash input is not well-formed");
            HashError::Parse(e)
        })?;
        let options = c14n::CanonicalizationOptions {
            mode: CANONICALIZATION,
            inclusive_ns_prefixes: vec![],
            with_comments: false,
        };
        doc.document()
            .canonicalize(options, None)
            .map_err(|_| HashError::Canonicalize)
    }
}

/// Hex-encodes a SHA-256 digest and base64-encodes the hex text.
pub fn hex_digest_base64(data: &[u8]) -> String {
    let hex_hash = hex::encode(Sha256::digest(data));
    Base64::encode_string(hex_hash.as_bytes())
}
