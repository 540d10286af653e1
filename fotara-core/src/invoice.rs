//! Invoice hashing, signing and QR generation over raw UBL XML.
//!
//! The flow for one invoice is:
//! 1. [`hash`] removes signature blocks, canonicalizes and digests the document.
//! 2. [`signature`] signs that digest with the taxpayer key.
//! 3. [`transform`] injects the UBL extension, QR and signature templates.
//! 4. [`sign`] fills the templates and produces the signed document.
pub mod hash;
pub mod qr;
pub mod request;
pub mod sign;
pub mod signature;
pub mod transform;
pub mod xml;

pub use hash::{CanonicalXmlHasher, InvoiceDigest};
pub use qr::{QrCodeError, QrFields, QrResult, TlvField};
pub use request::InvoiceRequest;
pub use sign::{EInvoiceSigningResult, InvoiceSigner, SigningError};
pub use signature::{DigitalSignature, SignatureEngine};
pub use transform::{Stylesheet, TransformPipeline};
pub use xml::InvoiceDocument;
