//! Toolkit for Fotara/ZATCA style UBL e-invoicing: invoice hashing, XAdES
//! signing, TLV QR codes, CSR enrollment and the compliance service API.
//!
//! # Examples
//! ```rust
//! use fotara_core::config::{Config, EnvironmentType};
//! use fotara_core::invoice::sign::InvoiceSigner;
//!
//! let config = Config::new(EnvironmentType::Simulation);
//! let signer = InvoiceSigner::from_config(&config)?;
//! # let _ = signer;
//! # Ok::<(), fotara_core::Error>(())
//! ```
pub mod api;
pub mod certificate;
pub mod config;
pub mod csr;
pub mod invoice;
pub mod keys;
pub mod security;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Xml(#[from] invoice::xml::XmlError),
    #[error(transparent)]
    Transform(#[from] invoice::transform::TransformError),
    #[error(transparent)]
    Hash(#[from] invoice::hash::HashError),
    #[error(transparent)]
    Qr(#[from] invoice::qr::QrCodeError),
    #[error(transparent)]
    Signature(#[from] invoice::signature::SignatureError),
    #[error(transparent)]
    Signing(#[from] invoice::sign::SigningError),
    #[error(transparent)]
    Request(#[from] invoice::request::InvoiceRequestError),
    #[error(transparent)]
    Key(#[from] keys::KeyError),
    #[error(transparent)]
    Certificate(#[from] certificate::CertificateError),
    #[error(transparent)]
    Csr(#[from] csr::CsrError),
    #[error(transparent)]
    Api(#[from] api::ApiError),
}
