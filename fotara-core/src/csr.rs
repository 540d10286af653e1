//! CSR generation and enrollment artifacts.
use crate::keys::{KeyAlgorithm, KeyError, SigningKeyMaterial};
use crate::security::ArtifactCipher;
use base64ct::{Base64, Encoding};
use ecdsa::signature::{Keypair, Signer};
use java_properties::read;
use sha2::Sha256;
use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, info};
use x509_cert::{
    builder::{Builder, RequestBuilder},
    der::{
        Encode, EncodePem, Error as DerError, Length, Result as DerResult, Tag, Writer, asn1,
        pem::LineEnding,
    },
    ext::{
        AsExtension, Extension,
        pkix::{SubjectAltName, name::GeneralName},
    },
    name,
    request::CertReq,
    spki::{DynSignatureAlgorithmIdentifier, EncodePublicKey, SignatureBitStringEncoding},
};

/// Errors that can occur while generating or validating CSRs.
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("failed to open CSR config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSR properties from '{path}': {source}")]
    PropertiesRead {
        path: PathBuf,
        #[source]
        source: java_properties::PropertiesError,
    },

    #[error("missing required CSR property '{key}' in file '{path}'")]
    MissingProperty { path: PathBuf, key: String },

    #[error("invalid subject distinguished name constructed from provided fields: {message}")]
    InvalidSubject { message: String },

    #[error("invalid Subject Alternative Name (SAN) from fields: {message}")]
    InvalidSan { message: String },

    #[error("failed to construct CSR request: {message}")]
    RequestBuild { message: String },

    #[error("failed adding CSR extension '{which}': {message}")]
    AddExtension {
        which: &'static str,
        message: String,
    },

    #[error("failed to build CSR: {message}")]
    CsrBuild { message: String },

    #[error("failed DER encoding for {context}: {source}")]
    DerEncode {
        context: &'static str,
        #[source]
        source: DerError,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("failed to write enrollment artifact '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Certificate template name extension, `1.3.6.1.4.1.311.20.2`.
struct TemplateNameExtension(asn1::Any);

impl const_oid::AssociatedOid for TemplateNameExtension {
    const OID: const_oid::ObjectIdentifier =
        const_oid::ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.20.2");
}

impl Encode for TemplateNameExtension {
    fn encoded_len(&self) -> DerResult<Length> {
        self.0.encoded_len()
    }
    fn encode(&self, encoder: &mut impl Writer) -> DerResult<()> {
        self.0.encode(encoder)
    }
}

impl AsExtension for TemplateNameExtension {
    fn critical(&self, _name: &name::Name, _exts: &[Extension]) -> bool {
        false
    }
}

impl TemplateNameExtension {
    // Tagged as PrintableString without charset checks, so names such as
    // `SIM_TEMP` are carried as given.
    fn new(template: &str) -> Result<Self, CsrError> {
        asn1::Any::new(Tag::PrintableString, template.as_bytes())
            .map(Self)
            .map_err(|e| CsrError::RequestBuild {
                message: format!("invalid template name for extension: {e}"),
            })
    }
}

/// CSR properties parsed from a Java `.properties` file.
///
/// # Examples
/// ```rust,no_run
/// use fotara_core::csr::CsrProperties;
/// use fotara_core::keys::KeyAlgorithm;
///
/// let props = CsrProperties::parse_csr_config("csr.properties".as_ref())?;
/// let (csr, _key) = props.generate(KeyAlgorithm::Secp256k1, "NQCSignature")?;
/// # let _ = csr;
/// # Ok::<(), fotara_core::csr::CsrError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrProperties {
    common_name: String,
    serial_number: String,
    organization_identifier: String,
    organization_unit_name: String,
    organization_name: String,
    country_name: String,
    invoice_type: String,
    location_address: String,
    industry_business_category: String,
}

impl CsrProperties {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        common_name: impl Into<String>,
        serial_number: impl Into<String>,
        organization_identifier: impl Into<String>,
        organization_unit_name: impl Into<String>,
        organization_name: impl Into<String>,
        country_name: impl Into<String>,
        invoice_type: impl Into<String>,
        location_address: impl Into<String>,
        industry_business_category: impl Into<String>,
    ) -> Result<Self, CsrError> {
        let props = Self {
            common_name: common_name.into().trim().to_string(),
            serial_number: serial_number.into().trim().to_string(),
            organization_identifier: organization_identifier.into().trim().to_string(),
            organization_unit_name: organization_unit_name.into().trim().to_string(),
            organization_name: organization_name.into().trim().to_string(),
            country_name: country_name.into().trim().to_string(),
            invoice_type: invoice_type.into().trim().to_string(),
            location_address: location_address.into().trim().to_string(),
            industry_business_category: industry_business_category.into().trim().to_string(),
        };
        props.validate()?;
        Ok(props)
    }

    fn validate(&self) -> Result<(), CsrError> {
        let fields = [
            ("common name", &self.common_name),
            ("serial number", &self.serial_number),
            ("organization identifier", &self.organization_identifier),
            ("organization unit name", &self.organization_unit_name),
            ("organization name", &self.organization_name),
            ("country name", &self.country_name),
            ("invoice type", &self.invoice_type),
            ("location address", &self.location_address),
            ("industry business category", &self.industry_business_category),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                return Err(invalid(format!("{name} must not be empty")));
            }
        }

        if self.serial_number.split('|').count() != 3 {
            return Err(invalid(format!(
                "serial number [{}] is invalid, expected TAX_NUMBER|SEQ_NUMBER|DEVICE_ID",
                self.serial_number
            )));
        }
        if self.invoice_type.len() != 4 || !self.invoice_type.chars().all(|c| c == '0' || c == '1')
        {
            return Err(invalid(format!(
                "invoice type [{}] is invalid, expected 4 digits of 0/1",
                self.invoice_type
            )));
        }
        if self.country_name.len() != 2 || !self.country_name.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(invalid(format!(
                "country name [{}] is not a 2-letter code",
                self.country_name
            )));
        }
        Ok(())
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn invoice_type(&self) -> &str {
        &self.invoice_type
    }

    /// First serial part, the taxpayer number.
    pub fn taxpayer_number(&self) -> &str {
        self.serial_part(0)
    }

    /// Third serial part, the device id.
    pub fn device_id(&self) -> &str {
        self.serial_part(2)
    }

    /// Standard (B2B) invoices are enabled by the first invoice type flag.
    pub fn issues_standard(&self) -> bool {
        self.invoice_type.starts_with('1')
    }

    /// Simplified (B2C) invoices are enabled by the second invoice type flag.
    pub fn issues_simplified(&self) -> bool {
        self.invoice_type.chars().nth(1) == Some('1')
    }

    fn serial_part(&self, index: usize) -> &str {
        self.serial_number.split('|').nth(index).unwrap_or_default()
    }

    fn generate_subject(&self) -> Result<name::Name, CsrError> {
        name::Name::from_str(&format!(
            "C={},OU={},O={},CN={}",
            &self.country_name,
            &self.organization_unit_name,
            &self.organization_name,
            &self.common_name
        ))
        .map_err(|e| CsrError::InvalidSubject {
            message: e.to_string(),
        })
    }

    fn generate_san_extension(&self) -> Result<SubjectAltName, CsrError> {
        let name = name::Name::from_str(&format!(
            "sn={},uid={},title={},registeredAddress={},businessCategory={}",
            &self.serial_number,
            &self.organization_identifier,
            &self.invoice_type,
            &self.location_address,
            &self.industry_business_category
        ))
        .map_err(|e| CsrError::InvalidSan {
            message: e.to_string(),
        })?;
        let dir_name = GeneralName::DirectoryName(name);
        Ok(SubjectAltName::from(vec![dir_name]))
    }

    /// Builds a PKCS#10 request signed with `key`.
    ///
    /// EC keys sign with ECDSA-SHA256, RSA keys with PKCS#1 v1.5 SHA-256.
    pub fn build(&self, key: &SigningKeyMaterial, template: &str) -> Result<CertReq, CsrError> {
        let csr = match key {
            SigningKeyMaterial::Secp256k1(signer) => {
                self.sign_request::<_, k256::ecdsa::DerSignature>(signer, template)?
            }
            SigningKeyMaterial::P256(signer) => {
                self.sign_request::<_, p256::ecdsa::DerSignature>(signer, template)?
            }
            SigningKeyMaterial::Rsa(private) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private.as_ref().clone());
                self.sign_request::<_, rsa::pkcs1v15::Signature>(&signer, template)?
            }
        };
        debug!(algorithm = %key.algorithm(), template, "built certificate request");
        Ok(csr)
    }

    fn sign_request<S, Sig>(&self, signer: &S, template: &str) -> Result<CertReq, CsrError>
    where
        S: Keypair + DynSignatureAlgorithmIdentifier + Signer<Sig>,
        S::VerifyingKey: EncodePublicKey,
        Sig: SignatureBitStringEncoding,
    {
        let subject = self.generate_subject()?;
        let template_extension = TemplateNameExtension::new(template)?;
        let san_extension = self.generate_san_extension()?;

        let mut csr_builder =
            RequestBuilder::new(subject, signer).map_err(|e| CsrError::RequestBuild {
                message: e.to_string(),
            })?;
        csr_builder
            .add_extension(&template_extension)
            .map_err(|e| CsrError::AddExtension {
                which: "TemplateName",
                message: e.to_string(),
            })?;
        csr_builder
            .add_extension(&san_extension)
            .map_err(|e| CsrError::AddExtension {
                which: "SubjectAltName",
                message: e.to_string(),
            })?;
        csr_builder
            .build::<Sig>()
            .map_err(|e| CsrError::CsrBuild {
                message: e.to_string(),
            })
    }

    /// Generates a fresh key of `algorithm` and a request signed with it.
    pub fn generate(
        &self,
        algorithm: KeyAlgorithm,
        template: &str,
    ) -> Result<(CertReq, SigningKeyMaterial), CsrError> {
        let key = SigningKeyMaterial::generate(algorithm)?;
        let csr = self.build(&key, template)?;
        Ok((csr, key))
    }

    pub fn parse_csr_config(csr_path: &Path) -> Result<CsrProperties, CsrError> {
        let pathbuf = csr_path.to_path_buf();
        let file = File::open(csr_path).map_err(|e| CsrError::Io {
            path: pathbuf.clone(),
            source: e,
        })?;
        let dst_map = read(BufReader::new(file)).map_err(|e| CsrError::PropertiesRead {
            path: pathbuf.clone(),
            source: e,
        })?;

        let req = |key: &str| -> Result<String, CsrError> {
            dst_map
                .get(key)
                .map(|s| s.to_string())
                .ok_or_else(|| CsrError::MissingProperty {
                    path: pathbuf.clone(),
                    key: key.to_string(),
                })
        };

        CsrProperties::new(
            req("csr.common.name")?,
            req("csr.serial.number")?,
            req("csr.organization.identifier")?,
            req("csr.organization.unit.name")?,
            req("csr.organization.name")?,
            req("csr.country.name")?,
            req("csr.invoice.type")?,
            req("csr.location.address")?,
            req("csr.industry.business.category")?,
        )
    }
}

fn invalid(message: String) -> CsrError {
    CsrError::Validation { message }
}

/// Encode to base64 string.
pub trait ToBase64String {
    fn to_base64_string(&self) -> Result<String, CsrError>;
    fn to_pem_base64_string(&self) -> Result<String, CsrError>;
}

impl ToBase64String for CertReq {
    fn to_base64_string(&self) -> Result<String, CsrError> {
        let der_bytes = self.to_der().map_err(|e| CsrError::DerEncode {
            context: "certificate request",
            source: e,
        })?;
        Ok(Base64::encode_string(&der_bytes))
    }

    fn to_pem_base64_string(&self) -> Result<String, CsrError> {
        Ok(Base64::encode_string(csr_pem(self)?.as_bytes()))
    }
}

fn csr_pem(csr: &CertReq) -> Result<String, CsrError> {
    csr.to_pem(LineEnding::LF).map_err(|e| CsrError::DerEncode {
        context: "certificate request (PEM)",
        source: e,
    })
}

/// Files written by key and CSR generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentArtifacts {
    pub private_pem: String,
    pub public_pem: String,
    pub csr_pem: String,
    /// Base64 of `csr_pem`, the value submitted to the compliance endpoint.
    pub csr_encoded: String,
}

impl EnrollmentArtifacts {
    pub const PRIVATE_KEY_FILE: &'static str = "private.pem";
    pub const PUBLIC_KEY_FILE: &'static str = "public.pem";
    pub const CSR_FILE: &'static str = "csr.pem";
    pub const CSR_ENCODED_FILE: &'static str = "csr.encoded";

    pub fn new(csr: &CertReq, key: &SigningKeyMaterial) -> Result<Self, CsrError> {
        Ok(Self {
            private_pem: key.to_pem()?,
            public_pem: key.public_key_pem()?,
            csr_pem: csr_pem(csr)?,
            csr_encoded: csr.to_pem_base64_string()?,
        })
    }

    /// Writes every artifact into `dir` through `cipher`.
    pub fn write_to(&self, dir: &Path, cipher: &dyn ArtifactCipher) -> Result<(), CsrError> {
        let files = [
            (Self::PRIVATE_KEY_FILE, &self.private_pem),
            (Self::PUBLIC_KEY_FILE, &self.public_pem),
            (Self::CSR_FILE, &self.csr_pem),
            (Self::CSR_ENCODED_FILE, &self.csr_encoded),
        ];
        for (name, contents) in files {
            let path = dir.join(name);
            fs::write(&path, cipher.encrypt(contents))
                .map_err(|source| CsrError::Write { path, source })?;
        }
        info!(dir = %dir.display(), "wrote enrollment artifacts");
        Ok(())
    }
}
