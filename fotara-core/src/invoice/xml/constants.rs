pub const INVOICE_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
pub const CAC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
pub const CBC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub const EXT_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
pub const SIG_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonSignatureComponents-2";
pub const SAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:SignatureAggregateComponents-2";
pub const SBC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:SignatureBasicComponents-2";
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// XPath prefix bound to the invoice default namespace.
pub const DEFAULT_NS_ALIAS: &str = "def";

pub(crate) const UBL_TEMPLATE: &str = include_str!("../../../assets/templates/ubl.xml");
pub(crate) const QR_TEMPLATE: &str = include_str!("../../../assets/templates/qr.xml");
pub(crate) const SIGNATURE_TEMPLATE: &str =
    include_str!("../../../assets/templates/signature.xml");

pub const UBL_PLACEHOLDER: &str = "UBL-TO-BE-REPLACED";
pub const QR_PLACEHOLDER: &str = "QR-TO-BE-REPLACED";
pub const SIGNATURE_PLACEHOLDER: &str = "SIGN-TO-BE-REPLACED";

pub const ECDSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
pub const RSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

macro_rules! signature_path {
    ($suffix:literal) => {
        concat!(
            "/def:Invoice/ext:UBLExtensions/ext:UBLExtension/ext:ExtensionContent",
            "/sig:UBLDocumentSignatures/sac:SignatureInformation/ds:Signature/",
            $suffix
        )
    };
}

macro_rules! signed_signature_properties_path {
    ($suffix:literal) => {
        concat!(
            "/def:Invoice/ext:UBLExtensions/ext:UBLExtension/ext:ExtensionContent",
            "/sig:UBLDocumentSignatures/sac:SignatureInformation/ds:Signature/",
            "ds:Object/xades:QualifyingProperties/xades:SignedProperties",
            "/xades:SignedSignatureProperties/",
            $suffix
        )
    };
}

pub const SIGNED_PROPERTIES_XPATH: &str =
    signature_path!("ds:Object/xades:QualifyingProperties/xades:SignedProperties");
pub const CERT_DIGEST_XPATH: &str = signed_signature_properties_path!(
    "xades:SigningCertificate/xades:Cert/xades:CertDigest/ds:DigestValue"
);
pub const SIGNING_TIME_XPATH: &str = signed_signature_properties_path!("xades:SigningTime");
pub const ISSUER_NAME_XPATH: &str = signed_signature_properties_path!(
    "xades:SigningCertificate/xades:Cert/xades:IssuerSerial/ds:X509IssuerName"
);
pub const SERIAL_NUMBER_XPATH: &str = signed_signature_properties_path!(
    "xades:SigningCertificate/xades:Cert/xades:IssuerSerial/ds:X509SerialNumber"
);
pub const SIGNATURE_VALUE_XPATH: &str = signature_path!("ds:SignatureValue");
pub const SIGNATURE_METHOD_XPATH: &str = signature_path!("ds:SignedInfo/ds:SignatureMethod");
pub const CERTIFICATE_XPATH: &str = signature_path!("ds:KeyInfo/ds:X509Data/ds:X509Certificate");
pub const SIGNED_PROPERTIES_DIGEST_XPATH: &str =
    signature_path!("ds:SignedInfo/ds:Reference[@URI='#xadesSignedProperties']/ds:DigestValue");
pub const INVOICE_DIGEST_XPATH: &str =
    signature_path!("ds:SignedInfo/ds:Reference[@Id='invoiceSignedData']/ds:DigestValue");

pub const QR_XPATH: &str = "/def:Invoice/cac:AdditionalDocumentReference[cbc:ID='QR']/cac:Attachment/cbc:EmbeddedDocumentBinaryObject";
pub const UUID_XPATH: &str = "/def:Invoice/cbc:UUID";
pub const ISSUE_DATE_XPATH: &str = "/def:Invoice/cbc:IssueDate";
pub const ISSUE_TIME_XPATH: &str = "/def:Invoice/cbc:IssueTime";
pub const SELLER_NAME_XPATH: &str =
    "/def:Invoice/cac:AccountingSupplierParty/cac:Party/cac:PartyLegalEntity/cbc:RegistrationName";
pub const SELLER_VAT_XPATH: &str =
    "/def:Invoice/cac:AccountingSupplierParty/cac:Party/cac:PartyTaxScheme/cbc:CompanyID";
pub const INVOICE_TOTAL_XPATH: &str = "/def:Invoice/cac:LegalMonetaryTotal/cbc:PayableAmount";
pub const VAT_TOTAL_XPATH: &str = "/def:Invoice/cac:TaxTotal/cbc:TaxAmount";
