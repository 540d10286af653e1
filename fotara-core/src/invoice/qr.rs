//! TLV encoding of the QR payload.
use super::xml::constants::{
    INVOICE_TOTAL_XPATH, ISSUE_DATE_XPATH, ISSUE_TIME_XPATH, SELLER_NAME_XPATH, SELLER_VAT_XPATH,
    VAT_TOTAL_XPATH,
};
use super::xml::{InvoiceDocument, XmlError};
use base64ct::{Base64, Encoding};
use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const TIMESTAMP_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
pub const DEFAULT_ISSUE_TIME: &str = "00:00:00";
/// Longest value the two-byte long-form length can describe.
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum QrCodeError {
    #[error("TLV tag {tag} is outside 1..=255")]
    InvalidTag { tag: u32 },
    #[error("TLV field {tag} exceeds {MAX_VALUE_LEN} bytes (len={len})")]
    ValueTooLong { tag: u8, len: usize },
    #[error("unsupported TLV length byte {byte:#04x} at offset {offset}")]
    InvalidLength { offset: usize, byte: u8 },
    #[error("QR payload is not valid base64")]
    InvalidBase64,
    #[error("TLV stream truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("{field} is missing from invoice XML ({xpath})")]
    MissingField {
        field: &'static str,
        xpath: &'static str,
    },
    #[error("invalid UTC offset of {hours} hours")]
    InvalidOffset { hours: i32 },
    #[error("QR XML error: {0}")]
    Xml(#[from] XmlError),
}

pub type QrResult<T> = std::result::Result<T, QrCodeError>;

/// A validated tag/value pair.
///
/// Lengths up to 127 take one byte. Longer values use the BER long form,
/// `0x81 nn` or `0x82 nn nn`, which public keys and certificates need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvField {
    tag: u8,
    value: Vec<u8>,
}

impl TlvField {
    pub fn new(tag: u32, value: impl Into<Vec<u8>>) -> QrResult<Self> {
        let tag = match u8::try_from(tag) {
            Ok(tag) if tag != 0 => tag,
            _ => return Err(QrCodeError::InvalidTag { tag }),
        };
        let value = value.into();
        if value.len() > MAX_VALUE_LEN {
            return Err(QrCodeError::ValueTooLong {
                tag,
                len: value.len(),
            });
        }
        Ok(Self { tag, value })
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

#[derive(Debug, Default)]
pub struct TlvBuilder {
    bytes: Vec<u8>,
}

impl TlvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &TlvField) {
        self.bytes.push(field.tag);
        push_length(&mut self.bytes, field.value.len());
        self.bytes.extend_from_slice(&field.value);
    }

    pub fn push_bytes(&mut self, tag: u32, value: &[u8]) -> QrResult<()> {
        let field = TlvField::new(tag, value)?;
        self.push(&field);
        Ok(())
    }

    pub fn push_str(&mut self, tag: u32, value: &str) -> QrResult<()> {
        self.push_bytes(tag, value.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn finish(self) -> String {
        Base64::encode_string(&self.bytes)
    }
}

fn push_length(bytes: &mut Vec<u8>, len: usize) {
    match u8::try_from(len) {
        Ok(short) if short < 0x80 => bytes.push(short),
        Ok(long) => bytes.extend_from_slice(&[0x81, long]),
        Err(_) => {
            // TlvField::new caps values at MAX_VALUE_LEN
            bytes.push(0x82);
            bytes.extend_from_slice(&(len as u16).to_be_bytes());
        }
    }
}

/// Reads the length starting at `offset`, returning it with the bytes consumed.
fn read_length(bytes: &[u8], offset: usize) -> QrResult<(usize, usize)> {
    let first = *bytes.get(offset).ok_or(QrCodeError::Truncated { offset })?;
    match first {
        0x00..=0x7F => Ok((usize::from(first), 1)),
        0x81 | 0x82 => {
            let width = usize::from(first & 0x7F);
            let raw = bytes
                .get(offset + 1..offset + 1 + width)
                .ok_or(QrCodeError::Truncated { offset: offset + 1 })?;
            let len = raw
                .iter()
                .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
            Ok((len, 1 + width))
        }
        byte => Err(QrCodeError::InvalidLength { offset, byte }),
    }
}

/// Encodes `fields` in the given order as base64 TLV.
pub fn encode(fields: &[TlvField]) -> String {
    let mut tlv = TlvBuilder::new();
    for field in fields {
        tlv.push(field);
    }
    tlv.finish()
}

/// Decodes a base64 TLV payload back into its ordered fields.
pub fn decode(payload: &str) -> QrResult<Vec<TlvField>> {
    let bytes = Base64::decode_vec(payload).map_err(|_| QrCodeError::InvalidBase64)?;
    let mut fields = Vec::new();
    let mut idx = 0;
    while let Some(&tag) = bytes.get(idx) {
        let (len, width) = read_length(&bytes, idx + 1)?;
        let start = idx + 1 + width;
        let value = bytes
            .get(start..start + len)
            .ok_or(QrCodeError::Truncated { offset: start })?;
        fields.push(TlvField::new(tag.into(), value)?);
        idx = start + len;
    }
    Ok(fields)
}

/// Invoice values read from the document for tags 1 to 5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrFields {
    pub seller_name: String,
    pub vat_number: String,
    pub timestamp: String,
    pub invoice_total: String,
    pub vat_total: String,
}

/// Signing outputs for tags 6 to 9.
#[derive(Debug, Clone, Copy)]
pub struct QrSigningParts<'a> {
    pub invoice_hash: &'a str,
    pub signature: &'a str,
    pub public_key: &'a [u8],
    /// DER of the signing certificate.
    pub certificate: &'a [u8],
}

impl QrFields {
    /// Reads the seller, totals and issue timestamp.
    ///
    /// A missing `cbc:IssueTime` falls back to [`DEFAULT_ISSUE_TIME`]; every
    /// other field is required.
    pub fn from_document(doc: &InvoiceDocument, utc_offset_hours: i32) -> QrResult<Self> {
        let seller_name = required(doc, "seller name", SELLER_NAME_XPATH)?;
        let vat_number = required(doc, "seller VAT number", SELLER_VAT_XPATH)?;
        let invoice_total = required(doc, "invoice total", INVOICE_TOTAL_XPATH)?;
        let vat_total = required(doc, "VAT total", VAT_TOTAL_XPATH)?;
        let issue_date = required(doc, "issue date", ISSUE_DATE_XPATH)?;
        let issue_time = match doc.text(ISSUE_TIME_XPATH)? {
            Some(time) => time,
            None => {
                warn!(
                    xpath = ISSUE_TIME_XPATH,
                    default = DEFAULT_ISSUE_TIME,
                    "issue time missing, using default"
                );
                DEFAULT_ISSUE_TIME.to_string()
            }
        };

        Ok(Self {
            seller_name,
            vat_number,
            timestamp: normalize_timestamp(&issue_date, &issue_time, utc_offset_hours)?,
            invoice_total,
            vat_total,
        })
    }

    pub fn to_tlv(&self, parts: QrSigningParts<'_>) -> QrResult<Vec<TlvField>> {
        Ok(vec![
            TlvField::new(1, self.seller_name.as_bytes())?,
            TlvField::new(2, self.vat_number.as_bytes())?,
            TlvField::new(3, self.timestamp.as_bytes())?,
            TlvField::new(4, self.invoice_total.as_bytes())?,
            TlvField::new(5, self.vat_total.as_bytes())?,
            TlvField::new(6, parts.invoice_hash.as_bytes())?,
            TlvField::new(7, parts.signature.as_bytes())?,
            TlvField::new(8, parts.public_key)?,
            TlvField::new(9, parts.certificate)?,
        ])
    }

    pub fn encode(&self, parts: QrSigningParts<'_>) -> QrResult<String> {
        Ok(encode(&self.to_tlv(parts)?))
    }
}

fn required(doc: &InvoiceDocument, field: &'static str, xpath: &'static str) -> QrResult<String> {
    doc.text(xpath)?
        .ok_or(QrCodeError::MissingField { field, xpath })
}

/// Joins the issue date and time into `yyyy-MM-ddTHH:mm:ss`.
///
/// A trailing `Z` marks UTC and is shifted by `utc_offset_hours`. Values
/// that fail to parse are passed through as `{date}T{time}`.
pub fn normalize_timestamp(date: &str, time: &str, utc_offset_hours: i32) -> QrResult<String> {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).ok_or(
        QrCodeError::InvalidOffset {
            hours: utc_offset_hours,
        },
    )?;
    let raw = format!("{date}T{time}");

    let formatted = match time.strip_suffix('Z') {
        Some(utc_time) => NaiveDateTime::parse_from_str(
            &format!("{date}T{utc_time}"),
            TIMESTAMP_INPUT_FORMAT,
        )
        .map(|naive| {
            Utc.from_utc_datetime(&naive)
                .with_timezone(&offset)
                .format(TIMESTAMP_FORMAT)
                .to_string()
        }),
        None => NaiveDateTime::parse_from_str(&raw, TIMESTAMP_INPUT_FORMAT)
            .map(|naive| naive.format(TIMESTAMP_FORMAT).to_string()),
    };

    Ok(formatted.unwrap_or_else(|err| {
        warn!(timestamp = %raw, error = %err, "unparseable issue timestamp, using raw value");
        raw
    }))
}
