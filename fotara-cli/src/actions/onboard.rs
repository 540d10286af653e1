//! Full device onboarding: enrollment, compliance CSID, compliance checks on
//! generated test invoices, then the production CSID.
use super::csr_keys::{CsrKeysAction, CsrKeysArgs};
use crate::stage::{self, Action, Context, write_file};
use anyhow::{Context as _, Result};
use chrono::Local;
use clap::Args;
use fotara_core::api::{Compliance, CsidCredentials, Production};
use fotara_core::csr::{CsrProperties, EnrollmentArtifacts};
use fotara_core::invoice::InvoiceRequest;
use fotara_core::invoice::xml::escape_text;
use fotara_core::keys::{KeyAlgorithm, SigningKeyMaterial};
use regex::Regex;
use std::path::PathBuf;
use tracing::{error, info};
use uuid::Uuid;

const B2B_INVOICE: &str = include_str!("../../assets/samples/b2b_invoice.xml");
const B2B_CREDIT: &str = include_str!("../../assets/samples/b2b_credit.xml");
const B2C_INVOICE: &str = include_str!("../../assets/samples/b2c_invoice.xml");
const B2C_CREDIT: &str = include_str!("../../assets/samples/b2c_credit.xml");

pub const PRODUCTION_CERTIFICATE_FILE: &str = "production_csid.cert";
pub const PRODUCTION_RESPONSE_FILE: &str = "production_response.json";
pub const COMPLIANCE_RESPONSE_FILE: &str = "compliance_response.json";

#[derive(Debug, Clone, Args)]
pub struct OnboardArgs {
    /// Six digit one-time password from the portal.
    #[arg(long)]
    pub otp: String,
    #[arg(long)]
    pub output: PathBuf,
    /// CSR properties file.
    #[arg(long)]
    pub config: PathBuf,
    #[arg(long, default_value = "secp256k1")]
    pub algorithm: KeyAlgorithm,
}

pub struct OnboardAction {
    args: OnboardArgs,
    properties: Option<CsrProperties>,
    compliance: Option<CsidCredentials<Compliance>>,
    production: Option<CsidCredentials<Production>>,
    signed_invoices: Vec<(String, String)>,
}

impl OnboardAction {
    pub fn new(args: OnboardArgs) -> Self {
        Self {
            args,
            properties: None,
            compliance: None,
            production: None,
            signed_invoices: Vec::new(),
        }
    }

    fn properties(&self) -> Result<&CsrProperties> {
        self.properties.as_ref().context("CSR properties not loaded")
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.args.output.join(name)
    }

    async fn enroll(&self, ctx: &Context) -> Result<()> {
        let keys = CsrKeysAction::new(CsrKeysArgs {
            config: self.args.config.clone(),
            output: self.args.output.clone(),
            algorithm: self.args.algorithm,
        });
        stage::run(keys, ctx).await
    }

    async fn compliance_csid(&self, ctx: &Context) -> Result<CsidCredentials<Compliance>> {
        let csr_encoded =
            ctx.read_protected(&self.output_path(EnrollmentArtifacts::CSR_ENCODED_FILE))?;
        let credentials = ctx
            .client()?
            .compliance_csr(&self.args.otp, csr_encoded.trim())
            .await
            .context("compliance CSID request failed")?;
        if !credentials.is_issued() {
            anyhow::bail!(
                "compliance CSID was not issued: {}",
                credentials.disposition_message().unwrap_or("no disposition")
            );
        }
        info!(request_id = credentials.request_id(), "compliance CSID issued");
        Ok(credentials)
    }

    /// Signs each generated test invoice and submits it for compliance.
    ///
    /// Every invoice is attempted; the step fails if any one is rejected.
    async fn compliance_checks(
        &mut self,
        ctx: &Context,
        credentials: &CsidCredentials<Compliance>,
    ) -> Result<()> {
        let properties = self.properties()?;
        let pem = ctx.read_protected(&self.output_path(EnrollmentArtifacts::PRIVATE_KEY_FILE))?;
        let key = SigningKeyMaterial::from_pem(&pem, None)?;
        let certificate = credentials.certificate_pem()?;
        let client = ctx.client()?;

        let tests = test_invoices(properties, &Local::now().format("%Y-%m-%d").to_string())?;
        if tests.is_empty() {
            anyhow::bail!(
                "invoice type {} enables neither standard nor simplified invoices",
                properties.invoice_type()
            );
        }

        let prefix = format!(
            "einvoice_test_{}_{}",
            properties.taxpayer_number(),
            properties.device_id()
        );
        let mut accepted = Vec::new();
        let mut rejected = 0;
        for xml in tests {
            let signed = ctx.signer.sign_invoice(&xml, &key, &certificate)?;
            let request = InvoiceRequest::from_signing_result(&signed);
            let response = client.compliance_invoice(credentials, &request).await?;
            if response.is_valid() {
                let name = format!("{prefix}_{}.xml", accepted.len());
                accepted.push((name, signed.into_signed_xml()));
            } else {
                rejected += 1;
                error!(
                    uuid = %request.uuid,
                    response = %serde_json::to_string(&response)?,
                    "compliance invoice rejected"
                );
            }
        }
        self.signed_invoices = accepted;

        if rejected > 0 {
            anyhow::bail!("{rejected} compliance invoice(s) rejected");
        }
        Ok(())
    }

    async fn production_csid(
        &self,
        ctx: &Context,
        credentials: &CsidCredentials<Compliance>,
    ) -> Result<CsidCredentials<Production>> {
        let production = ctx
            .client()?
            .production_certificate(credentials)
            .await
            .context("production CSID request failed")?;
        if !production.is_issued() {
            anyhow::bail!(
                "production CSID was not issued: {}",
                production.disposition_message().unwrap_or("no disposition")
            );
        }
        info!(request_id = production.request_id(), "production CSID issued");
        Ok(production)
    }
}

impl Action for OnboardAction {
    fn name(&self) -> &'static str {
        "onboard"
    }

    fn load(&mut self, _ctx: &Context) -> Result<()> {
        let otp = Regex::new(r"^\d{6}$")?;
        if !otp.is_match(&self.args.otp) {
            anyhow::bail!("OTP must be exactly six digits");
        }
        self.properties = Some(CsrProperties::parse_csr_config(&self.args.config)?);
        Ok(())
    }

    fn validate(&self, _ctx: &Context) -> Result<()> {
        if !self.args.output.is_dir() {
            anyhow::bail!(
                "output directory {} does not exist",
                self.args.output.display()
            );
        }
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> Result<()> {
        self.enroll(ctx).await?;
        let compliance = self.compliance_csid(ctx).await?;
        self.compliance_checks(ctx, &compliance).await?;
        self.production = Some(self.production_csid(ctx, &compliance).await?);
        self.compliance = Some(compliance);
        Ok(())
    }

    fn output(&self, ctx: &Context) -> Result<()> {
        for (name, xml) in &self.signed_invoices {
            write_file(&self.output_path(name), xml)?;
        }

        let compliance = self.compliance.as_ref().context("no compliance CSID")?;
        ctx.write_protected(
            &self.output_path(COMPLIANCE_RESPONSE_FILE),
            &serde_json::to_string_pretty(compliance)?,
        )?;

        let production = self.production.as_ref().context("no production CSID")?;
        ctx.write_protected(
            &self.output_path(PRODUCTION_RESPONSE_FILE),
            &serde_json::to_string_pretty(production)?,
        )?;
        ctx.write_protected(
            &self.output_path(PRODUCTION_CERTIFICATE_FILE),
            &production.certificate_pem()?,
        )?;
        info!(dir = %self.args.output.display(), "onboarding artifacts written");
        Ok(())
    }
}

/// Fills the bundled samples for every invoice family the device may issue.
fn test_invoices(properties: &CsrProperties, issue_date: &str) -> Result<Vec<String>> {
    let mut samples = Vec::new();
    if properties.issues_standard() {
        samples.extend([B2B_INVOICE, B2B_CREDIT]);
    }
    if properties.issues_simplified() {
        samples.extend([B2C_INVOICE, B2C_CREDIT]);
    }
    samples
        .into_iter()
        .enumerate()
        .map(|(counter, sample)| fill_sample(sample, properties, counter, issue_date))
        .collect()
}

fn fill_sample(
    sample: &str,
    properties: &CsrProperties,
    counter: usize,
    issue_date: &str,
) -> Result<String> {
    let taxpayer = properties.taxpayer_number();
    let device = properties.device_id();
    let id = format!("{taxpayer}_{device}_{counter}");
    // Credit notes reference the document generated just before them
    let org_id = format!("{taxpayer}_{device}_{}", counter as i64 - 1);

    let values = [
        ("${ID}", id.clone()),
        ("${UUID}", name_uuid(&id)),
        ("${ISSUE_DATE}", issue_date.to_string()),
        ("${ORG_ID}", org_id.clone()),
        ("${ORG_UUID}", name_uuid(&org_id)),
        ("${VAT_NUMBER}", taxpayer.to_string()),
        ("${TAXPAYER_NAME}", properties.common_name().to_string()),
        ("${DEVICE_ID}", device.to_string()),
    ];
    values
        .iter()
        .try_fold(sample.to_string(), |xml, (token, value)| {
            Ok(xml.replace(token, &escape_text(value)?))
        })
}

/// Deterministic UUID for a generated invoice id.
fn name_uuid(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
