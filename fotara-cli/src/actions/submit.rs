use crate::stage::{Action, Context, read_non_empty, write_file};
use anyhow::{Context as _, Result};
use clap::Args;
use fotara_core::api::{Compliance, CsidCredentials, Production, ValidationResponse};
use fotara_core::invoice::InvoiceRequest;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    /// Signed invoice XML.
    #[arg(long)]
    pub invoice: PathBuf,
    /// Saved certificate response JSON holding the CSID token and secret.
    #[arg(long)]
    pub credentials: PathBuf,
    /// Where the service response is written.
    #[arg(long)]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTarget {
    Compliance,
    Clearance,
    Reporting,
}

/// Sends a signed invoice to one of the validation endpoints.
pub struct SubmitAction {
    target: SubmitTarget,
    args: SubmitArgs,
    credentials: String,
    request: Option<InvoiceRequest>,
    response: Option<ValidationResponse>,
}

impl SubmitAction {
    pub fn new(target: SubmitTarget, args: SubmitArgs) -> Self {
        Self {
            target,
            args,
            credentials: String::new(),
            request: None,
            response: None,
        }
    }
}

fn parse_credentials<T>(raw: &str, path: &Path) -> Result<CsidCredentials<T>>
where
    CsidCredentials<T>: DeserializeOwned,
{
    serde_json::from_str(raw)
        .with_context(|| format!("{} is not a certificate response", path.display()))
}

impl Action for SubmitAction {
    fn name(&self) -> &'static str {
        match self.target {
            SubmitTarget::Compliance => "compliance-invoice",
            SubmitTarget::Clearance => "submit-clearance",
            SubmitTarget::Reporting => "submit-report",
        }
    }

    fn load(&mut self, ctx: &Context) -> Result<()> {
        let signed_xml = read_non_empty(&self.args.invoice)?;
        self.request = Some(InvoiceRequest::from_signed_xml(&signed_xml)?);
        self.credentials = ctx.read_protected(&self.args.credentials)?;
        Ok(())
    }

    fn validate(&self, _ctx: &Context) -> Result<()> {
        if self.args.output.as_os_str().is_empty() {
            anyhow::bail!("output path is empty");
        }
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> Result<()> {
        let request = self.request.as_ref().context("invoice request not built")?;
        let client = ctx.client()?;
        let path = &self.args.credentials;
        let response = match self.target {
            SubmitTarget::Compliance => {
                let creds = parse_credentials::<Compliance>(&self.credentials, path)?;
                client.compliance_invoice(&creds, request).await?
            }
            SubmitTarget::Clearance => {
                let creds = parse_credentials::<Production>(&self.credentials, path)?;
                client.submit_invoice(&creds, request).await?
            }
            SubmitTarget::Reporting => {
                let creds = parse_credentials::<Production>(&self.credentials, path)?;
                client.report_invoice(&creds, request).await?
            }
        };
        self.response = Some(response);
        Ok(())
    }

    fn output(&self, _ctx: &Context) -> Result<()> {
        let response = self.response.as_ref().context("no service response")?;
        let json = serde_json::to_string_pretty(response)?;
        if response.is_valid() {
            info!(action = self.name(), "invoice accepted");
        } else {
            warn!(action = self.name(), response = %json, "invoice not accepted");
        }
        write_file(&self.args.output, &json)
    }
}
