//! Read-only actions over an invoice file: hash, request body and the
//! well-formedness check.
use crate::stage::{Action, Context, read_non_empty};
use anyhow::{Context as _, Result};
use clap::Args;
use fotara_core::invoice::{InvoiceDocument, InvoiceRequest};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Args)]
pub struct InvoiceArgs {
    #[arg(long)]
    pub invoice: PathBuf,
}

pub struct HashAction {
    args: InvoiceArgs,
    invoice: String,
    hash: Option<String>,
}

impl HashAction {
    pub fn new(args: InvoiceArgs) -> Self {
        Self {
            args,
            invoice: String::new(),
            hash: None,
        }
    }
}

impl Action for HashAction {
    fn name(&self) -> &'static str {
        "generate-hash"
    }

    fn load(&mut self, _ctx: &Context) -> Result<()> {
        self.invoice = read_non_empty(&self.args.invoice)?;
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> Result<()> {
        self.hash = Some(ctx.signer.invoice_hash(&self.invoice)?.to_base64());
        Ok(())
    }

    fn output(&self, _ctx: &Context) -> Result<()> {
        let hash = self.hash.as_deref().context("hash was not computed")?;
        info!(invoice = %self.args.invoice.display(), hash, "computed invoice hash");
        println!("{hash}");
        Ok(())
    }
}

/// Prints the submission JSON for an already signed invoice.
pub struct RequestAction {
    args: InvoiceArgs,
    signed_xml: String,
    request: Option<InvoiceRequest>,
}

impl RequestAction {
    pub fn new(args: InvoiceArgs) -> Self {
        Self {
            args,
            signed_xml: String::new(),
            request: None,
        }
    }
}

impl Action for RequestAction {
    fn name(&self) -> &'static str {
        "invoice-request"
    }

    fn load(&mut self, _ctx: &Context) -> Result<()> {
        self.signed_xml = read_non_empty(&self.args.invoice)?;
        Ok(())
    }

    async fn process(&mut self, _ctx: &Context) -> Result<()> {
        self.request = Some(InvoiceRequest::from_signed_xml(&self.signed_xml)?);
        Ok(())
    }

    fn output(&self, _ctx: &Context) -> Result<()> {
        let request = self.request.as_ref().context("request was not built")?;
        println!("{}", request.to_json_pretty()?);
        Ok(())
    }
}

/// Checks that the invoice parses. No schema or business rules are applied.
pub struct ValidateAction {
    args: InvoiceArgs,
    invoice: String,
}

impl ValidateAction {
    pub fn new(args: InvoiceArgs) -> Self {
        Self {
            args,
            invoice: String::new(),
        }
    }
}

impl Action for ValidateAction {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn load(&mut self, _ctx: &Context) -> Result<()> {
        self.invoice = read_non_empty(&self.args.invoice)?;
        Ok(())
    }

    async fn process(&mut self, _ctx: &Context) -> Result<()> {
        InvoiceDocument::parse(&self.invoice)
            .with_context(|| format!("{} is not well-formed", self.args.invoice.display()))?;
        Ok(())
    }

    fn output(&self, _ctx: &Context) -> Result<()> {
        warn!("schema and business rule validation are not performed");
        info!(invoice = %self.args.invoice.display(), "invoice is well-formed");
        Ok(())
    }
}
