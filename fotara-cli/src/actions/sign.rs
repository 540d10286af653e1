use crate::stage::{Action, Context, read_non_empty, write_file};
use anyhow::{Context as _, Result};
use clap::Args;
use fotara_core::invoice::EInvoiceSigningResult;
use fotara_core::keys::SigningKeyMaterial;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct SigningArgs {
    #[arg(long)]
    pub invoice: PathBuf,
    /// Private key PEM, optionally PKCS#8 encrypted.
    #[arg(long)]
    pub key: PathBuf,
    #[arg(long)]
    pub cert: PathBuf,
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct SignArgs {
    #[command(flatten)]
    pub inputs: SigningArgs,
    /// Where the signed invoice is written.
    #[arg(long)]
    pub output: PathBuf,
}

/// Invoice, key and certificate read for one signing run.
pub struct SigningInputs {
    invoice: String,
    key: SigningKeyMaterial,
    certificate: String,
}

impl SigningInputs {
    pub fn load(args: &SigningArgs, ctx: &Context) -> Result<Self> {
        let invoice = read_non_empty(&args.invoice)?;
        let pem = ctx.read_protected(&args.key)?;
        let key = SigningKeyMaterial::from_pem(&pem, args.password.as_deref())
            .with_context(|| format!("failed to read private key {}", args.key.display()))?;
        let certificate = ctx.read_protected(&args.cert)?;
        Ok(Self {
            invoice,
            key,
            certificate,
        })
    }

    pub fn sign(&self, ctx: &Context) -> Result<EInvoiceSigningResult> {
        Ok(ctx
            .signer
            .sign_invoice(&self.invoice, &self.key, &self.certificate)?)
    }
}

pub struct SignAction {
    args: SignArgs,
    inputs: Option<SigningInputs>,
    result: Option<EInvoiceSigningResult>,
}

impl SignAction {
    pub fn new(args: SignArgs) -> Self {
        Self {
            args,
            inputs: None,
            result: None,
        }
    }
}

impl Action for SignAction {
    fn name(&self) -> &'static str {
        "sign"
    }

    fn load(&mut self, ctx: &Context) -> Result<()> {
        self.inputs = Some(SigningInputs::load(&self.args.inputs, ctx)?);
        Ok(())
    }

    fn validate(&self, _ctx: &Context) -> Result<()> {
        if self.args.output.as_os_str().is_empty() {
            anyhow::bail!("output path is empty");
        }
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> Result<()> {
        let inputs = self.inputs.as_ref().context("signing inputs not loaded")?;
        self.result = Some(inputs.sign(ctx)?);
        Ok(())
    }

    fn output(&self, _ctx: &Context) -> Result<()> {
        let result = self.result.as_ref().context("invoice was not signed")?;
        info!(
            uuid = result.invoice_uuid(),
            hash = result.invoice_hash(),
            qr = result.qr_code_base64(),
            "signed invoice"
        );
        write_file(&self.args.output, result.signed_xml())
    }
}

/// Signs in memory and prints only the QR payload.
pub struct QrAction {
    args: SigningArgs,
    inputs: Option<SigningInputs>,
    result: Option<EInvoiceSigningResult>,
}

impl QrAction {
    pub fn new(args: SigningArgs) -> Self {
        Self {
            args,
            inputs: None,
            result: None,
        }
    }
}

impl Action for QrAction {
    fn name(&self) -> &'static str {
        "generate-qr"
    }

    fn load(&mut self, ctx: &Context) -> Result<()> {
        self.inputs = Some(SigningInputs::load(&self.args, ctx)?);
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> Result<()> {
        let inputs = self.inputs.as_ref().context("signing inputs not loaded")?;
        self.result = Some(inputs.sign(ctx)?);
        Ok(())
    }

    fn output(&self, _ctx: &Context) -> Result<()> {
        let result = self.result.as_ref().context("invoice was not signed")?;
        info!(hash = result.invoice_hash(), "generated QR code");
        println!("{}", result.qr_code_base64());
        Ok(())
    }
}
