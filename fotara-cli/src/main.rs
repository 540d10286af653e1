mod actions;
mod stage;
mod telemetry;

use actions::csr_keys::{CsrKeysAction, CsrKeysArgs};
use actions::decrypt::{DecryptAction, DecryptArgs};
use actions::inspect::{HashAction, InvoiceArgs, RequestAction, ValidateAction};
use actions::onboard::{OnboardAction, OnboardArgs};
use actions::sign::{QrAction, SignAction, SignArgs, SigningArgs};
use actions::submit::{SubmitAction, SubmitArgs, SubmitTarget};
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use fotara_core::config::Config;
use stage::{Context, run};
use tracing::debug;

#[derive(Parser)]
#[command(name = "fotara")]
#[command(about = "Fotara e-invoice signing and onboarding CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair and CSR from a properties file.
    GenerateCsrKeys(CsrKeysArgs),
    /// Sign an invoice and write the signed XML.
    Sign(SignArgs),
    /// Sign an invoice in memory and print its QR payload.
    GenerateQr(SigningArgs),
    /// Print the invoice hash.
    GenerateHash(InvoiceArgs),
    /// Print the submission JSON for a signed invoice.
    InvoiceRequest(InvoiceArgs),
    /// Check that an invoice is well-formed XML.
    Validate(InvoiceArgs),
    /// Submit a signed invoice to the compliance endpoint.
    ComplianceInvoice(SubmitArgs),
    /// Submit a standard invoice for clearance.
    SubmitClearance(SubmitArgs),
    /// Submit a simplified invoice for reporting.
    SubmitReport(SubmitArgs),
    /// Enroll the device and obtain a production CSID.
    Onboard(OnboardArgs),
    /// Print a stored artifact in plain text.
    Decrypt(DecryptArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    debug!(env = %config.env(), "loaded configuration");
    let ctx = Context::new(config)?;

    match cli.command {
        Commands::GenerateCsrKeys(args) => run(CsrKeysAction::new(args), &ctx).await,
        Commands::Sign(args) => run(SignAction::new(args), &ctx).await,
        Commands::GenerateQr(args) => run(QrAction::new(args), &ctx).await,
        Commands::GenerateHash(args) => run(HashAction::new(args), &ctx).await,
        Commands::InvoiceRequest(args) => run(RequestAction::new(args), &ctx).await,
        Commands::Validate(args) => run(ValidateAction::new(args), &ctx).await,
        Commands::ComplianceInvoice(args) => {
            run(SubmitAction::new(SubmitTarget::Compliance, args), &ctx).await
        }
        Commands::SubmitClearance(args) => {
            run(SubmitAction::new(SubmitTarget::Clearance, args), &ctx).await
        }
        Commands::SubmitReport(args) => {
            run(SubmitAction::new(SubmitTarget::Reporting, args), &ctx).await
        }
        Commands::Onboard(args) => run(OnboardAction::new(args), &ctx).await,
        Commands::Decrypt(args) => run(DecryptAction::new(args), &ctx).await,
    }
}
