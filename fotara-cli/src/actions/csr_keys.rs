use crate::stage::{Action, Context};
use anyhow::{Context as _, Result};
use clap::Args;
use fotara_core::csr::{CsrProperties, EnrollmentArtifacts};
use fotara_core::keys::KeyAlgorithm;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct CsrKeysArgs {
    /// CSR properties file.
    #[arg(long)]
    pub config: PathBuf,
    /// Existing directory that receives the keys and CSR.
    #[arg(long)]
    pub output: PathBuf,
    #[arg(long, default_value = "secp256k1")]
    pub algorithm: KeyAlgorithm,
}

/// Generates a key pair and a CSR and writes the enrollment artifacts.
pub struct CsrKeysAction {
    args: CsrKeysArgs,
    properties: Option<CsrProperties>,
    artifacts: Option<EnrollmentArtifacts>,
}

impl CsrKeysAction {
    pub fn new(args: CsrKeysArgs) -> Self {
        Self {
            args,
            properties: None,
            artifacts: None,
        }
    }
}

impl Action for CsrKeysAction {
    fn name(&self) -> &'static str {
        "generate-csr-keys"
    }

    fn load(&mut self, _ctx: &Context) -> Result<()> {
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
        let properties = self.properties.as_ref().context("CSR properties not loaded")?;
        let template = ctx.config.certificate_template();
        let (csr, key) = properties.generate(self.args.algorithm, template)?;
        info!(algorithm = %self.args.algorithm, template, "generated key pair and CSR");
        self.artifacts = Some(EnrollmentArtifacts::new(&csr, &key)?);
        Ok(())
    }

    fn output(&self, ctx: &Context) -> Result<()> {
        let artifacts = self.artifacts.as_ref().context("no artifacts generated")?;
        artifacts.write_to(&self.args.output, ctx.cipher.as_ref())?;
        Ok(())
    }
}
