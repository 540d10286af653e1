use crate::stage::{Action, Context, read_non_empty};
use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Clone, Args)]
pub struct DecryptArgs {
    #[arg(long)]
    pub file: PathBuf,
}

/// Prints a stored artifact after running it through the cipher.
pub struct DecryptAction {
    args: DecryptArgs,
    contents: String,
    plain: Option<String>,
}

impl DecryptAction {
    pub fn new(args: DecryptArgs) -> Self {
        Self {
            args,
            contents: String::new(),
            plain: None,
        }
    }
}

impl Action for DecryptAction {
    fn name(&self) -> &'static str {
        "decrypt"
    }

    fn load(&mut self, _ctx: &Context) -> Result<()> {
        self.contents = read_non_empty(&self.args.file)?;
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> Result<()> {
        self.plain = Some(ctx.cipher.decrypt(&self.contents));
        Ok(())
    }

    fn output(&self, _ctx: &Context) -> Result<()> {
        let plain = self.plain.as_deref().context("nothing decrypted")?;
        print!("{plain}");
        Ok(())
    }
}
