//! Staged execution shared by every CLI action.
use anyhow::{Context as _, Result};
use fotara_core::api::FotaraClient;
use fotara_core::config::Config;
use fotara_core::invoice::InvoiceSigner;
use fotara_core::security::{ArtifactCipher, Passthrough};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info};

/// Process-wide state handed to each action.
pub struct Context {
    pub config: Config,
    pub cipher: Box<dyn ArtifactCipher>,
    pub signer: InvoiceSigner,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let signer = InvoiceSigner::from_config(&config).context("failed to prepare signer")?;
        Ok(Self {
            config,
            cipher: Box::new(Passthrough),
            signer,
        })
    }

    pub fn client(&self) -> Result<FotaraClient> {
        FotaraClient::new(&self.config).context("failed to build HTTP client")
    }

    /// Reads a stored artifact and runs it through the cipher.
    pub fn read_protected(&self, path: &Path) -> Result<String> {
        Ok(self.cipher.decrypt(&read_non_empty(path)?))
    }

    pub fn write_protected(&self, path: &Path, contents: &str) -> Result<()> {
        write_file(path, &self.cipher.encrypt(contents))
    }
}

pub fn read_non_empty(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if contents.trim().is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    Ok(contents)
}

pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "wrote file");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Validate,
    Process,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Load => "load",
            Stage::Validate => "validate",
            Stage::Process => "process",
            Stage::Output => "output",
        })
    }
}

/// One CLI operation, split into the stages [`run`] drives in order.
pub trait Action {
    fn name(&self) -> &'static str;

    /// Reads inputs named by the arguments.
    fn load(&mut self, ctx: &Context) -> Result<()>;

    fn validate(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> Result<()>;

    fn output(&self, ctx: &Context) -> Result<()>;
}

/// Runs every stage of `action`, stopping at the first failure.
pub async fn run<A: Action>(mut action: A, ctx: &Context) -> Result<()> {
    let name = action.name();
    debug!(action = name, "starting action");

    let loaded = action.load(ctx);
    check(name, Stage::Load, loaded)?;
    let validated = action.validate(ctx);
    check(name, Stage::Validate, validated)?;
    let processed = action.process(ctx).await;
    check(name, Stage::Process, processed)?;
    let written = action.output(ctx);
    check(name, Stage::Output, written)?;

    info!(action = name, "action completed");
    Ok(())
}

fn check(action: &'static str, stage: Stage, result: Result<()>) -> Result<()> {
    result.map_err(|err| {
        error!(action, %stage, error = %format!("{err:#}"), "action failed");
        err.context(format!("{action}: {stage} stage failed"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        stages: Vec<Stage>,
        fail_at: Option<Stage>,
    }

    impl Recorder {
        fn step(&mut self, stage: Stage) -> Result<()> {
            self.stages.push(stage);
            match self.fail_at {
                Some(failing) if failing == stage => anyhow::bail!("boom"),
                _ => Ok(()),
            }
        }
    }

    struct Staged<'a>(&'a mut Recorder);

    impl Action for Staged<'_> {
        fn name(&self) -> &'static str {
            "staged"
        }

        fn load(&mut self, _ctx: &Context) -> Result<()> {
            self.0.step(Stage::Load)
        }

        async fn process(&mut self, _ctx: &Context) -> Result<()> {
            self.0.step(Stage::Process)
        }

        fn output(&self, _ctx: &Context) -> Result<()> {
            match self.0.fail_at {
                Some(Stage::Output) => anyhow::bail!("boom"),
                _ => Ok(()),
            }
        }
    }

    fn context() -> Context {
        Context::new(Config::default()).expect("context")
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().expect("runtime")
    }

    #[test]
    fn stages_run_in_order() {
        let mut recorder = Recorder::default();
        runtime()
            .block_on(run(Staged(&mut recorder), &context()))
            .expect("run");
        assert_eq!(recorder.stages, vec![Stage::Load, Stage::Process]);
    }

    #[test]
    fn first_failure_stops_the_action() {
        let mut recorder = Recorder {
            fail_at: Some(Stage::Load),
            ..Recorder::default()
        };
        let err = runtime()
            .block_on(run(Staged(&mut recorder), &context()))
            .expect_err("load fails");
        assert_eq!(recorder.stages, vec![Stage::Load]);
        assert_eq!(err.to_string(), "staged: load stage failed");
        assert_eq!(err.root_cause().to_string(), "boom");
    }

    #[test]
    fn read_non_empty_rejects_blank_files() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), "  \n").expect("write");
        let err = read_non_empty(file.path()).expect_err("blank");
        assert!(err.to_string().ends_with("is empty"));
    }
}
