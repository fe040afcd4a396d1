//! Create command.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::Value;
use tracing::info;

use rigger_create::{Answers, GenerateOptions, GenerateService, TerminalPrompter};

use crate::presets::{self, PRESET_CREATE};

/// Arguments for the create command.
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Name of the project directory to create
    pub name: String,

    /// Template directory to copy
    #[arg(short, long, value_name = "DIR")]
    pub template: Option<PathBuf>,

    /// Accept defaults instead of prompting
    #[arg(short, long)]
    pub yes: bool,

    /// Answers given up front, as `--key value` or `--flag`
    #[arg(last = true, value_name = "ANSWERS")]
    pub answers: Vec<String>,
}

/// Parses trailing `--key value` pairs. A key without a value is `true`.
pub fn parse_answers(raw: &[String]) -> Result<Answers> {
    let mut answers = Answers::new();
    let mut tokens = raw.iter().peekable();

    while let Some(token) = tokens.next() {
        let Some(key) = token.strip_prefix("--").filter(|k| !k.is_empty()) else {
            bail!("expected an option like --key, found {token:?}");
        };
        let value = match tokens.next_if(|next| !next.starts_with("--")) {
            Some(value) => Value::String(value.clone()),
            None => Value::Bool(true),
        };
        answers.insert(key.to_string(), value);
    }

    Ok(answers)
}

/// Runs the create command.
pub async fn run(cwd: PathBuf, args: CreateArgs) -> Result<()> {
    let answers = parse_answers(&args.answers)?;

    let mut options = GenerateOptions::new(cwd, &args.name)
        .preset(PRESET_CREATE)
        .args(answers);
    if let Some(template) = args.template {
        options = options.template(template);
    }

    let mut service = GenerateService::new(options, presets::registry())
        .context("failed to set up the generator")?;
    if !args.yes {
        service = service.with_prompter(TerminalPrompter::stdio());
    }

    let context = service
        .run()
        .await
        .with_context(|| format!("failed to create {}", args.name))?;

    info!(dir = %context.paths.target.display(), name = %context.app_data.name, "project created");
    println!("Created {}", context.paths.target.display());
    Ok(())
}
