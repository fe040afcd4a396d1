//! Release command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use rigger_release::{ReleaseFlags, ReleaseOptions, ReleaseOutcome, ReleaseService};

use crate::presets::{self, PRESET_RELEASE};

/// Arguments for the release command.
#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Repository type, e.g. github
    #[arg(long)]
    pub repo_type: Option<String>,

    /// Repository URL
    #[arg(long)]
    pub repo_url: Option<String>,

    /// Changelog preset
    #[arg(long)]
    pub changelog_preset: Option<String>,

    /// Release this exact version instead of computing one
    #[arg(long, value_name = "VERSION")]
    pub target_version: Option<String>,

    /// Check the working tree before releasing
    #[arg(long, overrides_with = "no_git_checks")]
    pub git_checks: bool,

    /// Skip the working tree checks
    #[arg(long, overrides_with = "git_checks")]
    pub no_git_checks: bool,

    /// Mark the release as the latest one
    #[arg(long, overrides_with = "no_latest")]
    pub latest: bool,

    /// Do not mark the release as the latest one
    #[arg(long, overrides_with = "latest")]
    pub no_latest: bool,

    /// Perform a dry run without making changes
    #[arg(short, long)]
    pub dry_run: bool,
}

fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl ReleaseArgs {
    /// Returns the flags that were given, leaving the rest to the config.
    pub fn flags(&self) -> ReleaseFlags {
        ReleaseFlags {
            repo_type: self.repo_type.clone(),
            repo_url: self.repo_url.clone(),
            changelog_preset: self.changelog_preset.clone(),
            target_version: self.target_version.clone(),
            git_checks: toggle(self.git_checks, self.no_git_checks),
            latest: toggle(self.latest, self.no_latest),
            dry_run: self.dry_run.then_some(true),
        }
    }
}

fn summary(outcome: &ReleaseOutcome) -> String {
    let mut out = if outcome.dry_run {
        format!(
            "Dry run: would release {} (from {})",
            outcome.next_version, outcome.current_version
        )
    } else {
        format!(
            "Released {} (from {})",
            outcome.next_version, outcome.current_version
        )
    };
    if let Some(changelog) = &outcome.changelog {
        out.push_str("\n\n");
        out.push_str(changelog.trim_end());
    }
    out
}

/// Runs the release command.
pub async fn run(cwd: PathBuf, args: ReleaseArgs) -> Result<()> {
    let options = ReleaseOptions::new(cwd)
        .preset(PRESET_RELEASE)
        .flags(args.flags());

    let mut service = ReleaseService::new(options, presets::registry())
        .context("failed to set up the release")?;
    let outcome = service.run().await.context("release failed")?;

    info!(
        version = %outcome.next_version,
        increment = ?outcome.increment,
        dry_run = outcome.dry_run,
        "release finished"
    );
    println!("{}", summary(&outcome));
    Ok(())
}
