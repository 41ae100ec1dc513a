//! `pretext core`: run the core's own command line.

use anyhow::{Context, Result};
use clap::Args;
use pretext_build::CoreEngine;
use pretext_project::Project;

use super::Session;

#[derive(Debug, Args)]
pub struct CoreArgs {
    /// Arguments handed to the core unchanged
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Run the core with `args`; returns its exit code.
pub async fn run(session: &Session, args: CoreArgs) -> Result<i32> {
    let project = match &session.project_dir {
        Some(dir) => Project::parse(dir).context("Failed to read the project manifest")?,
        None => Project::new(&std::env::current_dir().context("Failed to read the current directory")?),
    };
    let engine = session.engine(&project);
    tracing::debug!("Running the core with arguments {:?}", args.args);
    let code = engine
        .passthrough(&args.args)
        .context("Failed to run the PreTeXt core")?;
    Ok(code)
}
