//! `pretext update`: refresh the managed boilerplate files of a project.

use anyhow::{Context, Result};
use clap::Args;
use pretext_project::resources::BoilerplateAction;
use pretext_project::Project;

use super::Session;

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Keep a .bak copy of every file that is replaced
    #[arg(short = 'b', long)]
    pub backup: bool,

    /// Replace files even when they were edited (a backup is always kept)
    #[arg(short = 'f', long)]
    pub force: bool,
}

/// Run the update command.
pub async fn run(session: &Session, args: UpdateArgs) -> Result<()> {
    let dir = session.require_project("update")?;
    let project = Project::parse(dir).context("Failed to read the project manifest")?;
    let actions = project
        .update_boilerplate(args.backup, args.force)
        .context("Failed to update project files")?;

    let count = |wanted: fn(&BoilerplateAction) -> bool| actions.iter().filter(|a| wanted(a)).count();
    tracing::info!(
        "Updated project files: {} added, {} replaced, {} kept, {} removed.",
        count(|a| matches!(a, BoilerplateAction::Added(_))),
        count(|a| matches!(a, BoilerplateAction::Replaced(_))),
        count(|a| matches!(a, BoilerplateAction::Kept(_))),
        count(|a| matches!(a, BoilerplateAction::Removed(_))),
    );
    Ok(())
}
