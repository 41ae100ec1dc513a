//! `pretext deploy`.

use anyhow::{Context, Result};
use clap::Args;
use pretext_build::DeployOptions;
use pretext_project::resources::{install_resources, resource_base_path};

use super::Session;

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Commit and push changes to the project source as well
    #[arg(short = 'u', long)]
    pub update_source: bool,

    /// Assemble the site in the stage directory without publishing it
    #[arg(long, conflicts_with = "skip_staging")]
    pub stage_only: bool,

    /// Publish the current stage directory as is
    #[arg(long)]
    pub skip_staging: bool,

    /// Commit to the local gh-pages branch without pushing
    #[arg(long)]
    pub no_push: bool,
}

/// Run the deploy command.
pub async fn run(session: &Session, args: DeployArgs) -> Result<()> {
    let dir = session.require_project("deploy")?;
    install_resources(&resource_base_path())?;
    let project = session.load_project(dir, &[])?;

    let published = pretext_build::deploy(
        &project,
        DeployOptions {
            update_source: args.update_source,
            stage_only: args.stage_only,
            skip_staging: args.skip_staging,
            no_push: args.no_push,
        },
    )
    .context("Deployment failed")?;

    match published {
        Some(repo) if args.no_push => {
            tracing::info!(
                "The gh-pages branch is ready; push it to publish at {}",
                repo.pages_url()
            );
        }
        Some(repo) => {
            tracing::info!("Deployed to GitHub Pages.");
            tracing::info!("Your site will be available shortly at {}", repo.pages_url());
            tracing::info!(
                "If this is your first deployment, enable GitHub Pages for the gh-pages branch at {}",
                repo.settings_url()
            );
        }
        None => tracing::info!(
            "Run `pretext deploy --skip-staging` to publish the stage at {}.",
            project.stage_abspath().display()
        ),
    }
    Ok(())
}
