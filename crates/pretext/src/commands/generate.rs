//! `pretext generate`.

use anyhow::{Context, Result};
use clap::Args;
use pretext_build::{Builder, GenerateOptions};
use pretext_project::resources::{install_resources, resource_base_path};

use super::{select_target, AssetArg, Session};

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Asset type to generate, or ALL
    #[arg(default_value = "ALL")]
    pub asset: AssetArg,

    /// Target to generate assets for (defaults to the first in the manifest)
    #[arg(short = 't', long)]
    pub target: Option<String>,

    /// Only generate assets inside the element with this xml:id
    #[arg(short = 'x', long)]
    pub xmlid: Option<String>,

    /// Generate every asset format rather than those the target uses
    #[arg(long)]
    pub all_formats: bool,

    /// Skip asset types that have not changed since they were last generated
    #[arg(long)]
    pub only_changed: bool,

    /// Remove generated assets and the image cache first
    #[arg(long)]
    pub clean: bool,

    /// Regenerate images even when a cached copy exists
    #[arg(long)]
    pub skip_cache: bool,

    /// Override a project.ptx value: --config-override targets.target@name web
    #[arg(long = "config-override", num_args = 2, value_names = ["PATH", "VALUE"])]
    pub config_override: Vec<String>,
}

/// Run the generate command.
pub async fn run(session: &Session, args: GenerateArgs) -> Result<()> {
    let dir = session.require_project("generate assets for")?;
    install_resources(&resource_base_path())?;
    let project = session.load_project(dir, &args.config_override)?;
    let target = select_target(&project, args.target.as_deref(), "generate assets for")?;

    let formats = if args.all_formats { "all" } else { "default" };
    match args.asset {
        AssetArg::All => tracing::info!(
            "Generating all assets in {} formats for the target \"{}\".",
            formats,
            target.name
        ),
        AssetArg::Only(asset) => tracing::info!(
            "Generating only {} assets in {} formats for the target \"{}\".",
            asset,
            formats,
            target.name
        ),
    }

    let engine = session.engine(&project);
    let report = Builder::new(target, &engine)
        .generate_assets(&GenerateOptions {
            requested: args.asset.requested(),
            all_formats: args.all_formats,
            only_changed: args.only_changed,
            xmlid: args.xmlid,
            clean: args.clean,
            skip_cache: args.skip_cache,
        })
        .with_context(|| format!("Failed to generate assets for {}", target.name))?;

    if report.generated.is_empty() && report.failed.is_empty() {
        tracing::info!("No assets needed to be generated.");
    } else if !report.failed.is_empty() {
        tracing::warn!(
            "Generated {} of {} asset types; see the errors above.",
            report.generated.len(),
            report.generated.len() + report.failed.len()
        );
    }
    Ok(())
}
