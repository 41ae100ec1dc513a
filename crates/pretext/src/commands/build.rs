//! `pretext build`.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use pretext_build::{BuildOptions, Builder, GenerateOptions};
use pretext_project::resources::{install_resources, resource_base_path};
use pretext_project::{Project, Target};

use super::{select_target, AssetArg, Session};

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Target from project.ptx, or a lone .ptx file when outside a project.
    pub target: Option<String>,

    /// Destroy the target's output directory before building
    #[arg(long)]
    pub clean: bool,

    /// Generate all assets, or only the given type, before building
    #[arg(short = 'g', long, num_args = 0..=1, default_missing_value = "ALL", value_name = "ASSET")]
    pub generate: Option<AssetArg>,

    /// Do not generate changed assets
    #[arg(long, conflicts_with = "generate")]
    pub no_generate: bool,

    /// Build only the subtree with this xml:id (HTML and revealjs)
    #[arg(short = 'x', long)]
    pub xmlid: Option<String>,

    /// Skip knowls in HTML output
    #[arg(long)]
    pub no_knowls: bool,

    /// Build every target marked for deployment
    #[arg(long, conflicts_with = "target")]
    pub deploys: bool,

    /// Override a project.ptx value: --config-override targets.target@name web
    #[arg(long = "config-override", num_args = 2, value_names = ["PATH", "VALUE"])]
    pub config_override: Vec<String>,
}

/// Run the build command.
pub async fn run(session: &Session, args: BuildArgs) -> Result<()> {
    if let Some(file) = standalone_source(session, args.target.as_deref()) {
        return build_standalone(session, file, &args);
    }

    let dir = session.require_project("build")?;
    install_resources(&resource_base_path())?;
    let project = session.load_project(dir, &args.config_override)?;

    let targets: Vec<&Target> = if args.deploys {
        let targets = project.deploy_targets();
        if targets.is_empty() {
            tracing::info!("No targets are configured to deploy; building the default target.");
            vec![select_target(&project, None, "build")?]
        } else {
            targets
        }
    } else {
        vec![select_target(&project, args.target.as_deref(), "build")?]
    };

    for target in targets {
        build_target(session, &project, target, &args)?;
    }
    Ok(())
}

/// The source file to build on its own, when `target` names one outside a project.
fn standalone_source<'a>(session: &Session, target: Option<&'a str>) -> Option<&'a Path> {
    let target = target?;
    let path = Path::new(target);
    let is_source = path.extension().is_some_and(|ext| ext == "ptx") && path.is_file();
    (session.project_dir.is_none() && is_source).then_some(path)
}

fn build_standalone(session: &Session, file: &Path, args: &BuildArgs) -> Result<()> {
    tracing::info!("Building the standalone document {}.", file.display());
    install_resources(&resource_base_path())?;
    let (project, names) = Project::standalone(file)
        .with_context(|| format!("Failed to set up a build of {}", file.display()))?;
    tracing::debug!("Standalone targets available: {:?}", names);
    let target = select_target(&project, None, "build")?;
    build_target(session, &project, target, args)
}

fn build_target(session: &Session, project: &Project, target: &Target, args: &BuildArgs) -> Result<()> {
    let engine = session.engine(project);
    let builder = Builder::new(target, &engine);

    match args.generate {
        Some(asset) => {
            match asset {
                AssetArg::All => tracing::info!("Generating all assets in default formats."),
                AssetArg::Only(asset) => tracing::warn!("Generating only {} assets.", asset),
            }
            builder.generate_assets(&GenerateOptions {
                requested: asset.requested(),
                only_changed: false,
                xmlid: args.xmlid.clone(),
                ..Default::default()
            })?;
        }
        None if args.no_generate => {
            tracing::warn!("Assets like latex-images will not be regenerated for this build");
            tracing::warn!("(previously generated assets will be used if they exist).");
        }
        None => {}
    }

    let result = builder
        .build(&BuildOptions {
            clean: args.clean,
            generate: args.generate.is_none() && !args.no_generate,
            xmlid: args.xmlid.clone(),
            no_knowls: args.no_knowls,
        })
        .with_context(|| format!("Failed to build target {}", target.name))?;

    tracing::info!(
        "Build of {} complete in {:.1}s.",
        target.name,
        result.duration_ms as f64 / 1000.0
    );
    tracing::info!("Output: {}", result.output_dir.display());
    Ok(())
}
