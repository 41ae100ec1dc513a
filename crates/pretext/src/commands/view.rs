//! `pretext view`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use pretext_build::{BuildOptions, Builder, GenerateOptions, SubprocessEngine};
use pretext_project::paths::{hash_path, to_posix};
use pretext_project::resources::{install_resources, resource_base_path};
use pretext_project::{Format, Project, Target};
use pretext_server::server::page_url;
use pretext_server::{
    url_for_access, Access, Environment, FileWatcher, PreviewServer, Registry, ServerConfig,
    ServerError,
};

use super::{select_target, AssetArg, Session};

#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Target from project.ptx to view
    pub target: Option<String>,

    /// Allow other computers on your network to connect (ignored in CoCalc)
    #[arg(short = 'a', long, default_value = "private")]
    pub access: Access,

    /// Port for the local server
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Serve this directory instead of a project
    #[arg(short = 'd', long)]
    pub directory: Option<PathBuf>,

    /// Build first, then rebuild whenever a source file changes
    #[arg(short = 'w', long)]
    pub watch: bool,

    /// Build the target before viewing
    #[arg(short = 'b', long)]
    pub build: bool,

    /// Generate all assets, or only the given type, before viewing
    #[arg(short = 'g', long, num_args = 0..=1, default_missing_value = "ALL", value_name = "ASSET")]
    pub generate: Option<AssetArg>,

    /// Do not open a browser
    #[arg(long)]
    pub no_launch: bool,

    /// Stop the server running for this project
    #[arg(long)]
    pub stop: bool,

    /// Override a project.ptx value: --config-override targets.target@name web
    #[arg(long = "config-override", num_args = 2, value_names = ["PATH", "VALUE"])]
    pub config_override: Vec<String>,
}

/// Run the view command.
pub async fn run(session: &Session, args: ViewArgs) -> Result<()> {
    let port = args.port.unwrap_or(session.config.port);

    if let Some(directory) = &args.directory {
        if !directory.is_dir() {
            anyhow::bail!("Directory not found: {}", directory.display());
        }
        let config = ServerConfig {
            directory: directory.clone(),
            access: args.access,
            port,
            launch: !args.no_launch,
            launch_path: String::new(),
        };
        PreviewServer::new(config).start().await?;
        return Ok(());
    }

    let dir = session.require_project("view the output for")?.to_path_buf();
    let registry = Registry::default();

    if args.stop {
        return stop_server(&registry, &dir);
    }

    install_resources(&resource_base_path())?;
    let project = session.load_project(&dir, &args.config_override)?;
    let target = select_target(&project, args.target.as_deref(), "view")?;
    let engine = session.engine(&project);

    if let Some(asset) = args.generate {
        Builder::new(target, &engine).generate_assets(&GenerateOptions {
            requested: asset.requested(),
            only_changed: false,
            ..Default::default()
        })?;
    }
    if args.build || args.watch {
        tracing::info!("Building target.");
        Builder::new(target, &engine)
            .build(&BuildOptions::default())
            .with_context(|| format!("Failed to build target {}", target.name))?;
    }

    let output = target.output_dir_abspath();
    if !output.exists() {
        tracing::warn!(
            "The target '{}' has not been built yet; run `pretext build {}` or `pretext view {} -b`.",
            target.name,
            target.name,
            target.name
        );
    }

    let page = launch_path(&project, target);
    let target_name = target.name.clone();
    let environment = Environment::detect();
    if let Some(server) = registry.find_active(&hash_path(&dir))? {
        tracing::info!("A PreTeXt web server is already running for this project.");
        let url = page_url(&url_for_access(args.access, server.port, &environment), &page);
        tracing::info!("Your output is at {}", url);
        if !args.no_launch {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open a browser: {}", e);
            }
        }
        if !args.watch {
            return Ok(());
        }
        tracing::info!("Watching for changes; the running server will show the rebuilt output.");
        return watch(project, target_name, engine).await;
    }

    let config = ServerConfig {
        directory: dir,
        access: args.access,
        port,
        launch: !args.no_launch,
        launch_path: page,
    };
    let server = PreviewServer::new(config).with_environment(environment);

    if args.watch {
        let watcher = tokio::spawn(watch(project, target_name, engine));
        let served = server.start().await;
        watcher.abort();
        served?;
    } else {
        server.start().await?;
    }
    Ok(())
}

/// Path below the project directory that shows `target`'s output.
fn launch_path(project: &Project, target: &Target) -> String {
    let output = target.output_dir_abspath();
    let file = match target.format {
        Format::Html | Format::Revealjs => None,
        _ => target.output_file_abspath(),
    };
    let shown = file.unwrap_or(output.clone());
    let relative = shown.strip_prefix(project.abspath()).unwrap_or(&shown);
    let mut path = to_posix(relative);
    if shown == output && !path.ends_with('/') {
        path.push('/');
    }
    path
}

fn stop_server(registry: &Registry, dir: &Path) -> Result<()> {
    match registry.find(&hash_path(dir))? {
        Some(server) => {
            tracing::info!("Stopping the PreTeXt web server on port {}.", server.port);
            registry.terminate(&server)?;
        }
        None => tracing::info!("No running PreTeXt web server was found for this project."),
    }
    Ok(())
}

/// Rebuild `target_name` whenever a source or publication file changes.
async fn watch(project: Project, target_name: String, engine: SubprocessEngine) -> Result<()> {
    let (_watcher, mut events) =
        FileWatcher::for_project(&project).map_err(|e| ServerError::WatchError(e.to_string()))?;
    tracing::info!("Watching for changes in {} ...", project.source_abspath().display());

    let project = Arc::new(project);
    let engine = Arc::new(engine);
    while let Some(event) = events.recv().await {
        if !event.is_source() {
            continue;
        }
        // Coalesce everything queued while the previous build ran.
        while events.try_recv().is_ok() {}
        tracing::info!("Changes detected in {}; rebuilding.", event.path().display());

        let project = Arc::clone(&project);
        let engine = Arc::clone(&engine);
        let name = target_name.clone();
        let rebuilt = tokio::task::spawn_blocking(move || -> Result<()> {
            let target = project
                .target(Some(&name))
                .with_context(|| format!("Target {} disappeared", name))?;
            let options = BuildOptions {
                generate: false,
                ..Default::default()
            };
            Builder::new(target, engine.as_ref()).build(&options)?;
            Ok(())
        })
        .await?;
        match rebuilt {
            Ok(()) => tracing::info!("Rebuild complete; refresh your browser."),
            Err(e) => tracing::warn!("Rebuild failed: {:#}", e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing;
    use pretty_assertions::assert_eq;

    #[test]
    fn html_targets_open_their_directory() {
        let temp = testing::project_dir();
        let project = Project::parse(temp.path()).unwrap();
        let web = project.target(Some("web")).unwrap();

        assert_eq!(launch_path(&project, web), "output/web/");
    }

    #[test]
    fn named_files_are_opened_directly() {
        let temp = testing::project_dir();
        std::fs::write(
            temp.path().join("project.ptx"),
            r#"<project ptx-version="2"><targets>
                <target name="print" format="pdf" output-filename="book.pdf"/>
            </targets></project>"#,
        )
        .unwrap();
        let project = Project::parse(temp.path()).unwrap();
        let print = project.target(Some("print")).unwrap();

        assert_eq!(launch_path(&project, print), "output/print/book.pdf");
    }

    #[test]
    fn stopping_without_a_server_is_quiet() {
        let temp = tempfile::tempdir().unwrap();
        let registry = Registry::new(temp.path().join("running_servers"));

        stop_server(&registry, temp.path()).unwrap();
    }
}
