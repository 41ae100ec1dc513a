//! PreTeXt CLI - create, build, preview and deploy PreTeXt projects.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pretext_project::paths::{project_path, requirements_version};
use pretext_project::{Project, VERSION};

mod commands;
mod config;
mod logging;

use commands::Session;
use config::CliConfig;
use logging::Verbosity;

#[derive(Parser)]
#[command(name = "pretext")]
#[command(about = "Command line tools for authoring and publishing PreTeXt documents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Console verbosity
    #[arg(short, long, value_enum, default_value = "info", global = true)]
    verbosity: Verbosity,

    /// Print the targets of the current project and exit
    #[arg(short, long)]
    targets: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print information to include when asking for help
    Support,

    /// Generate a new PreTeXt project from a template
    New(commands::new::NewArgs),

    /// Set up the current directory as a PreTeXt project
    Init(commands::init::InitArgs),

    /// Build a target of the project
    Build(commands::build::BuildArgs),

    /// Generate assets (images, previews, exercises) for a target
    Generate(commands::generate::GenerateArgs),

    /// Preview a built target in the browser
    View(commands::view::ViewArgs),

    /// Deploy the project site to GitHub Pages
    Deploy(commands::deploy::DeployArgs),

    /// Refresh the managed files of the project
    Update(commands::update::UpdateArgs),

    /// Run the PreTeXt core directly with the given arguments
    Core(commands::passthrough::CoreArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = CliConfig::load(&CliConfig::default_path());
    let project_dir = std::env::current_dir().ok().and_then(|cwd| project_path(&cwd));

    let log_file = match (&loaded, &project_dir) {
        (Ok(config), Some(dir)) if config.log_to_file && !cli.targets => {
            Some(logging::log_file_path(dir))
        }
        _ => None,
    };
    let collector = match logging::init(cli.verbosity, log_file.as_deref()) {
        Ok(collector) => collector,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(config) = accept_config(loaded) else {
        collector.replay();
        return ExitCode::FAILURE;
    };
    let session = Session {
        config,
        project_dir,
    };

    let code = match run(cli, &session).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            1
        }
    };

    if collector.replay() {
        return ExitCode::FAILURE;
    }
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// The loaded user configuration, or `None` after logging why it is unusable.
fn accept_config(loaded: Result<CliConfig>) -> Option<CliConfig> {
    match loaded {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!("{:#}", e);
            tracing::info!(
                "Fix or remove {} and run the command again.",
                CliConfig::default_path().display()
            );
            None
        }
    }
}

/// Dispatch the command line. Returns the process exit code.
async fn run(cli: Cli, session: &Session) -> Result<i32> {
    if let Some(dir) = &session.project_dir {
        if cli.targets {
            let project = Project::parse(dir)?;
            for target in project.targets() {
                println!("{}", target.name);
            }
            return Ok(0);
        }
        tracing::info!("PreTeXt project found in `{}`.", dir.display());
        check_requirements(dir);
    } else if cli.targets {
        tracing::warn!("No project.ptx found; there are no targets to list.");
        return Ok(0);
    }

    let Some(command) = cli.command else {
        tracing::info!("Run `pretext --help` for help.");
        return Ok(0);
    };

    match command {
        Commands::Support => commands::support::run(session).await?,
        Commands::New(args) => commands::new::run(args).await?,
        Commands::Init(args) => commands::init::run(session, args).await?,
        Commands::Build(args) => commands::build::run(session, args).await?,
        Commands::Generate(args) => commands::generate::run(session, args).await?,
        Commands::View(args) => commands::view::run(session, args).await?,
        Commands::Deploy(args) => commands::deploy::run(session, args).await?,
        Commands::Update(args) => commands::update::run(session, args).await?,
        Commands::Core(args) => return commands::passthrough::run(session, args).await,
    }
    Ok(0)
}

/// Warn when `requirements.txt` pins a different CLI version.
fn check_requirements(dir: &std::path::Path) {
    match requirements_version(dir) {
        Some(pinned) if pinned != VERSION => {
            tracing::warn!(
                "Using PreTeXt-CLI version {}, but this project's requirements.txt pins version {}.",
                VERSION,
                pinned
            );
            tracing::warn!(
                "Install the pinned version, or run `pretext update` to move the project to {}.",
                VERSION
            );
        }
        Some(_) => {}
        None => tracing::debug!("No pretext version pinned in requirements.txt."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn malformed_user_config_stops_the_run() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        let collector = logging::ErrorCollector::default();
        let subscriber = tracing_subscriber::registry().with(collector.clone());

        let accepted =
            tracing::subscriber::with_default(subscriber, || accept_config(CliConfig::load(&path)));

        assert!(accepted.is_none());
        let errors = collector.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Failed to parse"), "{}", errors[0]);
    }

    #[test]
    fn missing_user_config_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();

        let accepted = accept_config(CliConfig::load(&temp.path().join("config.toml")));

        assert_eq!(accepted, Some(CliConfig::default()));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_build_with_bare_generate() {
        let cli = Cli::try_parse_from(["pretext", "build", "web", "-g"]).unwrap();
        match cli.command {
            Some(Commands::Build(args)) => {
                assert_eq!(args.target.as_deref(), Some("web"));
                assert!(args.generate.is_some());
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn core_arguments_pass_through() {
        let cli = Cli::try_parse_from(["pretext", "core", "-c", "all", "-f", "html"]).unwrap();
        match cli.command {
            Some(Commands::Core(args)) => assert_eq!(args.args, ["-c", "all", "-f", "html"]),
            _ => panic!("expected core"),
        }
    }
}
