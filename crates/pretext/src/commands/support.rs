//! `pretext support`: installation details to share when asking for help.

use std::fs;

use anyhow::Result;
use pretext_build::engine::{default_core_dir, default_python};
use pretext_project::paths::home_path;
use pretext_project::{Project, VERSION};

use super::Session;

/// Run the support command.
pub async fn run(session: &Session) -> Result<()> {
    tracing::info!("");
    tracing::info!("Please share the following information when posting to the");
    tracing::info!("pretext-support Google Group.");
    tracing::info!("");
    tracing::info!("PreTeXt-CLI version: {}", VERSION);
    let core_dir = session.config.core_dir.clone().unwrap_or_else(default_core_dir);
    let core_state = if core_dir.join("pretext").join("pretext").is_file() {
        "installed"
    } else {
        "missing"
    };
    tracing::info!("PreTeXt core: {} ({})", core_dir.display(), core_state);
    tracing::info!(
        "Python: {}",
        session.config.python.clone().unwrap_or_else(default_python)
    );
    tracing::info!("PreTeXt home: {}", home_path().display());
    tracing::info!("OS: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(cwd) = std::env::current_dir() {
        tracing::info!("Current working directory: {}", cwd.display());
    }

    let Some(dir) = &session.project_dir else {
        tracing::info!("No project.ptx found.");
        return Ok(());
    };
    tracing::info!("PreTeXt project path: {}", dir.display());
    tracing::info!("");
    tracing::info!("Contents of project.ptx:");
    tracing::info!("------------------------");
    match fs::read_to_string(dir.join("project.ptx")) {
        Ok(contents) => tracing::info!("{}", contents),
        Err(e) => tracing::warn!("Unable to read project.ptx: {}", e),
    }
    tracing::info!("------------------------");

    match Project::parse(dir) {
        Ok(project) => {
            for (name, command) in project.executables().missing() {
                tracing::warn!(
                    "Unable to locate the command for <{}> on your system ({}).",
                    name,
                    command
                );
            }
        }
        Err(e) => tracing::warn!("The project manifest could not be read: {}", e),
    }
    Ok(())
}
