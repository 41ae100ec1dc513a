//! `pretext init`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use pretext_project::templates::{requirements_txt, GITIGNORE, PROJECT_PTX, PUBLICATION_PTX};
use pretext_project::VERSION;

use super::Session;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Generate the files even if project.ptx already exists
    #[arg(short = 'r', long)]
    pub refresh: bool,
}

/// Run the init command in the current directory.
pub async fn run(session: &Session, args: InitArgs) -> Result<()> {
    if let Some(existing) = &session.project_dir {
        if !args.refresh {
            tracing::warn!("A project already exists in `{}`.", existing.display());
            tracing::warn!(
                "Use `pretext init --refresh` to refresh initialization of an existing project."
            );
            return Ok(());
        }
    }
    let dir = std::env::current_dir().context("Failed to read the current directory")?;
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    init_project(&dir, &timestamp)?;
    tracing::info!("Success! Open project.ptx to edit your project manifest.");
    tracing::info!(
        "Edit your <target/>s to point to the location of your PreTeXt source files."
    );
    Ok(())
}

/// Write the initial project files into `dir`.
///
/// A file that already exists is left alone and the fresh copy is written
/// next to it with `timestamp` in its name. Returns the paths written.
pub fn init_project(dir: &Path, timestamp: &str) -> Result<Vec<PathBuf>> {
    let files = [
        ("project.ptx", PROJECT_PTX.to_string()),
        ("requirements.txt", requirements_txt(VERSION)),
        ("publication/publication.ptx", PUBLICATION_PTX.to_string()),
        (".gitignore", GITIGNORE.to_string()),
    ];

    let mut written = Vec::new();
    for (relative, contents) in files {
        let mut path = dir.join(relative);
        if path.exists() {
            let fresh = timestamped(&path, timestamp);
            tracing::warn!("You already have a file at {}.", path.display());
            tracing::warn!(
                "A default file has been created as {} for comparison.",
                fresh.display()
            );
            path = fresh;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Generated {}.", path.display());
        written.push(path);
    }
    Ok(written)
}

/// `project.ptx` becomes `project-<stamp>.ptx`; `.gitignore` becomes `.gitignore-<stamp>`.
fn timestamped(path: &Path, timestamp: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = match name.rfind('.') {
        Some(index) if index > 0 => format!("{}-{}{}", &name[..index], timestamp, &name[index..]),
        _ => format!("{}-{}", name, timestamp),
    };
    path.with_file_name(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writes_initial_files() {
        let temp = tempfile::tempdir().unwrap();

        let written = init_project(temp.path(), "20240101-120000").unwrap();

        assert_eq!(written.len(), 4);
        assert!(temp.path().join("publication/publication.ptx").is_file());
        assert!(pretext_project::Project::parse(temp.path()).is_ok());
    }

    #[test]
    fn existing_files_get_timestamped_siblings() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("project.ptx"), "mine").unwrap();
        fs::write(temp.path().join(".gitignore"), "mine").unwrap();

        init_project(temp.path(), "20240101-120000").unwrap();

        assert_eq!(fs::read_to_string(temp.path().join("project.ptx")).unwrap(), "mine");
        assert!(temp.path().join("project-20240101-120000.ptx").is_file());
        assert!(temp.path().join(".gitignore-20240101-120000").is_file());
    }

    #[test]
    fn timestamped_names() {
        let stamp = "20240101-120000";
        assert_eq!(
            timestamped(Path::new("a/requirements.txt"), stamp),
            PathBuf::from("a/requirements-20240101-120000.txt")
        );
        assert_eq!(
            timestamped(Path::new(".gitignore"), stamp),
            PathBuf::from(".gitignore-20240101-120000")
        );
    }
}
