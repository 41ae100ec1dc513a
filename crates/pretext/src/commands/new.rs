//! `pretext new`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use pretext_project::paths::project_path;
use pretext_project::templates::{requirements_txt, NewTemplate, GITIGNORE};
use pretext_project::VERSION;

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Starter document: book, article, demo, hello or slideshow
    #[arg(default_value = "book")]
    pub template: NewTemplate,

    /// Directory to create the project in
    #[arg(short = 'd', long, default_value = "new-pretext-project")]
    pub directory: PathBuf,
}

/// Run the new command.
pub async fn run(args: NewArgs) -> Result<()> {
    let dir = std::path::absolute(&args.directory)
        .with_context(|| format!("Invalid directory {}", args.directory.display()))?;
    if let Some(existing) = project_path(&dir) {
        tracing::warn!("A project already exists in `{}`.", existing.display());
        tracing::warn!("No new project will be generated.");
        return Ok(());
    }
    tracing::info!(
        "Generating new PreTeXt project in `{}` using `{}` template.",
        dir.display(),
        args.template
    );
    create_project(&dir, args.template)?;
    tracing::info!(
        "Success! Open `{}` to edit your document",
        dir.join("source").join("main.ptx").display()
    );
    tracing::info!(
        "Then try to `pretext build` and `pretext view` from within `{}`.",
        dir.display()
    );
    Ok(())
}

/// Write the template's files, `.gitignore` and `requirements.txt` into `dir`.
pub fn create_project(dir: &Path, template: NewTemplate) -> Result<()> {
    let mut files: Vec<(&str, String)> = template
        .files()
        .into_iter()
        .map(|(path, contents)| (path, contents.to_string()))
        .collect();
    files.push((".gitignore", GITIGNORE.to_string()));
    files.push(("requirements.txt", requirements_txt(VERSION)));

    for (relative, contents) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Created {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretext_project::Project;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_projects_parse() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("book");

        create_project(&dir, NewTemplate::Book).unwrap();

        assert!(dir.join("source/main.ptx").is_file());
        assert!(dir.join(".gitignore").is_file());
        let project = Project::parse(&dir).unwrap();
        assert!(!project.targets().is_empty());
    }

    #[test]
    fn requirements_pin_this_version() {
        let temp = tempfile::tempdir().unwrap();

        create_project(temp.path(), NewTemplate::Hello).unwrap();

        assert_eq!(
            pretext_project::paths::requirements_version(temp.path()).as_deref(),
            Some(VERSION)
        );
    }

    #[tokio::test]
    async fn refuses_to_overwrite_projects() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("project.ptx"), "<project/>").unwrap();
        let nested = temp.path().join("inner");

        run(NewArgs {
            template: NewTemplate::Article,
            directory: nested.clone(),
        })
        .await
        .unwrap();

        assert!(!nested.exists());
    }
}
