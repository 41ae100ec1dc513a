//! Boilerplate files distributed with the tools.
//!
//! A project owns a handful of managed files (manifest, `.gitignore`, CI
//! workflow, ...). `update_boilerplate` refreshes the ones the author has not
//! edited. The bundled templates are also installed below the per-user state
//! directory so that targets without a publication file of their own can
//! point at the bundled one.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ProjectError;
use crate::paths::home_path;
use crate::templates::{self, MANAGED_MARKER, REQUIREMENTS_HEADER};
use crate::VERSION;

/// A file a project may carry that the tools know how to (re)generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    /// Name used in messages and for lookup.
    pub name: &'static str,

    /// Location relative to the project directory.
    pub path: &'static str,

    /// Only meaningful when the project is a git repository.
    pub git_only: bool,
}

pub const PROJECT_RESOURCES: &[Resource] = &[
    Resource {
        name: "project.ptx",
        path: "project.ptx",
        git_only: false,
    },
    Resource {
        name: "codechat_config.yaml",
        path: "codechat_config.yaml",
        git_only: false,
    },
    Resource {
        name: ".gitignore",
        path: ".gitignore",
        git_only: false,
    },
    Resource {
        name: ".devcontainer.json",
        path: ".devcontainer.json",
        git_only: true,
    },
    Resource {
        name: "pretext-cli.yml",
        path: ".github/workflows/pretext-cli.yml",
        git_only: true,
    },
    Resource {
        name: "requirements.txt",
        path: "requirements.txt",
        git_only: false,
    },
];

pub const DEPRECATED_RESOURCES: &[Resource] = &[Resource {
    name: "deploy.yml",
    path: ".github/workflows/deploy.yml",
    git_only: true,
}];

/// Templates installed below [`resource_base_path`]`/templates`.
const INSTALLED_TEMPLATES: &[(&str, &str)] = &[
    ("project.ptx", templates::PROJECT_PTX),
    ("publication.ptx", templates::PUBLICATION_PTX),
    ("standalone-project.ptx", templates::STANDALONE_PROJECT_PTX),
    ("standalone-publication.ptx", templates::STANDALONE_PUBLICATION_PTX),
    (".gitignore", templates::GITIGNORE),
    (".devcontainer.json", templates::DEVCONTAINER_JSON),
    ("pretext-cli.yml", templates::WORKFLOW_YML),
    ("codechat_config.yaml", templates::CODECHAT_CONFIG_YAML),
];

/// Per-version directory holding installed resources.
pub fn resource_base_path() -> PathBuf {
    home_path().join(VERSION)
}

pub fn find_resource(name: &str) -> Result<&'static Resource, ProjectError> {
    PROJECT_RESOURCES
        .iter()
        .chain(DEPRECATED_RESOURCES)
        .find(|r| r.name == name)
        .ok_or_else(|| ProjectError::UnknownResource(name.to_string()))
}

/// Current bundled contents of a resource.
pub fn bundled_content(name: &str) -> Result<Cow<'static, str>, ProjectError> {
    Ok(match name {
        "project.ptx" => Cow::Borrowed(templates::PROJECT_PTX),
        "codechat_config.yaml" => Cow::Borrowed(templates::CODECHAT_CONFIG_YAML),
        ".gitignore" => Cow::Borrowed(templates::GITIGNORE),
        ".devcontainer.json" => Cow::Borrowed(templates::DEVCONTAINER_JSON),
        "pretext-cli.yml" => Cow::Borrowed(templates::WORKFLOW_YML),
        "deploy.yml" => Cow::Borrowed(templates::DEPRECATED_DEPLOY_YML),
        "requirements.txt" => Cow::Owned(templates::requirements_txt(VERSION)),
        other => return Err(ProjectError::UnknownResource(other.to_string())),
    })
}

/// Whether a project's copy of a resource may be replaced without losing edits.
pub fn is_unmodified(name: &str, contents: &[u8]) -> bool {
    let contents = String::from_utf8_lossy(contents);
    match name {
        "project.ptx" => normalize_newlines(&contents) == normalize_newlines(templates::PROJECT_PTX),
        "requirements.txt" => contents.trim_start().starts_with(REQUIREMENTS_HEADER),
        _ => contents.contains(MANAGED_MARKER),
    }
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").trim_end().to_string()
}

/// Write the bundled templates below `base/templates`, leaving existing files alone.
pub fn install_resources(base: &Path) -> Result<PathBuf, ProjectError> {
    let dir = base.join("templates");
    fs::create_dir_all(&dir).map_err(|e| ProjectError::io(&dir, e))?;
    for (name, contents) in INSTALLED_TEMPLATES {
        let path = dir.join(name);
        if !path.exists() {
            fs::write(&path, contents).map_err(|e| ProjectError::io(&path, e))?;
            tracing::debug!("Installed bundled resource {}", path.display());
        }
    }
    Ok(dir)
}

/// What happened to one resource during an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoilerplateAction {
    Added(String),
    Replaced(String),
    Kept(String),
    Removed(String),
}

fn backup(path: &Path) -> Result<(), ProjectError> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    let backup = path.with_file_name(name);
    fs::copy(path, &backup).map_err(|e| ProjectError::io(&backup, e))?;
    tracing::debug!("Created a backup of {} at {}", path.display(), backup.display());
    Ok(())
}

/// Write the bundled version of `name` into the project, optionally keeping a `.bak`.
pub fn add_boilerplate(project_dir: &Path, name: &str, make_backup: bool) -> Result<(), ProjectError> {
    let resource = find_resource(name)?;
    let path = project_dir.join(resource.path);
    if path.exists() && make_backup {
        backup(&path)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ProjectError::io(parent, e))?;
    }
    fs::write(&path, bundled_content(name)?.as_bytes()).map_err(|e| ProjectError::io(&path, e))?;
    tracing::debug!("Generated {}", path.display());
    Ok(())
}

/// Delete a resource from the project, optionally keeping a `.bak`.
pub fn remove_boilerplate(project_dir: &Path, name: &str, make_backup: bool) -> Result<(), ProjectError> {
    let resource = find_resource(name)?;
    let path = project_dir.join(resource.path);
    if make_backup {
        backup(&path)?;
    }
    fs::remove_file(&path).map_err(|e| ProjectError::io(&path, e))?;
    tracing::debug!("Removed {}", path.display());
    Ok(())
}

/// Refresh every managed resource that the author has not changed.
///
/// With `force`, every resource is rewritten and the previous copy is kept as
/// a backup. Deprecated resources that were never edited are removed.
pub fn update_boilerplate(
    project_dir: &Path,
    git_managed: bool,
    make_backup: bool,
    force: bool,
) -> Result<Vec<BoilerplateAction>, ProjectError> {
    let mut actions = Vec::new();

    for resource in PROJECT_RESOURCES {
        if resource.git_only && !git_managed {
            continue;
        }
        let path = project_dir.join(resource.path);
        if force {
            add_boilerplate(project_dir, resource.name, true)?;
            tracing::info!("Generated resource file {}.", resource.name);
            actions.push(BoilerplateAction::Replaced(resource.name.to_string()));
            continue;
        }
        if !path.exists() {
            add_boilerplate(project_dir, resource.name, false)?;
            tracing::info!("Generated resource file {}.", resource.name);
            actions.push(BoilerplateAction::Added(resource.name.to_string()));
            continue;
        }
        let contents = fs::read(&path).map_err(|e| ProjectError::io(&path, e))?;
        if is_unmodified(resource.name, &contents) {
            tracing::info!(
                "Resource {} has not changed since it was generated by PreTeXt, so it will be updated to the latest version.",
                resource.name
            );
            add_boilerplate(project_dir, resource.name, make_backup)?;
            actions.push(BoilerplateAction::Replaced(resource.name.to_string()));
        } else {
            tracing::warn!(
                "Resource {} has been modified since created by PreTeXt and will not be updated.",
                resource.name
            );
            actions.push(BoilerplateAction::Kept(resource.name.to_string()));
        }
    }

    for resource in DEPRECATED_RESOURCES {
        let path = project_dir.join(resource.path);
        if !path.exists() {
            continue;
        }
        let contents = fs::read(&path).map_err(|e| ProjectError::io(&path, e))?;
        if is_unmodified(resource.name, &contents) {
            remove_boilerplate(project_dir, resource.name, true)?;
            tracing::warn!("The deprecated {} file has been deleted.", resource.name);
            actions.push(BoilerplateAction::Removed(resource.name.to_string()));
        } else {
            tracing::warn!(
                "The deprecated {} file has been modified and was left in place; consider removing it.",
                resource.name
            );
        }
    }

    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn adds_missing_and_skips_git_only_resources() {
        let temp = tempdir().unwrap();

        let actions = update_boilerplate(temp.path(), false, false, false).unwrap();

        assert_eq!(
            actions,
            vec![
                BoilerplateAction::Added("project.ptx".to_string()),
                BoilerplateAction::Added("codechat_config.yaml".to_string()),
                BoilerplateAction::Added(".gitignore".to_string()),
                BoilerplateAction::Added("requirements.txt".to_string()),
            ]
        );
        assert!(!temp.path().join(".devcontainer.json").exists());
        let requirements = fs::read_to_string(temp.path().join("requirements.txt")).unwrap();
        assert!(requirements.contains(&format!("pretext == {}", VERSION)));
    }

    #[test]
    fn keeps_modified_files_and_replaces_managed_ones() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".gitignore"), "my own ignores\n").unwrap();
        fs::write(
            temp.path().join("codechat_config.yaml"),
            format!("# {}\nold: true\n", MANAGED_MARKER),
        )
        .unwrap();

        let actions = update_boilerplate(temp.path(), false, true, false).unwrap();

        assert!(actions.contains(&BoilerplateAction::Kept(".gitignore".to_string())));
        assert!(actions.contains(&BoilerplateAction::Replaced("codechat_config.yaml".to_string())));
        assert_eq!(
            fs::read_to_string(temp.path().join(".gitignore")).unwrap(),
            "my own ignores\n"
        );
        assert!(temp.path().join("codechat_config.yaml.bak").exists());
        assert_eq!(
            fs::read_to_string(temp.path().join("codechat_config.yaml")).unwrap(),
            templates::CODECHAT_CONFIG_YAML
        );
    }

    #[test]
    fn force_overwrites_with_backup() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(".gitignore"), "mine\n").unwrap();

        update_boilerplate(temp.path(), false, false, true).unwrap();

        assert_eq!(fs::read_to_string(temp.path().join(".gitignore.bak")).unwrap(), "mine\n");
        assert_eq!(
            fs::read_to_string(temp.path().join(".gitignore")).unwrap(),
            templates::GITIGNORE
        );
    }

    #[test]
    fn removes_unmodified_deprecated_workflow() {
        let temp = tempdir().unwrap();
        let workflow = temp.path().join(".github/workflows/deploy.yml");
        fs::create_dir_all(workflow.parent().unwrap()).unwrap();
        fs::write(&workflow, templates::DEPRECATED_DEPLOY_YML).unwrap();

        let actions = update_boilerplate(temp.path(), true, false, false).unwrap();

        assert!(actions.contains(&BoilerplateAction::Removed("deploy.yml".to_string())));
        assert!(!workflow.exists());
        assert!(temp.path().join(".github/workflows/deploy.yml.bak").exists());
        assert!(temp.path().join(".github/workflows/pretext-cli.yml").exists());
    }

    #[test]
    fn manifest_is_compared_exactly() {
        assert!(is_unmodified("project.ptx", templates::PROJECT_PTX.as_bytes()));
        assert!(!is_unmodified(
            "project.ptx",
            templates::PROJECT_PTX.replace("web", "site").as_bytes()
        ));
    }

    #[test]
    fn installs_templates_once() {
        let temp = tempdir().unwrap();

        let dir = install_resources(temp.path()).unwrap();
        fs::write(dir.join("publication.ptx"), "<publication/>").unwrap();
        install_resources(temp.path()).unwrap();

        assert!(dir.join("standalone-publication.ptx").exists());
        assert_eq!(fs::read_to_string(dir.join("publication.ptx")).unwrap(), "<publication/>");
    }
}
