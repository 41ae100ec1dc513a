//! CLI command implementations.

pub mod build;
pub mod deploy;
pub mod generate;
pub mod init;
pub mod new;
pub mod passthrough;
pub mod support;
pub mod update;
pub mod view;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use pretext_build::engine::{default_core_dir, default_python};
use pretext_build::SubprocessEngine;
use pretext_project::{AssetType, Format, ParseOptions, Project, ShadowXmlDocument, Target};

use crate::config::CliConfig;

/// State shared by every command.
#[derive(Debug, Clone)]
pub struct Session {
    pub config: CliConfig,

    /// Directory of the enclosing project, if any.
    pub project_dir: Option<PathBuf>,
}

impl Session {
    /// The project directory, or an error explaining how to get one.
    pub fn require_project(&self, task: &str) -> Result<&Path> {
        match &self.project_dir {
            Some(dir) => Ok(dir),
            None => {
                tracing::error!(
                    "Before you can {} your PreTeXt project, you must be in a (sub)directory initialized with a project.ptx manifest.",
                    task
                );
                tracing::info!(
                    "Move to such a directory, use `pretext new` to create a new project, or `pretext init` to update existing project for use with the CLI."
                );
                bail!("no project.ptx found");
            }
        }
    }

    /// Parse the project, applying any `--config-override` pairs first.
    pub fn load_project(&self, dir: &Path, overrides: &[String]) -> Result<Project> {
        let options = ParseOptions {
            overlay: overlay_from_pairs(overrides)?,
            ..Default::default()
        };
        let project = Project::parse_with(dir, options)
            .with_context(|| format!("Failed to read the project manifest in {}", dir.display()))?;
        if project.is_legacy() {
            tracing::warn!(
                "This project uses a legacy project.ptx manifest. Run `pretext update` and consult the PreTeXt guide to upgrade it."
            );
        }
        Ok(project)
    }

    /// Engine running the configured core for `project`.
    pub fn engine(&self, project: &Project) -> SubprocessEngine {
        let core_dir = self.config.core_dir.clone().unwrap_or_else(default_core_dir);
        let python = self.config.python.clone().unwrap_or_else(default_python);
        SubprocessEngine::new(core_dir, python).with_executables(project.executables().clone())
    }
}

/// Overlay built from flattened `PATH VALUE` pairs.
pub fn overlay_from_pairs(pairs: &[String]) -> Result<Option<ShadowXmlDocument>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    if pairs.len() % 2 != 0 {
        bail!("--config-override expects a path and a value");
    }
    let mut overlay = ShadowXmlDocument::new();
    for pair in pairs.chunks(2) {
        overlay
            .upsert_node_or_attribute(&pair[0], &pair[1])
            .with_context(|| format!("Invalid --config-override path '{}'", pair[0]))?;
    }
    Ok(Some(overlay))
}

/// Look up a target, logging hints when it does not exist.
pub fn select_target<'a>(project: &'a Project, name: Option<&str>, task: &str) -> Result<&'a Target> {
    match project.target(name) {
        Some(target) => {
            if name.is_none() {
                tracing::info!(
                    "Since no target was supplied, we will {} the first target of the project.ptx manifest ({}).",
                    task,
                    target.name
                );
            }
            Ok(target)
        }
        None => {
            let requested = name.unwrap_or_default();
            tracing::error!(
                "There is not a target named \"{}\" for this project.ptx manifest.",
                requested
            );
            for hint in target_hints(project, requested, task) {
                tracing::info!("{}", hint);
            }
            bail!("unknown target '{}'", requested)
        }
    }
}

/// Suggestions for a target name that does not exist.
pub fn target_hints(project: &Project, name: &str, task: &str) -> Vec<String> {
    let mut hints = Vec::new();
    match Format::from_str(name) {
        Ok(format) => {
            let names = project.target_names(&[format]);
            match names.len() {
                0 => {}
                1 => hints.push(format!(
                    "However, the target named \"{}\" has \"{}\" as its format. Try to {} that instead or edit your project.ptx manifest.",
                    names[0], name, task
                )),
                _ => hints.push(format!(
                    "However, the targets with names {:?} have \"{}\" as their format. Try to {} one of those instead or edit your project.ptx manifest.",
                    names, name, task
                )),
            }
            if matches!(format, Format::Epub | Format::Kindle) {
                hints.push(format!(
                    "Instructions for setting up a target with the {} format, including the external programs required, can be found in the PreTeXt guide: https://pretextbook.org/doc/guide/html/epub.html",
                    name
                ));
            }
        }
        Err(_) => hints.push(format!(
            "The available targets to {} are named: {:?}. Try to {} one of those instead or edit your project.ptx manifest.",
            task,
            project.target_names(&[]),
            task
        )),
    }
    hints
}

/// Value of `-g`/`generate`: every asset type or a single one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetArg {
    All,
    Only(AssetType),
}

impl AssetArg {
    pub fn requested(self) -> Option<Vec<AssetType>> {
        match self {
            AssetArg::All => None,
            AssetArg::Only(asset) => Some(vec![asset]),
        }
    }
}

impl FromStr for AssetArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(AssetArg::All);
        }
        AssetType::from_str(&s.to_ascii_lowercase())
            .map(AssetArg::Only)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs;

    use tempfile::TempDir;

    pub const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<project ptx-version="2">
  <targets>
    <target name="web" format="html"/>
    <target name="print" format="pdf"/>
    <target name="print-latex" format="latex"/>
  </targets>
</project>
"#;

    /// A project directory with a manifest, a publication file and a tiny source.
    pub fn project_dir() -> TempDir {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("project.ptx"), MANIFEST).unwrap();
        fs::create_dir_all(temp.path().join("source")).unwrap();
        fs::write(
            temp.path().join("source/main.ptx"),
            "<pretext><book><title>Test</title></book></pretext>",
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("publication")).unwrap();
        fs::write(
            temp.path().join("publication/publication.ptx"),
            "<publication/>",
        )
        .unwrap();
        temp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pairs_become_an_overlay() {
        let pairs = vec![
            "targets.target@name".to_string(),
            "web".to_string(),
            "source".to_string(),
            "src".to_string(),
        ];

        assert!(overlay_from_pairs(&pairs).unwrap().is_some());
        assert!(overlay_from_pairs(&[]).unwrap().is_none());
        assert!(overlay_from_pairs(&pairs[..3]).is_err());
    }

    #[test]
    fn parses_asset_arguments() {
        assert_eq!("ALL".parse::<AssetArg>(), Ok(AssetArg::All));
        assert_eq!(
            "latex-image".parse::<AssetArg>(),
            Ok(AssetArg::Only(AssetType::LatexImage))
        );
        assert_eq!(AssetArg::All.requested(), None);
        assert!("pictures".parse::<AssetArg>().is_err());
    }

    #[test]
    fn hints_for_format_names() {
        let temp = testing::project_dir();
        let project = Project::parse(temp.path()).unwrap();

        let hints = target_hints(&project, "epub", "build");

        assert_eq!(hints.len(), 1);
        assert!(hints[0].contains("epub.html"));
    }

    #[test]
    fn hints_list_available_targets() {
        let temp = testing::project_dir();
        let project = Project::parse(temp.path()).unwrap();

        let hints = target_hints(&project, "website", "view");

        assert_eq!(hints.len(), 1);
        assert!(hints[0].contains(r#"["web", "print", "print-latex"]"#));
    }

    #[test]
    fn unknown_target_is_an_error() {
        let temp = testing::project_dir();
        let project = Project::parse(temp.path()).unwrap();

        assert!(select_target(&project, Some("nope"), "build").is_err());
        assert_eq!(select_target(&project, None, "build").unwrap().name, "web");
    }
}
