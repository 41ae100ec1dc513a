//! Errors raised while building, generating and deploying.

use std::path::PathBuf;

use pretext_project::ProjectError;

/// Errors from invoking the core engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to find the PreTeXt core at {}", .0.display())]
    CoreMissing(PathBuf),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to run core component '{component}' ({status})\n{stderr}")]
    Failed {
        component: String,
        status: String,
        stderr: String,
    },
}

/// Errors that can occur during a build or asset generation.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("XML syntax for {} is invalid", .0.display())]
    InvalidSyntax(PathBuf),

    #[error("Runestone targets need exactly one docinfo/document-id in the source; found {0}")]
    DocumentId(usize),

    #[error("Failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while staging or publishing a deployment.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to render the landing page: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Failed to read site configuration {}: {message}", path.display())]
    SiteConfig { path: PathBuf, message: String },

    #[error("No build for `{target}` was found in {}. Try running `pretext build {target}` first.", path.display())]
    NotBuilt { target: String, path: PathBuf },

    #[error("The project has no targets to deploy")]
    NoTargets,

    #[error("{} is not managed by git", .0.display())]
    NotGitRepo(PathBuf),

    #[error("Failed to find a GitHub remote named origin (found: {0})")]
    NoGithubRemote(String),

    #[error("Failed to run `git {command}`: {message}")]
    Git { command: String, message: String },
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
