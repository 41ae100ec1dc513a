//! Build orchestration for PreTeXt projects.
//!
//! Wraps the external core engine: building targets, generating assets with
//! hash-based change detection, the CodeChat mapping, and staging and
//! publishing deployments.

pub mod builder;
pub mod codechat;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod generate;
pub mod git;
pub mod site;
pub mod validate;

#[cfg(test)]
mod testing;

pub use builder::{BuildOptions, BuildResult, Builder};
pub use deploy::{deploy, stage_deployment, DeployOptions};
pub use engine::{AssetJob, BuildJob, CoreEngine, SubprocessEngine};
pub use error::{BuildError, DeployError, EngineError};
pub use generate::{GenerateOptions, GenerateReport};
pub use git::{parse_git_remote, GithubRepo};
pub use validate::xml_syntax_is_valid;
