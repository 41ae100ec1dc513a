//! Publishing a staged site to the `gh-pages` branch of a GitHub repository.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DeployError;
use crate::fsutil::copy_dir;

const PAGES_BRANCH: &str = "gh-pages";

static GITHUB_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:git@github\.com:|https://(?:[^@/]+@)?github\.com/)([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
        .expect("valid regex")
});

/// A GitHub repository, as `owner/name`.
#[derive(Debug, Clone, PartialEq)]
pub struct GithubRepo {
    pub owner: String,
    pub name: String,
}

impl GithubRepo {
    /// Where GitHub Pages serves this repository.
    pub fn pages_url(&self) -> String {
        if self.name.eq_ignore_ascii_case(&format!("{}.github.io", self.owner)) {
            format!("https://{}.github.io/", self.owner)
        } else {
            format!("https://{}.github.io/{}/", self.owner, self.name)
        }
    }

    pub fn settings_url(&self) -> String {
        format!("https://github.com/{}/{}/settings/pages", self.owner, self.name)
    }
}

/// Parse an `origin` URL of the forms `git@github.com:o/r.git` or `https://github.com/o/r(.git|/)`.
pub fn parse_git_remote(url: &str) -> Option<GithubRepo> {
    let captures = GITHUB_REMOTE.captures(url.trim())?;
    Some(GithubRepo {
        owner: captures[1].to_string(),
        name: captures[2].to_string(),
    })
}

fn git(dir: &Path, args: &[&str]) -> Result<String, DeployError> {
    tracing::debug!("Running git {} in {}", args.join(" "), dir.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| DeployError::Git {
            command: args.join(" "),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(DeployError::Git {
            command: args.join(" "),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Options for [`publish_to_ghpages`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Commit and push the project source before publishing.
    pub update_source: bool,

    /// Update the local `gh-pages` branch without pushing.
    pub no_push: bool,
}

/// Commit `stage` as the sole content of `gh-pages` in the repository at `project_dir`.
///
/// Returns the GitHub repository the pages belong to.
pub fn publish_to_ghpages(
    project_dir: &Path,
    stage: &Path,
    options: PublishOptions,
) -> Result<GithubRepo, DeployError> {
    if git(project_dir, &["rev-parse", "--is-inside-work-tree"]).is_err() {
        tracing::error!(
            "Before deploying, your project must be under version control using git and connected to a GitHub repository."
        );
        return Err(DeployError::NotGitRepo(project_dir.to_path_buf()));
    }

    let remote = git(project_dir, &["remote", "get-url", "origin"]).unwrap_or_default();
    let repo = parse_git_remote(&remote).ok_or_else(|| DeployError::NoGithubRemote(remote.clone()))?;
    tracing::info!("Publishing to https://github.com/{}/{}", repo.owner, repo.name);

    if options.update_source {
        update_source(project_dir, options.no_push)?;
    }

    fs::write(stage.join(".nojekyll"), "").map_err(|e| DeployError::io(stage, e))?;

    let scratch = tempfile::Builder::new()
        .prefix("ptxcli_")
        .tempdir()
        .map_err(|e| DeployError::io(std::env::temp_dir(), e))?;
    let pages = scratch.path();
    copy_dir(stage, pages).map_err(|e| DeployError::io(stage, e))?;

    let identity = identity(project_dir);
    let mut commit: Vec<&str> = Vec::new();
    for setting in &identity {
        commit.push("-c");
        commit.push(setting);
    }
    commit.extend(["commit", "--quiet", "-m", "Update to PreTeXt deployment."]);

    git(pages, &["init", "--quiet"])?;
    git(pages, &["checkout", "--quiet", "-b", PAGES_BRANCH])?;
    git(pages, &["add", "--all"])?;
    git(pages, &commit)?;

    let scratch_path = pages.to_string_lossy().into_owned();
    let refspec = format!("+{}:{}", PAGES_BRANCH, PAGES_BRANCH);
    git(project_dir, &["fetch", "--quiet", &scratch_path, &refspec])?;
    tracing::info!("Committed the staged site to the local {} branch.", PAGES_BRANCH);

    if options.no_push {
        tracing::info!("Skipping push; run `git push --force origin {}` to publish.", PAGES_BRANCH);
    } else {
        git(project_dir, &["push", "--force", "origin", PAGES_BRANCH])?;
        tracing::info!("Pushed {} to GitHub.", PAGES_BRANCH);
    }
    Ok(repo)
}

fn update_source(project_dir: &Path, no_push: bool) -> Result<(), DeployError> {
    let status = git(project_dir, &["status", "--porcelain"])?;
    if status.is_empty() {
        tracing::info!("No uncommitted changes to the project source.");
    } else {
        tracing::info!("Committing changes to the project source.");
        git(project_dir, &["add", "--all"])?;
        git(project_dir, &["commit", "--quiet", "-m", "Update to PreTeXt project source."])?;
    }
    if !no_push {
        let branch = git(project_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        git(project_dir, &["push", "origin", &branch])?;
    }
    Ok(())
}

/// `user.name`/`user.email` settings from the project repository, for the scratch commit.
fn identity(project_dir: &Path) -> Vec<String> {
    ["user.name", "user.email"]
        .into_iter()
        .filter_map(|key| {
            git(project_dir, &["config", key])
                .ok()
                .filter(|value| !value.is_empty())
                .map(|value| format!("{}={}", key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn repo(owner: &str, name: &str) -> GithubRepo {
        GithubRepo {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn parses_github_remotes() {
        assert_eq!(parse_git_remote("git@github.com:octo/book.git"), Some(repo("octo", "book")));
        assert_eq!(parse_git_remote("https://github.com/octo/book.git"), Some(repo("octo", "book")));
        assert_eq!(parse_git_remote("https://github.com/octo/book/"), Some(repo("octo", "book")));
        assert_eq!(parse_git_remote("https://github.com/octo/book\n"), Some(repo("octo", "book")));
        assert_eq!(parse_git_remote("https://gitlab.com/octo/book.git"), None);
        assert_eq!(parse_git_remote(""), None);
    }

    #[test]
    fn pages_urls() {
        assert_eq!(repo("octo", "book").pages_url(), "https://octo.github.io/book/");
        assert_eq!(repo("octo", "octo.github.io").pages_url(), "https://octo.github.io/");
    }

    #[test]
    fn refuses_non_git_directories() {
        let temp = tempfile::tempdir().unwrap();

        let err = publish_to_ghpages(temp.path(), temp.path(), PublishOptions::default()).unwrap_err();

        assert!(matches!(err, DeployError::NotGitRepo(_)));
    }
}
