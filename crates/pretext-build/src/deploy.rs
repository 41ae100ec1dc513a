//! Staging built targets into a deployable site and publishing it.

use std::fs;

use pretext_project::paths::{is_proper_subdirectory, to_posix};
use pretext_project::{DeployStrategy, Project};

use crate::error::DeployError;
use crate::fsutil::copy_dir;
use crate::git::{publish_to_ghpages, GithubRepo, PublishOptions};
use crate::site::{apply_customization, render_landing_page, site_context};

/// Options for [`deploy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Commit and push the project source as well.
    pub update_source: bool,

    /// Stop after staging.
    pub stage_only: bool,

    /// Publish the existing stage as is.
    pub skip_staging: bool,

    /// Commit to `gh-pages` locally without pushing.
    pub no_push: bool,
}

/// Assemble the site to deploy in the project's stage directory.
pub fn stage_deployment(project: &Project) -> Result<(), DeployError> {
    let stage = project.stage_abspath();
    if stage.exists() && is_proper_subdirectory(project.abspath(), &stage) {
        fs::remove_dir_all(&stage).map_err(|e| DeployError::io(&stage, e))?;
        tracing::debug!("Removed old stage directory");
    }
    fs::create_dir_all(&stage).map_err(|e| DeployError::io(&stage, e))?;

    let strategy = project.deploy_strategy();
    tracing::info!("Staging deployment according to strategy {}", strategy);

    if strategy == DeployStrategy::DefaultTarget {
        let target = project.target(None).ok_or(DeployError::NoTargets)?;
        let output = target.output_dir_abspath();
        if !output.exists() {
            return Err(DeployError::NotBuilt {
                target: target.name.clone(),
                path: output,
            });
        }
        tracing::info!(
            "Staging latest build located in `{}` at `{}`.",
            output.display(),
            stage.display()
        );
        copy_dir(&output, &stage).map_err(|e| DeployError::io(&output, e))?;
        tracing::info!("Deployment is now staged at `{}`.", stage.display());
        return Ok(());
    }

    let targets = project.deploy_targets();
    for target in &targets {
        let output = target.output_dir_abspath();
        if !output.exists() {
            tracing::warn!(
                "No build for `{}` was found in the directory `{}`. Try running `pretext build {}` to build this component first.",
                target.name,
                output.display(),
                target.name
            );
            tracing::info!("Skipping this target for now.");
            continue;
        }
        let dest = target.deploy_dir_abspath();
        copy_dir(&output, &dest).map_err(|e| DeployError::io(&output, e))?;
        tracing::info!("Staging `{}` at `{}`.", target.name, dest.display());
    }

    // The site goes last so it can replace files from the targets.
    let site = project.site_abspath();
    if strategy == DeployStrategy::Static {
        tracing::info!(
            "Staging custom static site located in `{}` at `{}`.",
            site.display(),
            stage.display()
        );
        copy_dir(&site, &stage).map_err(|e| DeployError::io(&site, e))?;
    } else {
        if strategy == DeployStrategy::CustomSite {
            tracing::warn!("Support for customizing websites generated by PreTeXt-CLI is experimental!");
            tracing::warn!("Configurations are subject to change from version-to-version without notice.");
            tracing::warn!("Discussion: https://github.com/PreTeXtBook/pretext-cli/discussions/766");
        }
        tracing::info!("Staging generated site at `{}`.", stage.display());
        let source = match targets.first() {
            Some(target) => target.source_element()?,
            None => return Err(DeployError::NoTargets),
        };
        let links: Vec<(String, String)> = targets
            .iter()
            .map(|target| (capitalize(&target.name), to_posix(&target.deploy_path())))
            .collect();
        let mut context = site_context(&source, &links);
        if strategy == DeployStrategy::CustomSite {
            apply_customization(&mut context, &site)?;
        }
        let html = render_landing_page(&context)?;
        let index = stage.join("index.html");
        fs::write(&index, html).map_err(|e| DeployError::io(&index, e))?;
    }
    tracing::info!("Deployment is now staged at `{}`.", stage.display());
    Ok(())
}

/// Stage (unless skipped) and publish to GitHub Pages (unless only staging).
///
/// Returns the repository when something was published.
pub fn deploy(project: &Project, options: DeployOptions) -> Result<Option<GithubRepo>, DeployError> {
    if !options.skip_staging {
        stage_deployment(project)?;
    }
    if options.stage_only {
        return Ok(None);
    }
    let repo = publish_to_ghpages(
        project.abspath(),
        &project.stage_abspath(),
        PublishOptions {
            update_source: options.update_source,
            no_push: options.no_push,
        },
    )?;
    Ok(Some(repo))
}

/// First letter upper case, the rest lower case.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
