//! Building a single target.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use pretext_project::xml::{self, Element};
use pretext_project::{short_version, Format, Target};

use crate::codechat;
use crate::engine::{BuildJob, CoreEngine};
use crate::error::BuildError;
use crate::fsutil::{copy_dir, remove_dir_within};
use crate::validate::xml_syntax_is_valid;

/// Options for [`Builder::build`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Remove the output directory first.
    pub clean: bool,

    /// Generate changed assets before building.
    pub generate: bool,

    /// Build only the subtree rooted at this `xml:id` (html and revealjs).
    pub xmlid: Option<String>,

    /// Skip knowls in HTML output.
    pub no_knowls: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            clean: false,
            generate: true,
            xmlid: None,
            no_knowls: false,
        }
    }
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildResult {
    pub output_dir: PathBuf,
    pub duration_ms: u64,
}

/// Drives the core engine for one target.
pub struct Builder<'a> {
    pub(crate) target: &'a Target,
    pub(crate) engine: &'a dyn CoreEngine,
}

impl<'a> Builder<'a> {
    pub fn new(target: &'a Target, engine: &'a dyn CoreEngine) -> Self {
        Self { target, engine }
    }

    pub fn target(&self) -> &Target {
        self.target
    }

    /// The target's stringparams plus the CLI version.
    pub(crate) fn stringparams(&self) -> BTreeMap<String, String> {
        let mut params = self.target.stringparams.clone();
        params.insert("cli.version".to_string(), short_version().to_string());
        params
    }

    pub fn build(&self, options: &BuildOptions) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let target = self.target;
        let mut stringparams = self.stringparams();

        let source = target.source_abspath();
        if !xml_syntax_is_valid(&source, "pretext") {
            return Err(BuildError::InvalidSyntax(source));
        }
        let publication = target.publication_abspath();
        if !xml_syntax_is_valid(&publication, "publication") {
            return Err(BuildError::InvalidSyntax(publication));
        }

        if target.is_runestone() {
            let ids = document_ids(&target.source_element()?);
            if ids != 1 {
                return Err(BuildError::DocumentId(ids));
            }
            stringparams.insert("host-platform".to_string(), "runestone".to_string());
            if platform_host(&publication).as_deref() != Some("runestone") {
                tracing::warn!(
                    "The platform host in the publication file is not set to runestone. Since the requested target has @platform='runestone', we will override the publication file's platform host."
                );
            }
        }

        if options.clean {
            self.clean_output()?;
        }

        self.ensure_asset_directories(None)?;
        self.ensure_webwork_reps()?;

        if options.generate {
            self.generate_assets(&crate::GenerateOptions {
                xmlid: options.xmlid.clone(),
                ..Default::default()
            })?;
        }

        let output_dir = target.output_dir_abspath();
        tracing::debug!(
            "Ensuring output directory for {}: {}",
            target.name,
            output_dir.display()
        );
        fs::create_dir_all(&output_dir).map_err(|e| BuildError::io(&output_dir, e))?;

        if options.no_knowls {
            stringparams.insert("debug.skip-knowls".to_string(), "yes".to_string());
        }

        if stringparams.contains_key("publisher") {
            tracing::warn!(
                "You specified a publication file via a stringparam. This is ignored in favor of the publication file given by the `publication` element in the project manifest."
            );
        }
        if target.format == Format::Custom {
            stringparams.insert(
                "publisher".to_string(),
                pretext_project::paths::to_posix(&publication),
            );
        }

        // Holds the copied stylesheets until the engine is done with them.
        let xsl_dir = tempfile::Builder::new()
            .prefix("ptxcli_")
            .tempdir()
            .map_err(|e| BuildError::io(std::env::temp_dir(), e))?;
        let extra_xsl = match target.xsl_abspath() {
            Some(xsl) => {
                tracing::info!("Building with custom xsl {}", xsl.display());
                Some(self.copy_custom_xsl(&xsl, &xsl_dir.path().join("cli_xsl"))?)
            }
            None => None,
        };

        tracing::info!("Preparing to build into {}.", output_dir.display());
        if target.format == Format::Braille {
            tracing::warn!(
                "Braille output is still experimental, and requires additional libraries from liblouis (specifically the file2brl software)."
            );
        }

        let job = BuildJob {
            format: target.format,
            source: source.clone(),
            publication,
            stringparams,
            dest_dir: output_dir.clone(),
            out_file: target.output_file_abspath(),
            xmlid: match target.format {
                Format::Html | Format::Revealjs => options.xmlid.clone(),
                _ => None,
            },
            extra_xsl,
            latex_engine: target.latex_engine,
            braille_mode: target.braille_mode,
            compression: target.compression,
            math_format: match target.format {
                Format::Epub => Some("svg"),
                Format::Kindle => Some("kindle"),
                _ => None,
            },
        };
        self.engine.build(&job)?;

        match target.format {
            Format::Html => {
                if let Err(e) =
                    codechat::map_path_to_xml_id(&source, target.project_root(), &output_dir)
                {
                    tracing::warn!("Failed to map codechat path to xml id; codechat will not work.");
                    tracing::debug!("Error: {}", e);
                }
            }
            Format::Latex | Format::Custom => self.copy_asset_directories(&output_dir)?,
            _ => {}
        }

        Ok(BuildResult {
            output_dir,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Copy the directory holding `xsl` into `dest`, with the core's XSL under `dest/core`.
    fn copy_custom_xsl(&self, xsl: &Path, dest: &Path) -> Result<PathBuf, BuildError> {
        let xsl_dir = xsl.parent().unwrap_or(Path::new(""));
        tracing::debug!("Copying all files in {} to {}", xsl_dir.display(), dest.display());
        copy_dir(xsl_dir, dest).map_err(|e| BuildError::io(xsl_dir, e))?;
        if let Some(core_xsl) = self.engine.xsl_dir() {
            tracing::debug!("Copying core XSL to {}", dest.join("core").display());
            copy_dir(&core_xsl, &dest.join("core")).map_err(|e| BuildError::io(&core_xsl, e))?;
        }
        let name = xsl.file_name().unwrap_or_default();
        Ok(dest.join(name))
    }

    /// LaTeX output refers to external and generated files by relative path.
    fn copy_asset_directories(&self, output_dir: &Path) -> Result<(), BuildError> {
        for (from, name) in [
            (self.target.external_dir_abspath()?, "external"),
            (self.target.generated_dir_abspath()?, "generated"),
        ] {
            if from.exists() {
                let to = output_dir.join(name);
                copy_dir(&from, &to).map_err(|e| BuildError::io(&from, e))?;
            }
        }
        Ok(())
    }

    /// Make sure the external and generated directories exist, plus the
    /// directories `asset` writes into.
    pub fn ensure_asset_directories(
        &self,
        asset: Option<pretext_project::AssetType>,
    ) -> Result<(), BuildError> {
        let generated = self.target.generated_dir_abspath()?;
        let mut dirs = vec![self.target.external_dir_abspath()?, generated.clone()];
        if let Some(asset) = asset {
            dirs.extend(asset.directories().iter().map(|dir| generated.join(dir)));
        }
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn clean_output(&self) -> Result<(), BuildError> {
        let output_dir = self.target.output_dir_abspath();
        remove_dir_within(self.target.project_root(), &output_dir, "output")
            .map_err(|e| BuildError::io(&output_dir, e))?;
        Ok(())
    }

    pub fn clean_assets(&self) -> Result<(), BuildError> {
        for dir in [
            self.target.generated_dir_abspath()?,
            self.target.generated_cache_abspath(),
        ] {
            remove_dir_within(self.target.project_root(), &dir, "assets")
                .map_err(|e| BuildError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Number of `docinfo/document-id` elements in the source.
fn document_ids(root: &Element) -> usize {
    root.descendants()
        .into_iter()
        .filter(|element| element.name == "docinfo")
        .map(|docinfo| docinfo.children_named("document-id").count())
        .sum()
}

/// `publication/platform/@host`, if set.
fn platform_host(publication: &Path) -> Option<String> {
    let root = xml::parse_file(publication).ok()?;
    root.child("platform")?.attr("host").map(str::to_string)
}
