//! A PreTeXt project: the manifest plus everything resolved against its directory.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ProjectError;
use crate::executables::Executables;
use crate::legacy;
use crate::overlay::ShadowXmlDocument;
use crate::paths::PROJECT_FILE;
use crate::resources::{self, BoilerplateAction};
use crate::target::{
    check_unique_servers, reject_unknown_attributes, AsyMethod, Format, ProjectContext,
    ProjectPaths, Server, Target,
};
use crate::templates;
use crate::xml::{self, Element};

const PROJECT_ATTRIBUTES: &[&str] = &[
    "ptx-version",
    "source",
    "publication",
    "output-dir",
    "site",
    "stage",
    "xsl",
    "generated-cache",
    "asy-method",
];

/// How the deployment stage is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStrategy {
    /// No target opts into deployment; the default target is deployed alone.
    DefaultTarget,
    /// Deploy targets plus a generated landing page.
    GeneratedSite,
    /// Deploy targets plus a landing page customized by `site.ptx` or `site.json`.
    CustomSite,
    /// Deploy targets plus the static contents of the site directory.
    Static,
}

impl fmt::Display for DeployStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployStrategy::DefaultTarget => "default_target",
            DeployStrategy::GeneratedSite => "generated_site",
            DeployStrategy::CustomSite => "custom_site",
            DeployStrategy::Static => "static",
        })
    }
}

/// Options for [`Project::parse_with`].
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Overrides applied to the manifest before it is read.
    pub overlay: Option<ShadowXmlDocument>,

    /// Installed resource directory; defaults to [`resources::resource_base_path`].
    pub resources: Option<PathBuf>,
}

/// A project rooted at the directory containing its manifest.
#[derive(Debug, Clone)]
pub struct Project {
    /// Path of the manifest file.
    path: PathBuf,

    pub source: PathBuf,
    pub publication: PathBuf,
    pub output_dir: PathBuf,
    pub site: PathBuf,
    pub stage: PathBuf,
    pub xsl: PathBuf,
    pub generated_cache: PathBuf,
    pub asy_method: AsyMethod,
    pub servers: Vec<Server>,

    targets: Vec<Target>,
    executables: Executables,
    resources: PathBuf,
    legacy: bool,
}

impl Project {
    /// A project with default settings and no targets, rooted at `dir`.
    pub fn new(dir: &Path) -> Self {
        Self::with_resources(dir, resources::resource_base_path())
    }

    fn with_resources(dir: &Path, resources: PathBuf) -> Self {
        let dir = absolute(dir);
        Self {
            path: dir.join(PROJECT_FILE),
            source: PathBuf::from("source"),
            publication: PathBuf::from("publication"),
            output_dir: PathBuf::from("output"),
            site: PathBuf::from("site"),
            stage: PathBuf::from("output/stage"),
            xsl: PathBuf::from("xsl"),
            generated_cache: PathBuf::from(".cache"),
            asy_method: AsyMethod::default(),
            servers: Vec::new(),
            targets: Vec::new(),
            executables: Executables::default(),
            resources,
            legacy: false,
        }
    }

    /// Parse the manifest at `path`, or `path/project.ptx` when `path` is a directory.
    pub fn parse(path: &Path) -> Result<Self, ProjectError> {
        Self::parse_with(path, ParseOptions::default())
    }

    pub fn parse_with(path: &Path, options: ParseOptions) -> Result<Self, ProjectError> {
        let path = absolute(path);
        let path = if path.is_dir() { path.join(PROJECT_FILE) } else { path };
        let mut root = xml::parse_file(&path)?;
        if root.name != "project" {
            return Err(ProjectError::UnexpectedRoot {
                expected: "project".to_string(),
                found: root.name,
            });
        }

        if let Some(overlay) = &options.overlay {
            for message in overlay.overlay_tree(&mut root) {
                tracing::info!("Override: {}", message);
            }
        }

        let dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        let resources = options
            .resources
            .unwrap_or_else(resources::resource_base_path);
        let mut project = Self::with_resources(&dir, resources);
        project.path = path;

        match root.attr("ptx-version") {
            Some(version) if version.trim() == "2" => project.read_manifest(&root)?,
            Some(other) => {
                return Err(ProjectError::InvalidValue {
                    attribute: "ptx-version".to_string(),
                    value: other.to_string(),
                    expected: "2".to_string(),
                })
            }
            None => project.read_legacy_manifest(&root, &dir)?,
        }

        Ok(project)
    }

    fn read_manifest(&mut self, root: &Element) -> Result<(), ProjectError> {
        reject_unknown_attributes(root, PROJECT_ATTRIBUTES)?;
        let path_attrs: [(&str, &mut PathBuf); 7] = [
            ("source", &mut self.source),
            ("publication", &mut self.publication),
            ("output-dir", &mut self.output_dir),
            ("site", &mut self.site),
            ("stage", &mut self.stage),
            ("xsl", &mut self.xsl),
            ("generated-cache", &mut self.generated_cache),
        ];
        for (name, slot) in path_attrs {
            if let Some(value) = root.attr(name) {
                *slot = PathBuf::from(value.trim());
            }
        }
        if let Some(method) = root.attr("asy-method") {
            self.asy_method = method.parse()?;
        }

        for child in root.elements() {
            match child.name.as_str() {
                "targets" => {}
                "server" => self.servers.push(Server::from_element(child)?),
                other => {
                    return Err(ProjectError::InvalidProject(format!(
                        "unexpected element <{}> in the project manifest",
                        other
                    )))
                }
            }
        }
        check_unique_servers(&self.servers).map_err(ProjectError::InvalidProject)?;

        self.executables = Executables::load(self.abspath())?;

        if let Some(targets) = root.child("targets") {
            for element in targets.children_named("target") {
                let target = Target::from_element(element)?;
                self.add_target(target)?;
            }
        }
        Ok(())
    }

    fn read_legacy_manifest(&mut self, root: &Element, dir: &Path) -> Result<(), ProjectError> {
        tracing::debug!("Reading a legacy project manifest");
        self.legacy = true;
        // Legacy target paths are relative to the project directory itself.
        for slot in [
            &mut self.source,
            &mut self.publication,
            &mut self.output_dir,
            &mut self.site,
            &mut self.xsl,
        ] {
            *slot = PathBuf::new();
        }
        let manifest = legacy::translate(root, dir)?;
        self.executables = manifest.executables;
        for target in manifest.targets {
            self.add_target(target)?;
        }
        Ok(())
    }

    /// Project used to build a lone source file outside of any project.
    pub fn standalone(source: &Path) -> Result<(Self, Vec<String>), ProjectError> {
        let source = absolute(source);
        let dir = source.parent().unwrap_or(Path::new("")).to_path_buf();
        let file_name = source
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| ProjectError::InvalidProject(format!("{} is not a file", source.display())))?;

        let root = xml::parse_str(templates::STANDALONE_PROJECT_PTX)?;
        let mut project = Self::new(&dir);
        project.read_manifest(&root)?;
        for target in &mut project.targets {
            target.source = file_name.clone();
        }
        let names = project.target_names(&[]);
        Ok((project, names))
    }

    /// Attach a target to this project, finishing its validation.
    pub fn add_target(&mut self, mut target: Target) -> Result<&Target, ProjectError> {
        if self.targets.iter().any(|t| t.name == target.name) {
            return Err(ProjectError::InvalidProject(format!(
                "the target name '{}' is used more than once",
                target.name
            )));
        }
        let context = ProjectContext {
            paths: self.paths(),
            asy_method: self.asy_method,
            servers: &self.servers,
        };
        target.attach(&context);
        self.targets.push(target);
        Ok(&self.targets[self.targets.len() - 1])
    }

    /// Create and attach a target with default settings.
    pub fn new_target(&mut self, name: &str, format: Format) -> Result<&Target, ProjectError> {
        let target = Target::new(name, format)?;
        self.add_target(target)
    }

    /// Look up a target.
    ///
    /// `None` selects the first target. An unknown name falls back to the
    /// first target whose format equals the name.
    pub fn target(&self, name: Option<&str>) -> Option<&Target> {
        let Some(name) = name else {
            return self.targets.first();
        };
        if let Some(target) = self.targets.iter().find(|t| t.name == name) {
            return Some(target);
        }
        let target = self.targets.iter().find(|t| t.format.as_str() == name)?;
        tracing::warn!(
            "Could not find a target '{}', but found a target '{}' with format='{}'; using this target.",
            name,
            target.name,
            name
        );
        Some(target)
    }

    pub fn target_mut(&mut self, name: &str) -> Option<&mut Target> {
        self.targets.iter_mut().find(|t| t.name == name)
    }

    pub fn has_target(&self, name: Option<&str>) -> bool {
        self.target(name).is_some()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Names of targets whose format is one of `formats`, or all names when empty.
    pub fn target_names(&self, formats: &[Format]) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| formats.is_empty() || formats.contains(&t.format))
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn deploy_targets(&self) -> Vec<&Target> {
        self.targets.iter().filter(|t| t.to_deploy()).collect()
    }

    pub fn standalone_targets(&self) -> Vec<&Target> {
        self.targets.iter().filter(|t| t.is_standalone()).collect()
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub fn manifest_path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the manifest.
    pub fn abspath(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    pub fn source_abspath(&self) -> PathBuf {
        self.abspath().join(&self.source)
    }

    pub fn publication_abspath(&self) -> PathBuf {
        self.abspath().join(&self.publication)
    }

    pub fn output_dir_abspath(&self) -> PathBuf {
        self.abspath().join(&self.output_dir)
    }

    pub fn site_abspath(&self) -> PathBuf {
        self.abspath().join(&self.site)
    }

    pub fn stage_abspath(&self) -> PathBuf {
        self.abspath().join(&self.stage)
    }

    pub fn xsl_abspath(&self) -> PathBuf {
        self.abspath().join(&self.xsl)
    }

    pub fn generated_cache_abspath(&self) -> PathBuf {
        self.abspath().join(&self.generated_cache)
    }

    /// Installed resource directory used for default publication files.
    pub fn resources_path(&self) -> &Path {
        &self.resources
    }

    pub fn paths(&self) -> ProjectPaths {
        ProjectPaths {
            root: self.abspath().to_path_buf(),
            source: self.source_abspath(),
            publication: self.publication_abspath(),
            output_dir: self.output_dir_abspath(),
            stage: self.stage_abspath(),
            xsl: self.xsl_abspath(),
            generated_cache: self.generated_cache_abspath(),
            output_dir_rel: self.output_dir.clone(),
            stage_rel: self.stage.clone(),
            resources: self.resources.clone(),
        }
    }

    pub fn deploy_strategy(&self) -> DeployStrategy {
        if self.deploy_targets().is_empty() {
            return DeployStrategy::DefaultTarget;
        }
        let site = self.site_abspath();
        if !site.exists() {
            return DeployStrategy::GeneratedSite;
        }
        if site.join("site.ptx").exists() || site.join("site.json").exists() {
            return DeployStrategy::CustomSite;
        }
        DeployStrategy::Static
    }

    pub fn is_git_managed(&self) -> bool {
        self.abspath().join(".git").exists()
    }

    pub fn executables(&self) -> &Executables {
        &self.executables
    }

    /// Refresh the managed boilerplate files of this project.
    pub fn update_boilerplate(
        &self,
        backup: bool,
        force: bool,
    ) -> Result<Vec<BoilerplateAction>, ProjectError> {
        resources::update_boilerplate(self.abspath(), self.is_git_managed(), backup, force)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
