//! Build targets declared in a project manifest.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ProjectError;
use crate::paths::normalize_path;
use crate::publication::PublicationSubset;
use crate::xml::{self, Element};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $attribute:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ProjectError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ProjectError::InvalidValue {
                        attribute: $attribute.to_string(),
                        value: other.to_string(),
                        expected: [$($text),+].join(", "),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Output formats the core can produce.
    Format, "format" {
        Html => "html",
        Latex => "latex",
        Pdf => "pdf",
        Epub => "epub",
        Kindle => "kindle",
        Braille => "braille",
        Revealjs => "revealjs",
        Webwork => "webwork",
        Custom => "custom",
    }
);

string_enum!(
    BrailleMode, "braille-mode" {
        Emboss => "emboss",
        Electronic => "electronic",
    }
);

string_enum!(
    Compression, "compression" {
        Zip => "zip",
        Scorm => "scorm",
    }
);

string_enum!(
    /// Where an HTML build is meant to be hosted.
    Platform, "platform" {
        Web => "web",
        Runestone => "runestone",
    }
);

string_enum!(
    /// How Asymptote diagrams are rendered.
    AsyMethod, "asy-method" {
        Local => "local",
        Server => "server",
    }
);

string_enum!(
    ServerName, "server name" {
        Sage => "sage",
        Asy => "asy",
    }
);

string_enum!(
    LatexEngine, "latex-engine" {
        Xelatex => "xelatex",
        Latex => "latex",
        Pdflatex => "pdflatex",
    }
);

impl Default for BrailleMode {
    fn default() -> Self {
        Self::Emboss
    }
}

impl Default for LatexEngine {
    fn default() -> Self {
        Self::Xelatex
    }
}

impl Default for AsyMethod {
    fn default() -> Self {
        Self::Server
    }
}

/// A remote service used instead of a local executable for asset generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub name: ServerName,
    pub url: String,
}

impl Server {
    pub(crate) fn from_element(element: &Element) -> Result<Self, ProjectError> {
        reject_unknown_attributes(element, &["name", "url"])?;
        let name = required_attr(element, "name")?.parse()?;
        let url = required_attr(element, "url")?.trim().to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ProjectError::InvalidValue {
                attribute: "server url".to_string(),
                value: url,
                expected: "an http(s) URL".to_string(),
            });
        }
        Ok(Self { name, url })
    }
}

/// Ensure server names are not repeated.
pub(crate) fn check_unique_servers(servers: &[Server]) -> Result<(), String> {
    for (index, server) in servers.iter().enumerate() {
        if servers[..index].iter().any(|s| s.name == server.name) {
            return Err("Server names must not be repeated.".to_string());
        }
    }
    Ok(())
}

/// Absolute project-level locations a target resolves its own paths against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub source: PathBuf,
    pub publication: PathBuf,
    pub output_dir: PathBuf,
    pub stage: PathBuf,
    pub xsl: PathBuf,
    pub generated_cache: PathBuf,

    /// `output-dir` as written in the manifest.
    pub output_dir_rel: PathBuf,

    /// `stage` as written in the manifest.
    pub stage_rel: PathBuf,

    /// Directory holding the installed bundled templates.
    pub resources: PathBuf,
}

/// What a target inherits from its project once attached.
#[derive(Debug, Clone)]
pub(crate) struct ProjectContext<'a> {
    pub paths: ProjectPaths,
    pub asy_method: AsyMethod,
    pub servers: &'a [Server],
}

const TARGET_ATTRIBUTES: &[&str] = &[
    "name",
    "format",
    "source",
    "publication",
    "latex-engine",
    "braille-mode",
    "deploy",
    "deploy-dir",
    "standalone",
    "platform",
    "compression",
    "output-dir",
    "output-filename",
    "asy-method",
    "xsl",
];

/// A single `<target>` of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub format: Format,

    /// Root source file, relative to the project's source directory.
    pub source: PathBuf,

    /// Publication file, relative to the project's publication directory.
    /// Filled in with a default once the target is attached to a project.
    pub publication: Option<PathBuf>,

    pub latex_engine: LatexEngine,
    pub braille_mode: BrailleMode,
    pub stringparams: BTreeMap<String, String>,
    pub deploy: Option<String>,
    pub deploy_dir: Option<PathBuf>,
    pub standalone: Option<String>,
    pub platform: Option<Platform>,
    pub compression: Option<Compression>,

    /// Output directory, relative to the project's output directory.
    pub output_dir: Option<PathBuf>,

    pub output_filename: Option<String>,
    pub asy_method: Option<AsyMethod>,
    pub servers: Vec<Server>,

    /// Custom XSL, relative to the project's xsl directory.
    pub xsl: Option<PathBuf>,

    paths: ProjectPaths,
}

impl Target {
    /// A validated target with default settings.
    pub fn new(name: impl Into<String>, format: Format) -> Result<Self, ProjectError> {
        Self::unvalidated(name.into(), format).validate()
    }

    pub(crate) fn unvalidated(name: String, format: Format) -> Self {
        Self {
            name,
            format,
            source: PathBuf::from("main.ptx"),
            publication: None,
            latex_engine: LatexEngine::default(),
            braille_mode: BrailleMode::default(),
            stringparams: BTreeMap::new(),
            deploy: None,
            deploy_dir: None,
            standalone: None,
            platform: None,
            compression: None,
            output_dir: None,
            output_filename: None,
            asy_method: None,
            servers: Vec::new(),
            xsl: None,
            paths: ProjectPaths::default(),
        }
    }

    /// Read a `<target>` element of a current-style manifest.
    pub fn from_element(element: &Element) -> Result<Self, ProjectError> {
        reject_unknown_attributes(element, TARGET_ATTRIBUTES)?;
        let name = required_attr(element, "name")?.trim().to_string();
        let format = required_attr(element, "format")?.parse()?;
        let mut target = Self::unvalidated(name, format);

        if let Some(source) = element.attr("source") {
            target.source = PathBuf::from(source.trim());
        }
        target.publication = element.attr("publication").map(|p| PathBuf::from(p.trim()));
        if let Some(engine) = element.attr("latex-engine") {
            target.latex_engine = engine.parse()?;
        }
        if let Some(mode) = element.attr("braille-mode") {
            target.braille_mode = mode.parse()?;
        }
        target.deploy = element.attr("deploy").map(|v| v.trim().to_string());
        target.deploy_dir = element.attr("deploy-dir").map(|v| PathBuf::from(v.trim()));
        target.standalone = element.attr("standalone").map(|v| v.trim().to_string());
        target.platform = element.attr("platform").map(str::parse).transpose()?;
        target.compression = element.attr("compression").map(str::parse).transpose()?;
        target.output_dir = element.attr("output-dir").map(|v| PathBuf::from(v.trim()));
        target.output_filename = element.attr("output-filename").map(|v| v.trim().to_string());
        target.asy_method = element.attr("asy-method").map(str::parse).transpose()?;
        target.xsl = element.attr("xsl").map(|v| PathBuf::from(v.trim()));

        for child in element.elements() {
            match child.name.as_str() {
                "stringparams" => {
                    for (key, value) in &child.attributes {
                        target.stringparams.insert(key.clone(), value.clone());
                    }
                }
                "server" => target.servers.push(Server::from_element(child)?),
                other => {
                    return Err(ProjectError::target(
                        &target.name,
                        format!("unexpected element <{}>", other),
                    ))
                }
            }
        }

        target.validate()
    }

    /// Check combinations of settings and fill in format-dependent defaults.
    pub(crate) fn validate(mut self) -> Result<Self, ProjectError> {
        let fail = |message: &str| ProjectError::target(&self.name, message);

        if self.format == Format::Html {
            self.platform.get_or_insert(Platform::Web);
        } else if self.platform.is_some() {
            return Err(fail("Only the HTML format supports the platform attribute."));
        }
        let runestone = self.format == Format::Html && self.platform == Some(Platform::Runestone);

        if self.compression.is_some() {
            if !matches!(self.format, Format::Html | Format::Webwork) {
                return Err(fail("Only the HTML and WeBWorK formats support compression."));
            }
            if runestone {
                return Err(fail(
                    "The HTML format for the Runestone platform does not allow compression.",
                ));
            }
        }

        if self.output_dir.is_some() {
            if runestone {
                return Err(fail("The Runestone format's output-dir must not be specified."));
            }
        } else if !self.is_standalone() {
            self.output_dir = Some(PathBuf::from(&self.name));
        }

        if let Some(filename) = &self.output_filename {
            if self.format == Format::Webwork && self.compression.is_none() {
                return Err(fail(
                    "The output-filename must not be present when the format is WeBWorK without compression.",
                ));
            }
            if self.format == Format::Html && (runestone || self.compression.is_none()) {
                return Err(fail(
                    "The output-filename must not be present when the format is HTML.",
                ));
            }
            if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename.as_str()) {
                return Err(fail("The output-filename must be a file name without a directory."));
            }
        }

        check_unique_servers(&self.servers).map_err(|m| fail(&m))?;

        if self.format == Format::Custom && self.xsl.is_none() {
            return Err(fail("A custom format requires a value for xsl."));
        }

        Ok(self)
    }

    /// Finish validation that depends on the containing project.
    pub(crate) fn attach(&mut self, context: &ProjectContext<'_>) {
        self.paths = context.paths.clone();

        match &self.publication {
            None => {
                let local = self.paths.publication.join("publication.ptx");
                self.publication = Some(if local.exists() {
                    PathBuf::from("publication.ptx")
                } else if self.is_standalone() {
                    self.paths.resources.join("templates").join("standalone-publication.ptx")
                } else {
                    self.paths.resources.join("templates").join("publication.ptx")
                });
            }
            Some(_) => {
                let full = self.publication_abspath();
                if !full.exists() {
                    tracing::warn!(
                        "The target \"{}\" has a specified publication file that does not exist: {}",
                        self.name,
                        full.display()
                    );
                }
            }
        }

        self.asy_method.get_or_insert(context.asy_method);

        for server in context.servers {
            if !self.servers.iter().any(|s| s.name == server.name) {
                self.servers.push(server.clone());
            }
        }
    }

    /// Whether this target is part of a deployment.
    pub fn to_deploy(&self) -> bool {
        match &self.deploy {
            None => self.deploy_dir.is_some(),
            Some(value) => !value.eq_ignore_ascii_case("no"),
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
            .as_deref()
            .is_some_and(|value| !value.eq_ignore_ascii_case("no"))
    }

    pub fn is_runestone(&self) -> bool {
        self.format == Format::Html && self.platform == Some(Platform::Runestone)
    }

    pub fn asy_method(&self) -> AsyMethod {
        self.asy_method.unwrap_or_default()
    }

    pub fn project_root(&self) -> &Path {
        &self.paths.root
    }

    pub fn source_abspath(&self) -> PathBuf {
        self.paths.source.join(&self.source)
    }

    /// Root element of the source after XInclude expansion.
    pub fn source_element(&self) -> Result<Element, ProjectError> {
        Ok(xml::parse_file_with_includes(&self.source_abspath())?)
    }

    pub fn publication_abspath(&self) -> PathBuf {
        match &self.publication {
            Some(publication) => self.paths.publication.join(publication),
            None => self.paths.publication.join("publication.ptx"),
        }
    }

    pub fn output_dir_abspath(&self) -> PathBuf {
        match &self.output_dir {
            Some(output_dir) => self.paths.output_dir.join(output_dir),
            None => {
                let source = self.source_abspath();
                let parent = source.parent().unwrap_or(Path::new("")).to_path_buf();
                if self.format == Format::Pdf || self.compression == Some(Compression::Scorm) {
                    parent
                } else {
                    let stem = source
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    parent.join(format!("{}_{}", stem, self.name))
                }
            }
        }
    }

    pub fn output_dir_relpath(&self) -> PathBuf {
        match &self.output_dir {
            Some(output_dir) => self.paths.output_dir_rel.join(output_dir),
            None => self.output_dir_abspath(),
        }
    }

    /// Full path of the single output file, when one is named.
    pub fn output_file_abspath(&self) -> Option<PathBuf> {
        self.output_filename
            .as_ref()
            .map(|name| self.output_dir_abspath().join(name))
    }

    /// Directory of this target inside the deployment stage, relative to the stage.
    pub fn deploy_dir_path(&self) -> PathBuf {
        self.deploy_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.name))
    }

    pub fn deploy_dir_abspath(&self) -> PathBuf {
        self.paths.stage.join(self.deploy_dir_path())
    }

    pub fn deploy_dir_relpath(&self) -> PathBuf {
        self.paths.stage_rel.join(self.deploy_dir_path())
    }

    /// Link target used on the landing page.
    pub fn deploy_path(&self) -> PathBuf {
        match &self.output_filename {
            Some(name) => self.deploy_dir_path().join(name),
            None => self.deploy_dir_path(),
        }
    }

    pub fn xsl_abspath(&self) -> Option<PathBuf> {
        self.xsl.as_ref().map(|xsl| self.paths.xsl.join(xsl))
    }

    pub fn generated_cache_abspath(&self) -> PathBuf {
        self.paths.generated_cache.clone()
    }

    /// Where the asset hash table of this target is saved.
    pub fn asset_table_path(&self) -> PathBuf {
        self.paths
            .generated_cache
            .join(format!(".{}_assets.json", self.name))
    }

    fn publication_subset(&self) -> Result<PublicationSubset, ProjectError> {
        PublicationSubset::read(&self.publication_abspath())
    }

    fn source_dir(&self) -> PathBuf {
        self.source_abspath()
            .parent()
            .unwrap_or(Path::new(""))
            .to_path_buf()
    }

    pub fn external_dir_abspath(&self) -> Result<PathBuf, ProjectError> {
        let subset = self.publication_subset()?;
        Ok(normalize_path(&self.source_dir().join(subset.external)))
    }

    pub fn generated_dir_abspath(&self) -> Result<PathBuf, ProjectError> {
        let subset = self.publication_subset()?;
        Ok(normalize_path(&self.source_dir().join(subset.generated)))
    }
}

pub(crate) fn required_attr<'a>(element: &'a Element, name: &str) -> Result<&'a str, ProjectError> {
    element
        .attr(name)
        .ok_or_else(|| ProjectError::MissingAttribute {
            element: element.name.clone(),
            attribute: name.to_string(),
        })
}

pub(crate) fn reject_unknown_attributes(
    element: &Element,
    allowed: &[&str],
) -> Result<(), ProjectError> {
    for (key, _) in &element.attributes {
        if key.starts_with("xmlns") || allowed.contains(&key.as_str()) {
            continue;
        }
        return Err(ProjectError::UnknownAttribute {
            element: element.name.clone(),
            attribute: key.clone(),
        });
    }
    Ok(())
}
