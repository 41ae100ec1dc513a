//! The seam between the CLI and the external PreTeXt core.
//!
//! The core is a versioned bundle of XSL stylesheets and a Python driver
//! script. Everything the CLI needs from it goes through [`CoreEngine`], so
//! the orchestration code can be exercised without the bundle installed.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use pretext_project::paths::home_path;
use pretext_project::{BrailleMode, Compression, Executables, Format, LatexEngine, Server, VERSION};

use crate::error::EngineError;

/// Environment variable naming the core bundle directory.
pub const CORE_ENV: &str = "PTX_CORE";

/// Environment variable naming the Python interpreter used to run the core.
pub const PYTHON_ENV: &str = "PTX_PYTHON";

/// Prefix of the environment variables carrying `executables.ptx` settings.
pub const EXECUTABLE_ENV_PREFIX: &str = "PTX_EXEC_";

const STDERR_TAIL: usize = 20;

/// A full conversion of a source document into one output format.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildJob {
    pub format: Format,
    pub source: PathBuf,
    pub publication: PathBuf,
    pub stringparams: BTreeMap<String, String>,
    pub dest_dir: PathBuf,
    pub out_file: Option<PathBuf>,
    pub xmlid: Option<String>,
    pub extra_xsl: Option<PathBuf>,
    pub latex_engine: LatexEngine,
    pub braille_mode: BrailleMode,
    pub compression: Option<Compression>,

    /// `svg` for ePub, `kindle` for Kindle.
    pub math_format: Option<&'static str>,
}

/// Generation of one kind of asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetJob {
    /// Core component name, e.g. `latex-image` or `youtube`.
    pub component: String,
    pub source: PathBuf,
    pub publication: PathBuf,
    pub stringparams: BTreeMap<String, String>,
    pub dest_dir: PathBuf,
    pub outformat: Option<String>,
    pub xmlid: Option<String>,

    /// LaTeX engine or Asymptote method, for components that take one.
    pub method: Option<String>,
    pub servers: Vec<Server>,
}

/// Operations provided by the core.
pub trait CoreEngine: Send + Sync {
    /// Convert a whole document.
    fn build(&self, job: &BuildJob) -> Result<(), EngineError>;

    /// Produce one kind of asset.
    fn generate(&self, job: &AssetJob) -> Result<(), EngineError>;

    /// Run the core with raw arguments, returning its exit code.
    fn passthrough(&self, args: &[String]) -> Result<i32, EngineError>;

    /// Directory of the core's XSL, copied next to custom stylesheets.
    fn xsl_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Runs the core's driver script as a child process.
#[derive(Debug, Clone)]
pub struct SubprocessEngine {
    core_dir: PathBuf,
    python: String,
    executables: Executables,
}

impl SubprocessEngine {
    pub fn new(core_dir: impl Into<PathBuf>, python: impl Into<String>) -> Self {
        Self {
            core_dir: core_dir.into(),
            python: python.into(),
            executables: Executables::default(),
        }
    }

    /// Pass the project's external program settings to the core.
    pub fn with_executables(mut self, executables: Executables) -> Self {
        self.executables = executables;
        self
    }

    pub fn core_dir(&self) -> &Path {
        &self.core_dir
    }

    fn script(&self) -> PathBuf {
        self.core_dir.join("pretext").join("pretext")
    }

    fn command(&self) -> Result<Command, EngineError> {
        let script = self.script();
        if !script.is_file() {
            return Err(EngineError::CoreMissing(self.core_dir.clone()));
        }
        let mut command = Command::new(&self.python);
        command.arg(script);
        for (name, value) in self.executables.as_pairs() {
            if value != "None" {
                command.env(executable_env(name), value);
            }
        }
        Ok(command)
    }

    fn run(&self, component: &str, args: Vec<OsString>) -> Result<(), EngineError> {
        let mut command = self.command()?;
        command.args(&args);
        tracing::debug!("Running core: {:?}", command);

        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::Spawn {
                program: self.python.clone(),
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!("{}", line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            tracing::debug!("{}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed {
                component: component.to_string(),
                status: output.status.to_string(),
                stderr: tail(&stderr, STDERR_TAIL),
            })
        }
    }
}

impl CoreEngine for SubprocessEngine {
    fn build(&self, job: &BuildJob) -> Result<(), EngineError> {
        self.run(job.format.as_str(), build_args(job))
    }

    fn generate(&self, job: &AssetJob) -> Result<(), EngineError> {
        self.run(&job.component, asset_args(job))
    }

    fn passthrough(&self, args: &[String]) -> Result<i32, EngineError> {
        let mut command = self.command()?;
        let status = command
            .args(args)
            .status()
            .map_err(|source| EngineError::Spawn {
                program: self.python.clone(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }

    fn xsl_dir(&self) -> Option<PathBuf> {
        let dir = self.core_dir.join("xsl");
        dir.is_dir().then_some(dir)
    }
}

/// Core bundle location: `PTX_CORE`, else `<home>/<version>/core`.
pub fn default_core_dir() -> PathBuf {
    match std::env::var_os(CORE_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => home_path().join(VERSION).join("core"),
    }
}

/// Interpreter running the core: `PTX_PYTHON`, else the platform default.
pub fn default_python() -> String {
    match std::env::var(PYTHON_ENV) {
        Ok(python) if !python.is_empty() => python,
        _ if cfg!(windows) => "python".to_string(),
        _ => "python3".to_string(),
    }
}

pub fn executable_env(name: &str) -> String {
    format!("{}{}", EXECUTABLE_ENV_PREFIX, name.to_uppercase())
}

/// Name the driver script uses for a build format.
fn core_format(job: &BuildJob) -> String {
    match job.format {
        Format::Html if job.compression == Some(Compression::Zip) => "html-zip".to_string(),
        Format::Html if job.compression == Some(Compression::Scorm) => "html-scorm".to_string(),
        Format::Epub | Format::Kindle => format!("epub-{}", job.math_format.unwrap_or("svg")),
        Format::Braille => format!("braille-{}", job.braille_mode),
        Format::Webwork if job.compression.is_some() => "webwork-sets-zipped".to_string(),
        Format::Webwork => "webwork-sets".to_string(),
        other => other.as_str().to_string(),
    }
}

fn push_common(
    args: &mut Vec<OsString>,
    publication: &Path,
    stringparams: &BTreeMap<String, String>,
    xmlid: Option<&str>,
    dest_dir: &Path,
) {
    args.push("-p".into());
    args.push(publication.into());
    for (key, value) in stringparams {
        args.push("-x".into());
        args.push(key.into());
        args.push(value.into());
    }
    if let Some(xmlid) = xmlid {
        args.push("-r".into());
        args.push(xmlid.into());
    }
    args.push("-d".into());
    args.push(dest_dir.into());
}

/// Arguments of the driver script for a document build.
pub fn build_args(job: &BuildJob) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-c".into(), "all".into(), "-f".into(), core_format(job).into()];
    push_common(
        &mut args,
        &job.publication,
        &job.stringparams,
        job.xmlid.as_deref(),
        &job.dest_dir,
    );
    if let Some(out_file) = &job.out_file {
        args.push("-o".into());
        args.push(out_file.into());
    }
    if let Some(xsl) = &job.extra_xsl {
        args.push("-e".into());
        args.push(xsl.into());
    }
    if job.format == Format::Pdf {
        args.push("-m".into());
        args.push(job.latex_engine.as_str().into());
    }
    args.push(job.source.clone().into());
    args
}

/// Arguments of the driver script for asset generation.
pub fn asset_args(job: &AssetJob) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-c".into(), job.component.clone().into()];
    if let Some(outformat) = &job.outformat {
        args.push("-f".into());
        args.push(outformat.into());
    }
    push_common(
        &mut args,
        &job.publication,
        &job.stringparams,
        job.xmlid.as_deref(),
        &job.dest_dir,
    );
    if let Some(method) = &job.method {
        args.push("-m".into());
        args.push(method.into());
    }
    for server in &job.servers {
        args.push("-s".into());
        args.push(server.name.as_str().into());
        args.push(server.url.clone().into());
    }
    args.push(job.source.clone().into());
    args
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs;
    use std::sync::Mutex;

    use super::*;

    /// Records every call and optionally writes files into the destination.
    #[derive(Default)]
    pub struct RecordingEngine {
        pub builds: Mutex<Vec<BuildJob>>,
        pub assets: Mutex<Vec<AssetJob>>,

        /// Components that fail when asked to generate.
        pub failing: Vec<String>,

        /// (component, file name) pairs written into `dest_dir` on success.
        pub produces: Vec<(String, String)>,
    }

    impl RecordingEngine {
        pub fn components(&self) -> Vec<String> {
            self.assets
                .lock()
                .unwrap()
                .iter()
                .map(|job| job.component.clone())
                .collect()
        }
    }

    impl CoreEngine for RecordingEngine {
        fn build(&self, job: &BuildJob) -> Result<(), EngineError> {
            fs::create_dir_all(&job.dest_dir).unwrap();
            fs::write(job.dest_dir.join("index.html"), "<html/>").unwrap();
            self.builds.lock().unwrap().push(job.clone());
            Ok(())
        }

        fn generate(&self, job: &AssetJob) -> Result<(), EngineError> {
            self.assets.lock().unwrap().push(job.clone());
            if self.failing.contains(&job.component) {
                return Err(EngineError::Failed {
                    component: job.component.clone(),
                    status: "exit status: 1".to_string(),
                    stderr: "boom".to_string(),
                });
            }
            for (component, file) in &self.produces {
                if component == &job.component {
                    fs::create_dir_all(&job.dest_dir).unwrap();
                    fs::write(job.dest_dir.join(file), component).unwrap();
                }
            }
            Ok(())
        }

        fn passthrough(&self, _args: &[String]) -> Result<i32, EngineError> {
            Ok(0)
        }
    }
}
