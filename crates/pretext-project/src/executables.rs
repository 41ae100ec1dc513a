//! External programs the core shells out to, configured by `executables.ptx`.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::ProjectError;
use crate::target::reject_unknown_attributes;
use crate::xml::{self, Element};

/// File name of the optional executables configuration.
pub const EXECUTABLES_FILE: &str = "executables.ptx";

/// Command names for the external tools used during builds.
#[derive(Debug, Clone, PartialEq)]
pub struct Executables {
    pub latex: String,
    pub pdflatex: String,
    pub xelatex: String,
    pub pdfsvg: String,

    /// `None` lets asset generation fall back to a server.
    pub asy: Option<String>,

    /// `None` lets asset generation fall back to a server.
    pub sage: Option<String>,

    pub pdfpng: String,
    pub pdfeps: String,
    pub node: String,
    pub liblouis: String,
    pub mermaid: String,
}

impl Default for Executables {
    fn default() -> Self {
        Self {
            latex: "latex".to_string(),
            pdflatex: "pdflatex".to_string(),
            xelatex: "xelatex".to_string(),
            pdfsvg: "pdf2svg".to_string(),
            asy: find_executable("asy"),
            sage: find_executable("sage"),
            pdfpng: "convert".to_string(),
            pdfeps: "pdftops".to_string(),
            node: "node".to_string(),
            liblouis: "file2brl".to_string(),
            mermaid: "mmdc".to_string(),
        }
    }
}

const NAMES: &[&str] = &[
    "latex", "pdflatex", "xelatex", "pdfsvg", "asy", "sage", "pdfpng", "pdfeps", "node",
    "liblouis", "mermaid",
];

impl Executables {
    /// Read `executables.ptx` from `dir`, falling back to defaults when it is absent.
    pub fn load(dir: &Path) -> Result<Self, ProjectError> {
        let path = dir.join(EXECUTABLES_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let root = xml::parse_file(&path)?;
        Self::from_element(&root)
    }

    /// Read an `<executables>` element with one attribute per program.
    pub fn from_element(element: &Element) -> Result<Self, ProjectError> {
        if element.name != "executables" {
            return Err(ProjectError::UnexpectedRoot {
                expected: "executables".to_string(),
                found: element.name.clone(),
            });
        }
        reject_unknown_attributes(element, NAMES)?;
        let mut executables = Self::default();
        for (key, value) in &element.attributes {
            executables.set(key, value.trim());
        }
        Ok(executables)
    }

    /// Read the legacy form, where each program is a child element.
    pub(crate) fn from_legacy_element(element: &Element) -> Self {
        let mut executables = Self::default();
        for child in element.elements() {
            let value = child.text();
            if !value.is_empty() {
                executables.set(&child.name, &value);
            }
        }
        executables
    }

    fn set(&mut self, key: &str, value: &str) {
        let value = value.to_string();
        match key {
            "latex" => self.latex = value,
            "pdflatex" => self.pdflatex = value,
            "xelatex" => self.xelatex = value,
            "pdfsvg" => self.pdfsvg = value,
            "asy" => self.asy = Some(value),
            "sage" => self.sage = Some(value),
            "pdfpng" => self.pdfpng = value,
            "pdfeps" => self.pdfeps = value,
            "node" => self.node = value,
            "liblouis" => self.liblouis = value,
            "mermaid" => self.mermaid = value,
            other => tracing::debug!("Ignoring unknown executable {}", other),
        }
    }

    /// Name/command pairs, with `"None"` for programs that were not found.
    pub fn as_pairs(&self) -> Vec<(&'static str, String)> {
        let missing = || "None".to_string();
        vec![
            ("latex", self.latex.clone()),
            ("pdflatex", self.pdflatex.clone()),
            ("xelatex", self.xelatex.clone()),
            ("pdfsvg", self.pdfsvg.clone()),
            ("asy", self.asy.clone().unwrap_or_else(missing)),
            ("sage", self.sage.clone().unwrap_or_else(missing)),
            ("pdfpng", self.pdfpng.clone()),
            ("pdfeps", self.pdfeps.clone()),
            ("node", self.node.clone()),
            ("liblouis", self.liblouis.clone()),
            ("mermaid", self.mermaid.clone()),
        ]
    }

    /// Configured programs that cannot be found on the `PATH`.
    pub fn missing(&self) -> Vec<(&'static str, String)> {
        self.as_pairs()
            .into_iter()
            .filter(|(_, command)| command == "None" || find_executable(command).is_none())
            .collect()
    }
}

/// Locate a program on the `PATH`.
pub fn find_executable(name: &str) -> Option<String> {
    if Path::new(name).is_absolute() {
        return Path::new(name).is_file().then(|| name.to_string());
    }

    let lookup = if cfg!(windows) { "where" } else { "which" };

    let output = Command::new(lookup)
        .arg(name)
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_str;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn reads_attributes() {
        let root = parse_str(r#"<executables latex="lualatex" asy="/opt/asy" mermaid="npx mmdc"/>"#).unwrap();

        let executables = Executables::from_element(&root).unwrap();

        assert_eq!(executables.latex, "lualatex");
        assert_eq!(executables.asy.as_deref(), Some("/opt/asy"));
        assert_eq!(executables.mermaid, "npx mmdc");
        assert_eq!(executables.pdfsvg, "pdf2svg");
    }

    #[test]
    fn rejects_unknown_programs() {
        let root = parse_str(r#"<executables word="winword"/>"#).unwrap();

        assert!(Executables::from_element(&root).is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let temp = tempdir().unwrap();

        let executables = Executables::load(temp.path()).unwrap();

        assert_eq!(executables.xelatex, "xelatex");
        assert_eq!(executables.liblouis, "file2brl");
    }

    #[test]
    fn missing_programs_are_reported_as_none() {
        let executables = Executables {
            asy: None,
            ..Executables::default()
        };

        let pairs = executables.as_pairs();

        assert!(pairs.contains(&("asy", "None".to_string())));
    }

    #[test]
    fn reads_legacy_children() {
        let root = parse_str("<executables><latex>latex</latex><xelatex>xe</xelatex><sage>sage</sage></executables>").unwrap();

        let executables = Executables::from_legacy_element(&root);

        assert_eq!(executables.xelatex, "xe");
        assert_eq!(executables.sage.as_deref(), Some("sage"));
    }
}
