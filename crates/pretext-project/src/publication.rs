//! The part of a publication file the tools read themselves.
//!
//! Everything else in a publication file is only meaningful to the core.

use std::path::{Path, PathBuf};

use crate::error::ProjectError;
use crate::xml::{self, Element};

/// Asset directories declared by `publication/source/directories`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationSubset {
    /// Author-provided assets, relative to the source file's directory.
    pub external: PathBuf,

    /// Generated assets, relative to the source file's directory.
    pub generated: PathBuf,
}

impl PublicationSubset {
    pub fn read(path: &Path) -> Result<Self, ProjectError> {
        let root = xml::parse_file(path)?;
        Self::from_element(&root).map_err(|message| {
            ProjectError::InvalidProject(format!("{}: {}", path.display(), message))
        })
    }

    fn from_element(root: &Element) -> Result<Self, String> {
        if root.name != "publication" {
            return Err(format!("expected <publication> but found <{}>", root.name));
        }
        let directories = root
            .child("source")
            .and_then(|source| source.child("directories"))
            .ok_or("missing source/directories")?;
        let external = directories
            .attr("external")
            .ok_or("source/directories has no @external")?;
        let generated = directories
            .attr("generated")
            .ok_or("source/directories has no @generated")?;
        Ok(Self {
            external: PathBuf::from(external),
            generated: PathBuf::from(generated),
        })
    }
}
