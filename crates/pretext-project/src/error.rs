//! Errors raised while loading a project.

use std::path::PathBuf;

use crate::overlay::OverlayError;
use crate::xml::XmlError;

/// Errors that can occur while reading or validating a project.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Expected a <{expected}> element but found <{found}>")]
    UnexpectedRoot { expected: String, found: String },

    #[error("Invalid value '{value}' for {attribute}; expected one of: {expected}")]
    InvalidValue {
        attribute: String,
        value: String,
        expected: String,
    },

    #[error("<{element}> is missing the required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("<{element}> does not allow the attribute '{attribute}'")]
    UnknownAttribute { element: String, attribute: String },

    #[error("Invalid target '{target}': {message}")]
    InvalidTarget { target: String, message: String },

    #[error("Invalid project: {0}")]
    InvalidProject(String),

    #[error("{0} is not a resource distributed with the PreTeXt tools")]
    UnknownResource(String),
}

impl ProjectError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn target(target: &str, message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.to_string(),
            message: message.into(),
        }
    }
}
