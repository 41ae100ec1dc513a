//! Project model for PreTeXt authoring tools.
//!
//! Reads `project.ptx` manifests (current and legacy layouts), the small part
//! of publication files the tools care about, and `executables.ptx`. Also
//! carries the bundled boilerplate resources, the asset catalogue used to
//! decide what needs regenerating, and the `--config-override` XML overlay.

pub mod assets;
pub mod error;
pub mod executables;
pub mod legacy;
pub mod overlay;
pub mod paths;
pub mod project;
pub mod publication;
pub mod resources;
pub mod target;
pub mod templates;
pub mod xml;

pub use assets::{AssetTable, AssetType};
pub use error::ProjectError;
pub use executables::Executables;
pub use overlay::{OverlayError, ShadowXmlDocument};
pub use project::{DeployStrategy, ParseOptions, Project};
pub use target::{
    AsyMethod, BrailleMode, Compression, Format, LatexEngine, Platform, Server, ServerName, Target,
};
pub use xml::{Element, Node, XmlError};

/// Version of the tools, written into `requirements.txt` and compared against it.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The `major.minor` part of [`VERSION`], passed to the core as `cli.version`.
pub fn short_version() -> &'static str {
    match VERSION.rfind('.') {
        Some(index) => &VERSION[..index],
        None => VERSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_version_drops_patch() {
        let short = short_version();

        assert!(VERSION.starts_with(short));
        assert_eq!(short.matches('.').count(), 1);
    }
}
