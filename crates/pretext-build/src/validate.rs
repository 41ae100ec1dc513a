//! Well-formedness checks run before handing files to the core.

use std::path::Path;

use pretext_project::xml::{self, XmlError};

/// Whether `path` parses (with XIncludes expanded) and has `root` as its root element.
///
/// Problems are logged as errors rather than returned.
pub fn xml_syntax_is_valid(path: &Path, root: &str) -> bool {
    match xml::parse_file_with_includes(path) {
        Ok(element) if element.name == root => {
            tracing::debug!("XML syntax of {} appears well formed.", path.display());
            true
        }
        Ok(element) => {
            tracing::error!(
                "The file {} has <{}> as its root element instead of <{}>. Did you use a subfile as your source? Check the project manifest (project.ptx).",
                path.display(),
                element.name,
                root
            );
            false
        }
        Err(XmlError::Io { path, .. }) => {
            tracing::error!("The file {} does not exist", path.display());
            false
        }
        Err(err @ XmlError::Include { .. }) => {
            tracing::error!("XInclude error caused build to fail:");
            tracing::error!("{}", err);
            false
        }
        Err(err) => {
            tracing::error!("XML syntax error caused build to fail:");
            tracing::error!("{}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn accepts_expected_root_only() {
        let temp = tempdir().unwrap();
        let main = temp.path().join("main.ptx");
        fs::write(&main, "<pretext><book/></pretext>").unwrap();

        assert!(xml_syntax_is_valid(&main, "pretext"));
        assert!(!xml_syntax_is_valid(&main, "publication"));
    }

    #[test]
    fn rejects_broken_files() {
        let temp = tempdir().unwrap();
        let broken = temp.path().join("broken.ptx");
        fs::write(&broken, "<pretext><book></pretext>").unwrap();
        let include = temp.path().join("include.ptx");
        fs::write(
            &include,
            r#"<pretext xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="gone.ptx"/></pretext>"#,
        )
        .unwrap();

        assert!(!xml_syntax_is_valid(&broken, "pretext"));
        assert!(!xml_syntax_is_valid(&include, "pretext"));
        assert!(!xml_syntax_is_valid(&temp.path().join("missing.ptx"), "pretext"));
    }
}
