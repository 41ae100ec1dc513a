//! Source-file to output-page mapping used by the CodeChat editor integration.
//!
//! The mapping lets CodeChat jump between a source file and the HTML pages it
//! produced. It is written as `.mapping.json` in the output directory and is
//! keyed by paths relative to the project, so nothing about the author's
//! machine ends up in published output.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use pretext_project::paths::to_posix;
use pretext_project::xml::{self, Element, XML_ID};

use crate::error::BuildError;

pub const MAPPING_FILE: &str = ".mapping.json";

/// Source path → `xml:id`s in that file that produced an HTML page, in document order.
pub type PathToXmlId = BTreeMap<String, Vec<String>>;

/// Compute the mapping for `source` and write it into `dest_dir`.
pub fn map_path_to_xml_id(
    source: &Path,
    project_dir: &Path,
    dest_dir: &Path,
) -> Result<PathToXmlId, BuildError> {
    let pages = html_stems(dest_dir)?;
    let source = source.canonicalize().map_err(|e| BuildError::io(source, e))?;
    let root = xml::parse_file_with_includes(&source).map_err(pretext_project::ProjectError::from)?;
    let project_dir = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf());

    let mut mapping = PathToXmlId::new();
    collect(&root, &source, &project_dir, &pages, &mut mapping);

    let path = dest_dir.join(MAPPING_FILE);
    let json = serde_json::to_string(&mapping).map_err(|e| BuildError::Write {
        path: path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| BuildError::io(&path, e))?;
    Ok(mapping)
}

fn html_stems(dir: &Path) -> Result<HashSet<String>, BuildError> {
    let mut stems = HashSet::new();
    for entry in fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))? {
        let path = entry.map_err(|e| BuildError::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "html") {
            if let Some(stem) = path.file_stem() {
                stems.insert(stem.to_string_lossy().into_owned());
            }
        }
    }
    Ok(stems)
}

fn collect(
    element: &Element,
    file: &Path,
    project_dir: &Path,
    pages: &HashSet<String>,
    mapping: &mut PathToXmlId,
) {
    let file: PathBuf = match &element.origin {
        Some(origin) => origin.canonicalize().unwrap_or_else(|_| origin.clone()),
        None => file.to_path_buf(),
    };

    if let Some(id) = element.attr(XML_ID) {
        if pages.contains(id) {
            let relative = file.strip_prefix(project_dir).unwrap_or(&file);
            mapping
                .entry(to_posix(relative))
                .or_default()
                .push(id.to_string());
        }
    }

    for child in element.elements() {
        collect(child, &file, project_dir, pages, mapping);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn maps_ids_to_their_files() {
        let temp = tempdir().unwrap();
        let project = temp.path();
        fs::create_dir_all(project.join("source")).unwrap();
        fs::create_dir_all(project.join("output/web")).unwrap();
        fs::write(
            project.join("source/main.ptx"),
            r#"<pretext xmlns:xi="http://www.w3.org/2001/XInclude"><book xml:id="book"><xi:include href="ch1.ptx"/></book></pretext>"#,
        )
        .unwrap();
        fs::write(
            project.join("source/ch1.ptx"),
            r#"<chapter xml:id="ch1"><section xml:id="s1"/><section xml:id="s2"/></chapter>"#,
        )
        .unwrap();
        for page in ["book", "ch1", "s2"] {
            fs::write(project.join("output/web").join(format!("{}.html", page)), "").unwrap();
        }

        let mapping = map_path_to_xml_id(
            &project.join("source/main.ptx"),
            project,
            &project.join("output/web"),
        )
        .unwrap();

        assert_eq!(mapping["source/main.ptx"], vec!["book"]);
        assert_eq!(mapping["source/ch1.ptx"], vec!["ch1", "s2"]);
        let written = fs::read_to_string(project.join("output/web/.mapping.json")).unwrap();
        assert!(written.contains("\"source/ch1.ptx\":[\"ch1\",\"s2\"]"));
    }
}
