//! Manifests written before `ptx-version="2"`.
//!
//! Legacy targets describe their settings with child elements and use a few
//! composite format names. They are translated into current [`Target`]s.

use std::path::{Path, PathBuf};

use crate::error::ProjectError;
use crate::executables::Executables;
use crate::target::{required_attr, BrailleMode, Compression, Format, Target};
use crate::xml::Element;

/// Targets and executables read from a legacy manifest.
#[derive(Debug)]
pub(crate) struct LegacyManifest {
    pub targets: Vec<Target>,
    pub executables: Executables,
}

/// Split a legacy format name into a format and its modifiers.
fn translate_format(
    format: &str,
) -> Result<(Format, Option<Compression>, Option<BrailleMode>), ProjectError> {
    Ok(match format {
        "html-zip" => (Format::Html, Some(Compression::Zip), None),
        "webwork-sets" => (Format::Webwork, None, None),
        "webwork-sets-zipped" => (Format::Webwork, Some(Compression::Zip), None),
        "braille-electronic" => (Format::Braille, None, Some(BrailleMode::Electronic)),
        "braille-emboss" => (Format::Braille, None, Some(BrailleMode::Emboss)),
        "html" | "latex" | "pdf" | "epub" | "kindle" | "custom" => (format.parse()?, None, None),
        other => {
            return Err(ProjectError::InvalidValue {
                attribute: "format".to_string(),
                value: other.to_string(),
                expected: "html, html-zip, latex, pdf, epub, kindle, braille-electronic, \
                           braille-emboss, webwork-sets, webwork-sets-zipped, custom"
                    .to_string(),
            })
        }
    })
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .child(name)
        .map(Element::text)
        .filter(|text| !text.is_empty())
}

fn required_child(element: &Element, target: &str, name: &str) -> Result<String, ProjectError> {
    child_text(element, name)
        .ok_or_else(|| ProjectError::target(target, format!("missing <{}>", name)))
}

fn translate_target(element: &Element, project_dir: &Path) -> Result<Option<Target>, ProjectError> {
    let name = required_attr(element, "name")?.trim().to_string();
    let (format, compression, braille_mode) =
        translate_format(&required_child(element, &name, "format")?)?;
    let publication = required_child(element, &name, "publication")?;

    if !project_dir.join(&publication).exists() {
        tracing::warn!("Publication file at {} does not exist.", publication);
        tracing::warn!("{} will not be available.", name);
        return Ok(None);
    }

    let mut target = Target::unvalidated(name.clone(), format);
    target.source = PathBuf::from(required_child(element, &name, "source")?);
    target.publication = Some(PathBuf::from(publication));
    target.output_dir = Some(PathBuf::from(required_child(element, &name, "output-dir")?));
    target.output_filename = child_text(element, "output-filename");
    target.deploy_dir = child_text(element, "deploy-dir").map(PathBuf::from);
    target.xsl = child_text(element, "xsl").map(PathBuf::from);
    target.compression = compression;
    if let Some(mode) = braille_mode {
        target.braille_mode = mode;
    }
    if let Some(method) = element.attr("pdf-method") {
        target.latex_engine = method.parse()?;
    }
    for param in element.children_named("stringparam") {
        let key = required_attr(param, "key")?;
        let value = required_attr(param, "value")?;
        target.stringparams.insert(key.to_string(), value.to_string());
    }

    target.validate().map(Some)
}

/// Translate the root `<project>` element of a legacy manifest.
pub(crate) fn translate(root: &Element, project_dir: &Path) -> Result<LegacyManifest, ProjectError> {
    let mut targets = Vec::new();
    if let Some(list) = root.child("targets") {
        for element in list.children_named("target") {
            if let Some(target) = translate_target(element, project_dir)? {
                targets.push(target);
            }
        }
    }
    let executables = root
        .child("executables")
        .map(Executables::from_legacy_element)
        .unwrap_or_default();
    Ok(LegacyManifest {
        targets,
        executables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_str;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    const LEGACY: &str = r#"<project>
  <targets>
    <target name="html">
      <format>html-zip</format>
      <source>source/main.ptx</source>
      <publication>publication/publication.ptx</publication>
      <output-dir>output/html</output-dir>
      <stringparam key="debug.datedfiles" value="no"/>
    </target>
    <target name="print" pdf-method="pdflatex">
      <format>pdf</format>
      <source>source/main.ptx</source>
      <publication>publication/print.ptx</publication>
      <output-dir>output/print</output-dir>
    </target>
    <target name="braille">
      <format>braille-electronic</format>
      <source>source/main.ptx</source>
      <publication>publication/publication.ptx</publication>
      <output-dir>output/braille</output-dir>
    </target>
  </targets>
  <executables>
    <latex>latex</latex>
    <pdflatex>pdflatex</pdflatex>
    <xelatex>xelatex</xelatex>
  </executables>
</project>"#;

    #[test]
    fn translates_formats_and_skips_missing_publications() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("publication")).unwrap();
        fs::write(temp.path().join("publication/publication.ptx"), "<publication/>").unwrap();

        let manifest = translate(&parse_str(LEGACY).unwrap(), temp.path()).unwrap();
        let names: Vec<_> = manifest.targets.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(names, vec!["html", "braille"]);

        let html = &manifest.targets[0];
        assert_eq!(html.format, Format::Html);
        assert_eq!(html.compression, Some(Compression::Zip));
        assert_eq!(html.output_dir, Some(PathBuf::from("output/html")));
        assert_eq!(html.stringparams.get("debug.datedfiles").map(String::as_str), Some("no"));

        let braille = &manifest.targets[1];
        assert_eq!(braille.format, Format::Braille);
        assert_eq!(braille.braille_mode, BrailleMode::Electronic);
    }

    #[test]
    fn reads_pdf_method() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("publication")).unwrap();
        fs::write(temp.path().join("publication/print.ptx"), "<publication/>").unwrap();
        fs::write(temp.path().join("publication/publication.ptx"), "<publication/>").unwrap();

        let manifest = translate(&parse_str(LEGACY).unwrap(), temp.path()).unwrap();
        let print = manifest.targets.iter().find(|t| t.name == "print").unwrap();

        assert_eq!(print.latex_engine.as_str(), "pdflatex");
    }

    #[test]
    fn rejects_unknown_formats() {
        assert!(translate_format("docx").is_err());
    }
}
