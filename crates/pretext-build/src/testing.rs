//! Project fixtures shared by the unit tests.

use std::fs;

use pretext_project::{ParseOptions, Project};
use tempfile::TempDir;

pub const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<project ptx-version="2">
  <targets>
    <target name="web" format="html"/>
    <target name="print" format="pdf"/>
    <target name="rs" format="html" platform="runestone"/>
    <target name="ebook" format="epub"/>
    <target name="tex" format="latex"/>
  </targets>
</project>
"#;

const PUBLICATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<publication>
  <source>
    <directories external="../assets" generated="../generated-assets"/>
  </source>
</publication>
"#;

pub struct Fixture {
    pub project: Project,
    pub _temp: TempDir,
}

/// A project using [`MANIFEST`] whose `source/main.ptx` wraps `body` in `<pretext>`.
pub fn fixture(body: &str) -> Fixture {
    fixture_with(MANIFEST, body)
}

pub fn fixture_with(manifest: &str, body: &str) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("source")).unwrap();
    fs::create_dir_all(root.join("publication")).unwrap();
    fs::write(root.join("project.ptx"), manifest).unwrap();
    fs::write(root.join("publication/publication.ptx"), PUBLICATION).unwrap();
    fs::write(
        root.join("source/main.ptx"),
        format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<pretext>{}</pretext>\n", body),
    )
    .unwrap();

    let project = Project::parse_with(
        root,
        ParseOptions {
            resources: Some(root.join(".resources")),
            ..Default::default()
        },
    )
    .unwrap();
    Fixture {
        project,
        _temp: temp,
    }
}
