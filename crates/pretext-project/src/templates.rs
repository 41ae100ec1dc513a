//! Bundled file contents.
//!
//! Managed boilerplate files carry [`MANAGED_MARKER`] so later releases can
//! tell whether an author edited them. The default manifest carries no marker
//! and is compared byte for byte instead.

use std::fmt;
use std::str::FromStr;

/// Comment text marking a file as safe to overwrite on update.
pub const MANAGED_MARKER: &str = "Managed automatically by PreTeXt authoring tools";

pub const PROJECT_PTX: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!--
  This file, the project manifest, provides the overall configuration for your
  PreTeXt project. To edit the content of your document, open
  `source/main.ptx`. Each target below can be built with `pretext build NAME`.
-->
<project ptx-version="2">
  <targets>
    <target name="web" format="html"/>
    <target name="runestone" format="html" platform="runestone"/>
    <target name="print" format="pdf"/>
    <target name="print-latex" format="latex"/>
    <target name="epub" format="epub"/>
    <target name="kindle" format="kindle"/>
    <target name="braille" format="braille"/>
  </targets>
</project>
"#;

pub const PUBLICATION_PTX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!--
  The publication file holds settings that change how a document is
  presented, but not its content.
-->
<publication>
  <common>
    <chunking level="1"/>
    <tableofcontents level="2"/>
  </common>
  <source>
    <directories external="../assets" generated="../generated-assets"/>
  </source>
  <html>
    <css theme="default-modern"/>
    <asymptote links="yes"/>
  </html>
  <latex latex-style="" print="no" sides="one"/>
</publication>
"#;

pub const STANDALONE_PROJECT_PTX: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<project ptx-version="2" source="" publication="" output-dir="">
  <targets>
    <target name="web" format="html" standalone="yes"/>
    <target name="print" format="pdf" standalone="yes"/>
    <target name="print-latex" format="latex" standalone="yes"/>
    <target name="epub" format="epub" standalone="yes"/>
  </targets>
</project>
"#;

pub const STANDALONE_PUBLICATION_PTX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<publication>
  <common>
    <chunking level="0"/>
  </common>
  <source>
    <directories external="assets" generated="generated-assets"/>
  </source>
</publication>
"#;

pub const GITIGNORE: &str = r#"# Managed automatically by PreTeXt authoring tools
# Remove the line above to keep your own version of this file on update.

# Build output and caches
output/
published/
generated-assets/
.cache/
logs/

# Editors and operating systems
.vscode/
.idea/
*.swp
.DS_Store
Thumbs.db

# Python environments used to install the tools
.venv/
venv/
__pycache__/

# Backups written by `pretext update`
*.bak
"#;

pub const DEVCONTAINER_JSON: &str = r#"// Managed automatically by PreTeXt authoring tools
// Remove the line above to keep your own version of this file on update.
{
  "name": "PreTeXt",
  "image": "oscarlevin/pretext:small",
  "customizations": {
    "vscode": {
      "extensions": ["ms-vscode.live-server", "oscarlevin.pretext-tools"]
    },
    "codespaces": {
      "openFiles": ["source/main.ptx"]
    }
  },
  "forwardPorts": [8128],
  "portsAttributes": {
    "8128": { "label": "PreTeXt preview", "onAutoForward": "openPreview" }
  }
}
"#;

pub const WORKFLOW_YML: &str = r#"# Managed automatically by PreTeXt authoring tools
# Remove the line above to keep your own version of this file on update.
name: PreTeXt-CLI Actions
on:
  push:
    branches: ["*"]
  pull_request:
    branches: ["*"]
  workflow_dispatch:

jobs:
  build:
    runs-on: ubuntu-latest
    container: oscarlevin/pretext:full
    steps:
      - uses: actions/checkout@v4
      - name: install deps
        run: pip install -r requirements.txt
      - name: build deploy targets
        run: pretext build --deploys
      - name: stage deployment
        run: pretext deploy --stage-only
      - name: upload artifact
        uses: actions/upload-pages-artifact@v3
        with:
          path: output/stage

  deploy:
    if: github.ref == 'refs/heads/main'
    needs: build
    runs-on: ubuntu-latest
    permissions:
      pages: write
      id-token: write
    environment:
      name: github-pages
      url: ${{ steps.deployment.outputs.page_url }}
    steps:
      - id: deployment
        uses: actions/deploy-pages@v4
"#;

pub const CODECHAT_CONFIG_YAML: &str = r#"# Managed automatically by PreTeXt authoring tools
# Remove the line above to keep your own version of this file on update.
#
# Configuration for the CodeChat Editor, which previews the HTML page built
# from the source file being edited.
source_path: source
output_type: project
args: pretext build web
html_path: output/web
mapping_path: output/web/.mapping.json
"#;

/// Workflow that earlier releases installed and that is now removed on update.
pub const DEPRECATED_DEPLOY_YML: &str = r#"# Managed automatically by PreTeXt authoring tools
name: PreTeXt-CLI Deploy
on:
  workflow_dispatch:
jobs:
  deploy:
    runs-on: ubuntu-latest
    container: oscarlevin/pretext:full
    steps:
      - uses: actions/checkout@v3
      - run: pip install -r requirements.txt
      - run: pretext deploy
"#;

/// `requirements.txt` pinning the given release.
pub fn requirements_txt(version: &str) -> String {
    format!(
        "# This file was automatically generated with PreTeXt {}.\npretext == {}\n",
        version, version
    )
}

/// Prefix of a generated `requirements.txt`.
pub const REQUIREMENTS_HEADER: &str = "# This file was automatically generated with PreTeXt";

/// Starter documents for `pretext new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewTemplate {
    Book,
    Article,
    Demo,
    Hello,
    Slideshow,
}

impl NewTemplate {
    pub const ALL: &'static [NewTemplate] = &[
        NewTemplate::Book,
        NewTemplate::Article,
        NewTemplate::Demo,
        NewTemplate::Hello,
        NewTemplate::Slideshow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NewTemplate::Book => "book",
            NewTemplate::Article => "article",
            NewTemplate::Demo => "demo",
            NewTemplate::Hello => "hello",
            NewTemplate::Slideshow => "slideshow",
        }
    }

    /// Files of the template, relative to the new project directory.
    pub fn files(&self) -> Vec<(&'static str, &'static str)> {
        let mut files = vec![("publication/publication.ptx", PUBLICATION_PTX)];
        match self {
            NewTemplate::Book => {
                files.push(("project.ptx", PROJECT_PTX));
                files.push(("source/main.ptx", BOOK_MAIN));
                files.push(("source/docinfo.ptx", DOCINFO));
                files.push(("source/frontmatter.ptx", BOOK_FRONTMATTER));
                files.push(("source/ch-first.ptx", BOOK_CHAPTER));
                files.push(("source/backmatter.ptx", BOOK_BACKMATTER));
                files.push(("assets/README.md", ASSETS_README));
            }
            NewTemplate::Article => {
                files.push(("project.ptx", PROJECT_PTX));
                files.push(("source/main.ptx", ARTICLE_MAIN));
                files.push(("source/docinfo.ptx", DOCINFO));
                files.push(("assets/README.md", ASSETS_README));
            }
            NewTemplate::Demo => {
                files.push(("project.ptx", PROJECT_PTX));
                files.push(("source/main.ptx", DEMO_MAIN));
                files.push(("source/docinfo.ptx", DOCINFO));
                files.push(("source/ch-images.ptx", DEMO_IMAGES));
                files.push(("assets/README.md", ASSETS_README));
            }
            NewTemplate::Hello => {
                files.push(("project.ptx", PROJECT_PTX));
                files.push(("source/main.ptx", HELLO_MAIN));
            }
            NewTemplate::Slideshow => {
                files.push(("project.ptx", SLIDESHOW_PROJECT));
                files.push(("source/main.ptx", SLIDESHOW_MAIN));
                files.push(("source/docinfo.ptx", DOCINFO));
            }
        }
        files
    }
}

impl FromStr for NewTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NewTemplate::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown template '{}'; expected one of: book, article, demo, hello, slideshow",
                    s
                )
            })
    }
}

impl fmt::Display for NewTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DOCINFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<docinfo>
  <macros>
    \newcommand{\R}{\mathbb R}
  </macros>
  <latex-image-preamble>
    \usepackage{tikz}
  </latex-image-preamble>
  <document-id>my-document</document-id>
</docinfo>
"#;

const ASSETS_README: &str = "Place images and other files referenced by your source here.\n";

const BOOK_MAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pretext xml:lang="en-US" xmlns:xi="http://www.w3.org/2001/XInclude">
  <xi:include href="./docinfo.ptx"/>
  <book xml:id="my-great-book">
    <title>My Great Book</title>
    <subtitle>An example to get you started</subtitle>
    <xi:include href="./frontmatter.ptx"/>
    <xi:include href="./ch-first.ptx"/>
    <xi:include href="./backmatter.ptx"/>
  </book>
</pretext>
"#;

const BOOK_FRONTMATTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<frontmatter xml:id="frontmatter">
  <titlepage>
    <author>
      <personname>You</personname>
    </author>
    <date><today/></date>
  </titlepage>
  <abstract>
    <p>This book is about something great.</p>
  </abstract>
</frontmatter>
"#;

const BOOK_CHAPTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<chapter xml:id="ch-first" xmlns:xi="http://www.w3.org/2001/XInclude">
  <title>The First Chapter</title>
  <introduction>
    <p>Text before the first section.</p>
  </introduction>
  <section xml:id="sec-first">
    <title>The First Section</title>
    <p>Here is some math: <m>\R^2</m>.</p>
  </section>
</chapter>
"#;

const BOOK_BACKMATTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<backmatter xml:id="backmatter">
  <title>Backmatter</title>
  <colophon>
    <p>This book was authored in <pretext/>.</p>
  </colophon>
</backmatter>
"#;

const ARTICLE_MAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pretext xml:lang="en-US" xmlns:xi="http://www.w3.org/2001/XInclude">
  <xi:include href="./docinfo.ptx"/>
  <article xml:id="my-article">
    <title>My Article</title>
    <frontmatter>
      <bibinfo>
        <author>
          <personname>You</personname>
        </author>
        <date><today/></date>
      </bibinfo>
      <titlepage-items/>
      <abstract>
        <p>A short summary.</p>
      </abstract>
    </frontmatter>
    <section xml:id="sec-intro">
      <title>Introduction</title>
      <p>Write your article here.</p>
    </section>
  </article>
</pretext>
"#;

const DEMO_MAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pretext xml:lang="en-US" xmlns:xi="http://www.w3.org/2001/XInclude">
  <xi:include href="./docinfo.ptx"/>
  <book xml:id="demo">
    <title>A Demonstration</title>
    <subtitle>Some of what PreTeXt can do</subtitle>
    <chapter xml:id="ch-text">
      <title>Text and Mathematics</title>
      <p>Inline math <m>e^{i\pi} + 1 = 0</m> and display math:<me>\int_0^1 x^2\,dx = \frac{1}{3}</me></p>
      <theorem xml:id="thm-demo">
        <statement><p>Every demo has a theorem.</p></statement>
        <proof><p>By example.</p></proof>
      </theorem>
    </chapter>
    <xi:include href="./ch-images.ptx"/>
  </book>
</pretext>
"#;

const DEMO_IMAGES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<chapter xml:id="ch-images">
  <title>Generated Images</title>
  <figure xml:id="fig-tikz">
    <caption>A picture drawn with TikZ</caption>
    <image xml:id="img-tikz" width="40%">
      <latex-image>
        \begin{tikzpicture}
          \draw (0,0) circle (1);
        \end{tikzpicture}
      </latex-image>
    </image>
  </figure>
  <figure xml:id="fig-asy">
    <caption>A picture drawn with Asymptote</caption>
    <image xml:id="img-asy" width="40%">
      <asymptote>
        size(100);
        draw(unitsquare);
      </asymptote>
    </image>
  </figure>
</chapter>
"#;

const HELLO_MAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pretext>
  <article xml:id="hello">
    <title>Hello, World!</title>
    <p>Welcome to PreTeXt.</p>
  </article>
</pretext>
"#;

const SLIDESHOW_PROJECT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<project ptx-version="2">
  <targets>
    <target name="slides" format="revealjs"/>
    <target name="handout" format="pdf"/>
  </targets>
</project>
"#;

const SLIDESHOW_MAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pretext xml:lang="en-US" xmlns:xi="http://www.w3.org/2001/XInclude">
  <xi:include href="./docinfo.ptx"/>
  <slideshow xml:id="my-slides">
    <title>My Slideshow</title>
    <frontmatter>
      <bibinfo>
        <author><personname>You</personname></author>
      </bibinfo>
      <titlepage-items/>
    </frontmatter>
    <section xml:id="sec-slides">
      <title>First Section</title>
      <slide>
        <title>A Slide</title>
        <p pause="yes">One point at a time.</p>
        <p pause="yes">Then another.</p>
      </slide>
    </section>
  </slideshow>
</pretext>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_str;

    #[test]
    fn xml_templates_parse() {
        for template in NewTemplate::ALL {
            for (path, contents) in template.files() {
                if path.ends_with(".ptx") {
                    assert!(parse_str(contents).is_ok(), "{} in {} does not parse", path, template);
                }
            }
        }
        for contents in [PROJECT_PTX, PUBLICATION_PTX, STANDALONE_PROJECT_PTX, STANDALONE_PUBLICATION_PTX] {
            assert!(parse_str(contents).is_ok());
        }
    }

    #[test]
    fn template_manifests_load_as_projects() {
        let write_all = |files: &[(&str, &str)]| {
            let temp = tempfile::tempdir().unwrap();
            for (path, contents) in files {
                let path = temp.path().join(path);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, contents).unwrap();
            }
            temp
        };

        for template in NewTemplate::ALL {
            let temp = write_all(&template.files());
            let project = crate::Project::parse(temp.path())
                .unwrap_or_else(|e| panic!("{} manifest does not load: {}", template, e));
            assert!(!project.targets().is_empty());
        }

        let temp = write_all(&[
            ("project.ptx", PROJECT_PTX),
            ("publication/publication.ptx", PUBLICATION_PTX),
        ]);
        let project = crate::Project::parse(temp.path()).unwrap();
        let runestone = project.target(Some("runestone")).unwrap();
        assert!(runestone.is_runestone());
    }

    #[test]
    fn every_template_has_a_manifest_and_main_source() {
        for template in NewTemplate::ALL {
            let paths: Vec<_> = template.files().into_iter().map(|(p, _)| p).collect();

            assert!(paths.contains(&"project.ptx"));
            assert!(paths.contains(&"source/main.ptx"));
        }
    }

    #[test]
    fn managed_files_carry_the_marker() {
        for contents in [GITIGNORE, DEVCONTAINER_JSON, WORKFLOW_YML, CODECHAT_CONFIG_YAML] {
            assert!(contents.contains(MANAGED_MARKER));
        }
        assert!(!PROJECT_PTX.contains(MANAGED_MARKER));
    }

    #[test]
    fn parses_template_names() {
        assert_eq!("slideshow".parse::<NewTemplate>(), Ok(NewTemplate::Slideshow));
        assert!("thesis".parse::<NewTemplate>().is_err());
    }
}
