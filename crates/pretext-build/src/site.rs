//! Landing page rendered for deployments with several targets.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use minijinja::Environment;
use pretext_project::xml::{self, Element};
use serde_json::Value;

use crate::error::DeployError;

/// Template variables, named the way site customizations refer to them.
pub type SiteContext = BTreeMap<String, Value>;

pub const DEFAULT_SITENAME: &str = "My PreTeXt Project";

/// Variables taken from the document and its deploy targets.
///
/// `targets` pairs the display name with the link path.
pub fn site_context(source: &Element, targets: &[(String, String)]) -> SiteContext {
    let first_text = |name: &str| {
        source
            .find_descendant(name)
            .map(|element| element.text_content())
    };

    let mut context = SiteContext::new();
    context.insert(
        "SITENAME".to_string(),
        Value::String(first_text("title").unwrap_or_else(|| DEFAULT_SITENAME.to_string())),
    );
    if let Some(subtitle) = first_text("subtitle") {
        context.insert("SITESUBTITLE".to_string(), Value::String(subtitle));
    }
    if let Some(blurb) = first_text("blurb") {
        context.insert("PTX_SITE_DESCRIPTION".to_string(), Value::String(blurb));
    }
    let targets = targets
        .iter()
        .map(|(name, path)| serde_json::json!([name, path]))
        .collect();
    context.insert("PTX_TARGETS".to_string(), Value::Array(targets));
    context
}

/// Apply `site.ptx` (element per variable) or `site.json` overrides from `site_dir`.
pub fn apply_customization(context: &mut SiteContext, site_dir: &Path) -> Result<(), DeployError> {
    let ptx = site_dir.join("site.ptx");
    if ptx.exists() {
        let root = xml::parse_file_with_includes(&ptx).map_err(|e| DeployError::SiteConfig {
            path: ptx.clone(),
            message: e.to_string(),
        })?;
        for child in root.elements() {
            let key = child.name.to_uppercase().replace('-', "_");
            context.insert(key, Value::String(child.text()));
        }
        return Ok(());
    }

    let json = site_dir.join("site.json");
    let contents = fs::read_to_string(&json).map_err(|e| DeployError::io(&json, e))?;
    let overrides: BTreeMap<String, Value> =
        serde_json::from_str(&contents).map_err(|e| DeployError::SiteConfig {
            path: json.clone(),
            message: e.to_string(),
        })?;
    context.extend(overrides);
    Ok(())
}

/// Render `index.html` for the given context.
///
/// Text is HTML-escaped as usual. Link targets go through the `href` filter,
/// which leaves `/` alone so relative paths stay readable.
pub fn render_landing_page(context: &SiteContext) -> Result<String, DeployError> {
    let mut env = Environment::new();
    env.add_filter("href", href);
    env.add_template("index.html", INDEX_TEMPLATE)?;
    let template = env.get_template("index.html")?;
    Ok(template.render(context)?)
}

fn href(path: String) -> minijinja::Value {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            ' ' => escaped.push_str("%20"),
            c => escaped.push(c),
        }
    }
    minijinja::Value::from_safe_string(escaped)
}

const INDEX_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ SITENAME }}</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 3rem auto; padding: 0 1rem; line-height: 1.5; }
    h1 { margin-bottom: 0.25rem; }
    .subtitle { color: #555; margin-top: 0; }
    ul.targets { list-style: none; padding: 0; }
    ul.targets li { margin: 0.5rem 0; }
    ul.targets a { display: inline-block; padding: 0.5rem 1rem; border: 1px solid #2a5ea7; border-radius: 4px; color: #2a5ea7; text-decoration: none; }
  </style>
</head>
<body>
  <header>
    <h1>{{ SITENAME }}</h1>
    {% if SITESUBTITLE %}<p class="subtitle">{{ SITESUBTITLE }}</p>{% endif %}
  </header>
  <main>
    {% if PTX_SITE_DESCRIPTION %}<p>{{ PTX_SITE_DESCRIPTION }}</p>{% endif %}
    <ul class="targets">
    {% for target in PTX_TARGETS %}
      <li><a href="{{ target[1] | href }}">{{ target[0] }}</a></li>
    {% endfor %}
    </ul>
  </main>
  <footer>
    <p>Built with <a href="https://pretextbook.org">PreTeXt</a>.</p>
  </footer>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn source() -> Element {
        xml::parse_str(
            "<pretext><book><title>Linear Algebra</title><subtitle>A first course</subtitle><section><title>Other</title></section></book></pretext>",
        )
        .unwrap()
    }

    #[test]
    fn context_uses_first_title() {
        let context = site_context(&source(), &[("Web".to_string(), "web".to_string())]);

        assert_eq!(context["SITENAME"], "Linear Algebra");
        assert_eq!(context["SITESUBTITLE"], "A first course");
        assert!(!context.contains_key("PTX_SITE_DESCRIPTION"));
        assert_eq!(context["PTX_TARGETS"], serde_json::json!([["Web", "web"]]));
    }

    #[test]
    fn untitled_documents_get_a_default_name() {
        let root = xml::parse_str("<pretext><article/></pretext>").unwrap();

        let context = site_context(&root, &[]);

        assert_eq!(context["SITENAME"], DEFAULT_SITENAME);
    }

    #[test]
    fn renders_links_to_targets() {
        let context = site_context(
            &source(),
            &[
                ("Web".to_string(), "web".to_string()),
                ("Print".to_string(), "print/book.pdf".to_string()),
            ],
        );

        let html = render_landing_page(&context).unwrap();

        assert!(html.contains("<title>Linear Algebra</title>"));
        assert!(html.contains(r#"<a href="print/book.pdf">Print</a>"#));
        assert!(html.contains("A first course"));
    }

    #[test]
    fn link_targets_and_titles_are_escaped() {
        let root = xml::parse_str("<pretext><book><title>Q &amp; A</title></book></pretext>").unwrap();
        let context = site_context(
            &root,
            &[("<Slides>".to_string(), "slides/my deck.html?a=1&b=2".to_string())],
        );

        let html = render_landing_page(&context).unwrap();

        assert!(html.contains("<title>Q &amp; A</title>"));
        assert!(html.contains(r#"<a href="slides/my%20deck.html?a=1&amp;b=2">&lt;Slides&gt;</a>"#));
    }

    #[test]
    fn site_ptx_overrides_variables() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("site.ptx"),
            "<site><sitename>Custom</sitename><ptx-site-description>Hello</ptx-site-description></site>",
        )
        .unwrap();
        let mut context = site_context(&source(), &[]);

        apply_customization(&mut context, temp.path()).unwrap();

        assert_eq!(context["SITENAME"], "Custom");
        assert_eq!(context["PTX_SITE_DESCRIPTION"], "Hello");
    }

    #[test]
    fn site_json_merges_variables() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("site.json"), r#"{"SITESUBTITLE": "Second edition"}"#).unwrap();
        let mut context = site_context(&source(), &[]);

        apply_customization(&mut context, temp.path()).unwrap();

        assert_eq!(context["SITESUBTITLE"], "Second edition");
        assert_eq!(context["SITENAME"], "Linear Algebra");
    }
}
