//! A small owned XML tree.
//!
//! Manifests, publication files and document sources are read into [`Element`]
//! trees. The tree keeps attribute order and text nodes so that it can be
//! serialized back (for hashing assets or rewriting manifests) and it records
//! which file an element was loaded from, which is needed once XIncludes have
//! been expanded.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use quick_xml::escape::{escape, partial_escape, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

/// Namespace of `xi:include` elements.
pub const XINCLUDE_NS: &str = "http://www.w3.org/2001/XInclude";

/// Qualified name of the `xml:id` attribute.
pub const XML_ID: &str = "xml:id";

/// Nested includes deeper than this are treated as a cycle.
pub const MAX_INCLUDE_DEPTH: usize = 25;

/// `<!ENTITY name "value">` in an internal DTD subset. Parameter entities are skipped.
static ENTITY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([^\s%"']+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).expect("valid regex")
});

/// Errors produced while reading XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("XML syntax error in {location}: {message}")]
    Syntax { location: String, message: String },

    #[error("No root element found in {0}")]
    MissingRoot(String),

    #[error("XInclude error in {location}: {message}")]
    Include { location: String, message: String },
}

/// A node in the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with ordered attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Qualified name, including any prefix.
    pub name: String,

    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,

    /// Child nodes in document order.
    pub children: Vec<Node>,

    /// File this element was loaded from, set on document roots only.
    pub origin: Option<PathBuf>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    /// Namespace prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Builder-style [`Element::set_attr`].
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Append a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Child elements with the given qualified name.
    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a Element> + use<'a, 'b> {
        self.elements().filter(move |element| element.name == name)
    }

    /// First child element with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut found = Vec::new();
        collect_descendants(self, &mut found);
        found
    }

    /// First descendant element with the given qualified name.
    pub fn find_descendant(&self, name: &str) -> Option<&Element> {
        self.descendants()
            .into_iter()
            .find(|element| element.name == name)
    }

    /// Text before the first child element, as lxml's `.text` would report it.
    pub fn leading_text(&self) -> Option<&str> {
        match self.children.first() {
            Some(Node::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Replace the text before the first child element.
    pub fn set_leading_text(&mut self, text: impl Into<String>) {
        match self.children.first_mut() {
            Some(Node::Text(existing)) => *existing = text.into(),
            _ => self.children.insert(0, Node::Text(text.into())),
        }
    }

    /// Concatenated direct text children, trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                text.push_str(t);
            }
        }
        text.trim().to_string()
    }

    /// Concatenated text of the whole subtree, with whitespace collapsed.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        collect_text(self, &mut text);
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Serialize without an XML declaration.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

fn collect_descendants<'a>(element: &'a Element, found: &mut Vec<&'a Element>) {
    for child in element.elements() {
        found.push(child);
        collect_descendants(child, found);
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => {
                out.push(' ');
                collect_text(child, out);
            }
        }
    }
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for node in &element.children {
        match node {
            Node::Element(child) => write_element(child, out),
            Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

/// Parse a document from a string.
pub fn parse_str(source: &str) -> Result<Element, XmlError> {
    parse_document(source, "<string>")
}

/// Parse a document from a file, recording the file as the root's origin.
pub fn parse_file(path: &Path) -> Result<Element, XmlError> {
    let source = fs::read_to_string(path).map_err(|source| XmlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut root = parse_document(&source, &path.display().to_string())?;
    root.origin = Some(path.to_path_buf());
    Ok(root)
}

/// Parse a file and expand its XIncludes.
pub fn parse_file_with_includes(path: &Path) -> Result<Element, XmlError> {
    let mut root = parse_file(path)?;
    let base = path.parent().unwrap_or(Path::new("")).to_path_buf();
    expand_includes(&mut root, &base, &HashMap::new(), 0)?;
    Ok(root)
}

fn parse_document(source: &str, location: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut entities: HashMap<String, String> = HashMap::new();

    loop {
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            location: location.to_string(),
            message: format!("{} (at byte {})", e, reader.error_position()),
        })?;

        match event {
            Event::DocType(doctype) => {
                entities = internal_entities(&String::from_utf8_lossy(&doctype));
            }
            Event::Start(start) => stack.push(element_from_start(&start, &entities, location)?),
            Event::Empty(start) => {
                let element = element_from_start(&start, &entities, location)?;
                attach(&mut stack, &mut root, element, location)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| XmlError::Syntax {
                    location: location.to_string(),
                    message: "unexpected closing tag".to_string(),
                })?;
                attach(&mut stack, &mut root, element, location)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape_with(|name| resolve_entity(&entities, name))
                    .map_err(|e| XmlError::Syntax {
                        location: location.to_string(),
                        message: e.to_string(),
                    })?;
                match stack.last_mut() {
                    Some(parent) => push_text(parent, &text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(XmlError::Syntax {
                            location: location.to_string(),
                            message: "text outside of the root element".to_string(),
                        })
                    }
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    push_text(parent, &String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Syntax {
            location: location.to_string(),
            message: format!("element <{}> is never closed", open.name),
        });
    }

    root.ok_or_else(|| XmlError::MissingRoot(location.to_string()))
}

/// Entities declared in the internal subset of a `<!DOCTYPE ...>`.
fn internal_entities(doctype: &str) -> HashMap<String, String> {
    ENTITY_DECL
        .captures_iter(doctype)
        .filter_map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3))?;
            Some((caps[1].to_string(), value.as_str().to_string()))
        })
        .collect()
}

fn resolve_entity<'a>(entities: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    resolve_predefined_entity(name).or_else(|| entities.get(name).map(String::as_str))
}

fn element_from_start(
    start: &BytesStart<'_>,
    entities: &HashMap<String, String>,
    location: &str,
) -> Result<Element, XmlError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax {
            location: location.to_string(),
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value_with(|name| resolve_entity(entities, name))
            .map_err(|e| XmlError::Syntax {
                location: location.to_string(),
                message: e.to_string(),
            })?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    location: &str,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
    } else if root.is_some() {
        return Err(XmlError::Syntax {
            location: location.to_string(),
            message: "document has more than one root element".to_string(),
        });
    } else {
        *root = Some(element);
    }
    Ok(())
}

fn push_text(parent: &mut Element, text: &str) {
    if let Some(Node::Text(existing)) = parent.children.last_mut() {
        existing.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

/// Replace `xi:include` elements below `element` with the documents they reference.
fn expand_includes(
    element: &mut Element,
    base: &Path,
    namespaces: &HashMap<String, String>,
    depth: usize,
) -> Result<(), XmlError> {
    let scope = extend_scope(element, namespaces);
    let scope = scope.as_ref().unwrap_or(namespaces);

    let local_base;
    let base = match &element.origin {
        Some(origin) => {
            local_base = origin.parent().unwrap_or(Path::new("")).to_path_buf();
            local_base.as_path()
        }
        None => base,
    };

    let mut expanded = Vec::with_capacity(element.children.len());
    for node in std::mem::take(&mut element.children) {
        match node {
            Node::Element(child) if is_xinclude(&child, scope) => {
                let location = element
                    .origin
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| base.display().to_string());
                if depth >= MAX_INCLUDE_DEPTH {
                    return Err(XmlError::Include {
                        location,
                        message: format!(
                            "includes are nested more than {} levels deep",
                            MAX_INCLUDE_DEPTH
                        ),
                    });
                }
                let href = child.attr("href").ok_or_else(|| XmlError::Include {
                    location: location.clone(),
                    message: "xi:include without href".to_string(),
                })?;
                let target = base.join(href);
                if child.attr("parse") == Some("text") {
                    let text = fs::read_to_string(&target).map_err(|e| XmlError::Include {
                        location,
                        message: format!("{}: {}", target.display(), e),
                    })?;
                    expanded.push(Node::Text(text));
                } else {
                    let mut included = parse_file(&target).map_err(|e| match e {
                        XmlError::Io { path, source } => XmlError::Include {
                            location,
                            message: format!("{}: {}", path.display(), source),
                        },
                        other => other,
                    })?;
                    let child_base = target.parent().unwrap_or(Path::new("")).to_path_buf();
                    expand_includes(&mut included, &child_base, scope, depth + 1)?;
                    expanded.push(Node::Element(included));
                }
            }
            Node::Element(mut child) => {
                expand_includes(&mut child, base, scope, depth)?;
                expanded.push(Node::Element(child));
            }
            text => expanded.push(text),
        }
    }
    element.children = expanded;
    Ok(())
}

fn extend_scope(
    element: &Element,
    namespaces: &HashMap<String, String>,
) -> Option<HashMap<String, String>> {
    let declarations: Vec<_> = element
        .attributes
        .iter()
        .filter_map(|(key, value)| {
            if key == "xmlns" {
                Some((String::new(), value.clone()))
            } else {
                key.strip_prefix("xmlns:")
                    .map(|prefix| (prefix.to_string(), value.clone()))
            }
        })
        .collect();
    if declarations.is_empty() {
        return None;
    }
    let mut scope = namespaces.clone();
    scope.extend(declarations);
    Some(scope)
}

fn is_xinclude(element: &Element, namespaces: &HashMap<String, String>) -> bool {
    if element.local_name() != "include" {
        return false;
    }
    let prefix = element.prefix().unwrap_or("");
    let declared = element.attr(&if prefix.is_empty() {
        "xmlns".to_string()
    } else {
        format!("xmlns:{}", prefix)
    });
    declared.or_else(|| namespaces.get(prefix).map(String::as_str)) == Some(XINCLUDE_NS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn resolves_internal_dtd_entities() {
        let root = parse_str(
            r#"<?xml version="1.0"?>
<!DOCTYPE pretext [
  <!ENTITY book "Linear Algebra">
  <!ENTITY short 'LA'>
]>
<pretext><book label="&short;"><title>&book; &amp; more</title></book></pretext>"#,
        )
        .unwrap();

        let book = root.child("book").unwrap();
        assert_eq!(book.attr("label"), Some("LA"));
        assert_eq!(book.child("title").unwrap().text(), "Linear Algebra & more");
    }

    #[test]
    fn undeclared_entities_are_syntax_errors() {
        let result = parse_str("<pretext><p>&missing;</p></pretext>");

        assert!(matches!(result, Err(XmlError::Syntax { .. })));
    }

    #[test]
    fn round_trips_attributes_and_text() {
        let root = parse_str(r#"<root a="1"><b c="x &amp; y">text</b><d/></root>"#).unwrap();

        assert_eq!(root.attr("a"), Some("1"));
        assert_eq!(root.child("b").unwrap().attr("c"), Some("x & y"));
        assert_eq!(
            root.to_xml_string(),
            r#"<root a="1"><b c="x &amp; y">text</b><d/></root>"#
        );
    }

    #[test]
    fn ignores_declarations_and_comments() {
        let root = parse_str(
            "<?xml version=\"1.0\"?>\n<!-- note -->\n<project ptx-version=\"2\"><targets/></project>\n",
        )
        .unwrap();

        assert_eq!(root.name, "project");
        assert!(root.child("targets").is_some());
    }

    #[test]
    fn rejects_mismatched_tags() {
        let result = parse_str("<a><b></a>");

        assert!(matches!(result, Err(XmlError::Syntax { .. })));
    }

    #[test]
    fn rejects_unclosed_documents() {
        let result = parse_str("<a><b/>");

        assert!(matches!(result, Err(XmlError::Syntax { .. })));
    }

    #[test]
    fn finds_descendants_in_document_order() {
        let root = parse_str("<a><b><c/></b><c id=\"2\"/></a>").unwrap();
        let names: Vec<_> = root.descendants().iter().map(|e| e.name.clone()).collect();

        assert_eq!(names, vec!["b", "c", "c"]);
    }

    #[test]
    fn collects_text_content() {
        let root = parse_str("<title>Calculus <em>for</em>\n  everyone</title>").unwrap();

        assert_eq!(root.text_content(), "Calculus for everyone");
    }

    #[test]
    fn expands_xincludes_with_origins() {
        let temp = tempdir().unwrap();
        let main = temp.path().join("main.ptx");
        fs::create_dir_all(temp.path().join("ch")).unwrap();
        fs::write(
            &main,
            r#"<pretext xmlns:xi="http://www.w3.org/2001/XInclude"><book><xi:include href="ch/one.ptx"/></book></pretext>"#,
        )
        .unwrap();
        fs::write(
            temp.path().join("ch/one.ptx"),
            r#"<chapter xml:id="one" xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="code.txt" parse="text"/></chapter>"#,
        )
        .unwrap();
        fs::write(temp.path().join("ch/code.txt"), "x = 1").unwrap();

        let root = parse_file_with_includes(&main).unwrap();
        let chapter = root.find_descendant("chapter").unwrap();

        assert_eq!(chapter.attr(XML_ID), Some("one"));
        assert_eq!(chapter.origin.as_deref(), Some(temp.path().join("ch/one.ptx").as_path()));
        assert_eq!(chapter.text(), "x = 1");
    }

    #[test]
    fn reports_missing_include_targets() {
        let temp = tempdir().unwrap();
        let main = temp.path().join("main.ptx");
        fs::write(
            &main,
            r#"<pretext xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="gone.ptx"/></pretext>"#,
        )
        .unwrap();

        let result = parse_file_with_includes(&main);

        assert!(matches!(result, Err(XmlError::Include { .. })));
    }

    #[test]
    fn stops_on_include_cycles() {
        let temp = tempdir().unwrap();
        let main = temp.path().join("loop.ptx");
        fs::write(
            &main,
            r#"<part xmlns:xi="http://www.w3.org/2001/XInclude"><xi:include href="loop.ptx"/></part>"#,
        )
        .unwrap();

        let result = parse_file_with_includes(&main);

        assert!(matches!(result, Err(XmlError::Include { .. })));
    }
}
