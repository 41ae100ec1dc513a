//! Command line overrides for manifest entries.
//!
//! Paths are `.`-separated element names relative to the root element, so the
//! `<c>` in `<project><a><b><c>` is `a.b.c`. An attribute is addressed as
//! `a.b.c@name`. Overrides are collected into a [`ShadowXmlDocument`] and then
//! laid over a parsed manifest before it is validated.

use std::collections::BTreeMap;

use crate::xml::{Element, Node};

/// Errors raised while recording an override.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("Cannot have multiple `@` characters in an override path: {0}")]
    MultipleAttributeMarkers(String),

    #[error("Override path must not be empty")]
    EmptyPath,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ShadowNode {
    value: Option<String>,
    attributes: Vec<(String, String)>,
}

/// A sparse description of the elements and attributes to force into a tree.
#[derive(Debug, Clone, Default)]
pub struct ShadowXmlDocument {
    nodes: BTreeMap<String, ShadowNode>,
}

impl ShadowXmlDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Record the text of `path`, or an attribute when `path` has an `@name` suffix.
    pub fn upsert_node_or_attribute(
        &mut self,
        path: &str,
        value: &str,
    ) -> Result<&mut Self, OverlayError> {
        let mut parts = path.split('@');
        let node_path = parts.next().unwrap_or_default();
        let attribute = parts.next();
        if parts.next().is_some() {
            return Err(OverlayError::MultipleAttributeMarkers(path.to_string()));
        }
        if node_path.is_empty() {
            return Err(OverlayError::EmptyPath);
        }

        let node = self.nodes.entry(node_path.to_string()).or_default();
        match attribute {
            Some(name) => node.attributes.push((name.to_string(), value.to_string())),
            None => node.value = Some(value.to_string()),
        }
        Ok(self)
    }

    /// Apply every recorded override to `root`, creating missing elements.
    ///
    /// When several elements match a path component, the override is applied
    /// below each of them. Returns one message per change made.
    pub fn overlay_tree(&self, root: &mut Element) -> Vec<String> {
        let mut messages = Vec::new();

        for (path, node) in &self.nodes {
            let components: Vec<&str> = path.split('.').collect();
            let trails = upsert_path(root, &components, Vec::new(), &mut Vec::new(), &mut messages);

            for trail in trails {
                let Some(element) = element_at_mut(root, &trail) else {
                    continue;
                };
                for (attribute, value) in &node.attributes {
                    match element.attr(attribute) {
                        Some(old) if old != value => messages.push(format!(
                            "ATTRIBUTE_CHANGED '{}' to '{}' at XML path '{}'",
                            old, value, path
                        )),
                        Some(_) => {}
                        None => messages.push(format!(
                            "ATTRIBUTE_ADDED '{}' at XML path '{}'",
                            value, path
                        )),
                    }
                    element.set_attr(attribute.as_str(), value.as_str());
                }
                if let Some(value) = &node.value {
                    match element.leading_text() {
                        Some(old) => messages.push(format!(
                            "TEXT_CHANGED ''{}'' to ''{}'' at XML path '{}'",
                            old, value, path
                        )),
                        None => messages.push(format!(
                            "TEXT_ADDED ''{}'' at XML path '{}'",
                            value, path
                        )),
                    }
                    element.set_leading_text(value.as_str());
                }
            }
        }

        messages
    }
}

/// Walk `path` below `current`, adding missing elements, and return the child
/// index trail of every element the path ends on.
fn upsert_path(
    current: &mut Element,
    path: &[&str],
    trail: Vec<usize>,
    walked: &mut Vec<String>,
    messages: &mut Vec<String>,
) -> Vec<Vec<usize>> {
    let Some((needed, rest)) = path.split_first() else {
        return vec![trail];
    };
    walked.push(needed.to_string());

    let mut matching: Vec<usize> = current
        .children
        .iter()
        .enumerate()
        .filter_map(|(index, node)| match node {
            Node::Element(element) if element.name == *needed => Some(index),
            _ => None,
        })
        .collect();

    if matching.is_empty() {
        current.push(Element::new(*needed));
        messages.push(format!("NODE_ADDED with XML path {}", walked.join(".")));
        matching.push(current.children.len() - 1);
    }

    let mut trails = Vec::new();
    for index in matching {
        if let Node::Element(child) = &mut current.children[index] {
            let mut child_trail = trail.clone();
            child_trail.push(index);
            trails.extend(upsert_path(child, rest, child_trail, walked, messages));
        }
    }
    walked.pop();
    trails
}

fn element_at_mut<'a>(root: &'a mut Element, trail: &[usize]) -> Option<&'a mut Element> {
    let mut current = root;
    for &index in trail {
        current = match current.children.get_mut(index)? {
            Node::Element(element) => element,
            Node::Text(_) => return None,
        };
    }
    Some(current)
}
