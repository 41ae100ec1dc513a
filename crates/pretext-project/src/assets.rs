//! Generated asset catalogue.
//!
//! Every asset type is recognized by a selector over the assembled source.
//! The [`AssetTable`] records, per type, a hash of all the source nodes of
//! that type so unchanged types can be skipped on the next generation.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::ProjectError;
use crate::target::Format;
use crate::xml::{Element, XML_ID};

/// Namespace of `pf:prefigure` diagrams.
pub const PREFIGURE_NS: &str = "https://prefigure.org";

/// Asset type → hash of all nodes of that type.
pub type AssetTable = BTreeMap<String, String>;

/// Kinds of generated assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetType {
    Webwork,
    Myopenmath,
    LatexImage,
    Asymptote,
    Sageplot,
    Prefigure,
    Interactive,
    Youtube,
    Mermaid,
    Codelens,
    Datafile,
}

impl AssetType {
    /// All types, in generation order.
    pub const ALL: &'static [AssetType] = &[
        AssetType::Webwork,
        AssetType::Myopenmath,
        AssetType::LatexImage,
        AssetType::Asymptote,
        AssetType::Sageplot,
        AssetType::Prefigure,
        AssetType::Interactive,
        AssetType::Youtube,
        AssetType::Mermaid,
        AssetType::Codelens,
        AssetType::Datafile,
    ];

    /// Types whose individual images are cached by content hash.
    pub const CACHEABLE: &'static [AssetType] = &[
        AssetType::LatexImage,
        AssetType::Asymptote,
        AssetType::Sageplot,
        AssetType::Prefigure,
        AssetType::Mermaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Webwork => "webwork",
            AssetType::Myopenmath => "myopenmath",
            AssetType::LatexImage => "latex-image",
            AssetType::Asymptote => "asymptote",
            AssetType::Sageplot => "sageplot",
            AssetType::Prefigure => "prefigure",
            AssetType::Interactive => "interactive",
            AssetType::Youtube => "youtube",
            AssetType::Mermaid => "mermaid",
            AssetType::Codelens => "codelens",
            AssetType::Datafile => "datafile",
        }
    }

    /// Name of the core component that generates this type.
    pub fn component(&self) -> &'static str {
        match self {
            AssetType::Webwork => "webwork",
            AssetType::Myopenmath => "mom",
            AssetType::LatexImage => "latex-image",
            AssetType::Asymptote => "asy",
            AssetType::Sageplot => "sageplot",
            AssetType::Prefigure => "prefigure",
            AssetType::Interactive => "preview",
            AssetType::Youtube => "youtube",
            AssetType::Mermaid => "mermaid",
            AssetType::Codelens => "codelens",
            AssetType::Datafile => "datafile",
        }
    }

    /// Directory below the generated-assets directory that receives the output.
    pub fn output_dir(&self) -> &'static str {
        match self {
            AssetType::Myopenmath => "problems",
            AssetType::Interactive => "preview",
            AssetType::Codelens => "trace",
            other => other.as_str(),
        }
    }

    /// Every directory this type writes into, including side products.
    pub fn directories(&self) -> &'static [&'static str] {
        match self {
            AssetType::Webwork => &["webwork"],
            AssetType::Myopenmath => &["problems"],
            AssetType::LatexImage => &["latex-image"],
            AssetType::Asymptote => &["asymptote"],
            AssetType::Sageplot => &["sageplot"],
            AssetType::Prefigure => &["prefigure"],
            AssetType::Interactive => &["preview", "qrcode"],
            AssetType::Youtube => &["youtube", "play-button", "qrcode"],
            AssetType::Mermaid => &["mermaid"],
            AssetType::Codelens => &["trace"],
            AssetType::Datafile => &["datafile"],
        }
    }

    pub fn is_cacheable(&self) -> bool {
        Self::CACHEABLE.contains(self)
    }

    /// Whether `element` is an asset of this type.
    pub fn matches(&self, element: &Element) -> bool {
        let name = element.name.as_str();
        match self {
            AssetType::Webwork => {
                name == "webwork" && (!element.attributes.is_empty() || element.elements().next().is_some())
            }
            AssetType::Myopenmath => name == "myopenmath" && element.attr("problem").is_some(),
            AssetType::LatexImage => name == "latex-image",
            AssetType::Asymptote => name == "asymptote",
            AssetType::Sageplot => name == "sageplot",
            AssetType::Prefigure => element.local_name() == "prefigure" && element.prefix() == Some("pf"),
            AssetType::Interactive => name == "interactive",
            AssetType::Youtube => name == "video" && element.attr("youtube").is_some(),
            AssetType::Mermaid => name == "mermaid",
            AssetType::Codelens => name == "program" && element.attr("interactive") == Some("codelens"),
            AssetType::Datafile => name == "datafile",
        }
    }

    /// Assets of this type below `root`, in document order.
    pub fn select<'a>(&self, root: &'a Element) -> Vec<&'a Element> {
        root.descendants()
            .into_iter()
            .filter(|element| self.matches(element))
            .collect()
    }

    /// Whether a target of `format` uses this asset type.
    pub fn allowed_for(&self, format: Format) -> bool {
        match format {
            Format::Braille => matches!(
                self,
                AssetType::Webwork
                    | AssetType::LatexImage
                    | AssetType::Sageplot
                    | AssetType::Asymptote
                    | AssetType::Prefigure
                    | AssetType::Myopenmath
                    | AssetType::Datafile
            ),
            Format::Webwork => *self == AssetType::Webwork,
            _ => true,
        }
    }

    /// File formats to produce for a target of `format`.
    ///
    /// Types without per-format output return a single empty string, meaning
    /// the core picks the format itself.
    pub fn output_formats(&self, format: Format, all_formats: bool) -> Vec<&'static str> {
        if all_formats && self.has_output_formats() {
            return vec!["all"];
        }
        let html_like = matches!(format, Format::Html | Format::Revealjs | Format::Custom | Format::Webwork);
        match self {
            AssetType::Asymptote => match format {
                Format::Pdf | Format::Latex => vec!["pdf"],
                Format::Epub | Format::Braille => vec!["svg"],
                Format::Kindle => vec!["png"],
                _ => vec!["html"],
            },
            AssetType::LatexImage => match format {
                Format::Pdf | Format::Latex => vec![],
                Format::Kindle => vec!["png"],
                _ => vec!["svg"],
            },
            AssetType::Sageplot => match format {
                Format::Pdf | Format::Latex => vec!["pdf", "png"],
                Format::Kindle => vec!["png"],
                _ if html_like => vec!["html", "svg"],
                _ => vec!["svg"],
            },
            AssetType::Prefigure => match format {
                Format::Pdf | Format::Latex => vec!["pdf"],
                Format::Kindle => vec!["png"],
                _ => vec!["svg"],
            },
            _ => vec![""],
        }
    }

    fn has_output_formats(&self) -> bool {
        matches!(
            self,
            AssetType::Asymptote | AssetType::LatexImage | AssetType::Sageplot | AssetType::Prefigure
        )
    }

    /// Extensions an individually cached image of this type is stored under.
    pub fn cache_extensions(&self, outformat: &str) -> Vec<&'static str> {
        match (self, outformat) {
            (AssetType::Mermaid, _) => vec!["png"],
            (_, "all") => vec!["pdf", "svg", "png", "eps"],
            (AssetType::Asymptote, "html") => vec!["html"],
            (AssetType::Sageplot, "html") => vec!["html"],
            (_, "pdf") => vec!["pdf"],
            (_, "svg") => vec!["svg"],
            (_, "png") => vec!["png"],
            (_, "eps") => vec!["eps"],
            _ => vec![],
        }
    }
}

impl FromStr for AssetType {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProjectError::InvalidValue {
                attribute: "asset type".to_string(),
                value: s.to_string(),
                expected: AssetType::ALL
                    .iter()
                    .map(AssetType::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash of a sequence of serialized nodes.
pub fn hash_nodes<'a>(nodes: impl IntoIterator<Item = &'a Element>) -> String {
    let mut hasher = Sha256::new();
    for node in nodes {
        hasher.update(node.to_xml_string().as_bytes());
    }
    to_hex(&hasher.finalize())
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hash every asset type present below `root`.
pub fn asset_table(root: &Element) -> AssetTable {
    let mut table = AssetTable::new();
    for asset in AssetType::ALL {
        let nodes = asset.select(root);
        if nodes.is_empty() {
            continue;
        }
        table.insert(asset.as_str().to_string(), hash_nodes(nodes));
    }
    table
}

/// Drop entries for types that no longer appear in the source.
pub fn clean_asset_table(saved: AssetTable, current: &AssetTable) -> AssetTable {
    saved
        .into_iter()
        .filter(|(asset, _)| current.contains_key(asset))
        .collect()
}

/// Read a saved table; unreadable or missing files give an empty table.
pub fn load_asset_table(path: &Path) -> AssetTable {
    fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .unwrap_or_default()
}

pub fn save_asset_table(path: &Path, table: &AssetTable) -> Result<(), ProjectError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ProjectError::io(parent, e))?;
    }
    let json = serde_json::to_string(table).map_err(|e| {
        ProjectError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    fs::write(path, json).map_err(|e| ProjectError::io(path, e))
}

/// An individual asset with an `xml:id`, keyed by the hash of its markup.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetItem {
    /// `xml:id` of the element, or of its enclosing `image` when it has none.
    pub id: String,
    pub hash: String,
}

/// Identified items of `asset` below `root`.
///
/// Returns `None` when some item has no identifier, since its output file
/// name cannot be predicted.
pub fn asset_items(root: &Element, asset: AssetType) -> Option<Vec<AssetItem>> {
    let mut items = Vec::new();
    collect_items(root, asset, None, &mut items)?;
    Some(items)
}

fn collect_items(
    element: &Element,
    asset: AssetType,
    enclosing_id: Option<&str>,
    items: &mut Vec<AssetItem>,
) -> Option<()> {
    for child in element.elements() {
        if asset.matches(child) {
            let id = child.attr(XML_ID).or(enclosing_id)?;
            items.push(AssetItem {
                id: id.to_string(),
                hash: hash_nodes([child]),
            });
            continue;
        }
        let enclosing = if child.name == "image" {
            child.attr(XML_ID)
        } else {
            None
        };
        collect_items(child, asset, enclosing, items)?;
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_str;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const SOURCE: &str = r#"<pretext xmlns:pf="https://prefigure.org"><book>
  <image xml:id="img-tikz"><latex-image>\draw (0,0) circle (1);</latex-image></image>
  <image><asymptote xml:id="asy-square">draw(unitsquare);</asymptote></image>
  <webwork/>
  <webwork><statement><p>Compute.</p></statement></webwork>
  <video youtube="abc123"/>
  <video source="clip.mp4"/>
  <program interactive="codelens" language="python"><code>x = 1</code></program>
  <image xml:id="pf-1"><pf:prefigure><diagram/></pf:prefigure></image>
  <myopenmath problem="12345"/>
</book></pretext>"#;

    #[test]
    fn selects_assets_by_type() {
        let root = parse_str(SOURCE).unwrap();

        assert_eq!(AssetType::Webwork.select(&root).len(), 1);
        assert_eq!(AssetType::Youtube.select(&root).len(), 1);
        assert_eq!(AssetType::Codelens.select(&root).len(), 1);
        assert_eq!(AssetType::Prefigure.select(&root).len(), 1);
        assert_eq!(AssetType::Myopenmath.select(&root).len(), 1);
        assert!(AssetType::Sageplot.select(&root).is_empty());
    }

    #[test]
    fn table_only_lists_present_types() {
        let root = parse_str(SOURCE).unwrap();

        let table = asset_table(&root);
        let keys: Vec<_> = table.keys().cloned().collect();

        assert_eq!(
            keys,
            vec!["asymptote", "codelens", "latex-image", "myopenmath", "prefigure", "webwork", "youtube"]
        );
        assert_eq!(table["latex-image"].len(), 64);
    }

    #[test]
    fn table_changes_with_content() {
        let before = asset_table(&parse_str(SOURCE).unwrap());
        let after = asset_table(&parse_str(&SOURCE.replace("circle (1)", "circle (2)")).unwrap());

        assert_ne!(before["latex-image"], after["latex-image"]);
        assert_eq!(before["asymptote"], after["asymptote"]);
    }

    #[test]
    fn cleaning_drops_vanished_types() {
        let saved: AssetTable = [("sageplot", "1"), ("asymptote", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let current: AssetTable = [("asymptote".to_string(), "3".to_string())].into_iter().collect();

        let cleaned = clean_asset_table(saved, &current);

        assert_eq!(cleaned.keys().collect::<Vec<_>>(), vec!["asymptote"]);
    }

    #[test]
    fn saves_and_loads_tables() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".cache/.web_assets.json");
        let table: AssetTable = [("youtube".to_string(), "abc".to_string())].into_iter().collect();

        save_asset_table(&path, &table).unwrap();

        assert_eq!(load_asset_table(&path), table);
        assert!(load_asset_table(&temp.path().join("missing.json")).is_empty());
    }

    #[test]
    fn format_restrictions() {
        assert!(AssetType::Webwork.allowed_for(Format::Webwork));
        assert!(!AssetType::LatexImage.allowed_for(Format::Webwork));
        assert!(!AssetType::Youtube.allowed_for(Format::Braille));
        assert!(AssetType::Datafile.allowed_for(Format::Braille));
        assert!(AssetType::Mermaid.allowed_for(Format::Html));
    }

    #[test]
    fn output_formats_per_target() {
        assert_eq!(AssetType::Sageplot.output_formats(Format::Pdf, false), vec!["pdf", "png"]);
        assert_eq!(AssetType::Sageplot.output_formats(Format::Html, false), vec!["html", "svg"]);
        assert_eq!(AssetType::LatexImage.output_formats(Format::Latex, false), Vec::<&str>::new());
        assert_eq!(AssetType::Asymptote.output_formats(Format::Kindle, false), vec!["png"]);
        assert_eq!(AssetType::Prefigure.output_formats(Format::Epub, true), vec!["all"]);
        assert_eq!(AssetType::Youtube.output_formats(Format::Html, true), vec![""]);
    }

    #[test]
    fn items_use_own_or_image_ids() {
        let root = parse_str(SOURCE).unwrap();

        let latex = asset_items(&root, AssetType::LatexImage).unwrap();
        let asy = asset_items(&root, AssetType::Asymptote).unwrap();

        assert_eq!(latex[0].id, "img-tikz");
        assert_eq!(asy[0].id, "asy-square");
        assert!(asset_items(&parse_str("<a><latex-image/></a>").unwrap(), AssetType::LatexImage).is_none());
    }
}
