use std::collections::BTreeMap;

use anyhow::Context;

use super::package::DocxPackage;
use super::xml::{parse_xml_document, XmlDocument, XmlElement};

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_SETTINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/settings";
pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// The relationship set of one source part (e.g. `word/_rels/document.xml.rels`).
#[derive(Clone, Debug, Default)]
pub struct Relationships {
    pub items: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let doc = parse_xml_document("rels", bytes)?;
        let mut items = Vec::new();
        for el in doc.root.children_named("Relationship") {
            let (Some(id), Some(rel_type), Some(target)) = (
                el.attr_value("Id"),
                el.attr_value("Type"),
                el.attr_value("Target"),
            ) else {
                continue;
            };
            items.push(Relationship {
                id,
                rel_type,
                target,
                external: el.attr("TargetMode") == Some("External"),
            });
        }
        Ok(Self { items })
    }

    /// Relationships for `part_name`, or an empty set when the rels part is absent.
    pub fn for_part(pkg: &DocxPackage, part_name: &str) -> anyhow::Result<Self> {
        let rels_name = rels_part_name(part_name);
        match pkg.data(&rels_name) {
            Some(bytes) => Self::parse(bytes).with_context(|| format!("parse {rels_name}")),
            None => Ok(Self::default()),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn first_of_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.rel_type == rel_type)
    }

    pub fn add(&mut self, rel_type: &str, target: &str) -> String {
        let id = format!("rId{}", self.items.len() + 1);
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external: false,
        });
        id
    }

    pub fn to_document(&self, name: &str) -> XmlDocument {
        let mut root = XmlElement::new("Relationships").with_attr("xmlns", RELS_NS);
        for rel in &self.items {
            let mut el = XmlElement::new("Relationship")
                .with_attr("Id", &rel.id)
                .with_attr("Type", &rel.rel_type)
                .with_attr("Target", &rel.target);
            if rel.external {
                el.set_attr("TargetMode", "External");
            }
            root.push(el);
        }
        XmlDocument::new(name, root)
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_part_name(part_name: &str) -> String {
    let part_name = part_name.trim_start_matches('/');
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolves a relationship target relative to the directory of `source_part`.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let base_dir = source_part
        .trim_start_matches('/')
        .rsplit_once('/')
        .map(|(d, _)| d)
        .unwrap_or("");
    let mut segments: Vec<&str> = if base_dir.is_empty() {
        Vec::new()
    } else {
        base_dir.split('/').collect()
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Locates the main document part through the package relationships.
pub fn main_document_part(pkg: &DocxPackage) -> String {
    Relationships::for_part(pkg, "")
        .ok()
        .and_then(|rels| {
            rels.first_of_type(REL_OFFICE_DOCUMENT)
                .map(|r| resolve_target("", &r.target))
        })
        .unwrap_or_else(|| "word/document.xml".to_string())
}

#[derive(Clone, Debug, Default)]
pub struct ContentTypes {
    pub defaults: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, String>,
}

impl ContentTypes {
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let doc = parse_xml_document("[Content_Types].xml", bytes)?;
        let mut out = Self::default();
        for el in doc.root.elements() {
            match el.name.as_str() {
                "Default" => {
                    if let (Some(ext), Some(ct)) =
                        (el.attr_value("Extension"), el.attr_value("ContentType"))
                    {
                        out.defaults.insert(ext.to_ascii_lowercase(), ct);
                    }
                }
                "Override" => {
                    if let (Some(part), Some(ct)) =
                        (el.attr_value("PartName"), el.attr_value("ContentType"))
                    {
                        out.overrides
                            .insert(part.trim_start_matches('/').to_string(), ct);
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    pub fn from_package(pkg: &DocxPackage) -> anyhow::Result<Self> {
        match pkg.data("[Content_Types].xml") {
            Some(bytes) => Self::parse(bytes),
            None => Ok(Self::default()),
        }
    }

    pub fn content_type_of(&self, part_name: &str) -> Option<&str> {
        let part_name = part_name.trim_start_matches('/');
        if let Some(ct) = self.overrides.get(part_name) {
            return Some(ct.as_str());
        }
        let ext = part_name.rsplit_once('.')?.1.to_ascii_lowercase();
        self.defaults.get(&ext).map(|s| s.as_str())
    }

    pub fn add_default(&mut self, ext: &str, content_type: &str) {
        self.defaults
            .entry(ext.to_ascii_lowercase())
            .or_insert_with(|| content_type.to_string());
    }

    pub fn add_override(&mut self, part_name: &str, content_type: &str) {
        self.overrides.insert(
            part_name.trim_start_matches('/').to_string(),
            content_type.to_string(),
        );
    }

    pub fn to_document(&self) -> XmlDocument {
        let mut root = XmlElement::new("Types").with_attr("xmlns", CONTENT_TYPES_NS);
        for (ext, ct) in &self.defaults {
            root.push(
                XmlElement::new("Default")
                    .with_attr("Extension", ext)
                    .with_attr("ContentType", ct),
            );
        }
        for (part, ct) in &self.overrides {
            root.push(
                XmlElement::new("Override")
                    .with_attr("PartName", &format!("/{part}"))
                    .with_attr("ContentType", ct),
            );
        }
        XmlDocument::new("[Content_Types].xml", root)
    }
}

/// Guesses an image content type from a file extension when the package does not say.
pub fn image_content_type_for_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "emf" => "image/x-emf",
        "wmf" => "image/x-wmf",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub fn image_ext_for_content_type(content_type: &str) -> &'static str {
    match content_type.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpeg",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/x-emf" | "image/emf" => "emf",
        "image/x-wmf" | "image/wmf" => "wmf",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}
