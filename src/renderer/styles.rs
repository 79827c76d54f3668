use std::collections::BTreeMap;

use crate::ast::{StyleDef, StyleType};
use crate::docx::xml::{XmlDocument, XmlElement};

/// The target package's `w:styles` part, resolved against by display name or id.
#[derive(Clone, Debug)]
pub struct StyleCatalogue {
    root: XmlElement,
}

fn is_heading_name(name: &str) -> bool {
    let lower = name.trim().to_ascii_lowercase();
    let level = lower
        .strip_prefix("heading ")
        .map(|rest| rest.strip_suffix(" char").unwrap_or(rest));
    matches!(level, Some(n) if n.len() == 1 && matches!(n.as_bytes()[0], b'1'..=b'9'))
}

impl StyleCatalogue {
    pub fn new(root: XmlElement) -> Self {
        Self { root }
    }

    fn styles(&self) -> impl Iterator<Item = &XmlElement> {
        self.root.children_named("w:style")
    }

    fn type_matches(el: &XmlElement, kind: StyleType) -> bool {
        el.attr("w:type") == Some(kind.as_ooxml())
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.styles().any(|s| s.attr_value("w:styleId").as_deref() == Some(id))
    }

    fn id_by_name(&self, name: &str, kind: StyleType) -> Option<String> {
        self.styles()
            .filter(|s| Self::type_matches(s, kind))
            .find(|s| {
                s.child_attr("w:name", "w:val")
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .and_then(|s| s.attr_value("w:styleId"))
    }

    fn id_by_id(&self, id: &str, kind: StyleType) -> Option<String> {
        self.styles()
            .filter(|s| Self::type_matches(s, kind))
            .find(|s| s.attr_value("w:styleId").as_deref() == Some(id))
            .and_then(|s| s.attr_value("w:styleId"))
    }

    /// Target style id for an AST style reference: display name first, then the id itself.
    /// `None` means the default style applies.
    pub fn resolve(
        &self,
        style: &str,
        ast_styles: &BTreeMap<String, StyleDef>,
        kind: StyleType,
    ) -> Option<String> {
        let name = ast_styles.get(style).map(|d| d.name.as_str());
        let found = name
            .and_then(|n| self.id_by_name(n, kind))
            .or_else(|| self.id_by_name(style, kind))
            .or_else(|| self.id_by_id(style, kind));
        if found.is_none() {
            tracing::debug!(style, "style not in target catalogue; default style used");
        }
        found
    }

    /// Strips `w:color` from the built-in heading styles and their linked character styles.
    pub fn neutralize_heading_colors(&mut self) {
        for style in self.root.elements_mut().filter(|s| s.name == "w:style") {
            let heading = style
                .child_attr("w:name", "w:val")
                .is_some_and(|n| is_heading_name(&n));
            if !heading {
                continue;
            }
            if let Some(rpr) = style.child_mut("w:rPr") {
                rpr.remove_children("w:color");
            }
        }
    }

    /// Adds minimal definitions for AST styles the target lacks (by id and by name), so
    /// style names survive a round trip. Numbering styles are skipped.
    pub fn ensure(&mut self, ast_styles: &BTreeMap<String, StyleDef>) {
        for def in ast_styles.values() {
            if def.style_type == StyleType::Numbering {
                continue;
            }
            if self.has_id(&def.style_id) || self.id_by_name(&def.name, def.style_type).is_some() {
                continue;
            }
            let mut el = XmlElement::new("w:style")
                .with_attr("w:type", def.style_type.as_ooxml())
                .with_attr("w:customStyle", "1")
                .with_attr("w:styleId", &def.style_id)
                .with_child(XmlElement::new("w:name").with_attr("w:val", &def.name));
            if let Some(base) = def.based_on.as_deref() {
                if self.has_id(base) || ast_styles.contains_key(base) {
                    el.push(XmlElement::new("w:basedOn").with_attr("w:val", base));
                }
            }
            self.root.push(el);
        }
    }

    #[cfg(test)]
    fn style_rpr(&self, id: &str) -> Option<&XmlElement> {
        self.styles()
            .find(|s| s.attr_value("w:styleId").as_deref() == Some(id))
            .and_then(|s| s.child("w:rPr"))
    }

    pub fn to_document(&self) -> XmlDocument {
        XmlDocument::new("word/styles.xml", self.root.clone())
    }
}
