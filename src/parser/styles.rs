use std::collections::{BTreeMap, HashSet};

use crate::ast::{StyleDef, StyleType};
use crate::docx::xml::XmlElement;

/// One `w:style` definition with the properties elements the parser inherits from.
#[derive(Clone, Debug)]
pub struct StyleEntry {
    pub def: StyleDef,
    pub ppr: Option<XmlElement>,
    pub rpr: Option<XmlElement>,
}

/// Style definitions of the source package, keyed by style id.
#[derive(Clone, Debug, Default)]
pub struct StyleSheet {
    pub entries: BTreeMap<String, StyleEntry>,
    pub default_paragraph: Option<String>,
    pub default_rpr: Option<XmlElement>,
}

impl StyleSheet {
    pub fn from_root(root: &XmlElement) -> Self {
        let mut sheet = Self {
            default_rpr: root
                .child("w:docDefaults")
                .and_then(|d| d.child("w:rPrDefault"))
                .and_then(|d| d.child("w:rPr"))
                .cloned(),
            ..Default::default()
        };
        for el in root.children_named("w:style") {
            let Some(style_id) = el.attr_value("w:styleId") else {
                continue;
            };
            let Some(style_type) = el
                .attr_value("w:type")
                .as_deref()
                .and_then(StyleType::from_ooxml)
            else {
                continue;
            };
            if style_type == StyleType::Paragraph
                && el.attr("w:default").is_some_and(|v| matches!(v, "1" | "true" | "on"))
                && sheet.default_paragraph.is_none()
            {
                sheet.default_paragraph = Some(style_id.clone());
            }
            let def = StyleDef {
                name: el
                    .child_attr("w:name", "w:val")
                    .unwrap_or_else(|| style_id.clone()),
                style_id: style_id.clone(),
                style_type,
                based_on: el.child_attr("w:basedOn", "w:val"),
            };
            sheet.entries.insert(
                style_id,
                StyleEntry {
                    def,
                    ppr: el.child("w:pPr").cloned(),
                    rpr: el.child("w:rPr").cloned(),
                },
            );
        }
        sheet
    }

    /// `id`, then its `based_on` ancestors. Stops at a missing id or on a cycle.
    pub fn chain(&self, id: &str) -> Vec<&StyleEntry> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(id);
        while let Some(cur) = next {
            if !seen.insert(cur) {
                tracing::warn!(style = cur, "cyclic basedOn chain");
                break;
            }
            let Some(entry) = self.entries.get(cur) else {
                break;
            };
            out.push(entry);
            next = entry.def.based_on.as_deref();
        }
        out
    }

    /// Flat `{id -> definition}` table, no inheritance resolution.
    pub fn style_table(&self) -> BTreeMap<String, StyleDef> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.def.clone()))
            .collect()
    }

    pub fn language(&self) -> Option<String> {
        let lang = self.default_rpr.as_ref()?.child("w:lang")?;
        lang.attr_value("w:val")
            .or_else(|| lang.attr_value("w:eastAsia"))
            .filter(|v| !v.is_empty())
    }
}
