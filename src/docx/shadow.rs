//! Capture of self-namespaced properties fragments and their sanitization before reuse.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::RawXml;
use crate::error::AstResult;

use super::xml::XmlElement;

/// Prefix -> namespace URI (raw attribute value) declared on part roots.
#[derive(Clone, Debug, Default)]
pub struct Namespaces {
    decls: BTreeMap<String, String>,
}

impl Namespaces {
    /// Collects `xmlns:*` declarations; earlier roots win on conflicting prefixes.
    pub fn from_roots(roots: &[&XmlElement]) -> Self {
        let mut decls = BTreeMap::new();
        for root in roots {
            for (k, v) in &root.attrs {
                if let Some(prefix) = k.strip_prefix("xmlns:") {
                    decls.entry(prefix.to_string()).or_insert_with(|| v.clone());
                }
            }
        }
        Self { decls }
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.decls.get(prefix).map(String::as_str)
    }
}

fn used_prefixes(el: &XmlElement, out: &mut BTreeSet<String>) {
    if let Some(p) = el.prefix() {
        out.insert(p.to_string());
    }
    for (k, _) in &el.attrs {
        if k == "xmlns" || k.starts_with("xmlns:") {
            continue;
        }
        if let Some((p, _)) = k.split_once(':') {
            out.insert(p.to_string());
        }
    }
    for child in el.elements() {
        used_prefixes(child, out);
    }
}

/// Serializes a properties element so it parses on its own: every prefix it uses is
/// declared on its root. Elements without children produce no shadow.
pub fn capture(el: &XmlElement, ns: &Namespaces) -> AstResult<Option<RawXml>> {
    if el.element_count() == 0 {
        return Ok(None);
    }
    let mut prefixes = BTreeSet::new();
    used_prefixes(el, &mut prefixes);

    let mut copy = el.clone();
    let mut decls = Vec::new();
    for prefix in prefixes {
        if prefix == "xml" {
            continue;
        }
        let key = format!("xmlns:{prefix}");
        if copy.attr(&key).is_some() {
            continue;
        }
        if let Some(uri) = ns.uri(&prefix) {
            decls.push((key, uri.to_string()));
        }
    }
    decls.append(&mut copy.attrs);
    copy.attrs = decls;
    RawXml::serialize(&copy).map(Some)
}

/// Drops namespace declarations the target part root already makes with the same URI.
pub fn adopt(el: &mut XmlElement, target: &Namespaces) {
    el.attrs.retain(|(k, v)| match k.strip_prefix("xmlns:") {
        Some(prefix) => target.uri(prefix) != Some(v.as_str()),
        None => true,
    });
}

/// Revision markup that refers to ids and snapshots of the source package.
pub const REVISION_MARKERS: &[&str] = &[
    "w:pPrChange",
    "w:rPrChange",
    "w:tblPrChange",
    "w:tblPrExChange",
    "w:trPrChange",
    "w:tcPrChange",
    "w:sectPrChange",
    "w:ins",
    "w:del",
    "w:moveFrom",
    "w:moveTo",
    "w:cellIns",
    "w:cellDel",
    "w:cellMerge",
];

pub fn sanitize_ppr(ppr: &mut XmlElement) {
    ppr.remove_children("w:pStyle");
    ppr.remove_children("w:sectPr");
    ppr.remove_descendants(REVISION_MARKERS);
    if let Some(mark) = ppr.child_mut("w:rPr") {
        mark.remove_children("w:rStyle");
    }
}

pub fn sanitize_rpr(rpr: &mut XmlElement) {
    rpr.remove_children("w:rStyle");
    rpr.remove_descendants(REVISION_MARKERS);
}

pub fn sanitize_tblpr(tblpr: &mut XmlElement) {
    tblpr.remove_children("w:tblStyle");
    tblpr.remove_descendants(REVISION_MARKERS);
}

/// Grid offsets are dropped: the rebuilt table always starts at grid column 0.
pub fn sanitize_trpr(trpr: &mut XmlElement) {
    for name in ["w:gridBefore", "w:gridAfter", "w:wBefore", "w:wAfter"] {
        trpr.remove_children(name);
    }
    trpr.remove_descendants(REVISION_MARKERS);
}

/// Span and width markup is regenerated from the cell's grid position.
pub fn sanitize_tcpr(tcpr: &mut XmlElement) {
    for name in ["w:gridSpan", "w:vMerge", "w:hMerge", "w:tcW"] {
        tcpr.remove_children(name);
    }
    tcpr.remove_descendants(REVISION_MARKERS);
}
