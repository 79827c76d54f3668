use std::borrow::Cow;

use anyhow::{anyhow, Context};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

/// Owned element tree. Attribute values are kept in their raw (escaped) form so that
/// character references survive a parse/write cycle untouched; text nodes are unescaped.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
}

/// A whole XML part: everything before the root element plus the root itself.
#[derive(Clone, Debug)]
pub struct XmlDocument {
    pub name: String,
    pub prolog: Vec<XmlEvent>,
    pub root: XmlElement,
}

pub fn parse_events(xml_bytes: &[u8]) -> anyhow::Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).context("read xml event")?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().context("decl version")?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::End(e) => {
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Empty(s) => {
                events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::Text(t) => {
                let txt = t.unescape().context("unescape text")?.into_owned();
                events.push(XmlEvent::Text { text: txt });
            }
            Event::CData(t) => {
                let txt = bytes_to_string(t.into_inner());
                events.push(XmlEvent::CData { text: txt });
            }
            Event::Comment(t) => {
                let txt = bytes_to_string(t.into_inner());
                events.push(XmlEvent::Comment { text: txt });
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => {
                let txt = bytes_to_string(t.into_inner());
                events.push(XmlEvent::DocType { text: txt });
            }
        }
    }
    Ok(events)
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        let key = bytes_to_string(a.key.as_ref());
        // Raw bytes: VML payloads such as `o:gfxdata` carry `&#13;&#10;` references that
        // would be normalized to spaces if unescaped and written back.
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_events(events: &[XmlEvent]) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();

    fn escape_text_into(out: &mut Vec<u8>, text: &str) {
        for ch in text.chars() {
            match ch {
                '&' => out.extend_from_slice(b"&amp;"),
                '<' => out.extend_from_slice(b"&lt;"),
                '>' => out.extend_from_slice(b"&gt;"),
                _ => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
        out.extend_from_slice(b"<");
        out.extend_from_slice(name.as_bytes());
        // Attribute values are already escaped.
        for (k, v) in attrs {
            out.extend_from_slice(b" ");
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(b"=\"");
            out.extend_from_slice(v.as_bytes());
            out.extend_from_slice(b"\"");
        }
        if empty {
            out.extend_from_slice(b"/>");
        } else {
            out.extend_from_slice(b">");
        }
    }

    for ev in events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let d =
                    BytesDecl::new(version.as_str(), encoding.as_deref(), standalone.as_deref());
                let mut writer = quick_xml::Writer::new(Vec::new());
                writer.write_event(Event::Decl(d)).context("write decl")?;
                out.extend_from_slice(&writer.into_inner());
            }
            XmlEvent::Start { name, attrs } => {
                write_start_like(&mut out, name, attrs, false);
            }
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b">");
            }
            XmlEvent::Empty { name, attrs } => {
                write_start_like(&mut out, name, attrs, true);
            }
            XmlEvent::Text { text } => {
                escape_text_into(&mut out, text);
            }
            XmlEvent::CData { text } => {
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b">");
            }
        }
    }

    Ok(out)
}

/// Builds an element tree from a flat event list. Exactly one root element is accepted;
/// anything but whitespace, comments and processing instructions outside it is an error.
fn build_tree(events: Vec<XmlEvent>) -> anyhow::Result<(Vec<XmlEvent>, XmlElement)> {
    let mut prolog: Vec<XmlEvent> = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    fn attach(
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
        el: XmlElement,
    ) -> anyhow::Result<()> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(XmlNode::Element(el));
            return Ok(());
        }
        if root.is_some() {
            return Err(anyhow!("multiple root elements (second: <{}>)", el.name));
        }
        *root = Some(el);
        Ok(())
    }

    for ev in events {
        match ev {
            XmlEvent::Start { name, attrs } => {
                if stack.is_empty() && root.is_some() {
                    return Err(anyhow!("multiple root elements (second: <{name}>)"));
                }
                stack.push(XmlElement {
                    name,
                    attrs,
                    children: Vec::new(),
                });
            }
            XmlEvent::Empty { name, attrs } => {
                let el = XmlElement {
                    name,
                    attrs,
                    children: Vec::new(),
                };
                attach(&mut stack, &mut root, el)?;
            }
            XmlEvent::End { name } => {
                let el = stack
                    .pop()
                    .ok_or_else(|| anyhow!("unmatched end tag </{name}>"))?;
                if el.name != name {
                    return Err(anyhow!("mismatched end tag </{name}> for <{}>", el.name));
                }
                attach(&mut stack, &mut root, el)?;
            }
            XmlEvent::Text { text } => match stack.last_mut() {
                Some(parent) => parent.children.push(XmlNode::Text(text)),
                None if text.trim().is_empty() => {}
                None => return Err(anyhow!("text outside of root element: {text:?}")),
            },
            XmlEvent::CData { text } => match stack.last_mut() {
                Some(parent) => parent.children.push(XmlNode::CData(text)),
                None => return Err(anyhow!("CDATA outside of root element")),
            },
            XmlEvent::Comment { text } => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Comment(text));
                } else if root.is_none() {
                    prolog.push(XmlEvent::Comment { text });
                }
            }
            XmlEvent::PI { content } => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::PI(content));
                } else if root.is_none() {
                    prolog.push(XmlEvent::PI { content });
                }
            }
            ev @ (XmlEvent::Decl { .. } | XmlEvent::DocType { .. }) => {
                if root.is_some() || !stack.is_empty() {
                    return Err(anyhow!("declaration after root element"));
                }
                prolog.push(ev);
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(anyhow!("unclosed element <{}>", open.name));
    }
    let root = root.ok_or_else(|| anyhow!("no root element"))?;
    Ok((prolog, root))
}

pub fn parse_xml_document(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlDocument> {
    let events = parse_events(xml_bytes).with_context(|| format!("parse xml: {name}"))?;
    let (prolog, root) = build_tree(events).with_context(|| format!("build tree: {name}"))?;
    Ok(XmlDocument {
        name: name.to_string(),
        prolog,
        root,
    })
}

pub fn write_xml_document(doc: &XmlDocument) -> anyhow::Result<Vec<u8>> {
    let mut events = doc.prolog.clone();
    doc.root.push_events(&mut events);
    write_events(&events).with_context(|| format!("serialize xml: {}", doc.name))
}

impl XmlDocument {
    /// A new standalone part with the usual OOXML declaration.
    pub fn new(name: &str, root: XmlElement) -> Self {
        Self {
            name: name.to_string(),
            prolog: vec![XmlEvent::Decl {
                version: "1.0".to_string(),
                encoding: Some("UTF-8".to_string()),
                standalone: Some("yes".to_string()),
            }],
            root,
        }
    }
}

pub fn escape_attr(value: &str) -> String {
    escape(value).into_owned()
}

pub fn unescape_attr(raw: &str) -> String {
    match unescape(raw) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => raw.to_string(),
    }
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Parses a standalone fragment holding exactly one element.
    pub fn parse_fragment(xml: &str) -> anyhow::Result<Self> {
        let events = parse_events(xml.as_bytes())?;
        let (prolog, root) = build_tree(events)?;
        if prolog
            .iter()
            .any(|e| matches!(e, XmlEvent::DocType { .. }))
        {
            return Err(anyhow!("unexpected DOCTYPE in fragment"));
        }
        Ok(root)
    }

    pub fn push_events(&self, out: &mut Vec<XmlEvent>) {
        if self.children.is_empty() {
            out.push(XmlEvent::Empty {
                name: self.name.clone(),
                attrs: self.attrs.clone(),
            });
            return;
        }
        out.push(XmlEvent::Start {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
        });
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.push_events(out),
                XmlNode::Text(text) => out.push(XmlEvent::Text { text: text.clone() }),
                XmlNode::CData(text) => out.push(XmlEvent::CData { text: text.clone() }),
                XmlNode::Comment(text) => out.push(XmlEvent::Comment { text: text.clone() }),
                XmlNode::PI(content) => out.push(XmlEvent::PI {
                    content: content.clone(),
                }),
            }
        }
        out.push(XmlEvent::End {
            name: self.name.clone(),
        });
    }

    pub fn to_xml_string(&self) -> anyhow::Result<String> {
        let mut events = Vec::new();
        self.push_events(&mut events);
        let bytes = write_events(&events)?;
        String::from_utf8(bytes).context("fragment is not utf-8")
    }

    /// Raw (escaped) attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Unescaped attribute value.
    pub fn attr_value(&self, key: &str) -> Option<String> {
        self.attr(key).map(unescape_attr)
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        let escaped = escape_attr(value);
        for (k, v) in self.attrs.iter_mut() {
            if k == key {
                *v = escaped;
                return;
            }
        }
        self.attrs.push((key.to_string(), escaped));
    }

    pub fn remove_attr(&mut self, key: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|(k, _)| k != key);
        before != self.attrs.len()
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.name == name)
    }

    /// `w:val` style lookup: the unescaped `attr` of the first child called `name`.
    pub fn child_attr(&self, name: &str, attr: &str) -> Option<String> {
        self.child(name).and_then(|el| el.attr_value(attr))
    }

    pub fn element_count(&self) -> usize {
        self.elements().count()
    }

    /// Removes every direct child element called `name`; returns how many were removed.
    pub fn remove_children(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|c| !matches!(c, XmlNode::Element(el) if el.name == name));
        before - self.children.len()
    }

    /// Removes matching elements at any depth below `self`.
    pub fn remove_descendants(&mut self, names: &[&str]) {
        self.children
            .retain(|c| !matches!(c, XmlNode::Element(el) if names.contains(&el.name.as_str())));
        for el in self.elements_mut() {
            el.remove_descendants(names);
        }
    }

    /// Pre-order walk over all descendant elements (excluding `self`).
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        fn walk<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
            for child in el.elements() {
                out.push(child);
                walk(child, out);
            }
        }
        walk(self, &mut out);
        out
    }

    pub fn find_descendant(&self, name: &str) -> Option<&XmlElement> {
        self.descendants().into_iter().find(|el| el.name == name)
    }

    /// Concatenated text of direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for c in &self.children {
            match c {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_preserves_attr_entity_refs() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let doc = parse_xml_document("test.xml", xml).expect("parse xml");
        let out = write_xml_document(&doc).expect("write xml");
        let s = String::from_utf8(out).expect("utf8");

        assert!(s.contains(r#"o:gfxdata="A&#xD;&#xA;B""#));
        assert!(!s.contains(r#"o:gfxdata="A&amp;#xD;"#));
    }

    #[test]
    fn fragment_tree_round_trip() {
        let xml = r#"<w:pPr xmlns:w="urn:w"><w:jc w:val="center"/><w:spacing w:before="120" w:after="240"/></w:pPr>"#;
        let el = XmlElement::parse_fragment(xml).expect("parse");
        assert_eq!(el.name, "w:pPr");
        assert_eq!(el.element_count(), 2);
        assert_eq!(el.child_attr("w:jc", "w:val").as_deref(), Some("center"));
        assert_eq!(el.to_xml_string().expect("write"), xml);
    }

    #[test]
    fn fragment_rejects_garbage() {
        assert!(XmlElement::parse_fragment("NOT VALID XML").is_err());
        assert!(XmlElement::parse_fragment("<a><b></a>").is_err());
        assert!(XmlElement::parse_fragment("<a>").is_err());
        assert!(XmlElement::parse_fragment("<a/><b/>").is_err());
        assert!(XmlElement::parse_fragment("").is_err());
    }

    #[test]
    fn attribute_values_are_escaped_on_set() {
        let mut el = XmlElement::new("w:rFonts");
        el.set_attr("w:ascii", "A & B");
        assert_eq!(el.attr("w:ascii"), Some("A &amp; B"));
        assert_eq!(el.attr_value("w:ascii").as_deref(), Some("A & B"));
    }

    #[test]
    fn text_is_unescaped_in_tree_and_escaped_on_write() {
        let el = XmlElement::parse_fragment("<w:t>a &lt; b</w:t>").expect("parse");
        assert_eq!(el.text(), "a < b");
        assert_eq!(el.to_xml_string().expect("write"), "<w:t>a &lt; b</w:t>");
    }

    #[test]
    fn remove_descendants_is_recursive() {
        let mut el = XmlElement::parse_fragment(
            "<w:pPr><w:rPr><w:ins w:id=\"1\"/><w:b/></w:rPr><w:pPrChange/></w:pPr>",
        )
        .expect("parse");
        el.remove_descendants(&["w:ins", "w:pPrChange"]);
        assert_eq!(el.to_xml_string().expect("write"), "<w:pPr><w:rPr><w:b/></w:rPr></w:pPr>");
    }
}
