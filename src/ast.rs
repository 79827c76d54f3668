//! JSON-serializable document tree.
//!
//! Every block and cell carries an id assigned at parse time; it is the only key the
//! merge step uses to pair an edited view with the full tree. Formatting the semantic
//! fields cannot express rides along in `_raw_*` shadows (see [`RawXml`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::docx::xml::XmlElement;
use crate::error::{AstError, AstResult};

pub const SCHEMA_VERSION: &str = "1.0";
const SCHEMA_MAJOR: &str = "1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    pub schema_version: String,
    pub document: Document,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub styles: BTreeMap<String, StyleDef>,
    #[serde(default)]
    pub body: Vec<Block>,
    #[serde(default)]
    pub passthrough: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageSetup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Page geometry in twips.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageSetup {
    #[serde(default = "default_page_size")]
    pub size: String,
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub margin: PageMargins,
}

fn default_page_size() -> String {
    "custom".to_string()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMargins {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDef {
    pub style_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub style_type: StyleType,
    #[serde(default)]
    pub based_on: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleType {
    Paragraph,
    Character,
    Table,
    Numbering,
}

impl StyleType {
    pub fn from_ooxml(value: &str) -> Option<Self> {
        match value {
            "paragraph" => Some(Self::Paragraph),
            "character" => Some(Self::Character),
            "table" => Some(Self::Table),
            "numbering" => Some(Self::Numbering),
            _ => None,
        }
    }

    pub fn as_ooxml(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Character => "character",
            Self::Table => "table",
            Self::Numbering => "numbering",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    #[serde(rename = "TOC")]
    Toc(Toc),
}

impl Block {
    pub fn id(&self) -> &str {
        match self {
            Block::Paragraph(p) => &p.id,
            Block::Table(t) => &t.id,
            Block::Toc(t) => &t.id,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "ParagraphFormat::is_empty")]
    pub paragraph_format: ParagraphFormat,
    #[serde(default, skip_serializing_if = "RunFormat::is_empty")]
    pub default_run: RunFormat,
    #[serde(default)]
    pub content: Vec<InlineItem>,
}

impl Paragraph {
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                InlineItem::Text(t) => Some(t.text.as_str()),
                InlineItem::InlineImage(_) => None,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    /// Maps a `w:jc/@w:val` onto the four semantic alignments.
    pub fn from_jc(val: &str) -> Option<Self> {
        match val {
            "left" | "start" => Some(Self::Left),
            "center" => Some(Self::Center),
            "right" | "end" => Some(Self::Right),
            "both" | "distribute" | "lowKashida" | "mediumKashida" | "highKashida"
            | "thaiDistribute" => Some(Self::Justify),
            _ => None,
        }
    }

    pub fn to_jc(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "both",
        }
    }
}

/// Semantic paragraph properties (twips) plus the verbatim `w:pPr` shadow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParagraphFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_left: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_right: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent_first_line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_before: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_after: Option<i64>,
    #[serde(
        rename = "_raw_pPr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw: Option<RawXml>,
}

impl ParagraphFormat {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Semantic run properties. Sizes are half-points, colors `#RRGGBB`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_ascii: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_east_asia: Option<String>,
}

impl RunFormat {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Field-wise overlay: values set on `top` win over `self`.
    pub fn overlaid_with(&self, top: &RunFormat) -> RunFormat {
        RunFormat {
            bold: top.bold.or(self.bold),
            italic: top.italic.or(self.italic),
            underline: top.underline.or(self.underline),
            size: top.size.or(self.size),
            color: top.color.clone().or_else(|| self.color.clone()),
            font_ascii: top.font_ascii.clone().or_else(|| self.font_ascii.clone()),
            font_east_asia: top
                .font_east_asia
                .clone()
                .or_else(|| self.font_east_asia.clone()),
        }
    }
}

/// Run-level overrides: semantic fields plus the verbatim `w:rPr` shadow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOverrides {
    #[serde(flatten)]
    pub format: RunFormat,
    #[serde(
        rename = "_raw_rPr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw: Option<RawXml>,
}

impl RunOverrides {
    pub fn is_empty(&self) -> bool {
        self.format.is_empty() && self.raw.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InlineItem {
    Text(TextRun),
    InlineImage(InlineImage),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "RunOverrides::is_empty")]
    pub overrides: RunOverrides,
}

/// Image bytes are base64 in the JSON form; extents are in twips.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InlineImage {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub content_type: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(
        rename = "_raw_tblPr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw: Option<RawXml>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(
        rename = "_raw_trPr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw: Option<RawXml>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: String,
    #[serde(default)]
    pub content: Vec<Paragraph>,
    #[serde(default)]
    pub grid_col: usize,
    #[serde(default = "one")]
    pub col_span: usize,
    #[serde(default = "one")]
    pub row_span: usize,
    #[serde(
        rename = "_raw_tcPr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw: Option<RawXml>,
}

fn one() -> usize {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Toc {
    pub id: String,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Paragraph>,
}

/// A verbatim, self-namespaced properties fragment (`w:pPr`, `w:rPr`, `w:tblPr`, ...).
///
/// Opaque to the agent-facing view; parsed only when the renderer applies it or the
/// merge step patches it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawXml(String);

impl RawXml {
    pub fn new(xml: impl Into<String>) -> Self {
        Self(xml.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the fragment and checks its root is `expected` (e.g. `w:pPr`).
    pub fn parse(&self, expected: &str) -> AstResult<XmlElement> {
        let el = XmlElement::parse_fragment(&self.0)
            .map_err(|e| AstError::shadow_parse(expected, format!("{e:#}")))?;
        if el.name != expected {
            return Err(AstError::shadow_parse(
                expected,
                format!("root element is <{}>", el.name),
            ));
        }
        Ok(el)
    }

    pub fn serialize(el: &XmlElement) -> AstResult<Self> {
        el.to_xml_string()
            .map(Self)
            .map_err(|e| AstError::shadow_parse(el.name.clone(), format!("{e:#}")))
    }

    /// Parse, edit, re-serialize. Fails without side effects when the fragment is bad.
    pub fn patch(&self, expected: &str, edit: impl FnOnce(&mut XmlElement)) -> AstResult<Self> {
        let mut el = self.parse(expected)?;
        edit(&mut el);
        Self::serialize(&el)
    }
}

impl Ast {
    pub fn new(document: Document) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            document,
        }
    }

    pub fn from_json(text: &str) -> AstResult<Self> {
        let ast: Ast = serde_json::from_str(text)?;
        ast.check_schema()?;
        Ok(ast)
    }

    pub fn to_json(&self, pretty: bool) -> AstResult<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }

    /// Consumers must not trust the shape of `document` under a different major version.
    pub fn check_schema(&self) -> AstResult<()> {
        let major = self
            .schema_version
            .split('.')
            .next()
            .unwrap_or_default()
            .trim();
        if major != SCHEMA_MAJOR {
            return Err(AstError::UnsupportedSchema {
                found: self.schema_version.clone(),
                expected: SCHEMA_MAJOR.to_string(),
            });
        }
        Ok(())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        B64.decode(text.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Ast {
        Ast::new(Document {
            body: vec![
                Block::Paragraph(Paragraph {
                    id: "p0".into(),
                    style: Some("Normal".into()),
                    paragraph_format: ParagraphFormat {
                        alignment: Some(Alignment::Center),
                        raw: Some(RawXml::new("<w:pPr xmlns:w=\"urn:w\"><w:jc w:val=\"center\"/></w:pPr>")),
                        ..Default::default()
                    },
                    content: vec![
                        InlineItem::Text(TextRun {
                            text: "Hi".into(),
                            overrides: RunOverrides {
                                format: RunFormat {
                                    bold: Some(true),
                                    ..Default::default()
                                },
                                raw: None,
                            },
                        }),
                        InlineItem::InlineImage(InlineImage {
                            data: vec![1, 2, 3],
                            content_type: "image/png".into(),
                            width: 1440,
                            height: 720,
                        }),
                    ],
                    ..Default::default()
                }),
                Block::Toc(Toc {
                    id: "toc0".into(),
                    instruction: "TOC \\o \"1-3\"".into(),
                    title: None,
                }),
            ],
            ..Default::default()
        })
    }

    #[test]
    fn json_shape_uses_type_tags_and_raw_keys() {
        let v = serde_json::to_value(sample()).expect("to json");
        let p = &v["document"]["body"][0];
        assert_eq!(p["type"], "Paragraph");
        assert_eq!(p["paragraph_format"]["alignment"], "center");
        assert!(p["paragraph_format"]["_raw_pPr"].is_string());
        assert_eq!(p["content"][0]["type"], "Text");
        assert_eq!(p["content"][0]["overrides"], json!({"bold": true}));
        assert_eq!(p["content"][1]["type"], "InlineImage");
        assert_eq!(p["content"][1]["data"], "AQID");
        assert_eq!(v["document"]["body"][1]["type"], "TOC");
        assert!(p.get("default_run").is_none());
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let ast = sample();
        let text = ast.to_json(true).expect("serialize");
        assert_eq!(Ast::from_json(&text).expect("parse"), ast);
    }

    #[test]
    fn minimal_agent_json_deserializes() {
        let text = r#"{"schema_version":"1.0","document":{"body":[
            {"id":"p0","type":"Paragraph","content":[{"type":"Text","text":"Hello"}]},
            {"id":"t0","type":"Table","rows":[{"cells":[{"id":"t0.r0c0","content":[{"id":"x","type":"Paragraph","content":[]}]}]}]}
        ]}}"#;
        let ast = Ast::from_json(text).expect("parse");
        let Block::Table(t) = &ast.document.body[1] else {
            panic!("expected table");
        };
        assert_eq!(t.rows[0].cells[0].col_span, 1);
        assert_eq!(t.rows[0].cells[0].row_span, 1);
    }

    #[test]
    fn schema_major_version_is_checked() {
        let mut ast = sample();
        ast.schema_version = "2.0".into();
        assert!(matches!(
            ast.check_schema(),
            Err(AstError::UnsupportedSchema { .. })
        ));
        ast.schema_version = "1.3".into();
        assert!(ast.check_schema().is_ok());
    }

    #[test]
    fn raw_shadow_parse_checks_root() {
        let raw = RawXml::new("<w:rPr xmlns:w=\"urn:w\"><w:b/></w:rPr>");
        assert!(raw.parse("w:rPr").is_ok());
        assert!(matches!(raw.parse("w:pPr"), Err(AstError::ShadowParse { .. })));
        assert!(RawXml::new("NOT VALID XML").parse("w:rPr").is_err());
    }
}
