//! Structural renderer: AST -> document package.
//!
//! Shadows are preferred when they parse; otherwise properties are synthesized from the
//! semantic fields. The whole package is assembled in memory, so a failed render never
//! leaves a partially written file behind.

mod paragraph;
pub mod styles;
mod table;
mod toc;

use std::collections::BTreeMap;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::ast::{Ast, Block, InlineImage, Meta, Orientation, StyleDef};
use crate::docx::opc::{
    image_ext_for_content_type, ContentTypes, Relationships, REL_IMAGE, REL_OFFICE_DOCUMENT,
    REL_SETTINGS, REL_STYLES,
};
use crate::docx::package::DocxPackage;
use crate::docx::template::{
    document_root, COMPAT_URI, CT_DOCUMENT, CT_RELATIONSHIPS, CT_SETTINGS, CT_STYLES, CT_XML,
    DEFAULT_MARGIN_LR, DEFAULT_MARGIN_TB, DEFAULT_PAGE_HEIGHT, DEFAULT_PAGE_WIDTH, SETTINGS_XML,
    STYLES_XML,
};
use crate::docx::xml::{parse_xml_document, write_xml_document, XmlDocument, XmlElement};
use crate::error::{AstError, AstResult};
use crate::parser::DEFAULT_TOC_INSTRUCTION;

use styles::StyleCatalogue;

#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Value written to the `compatibilityMode` compat setting.
    pub compatibility_mode: u32,
    pub neutralize_heading_colors: bool,
    /// Used for TOC blocks with an empty instruction.
    pub default_toc_instruction: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            compatibility_mode: 15,
            neutralize_heading_colors: true,
            default_toc_instruction: DEFAULT_TOC_INSTRUCTION.to_string(),
        }
    }
}

/// Mutable state of one render call.
pub(crate) struct Renderer<'a> {
    pub opts: &'a RenderOptions,
    pub ast_styles: &'a BTreeMap<String, StyleDef>,
    pub catalogue: StyleCatalogue,
    pub rels: Relationships,
    pub content_types: ContentTypes,
    /// Media part name -> relationship id.
    media_rels: BTreeMap<String, String>,
    media: Vec<(String, Vec<u8>)>,
    next_drawing_id: u32,
    /// Usable text width in twips.
    pub text_width: i64,
}

impl Renderer<'_> {
    /// Registers image bytes as a content-addressed media part and returns its rel id.
    pub fn add_image(&mut self, image: &InlineImage) -> (String, String) {
        let ext = image_ext_for_content_type(&image.content_type);
        let digest = hex::encode(Sha256::digest(&image.data));
        let name = format!("image-{}.{ext}", &digest[..10]);
        if let Some(rel_id) = self.media_rels.get(&name) {
            return (rel_id.clone(), name);
        }
        let rel_id = self.rels.add(REL_IMAGE, &format!("media/{name}"));
        self.content_types.add_default(ext, &image.content_type);
        self.media_rels.insert(name.clone(), rel_id.clone());
        self.media.push((format!("word/media/{name}"), image.data.clone()));
        (rel_id, name)
    }

    pub fn next_drawing_id(&mut self) -> u32 {
        self.next_drawing_id += 1;
        self.next_drawing_id
    }

    fn render_blocks(&mut self, blocks: &[Block], body: &mut XmlElement) {
        let mut last_was_table = false;
        for block in blocks {
            match block {
                Block::Paragraph(p) => {
                    body.push(paragraph::render_paragraph(self, p));
                    last_was_table = false;
                }
                Block::Table(t) => {
                    let Some(tbl) = table::render_table(self, t) else {
                        continue;
                    };
                    // Two adjacent w:tbl elements are read back as one table.
                    if last_was_table {
                        body.push(XmlElement::new("w:p"));
                    }
                    body.push(tbl);
                    last_was_table = true;
                }
                Block::Toc(t) => {
                    body.push(toc::render_toc(self, t));
                    last_was_table = false;
                }
            }
        }
    }
}

pub fn render_docx(ast: &Ast, output_path: &Path, opts: &RenderOptions) -> AstResult<()> {
    let pkg = render_ast(ast, opts)?;
    pkg.write(output_path).map_err(AstError::from_package)
}

pub fn render_ast(ast: &Ast, opts: &RenderOptions) -> AstResult<DocxPackage> {
    ast.check_schema()?;
    let doc = &ast.document;

    let styles_doc = parse_xml_document("word/styles.xml", STYLES_XML.as_bytes())
        .map_err(AstError::from_package)?;
    let mut catalogue = StyleCatalogue::new(styles_doc.root);
    if opts.neutralize_heading_colors {
        catalogue.neutralize_heading_colors();
    }
    catalogue.ensure(&doc.styles);

    let mut settings = parse_xml_document("word/settings.xml", SETTINGS_XML.as_bytes())
        .map_err(AstError::from_package)?;
    set_compatibility_mode(&mut settings.root, opts.compatibility_mode);

    let mut rels = Relationships::default();
    rels.add(REL_STYLES, "styles.xml");
    rels.add(REL_SETTINGS, "settings.xml");

    let (page_width, margin_left, margin_right) = page_geometry(&doc.meta);
    let mut r = Renderer {
        opts,
        ast_styles: &doc.styles,
        catalogue,
        rels,
        content_types: ContentTypes::default(),
        media_rels: BTreeMap::new(),
        media: Vec::new(),
        next_drawing_id: 0,
        text_width: page_width
            .saturating_sub(margin_left)
            .saturating_sub(margin_right)
            .max(1440),
    };

    let mut body = XmlElement::new("w:body");
    r.render_blocks(&doc.body, &mut body);
    body.push(section_properties(&doc.meta));
    let root = document_root().with_child(body);
    tracing::debug!(blocks = doc.body.len(), media = r.media.len(), "rendered body");

    let mut ct = std::mem::take(&mut r.content_types);
    ct.add_default("rels", CT_RELATIONSHIPS);
    ct.add_default("xml", CT_XML);
    ct.add_override("word/document.xml", CT_DOCUMENT);
    ct.add_override("word/styles.xml", CT_STYLES);
    ct.add_override("word/settings.xml", CT_SETTINGS);

    let mut package_rels = Relationships::default();
    package_rels.add(REL_OFFICE_DOCUMENT, "word/document.xml");

    let parts: Vec<XmlDocument> = vec![
        ct.to_document(),
        package_rels.to_document("_rels/.rels"),
        XmlDocument::new("word/document.xml", root),
        r.rels.to_document("word/_rels/document.xml.rels"),
        r.catalogue.to_document(),
        settings,
    ];
    let mut pkg = DocxPackage::default();
    for part in &parts {
        let bytes = write_xml_document(part).map_err(AstError::from_package)?;
        pkg.put(&part.name, bytes);
    }
    for (name, data) in std::mem::take(&mut r.media) {
        pkg.put(&name, data);
    }
    Ok(pkg)
}

fn set_compatibility_mode(settings: &mut XmlElement, mode: u32) {
    if !settings.has_child("w:compat") {
        settings.push(XmlElement::new("w:compat"));
    }
    let Some(compat) = settings.child_mut("w:compat") else {
        return;
    };
    let value = mode.to_string();
    if let Some(cs) = compat.elements_mut().find(|cs| {
        cs.name == "w:compatSetting"
            && cs.attr("w:name") == Some("compatibilityMode")
            && cs.attr("w:uri") == Some(COMPAT_URI)
    }) {
        cs.set_attr("w:val", &value);
        return;
    }
    compat.push(
        XmlElement::new("w:compatSetting")
            .with_attr("w:name", "compatibilityMode")
            .with_attr("w:uri", COMPAT_URI)
            .with_attr("w:val", &value),
    );
}

fn page_geometry(meta: &Meta) -> (i64, i64, i64) {
    match &meta.page {
        Some(page) => (
            page.width,
            page.margin.left.unwrap_or(DEFAULT_MARGIN_LR),
            page.margin.right.unwrap_or(DEFAULT_MARGIN_LR),
        ),
        None => (DEFAULT_PAGE_WIDTH, DEFAULT_MARGIN_LR, DEFAULT_MARGIN_LR),
    }
}

/// The single output section: page size, orientation and margins from `meta`.
fn section_properties(meta: &Meta) -> XmlElement {
    let (width, height, orientation, margin) = match &meta.page {
        Some(p) => (p.width, p.height, p.orientation, p.margin.clone()),
        None => (
            DEFAULT_PAGE_WIDTH,
            DEFAULT_PAGE_HEIGHT,
            Orientation::Portrait,
            Default::default(),
        ),
    };
    let mut size = XmlElement::new("w:pgSz")
        .with_attr("w:w", &width.to_string())
        .with_attr("w:h", &height.to_string());
    if orientation == Orientation::Landscape {
        size.set_attr("w:orient", "landscape");
    }
    let px = |v: Option<i64>, d: i64| v.unwrap_or(d).to_string();
    let margins = XmlElement::new("w:pgMar")
        .with_attr("w:top", &px(margin.top, DEFAULT_MARGIN_TB))
        .with_attr("w:right", &px(margin.right, DEFAULT_MARGIN_LR))
        .with_attr("w:bottom", &px(margin.bottom, DEFAULT_MARGIN_TB))
        .with_attr("w:left", &px(margin.left, DEFAULT_MARGIN_LR))
        .with_attr("w:header", "720")
        .with_attr("w:footer", "720")
        .with_attr("w:gutter", "0");
    XmlElement::new("w:sectPr")
        .with_child(size)
        .with_child(margins)
        .with_child(XmlElement::new("w:cols").with_attr("w:space", "720"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Alignment, Document, InlineItem, PageMargins, PageSetup, Paragraph, ParagraphFormat,
        RawXml, RunFormat, RunOverrides, TextRun,
    };
    use crate::parser::{parse_package, ParseOptions};
    use crate::testutil::{body_package, span_table_3x3, DocxBuilder, PNG_1X1};

    fn reparse(ast: &Ast) -> Ast {
        let pkg = render_ast(ast, &RenderOptions::default()).expect("render");
        let bytes = pkg.to_bytes().expect("zip");
        let back = DocxPackage::from_bytes(&bytes).expect("unzip");
        parse_package(&back, &ParseOptions::default()).expect("reparse")
    }

    fn part(pkg: &DocxPackage, name: &str) -> String {
        String::from_utf8(pkg.data(name).expect(name).to_vec()).expect("utf8")
    }

    fn paragraphs(ast: &Ast) -> Vec<&Paragraph> {
        ast.document
            .body
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn text_run(text: &str, format: RunFormat) -> InlineItem {
        InlineItem::Text(TextRun {
            text: text.into(),
            overrides: RunOverrides { format, raw: None },
        })
    }

    #[test]
    fn round_trip_keeps_text_and_semantic_fields() {
        let pkg = body_package(
            r#"<w:p><w:pPr><w:jc w:val="center"/><w:spacing w:before="120" w:after="60"/></w:pPr>
                 <w:r><w:rPr><w:b/><w:color w:val="FF0000"/><w:sz w:val="28"/></w:rPr><w:t>Red</w:t></w:r>
                 <w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve"> italic</w:t></w:r></w:p>
               <w:p><w:pPr><w:ind w:left="720" w:firstLine="360"/><w:jc w:val="both"/></w:pPr><w:r><w:t>Second</w:t></w:r></w:p>"#,
        );
        let ast = parse_package(&pkg, &ParseOptions::default()).expect("parse");
        let back = reparse(&ast);
        let before = paragraphs(&ast);
        let after = paragraphs(&back);
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.plain_text(), b.plain_text());
            assert_eq!(
                ParagraphFormat { raw: None, ..a.paragraph_format.clone() },
                ParagraphFormat { raw: None, ..b.paragraph_format.clone() }
            );
            assert_eq!(a.content.len(), b.content.len());
            for (x, y) in a.content.iter().zip(b.content.iter()) {
                match (x, y) {
                    (InlineItem::Text(x), InlineItem::Text(y)) => {
                        assert_eq!(x.text, y.text);
                        assert_eq!(x.overrides.format, y.overrides.format);
                    }
                    other => panic!("unexpected items {other:?}"),
                }
            }
        }
    }

    #[test]
    fn span_table_round_trips() {
        let ast = parse_package(&body_package(&span_table_3x3()), &ParseOptions::default())
            .expect("parse");
        let back = reparse(&ast);
        let (Block::Table(a), Block::Table(b)) = (&ast.document.body[0], &back.document.body[0])
        else {
            panic!("tables expected");
        };
        let shape = |t: &crate::ast::Table| -> Vec<Vec<(usize, usize, usize, String)>> {
            t.rows
                .iter()
                .map(|r| {
                    r.cells
                        .iter()
                        .map(|c| {
                            let text = c.content.iter().map(|p| p.plain_text()).collect::<String>();
                            (c.grid_col, c.col_span, c.row_span, text)
                        })
                        .collect()
                })
                .collect()
        };
        assert_eq!(shape(a), shape(b));
    }

    #[test]
    fn heading_colors_neutralized_and_compat_mode_set() {
        let pkg = render_ast(&Ast::new(Document::default()), &RenderOptions::default())
            .expect("render");
        let styles = part(&pkg, "word/styles.xml");
        assert!(!styles.contains("365F91"));
        let settings = part(&pkg, "word/settings.xml");
        assert!(settings.contains(r#"w:name="compatibilityMode" w:uri="http://schemas.microsoft.com/office/word" w:val="15""#));

        let keep = RenderOptions {
            neutralize_heading_colors: false,
            compatibility_mode: 16,
            ..Default::default()
        };
        let pkg = render_ast(&Ast::new(Document::default()), &keep).expect("render");
        assert!(part(&pkg, "word/styles.xml").contains("365F91"));
        assert!(part(&pkg, "word/settings.xml").contains(r#"w:val="16""#));
    }

    #[test]
    fn corrupt_shadow_falls_back_to_fields() {
        let ast = Ast::new(Document {
            body: vec![Block::Paragraph(Paragraph {
                id: "p0".into(),
                paragraph_format: ParagraphFormat {
                    alignment: Some(Alignment::Right),
                    raw: Some(RawXml::new("NOT VALID XML")),
                    ..Default::default()
                },
                content: vec![InlineItem::Text(TextRun {
                    text: "x".into(),
                    overrides: RunOverrides {
                        format: RunFormat {
                            bold: Some(true),
                            ..Default::default()
                        },
                        raw: Some(RawXml::new("<w:rPr><broken")),
                    },
                })],
                ..Default::default()
            })],
            ..Default::default()
        });
        let back = reparse(&ast);
        let p = paragraphs(&back)[0];
        assert_eq!(p.paragraph_format.alignment, Some(Alignment::Right));
        let InlineItem::Text(t) = &p.content[0] else {
            panic!("text expected");
        };
        assert_eq!(t.overrides.format.bold, Some(true));
    }

    #[test]
    fn shadows_are_sanitized_before_use() {
        let w = crate::docx::template::W_NS;
        let ast = Ast::new(Document {
            body: vec![Block::Paragraph(Paragraph {
                id: "p0".into(),
                paragraph_format: ParagraphFormat {
                    raw: Some(RawXml::new(format!(
                        r#"<w:pPr xmlns:w="{w}"><w:pStyle w:val="SourceOnly"/><w:jc w:val="center"/><w:sectPr><w:headerReference r:id="rId99" xmlns:r="urn:r"/></w:sectPr><w:pPrChange w:id="4"/></w:pPr>"#
                    ))),
                    ..Default::default()
                },
                content: vec![InlineItem::Text(TextRun {
                    text: "x".into(),
                    overrides: RunOverrides {
                        format: RunFormat::default(),
                        raw: Some(RawXml::new(format!(
                            r#"<w:rPr xmlns:w="{w}"><w:rStyle w:val="Gone"/><w:b/><w:rPrChange w:id="5"><w:rPr/></w:rPrChange></w:rPr>"#
                        ))),
                    },
                })],
                ..Default::default()
            })],
            ..Default::default()
        });
        let pkg = render_ast(&ast, &RenderOptions::default()).expect("render");
        let xml = part(&pkg, "word/document.xml");
        for gone in ["SourceOnly", "headerReference", "pPrChange", "rStyle", "rPrChange"] {
            assert!(!xml.contains(gone), "{gone} should be stripped");
        }
        assert!(xml.contains(r#"<w:pPr><w:jc w:val="center"/></w:pPr>"#));
        assert!(xml.contains("<w:rPr><w:b/></w:rPr>"));
        // One section only: the body-level one.
        assert_eq!(xml.matches("<w:sectPr>").count(), 1);
    }

    #[test]
    fn style_applied_by_name_then_id() {
        let mut ast = Ast::new(Document::default());
        ast.document.styles.insert(
            "1".into(),
            StyleDef {
                style_id: "1".into(),
                name: "heading 1".into(),
                style_type: crate::ast::StyleType::Paragraph,
                based_on: None,
            },
        );
        for (id, style) in [("p0", "1"), ("p1", "Heading2"), ("p2", "Unknown")] {
            ast.document.body.push(Block::Paragraph(Paragraph {
                id: id.into(),
                style: Some(style.into()),
                content: vec![text_run("t", RunFormat::default())],
                ..Default::default()
            }));
        }
        let pkg = render_ast(&ast, &RenderOptions::default()).expect("render");
        let xml = part(&pkg, "word/document.xml");
        assert!(xml.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(xml.contains(r#"<w:pStyle w:val="Heading2"/>"#));
        assert!(!xml.contains("Unknown"));
    }

    #[test]
    fn view_shaped_document_renders_with_default_run() {
        let ast = Ast::new(Document {
            body: vec![Block::Paragraph(Paragraph {
                id: "p0".into(),
                default_run: RunFormat {
                    font_ascii: Some("X".into()),
                    size: Some(30),
                    ..Default::default()
                },
                content: vec![text_run(
                    "a\tb\nc",
                    RunFormat {
                        size: Some(20),
                        ..Default::default()
                    },
                )],
                ..Default::default()
            })],
            ..Default::default()
        });
        let back = reparse(&ast);
        let p = paragraphs(&back)[0];
        let InlineItem::Text(t) = &p.content[0] else {
            panic!("text expected");
        };
        assert_eq!(t.text, "a\tb\nc");
        assert_eq!(t.overrides.format.font_ascii.as_deref(), Some("X"));
        assert_eq!(t.overrides.format.size, Some(20));
    }

    #[test]
    fn heading_style_font_survives_render() {
        let pkg = DocxBuilder::new(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>"#,
        )
        .styles(
            r#"<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/>
                 <w:rPr><w:rFonts w:ascii="X" w:hAnsi="X"/></w:rPr></w:style>"#,
        )
        .build();
        let ast = parse_package(&pkg, &ParseOptions::default()).expect("parse");
        let out = render_ast(&ast, &RenderOptions::default()).expect("render");
        let xml = part(&out, "word/document.xml");
        assert!(xml.contains(r#"<w:r><w:rPr><w:rFonts w:ascii="X" w:hAnsi="X"/></w:rPr><w:t>Title</w:t></w:r>"#));
    }

    #[test]
    fn images_are_deduplicated_media_parts() {
        let image = InlineItem::InlineImage(InlineImage {
            data: PNG_1X1.to_vec(),
            content_type: "image/png".into(),
            width: 1440,
            height: 720,
        });
        let ast = Ast::new(Document {
            body: vec![Block::Paragraph(Paragraph {
                id: "p0".into(),
                content: vec![image.clone(), image],
                ..Default::default()
            })],
            ..Default::default()
        });
        let pkg = render_ast(&ast, &RenderOptions::default()).expect("render");
        let media: Vec<&str> = pkg
            .entries
            .iter()
            .map(|e| e.name.as_str())
            .filter(|n| n.starts_with("word/media/"))
            .collect();
        assert_eq!(media.len(), 1);
        assert!(media[0].ends_with(".png"));
        assert!(part(&pkg, "[Content_Types].xml").contains(r#"Extension="png""#));

        let back = reparse(&ast);
        let p = paragraphs(&back)[0];
        assert_eq!(p.content.len(), 2);
        let InlineItem::InlineImage(img) = &p.content[0] else {
            panic!("image expected");
        };
        assert_eq!((img.width, img.height), (1440, 720));
        assert_eq!(img.data, PNG_1X1);
    }

    #[test]
    fn out_of_range_extents_and_margins_render() {
        let ast = Ast::new(Document {
            meta: Meta {
                page: Some(PageSetup {
                    size: "custom".into(),
                    width: i64::MIN,
                    height: 15840,
                    orientation: Default::default(),
                    margin: PageMargins {
                        left: Some(i64::MAX),
                        right: Some(i64::MAX),
                        ..Default::default()
                    },
                }),
                ..Default::default()
            },
            body: vec![Block::Paragraph(Paragraph {
                id: "p0".into(),
                content: vec![InlineItem::InlineImage(InlineImage {
                    data: PNG_1X1.to_vec(),
                    content_type: "image/png".into(),
                    width: i64::MAX,
                    height: 10,
                })],
                ..Default::default()
            })],
            ..Default::default()
        });
        let pkg = render_ast(&ast, &RenderOptions::default()).expect("render");
        let xml = part(&pkg, "word/document.xml");
        assert!(xml.contains(&format!(r#"cx="{}" cy="6350""#, i64::MAX)));
    }

    #[test]
    fn page_setup_is_applied() {
        let ast = Ast::new(Document {
            meta: Meta {
                page: Some(PageSetup {
                    size: "custom".into(),
                    width: 16838,
                    height: 11906,
                    orientation: Orientation::Landscape,
                    margin: PageMargins {
                        top: Some(720),
                        bottom: Some(720),
                        left: Some(1000),
                        right: Some(1000),
                    },
                }),
                ..Default::default()
            },
            ..Default::default()
        });
        let back = reparse(&ast);
        let page = back.document.meta.page.expect("page");
        assert_eq!((page.width, page.height), (16838, 11906));
        assert_eq!(page.orientation, Orientation::Landscape);
        assert_eq!(page.margin.left, Some(1000));
        assert_eq!(page.margin.top, Some(720));
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let mut ast = Ast::new(Document::default());
        ast.schema_version = "2.0".into();
        assert!(matches!(
            render_ast(&ast, &RenderOptions::default()),
            Err(AstError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn tolerates_missing_fixture_parts() {
        // A package parsed without styles still renders.
        let pkg = DocxBuilder::new(r#"<w:p><w:r><w:t>x</w:t></w:r></w:p>"#)
            .without_styles()
            .build();
        let ast = parse_package(&pkg, &ParseOptions::default()).expect("parse");
        assert!(render_ast(&ast, &RenderOptions::default()).is_ok());
    }
}
