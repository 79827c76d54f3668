//! In-memory document fixtures for unit tests.

use crate::docx::opc::{REL_IMAGE, REL_OFFICE_DOCUMENT, REL_STYLES};
use crate::docx::package::DocxPackage;
use crate::docx::template::{CT_DOCUMENT, CT_RELATIONSHIPS, CT_STYLES, CT_XML, W_NS};

const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const PKG_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const DEFAULT_STYLES: &str =
    r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>"#;

/// A 1x1 transparent PNG.
pub const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

pub struct DocxBuilder {
    body: String,
    styles: Option<String>,
    images: Vec<(String, String, Vec<u8>)>,
}

impl DocxBuilder {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            styles: Some(DEFAULT_STYLES.to_string()),
            images: Vec::new(),
        }
    }

    /// Replaces the children of `w:styles`.
    pub fn styles(mut self, inner: &str) -> Self {
        self.styles = Some(inner.to_string());
        self
    }

    pub fn without_styles(mut self) -> Self {
        self.styles = None;
        self
    }

    /// Adds an image part `word/<target>` reachable through `rel_id`.
    pub fn image(mut self, rel_id: &str, target: &str, data: &[u8]) -> Self {
        self.images
            .push((rel_id.to_string(), target.to_string(), data.to_vec()));
        self
    }

    pub fn build(self) -> DocxPackage {
        let mut pkg = DocxPackage::default();

        let mut overrides = format!(
            r#"<Override PartName="/word/document.xml" ContentType="{CT_DOCUMENT}"/>"#
        );
        if self.styles.is_some() {
            overrides.push_str(&format!(
                r#"<Override PartName="/word/styles.xml" ContentType="{CT_STYLES}"/>"#
            ));
        }
        pkg.put(
            "[Content_Types].xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="{CT_NS}"><Default Extension="rels" ContentType="{CT_RELATIONSHIPS}"/><Default Extension="xml" ContentType="{CT_XML}"/><Default Extension="png" ContentType="image/png"/>{overrides}</Types>"#
            )
            .into_bytes(),
        );
        pkg.put(
            "_rels/.rels",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_RELS_NS}"><Relationship Id="rId1" Type="{REL_OFFICE_DOCUMENT}" Target="word/document.xml"/></Relationships>"#
            )
            .into_bytes(),
        );

        let mut rels = String::new();
        if self.styles.is_some() {
            rels.push_str(&format!(
                r#"<Relationship Id="rIdStyles" Type="{REL_STYLES}" Target="styles.xml"/>"#
            ));
        }
        for (rel_id, target, data) in self.images {
            rels.push_str(&format!(
                r#"<Relationship Id="{rel_id}" Type="{REL_IMAGE}" Target="{target}"/>"#
            ));
            pkg.put(&format!("word/{target}"), data);
        }
        pkg.put(
            "word/_rels/document.xml.rels",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_RELS_NS}">{rels}</Relationships>"#
            )
            .into_bytes(),
        );

        pkg.put(
            "word/document.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}" xmlns:wp="{WP_NS}" xmlns:a="{A_NS}" xmlns:pic="{PIC_NS}"><w:body>{}</w:body></w:document>"#,
                self.body
            )
            .into_bytes(),
        );
        if let Some(styles) = self.styles {
            pkg.put(
                "word/styles.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="{W_NS}">{styles}</w:styles>"#
                )
                .into_bytes(),
            );
        }
        pkg
    }
}

/// A package with the default styles part and `body_xml` as the body content.
pub fn body_package(body_xml: &str) -> DocxPackage {
    DocxBuilder::new(body_xml).build()
}

fn text_cell(tcpr: &str, text: &str) -> String {
    let content = if text.is_empty() {
        "<w:p/>".to_string()
    } else {
        format!("<w:p><w:r><w:t>{text}</w:t></w:r></w:p>")
    };
    format!("<w:tc><w:tcPr>{tcpr}</w:tcPr>{content}</w:tc>")
}

/// 3x3 grid: (0,0)-(0,1) merged horizontally, (1,2)-(2,2) merged vertically.
pub fn span_table_3x3() -> String {
    let w = r#"<w:tcW w:w="2880" w:type="dxa"/>"#;
    let rows = [
        [
            text_cell(&format!(r#"{w}<w:gridSpan w:val="2"/>"#), "C00"),
            text_cell(w, "C02"),
            String::new(),
        ],
        [
            text_cell(w, "C10"),
            text_cell(w, "C11"),
            text_cell(&format!(r#"{w}<w:vMerge w:val="restart"/>"#), "C12"),
        ],
        [
            text_cell(w, "C20"),
            text_cell(w, "C21"),
            text_cell(&format!("{w}<w:vMerge/>"), ""),
        ],
    ];
    let body: String = rows
        .iter()
        .map(|cells| format!("<w:tr>{}</w:tr>", cells.concat()))
        .collect();
    format!(
        r#"<w:tbl><w:tblPr><w:tblStyle w:val="TableGrid"/><w:tblW w:w="0" w:type="auto"/></w:tblPr><w:tblGrid><w:gridCol w:w="2880"/><w:gridCol w:w="2880"/><w:gridCol w:w="2880"/></w:tblGrid>{body}</w:tbl>"#
    )
}

/// A content control holding a TOC field with one cached entry.
pub fn toc_sdt(gallery: bool, title: Option<&str>, instruction: &str) -> String {
    let sdt_pr = if gallery {
        r#"<w:sdtPr><w:docPartObj><w:docPartGallery w:val="Table of Contents"/><w:docPartUnique/></w:docPartObj></w:sdtPr>"#
    } else {
        r#"<w:sdtPr><w:id w:val="7"/></w:sdtPr>"#
    };
    let title = title
        .map(|t| format!("<w:p><w:r><w:t>{t}</w:t></w:r></w:p>"))
        .unwrap_or_default();
    format!(
        r#"<w:sdt>{sdt_pr}<w:sdtContent>{title}<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve">{instruction}</w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>Intro 1</w:t></w:r></w:p><w:p><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p></w:sdtContent></w:sdt>"#
    )
}
