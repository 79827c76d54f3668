//! Structural parser: document package -> full AST.
//!
//! Every paragraph, run, table and properties element is read from the owned XML tree of
//! the main document part. Properties elements are augmented with inheritable markup from
//! their style chain before the semantic fields and the `_raw_*` shadows are taken from
//! them, so formatting that only lives in a style still travels with the block.

mod paragraph;
pub mod styles;
mod table;
mod toc;

use std::path::Path;

use anyhow::Context;

use crate::ast::{Ast, Block, Document, Meta, Orientation, PageMargins, PageSetup};
use crate::docx::opc::{
    main_document_part, resolve_target, ContentTypes, Relationships, REL_STYLES,
};
use crate::docx::package::DocxPackage;
use crate::docx::shadow::Namespaces;
use crate::docx::xml::{parse_xml_document, XmlElement};
use crate::error::{AstError, AstResult};
use crate::units::parse_twips;

use styles::StyleSheet;

pub use toc::DEFAULT_TOC_INSTRUCTION;

#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Copy inheritable style-chain markup into paragraph/run properties.
    pub inherit_style_properties: bool,
    /// Merge adjacent text runs whose overrides are identical.
    pub coalesce_runs: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            inherit_style_properties: true,
            coalesce_runs: true,
        }
    }
}

/// Everything a block parser needs to resolve styles, relationships and namespaces.
pub(crate) struct ParseContext<'a> {
    pub pkg: &'a DocxPackage,
    pub part_name: String,
    pub rels: Relationships,
    pub content_types: ContentTypes,
    pub styles: StyleSheet,
    pub ns: Namespaces,
    pub opts: &'a ParseOptions,
}

pub fn parse_docx(path: &Path, opts: &ParseOptions) -> AstResult<Ast> {
    let pkg = DocxPackage::read(path).map_err(AstError::from_package)?;
    parse_package(&pkg, opts)
}

pub fn parse_package(pkg: &DocxPackage, opts: &ParseOptions) -> AstResult<Ast> {
    let part_name = main_document_part(pkg);
    let bytes = pkg
        .data(&part_name)
        .ok_or_else(|| AstError::format(format!("missing main document part {part_name}")))?;
    let document = parse_xml_document(&part_name, bytes).map_err(AstError::from_package)?;
    let body = document
        .root
        .child("w:body")
        .ok_or_else(|| AstError::format(format!("{part_name}: no w:body element")))?;

    let rels = Relationships::for_part(pkg, &part_name).map_err(AstError::from_package)?;
    let content_types = ContentTypes::from_package(pkg).map_err(AstError::from_package)?;
    let styles_root = load_styles_root(pkg, &part_name, &rels).map_err(AstError::from_package)?;
    let styles = styles_root
        .as_ref()
        .map(StyleSheet::from_root)
        .unwrap_or_default();
    let mut roots = vec![&document.root];
    roots.extend(styles_root.as_ref());
    let ns = Namespaces::from_roots(&roots);

    let ctx = ParseContext {
        pkg,
        part_name,
        rels,
        content_types,
        styles,
        ns,
        opts,
    };

    let mut walker = BodyWalker::default();
    for el in body.elements() {
        walker.visit(&ctx, el)?;
    }
    tracing::debug!(blocks = walker.blocks.len(), "parsed body");

    Ok(Ast::new(Document {
        meta: parse_meta(body, &ctx.styles),
        styles: ctx.styles.style_table(),
        body: walker.blocks,
        passthrough: Default::default(),
    }))
}

fn load_styles_root(
    pkg: &DocxPackage,
    part_name: &str,
    rels: &Relationships,
) -> anyhow::Result<Option<XmlElement>> {
    let styles_part = rels
        .first_of_type(REL_STYLES)
        .map(|r| resolve_target(part_name, &r.target))
        .unwrap_or_else(|| "word/styles.xml".to_string());
    let Some(bytes) = pkg.data(&styles_part) else {
        return Ok(None);
    };
    let doc = parse_xml_document(&styles_part, bytes)
        .with_context(|| format!("parse styles part {styles_part}"))?;
    Ok(Some(doc.root))
}

/// Assigns `p<N>`, `t<N>` and `toc<N>` ids in body order.
#[derive(Default)]
struct BodyWalker {
    blocks: Vec<Block>,
    paragraphs: usize,
    tables: usize,
    tocs: usize,
}

impl BodyWalker {
    fn visit(&mut self, ctx: &ParseContext<'_>, el: &XmlElement) -> AstResult<()> {
        match el.name.as_str() {
            "w:p" => {
                let id = format!("p{}", self.paragraphs);
                self.paragraphs += 1;
                let p = paragraph::parse_paragraph(ctx, el, id)?;
                self.blocks.push(Block::Paragraph(p));
            }
            "w:tbl" => {
                let id = format!("t{}", self.tables);
                self.tables += 1;
                let t = table::parse_table(ctx, el, id)?;
                self.blocks.push(Block::Table(t));
            }
            "w:sdt" if toc::is_toc_sdt(el) => {
                let id = format!("toc{}", self.tocs);
                self.tocs += 1;
                let t = toc::parse_toc(ctx, el, id)?;
                self.blocks.push(Block::Toc(t));
            }
            "w:sdt" => {
                if let Some(content) = el.child("w:sdtContent") {
                    for inner in content.elements() {
                        self.visit(ctx, inner)?;
                    }
                }
            }
            "w:customXml" => {
                for inner in el.elements() {
                    self.visit(ctx, inner)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_i64(el: &XmlElement, attr: &str) -> Option<i64> {
    el.attr(attr).and_then(parse_twips)
}

fn parse_meta(body: &XmlElement, styles: &StyleSheet) -> Meta {
    let page = body.child("w:sectPr").and_then(|sect| {
        let size = sect.child("w:pgSz")?;
        let width = parse_i64(size, "w:w")?;
        let height = parse_i64(size, "w:h")?;
        let orientation = match size.attr("w:orient") {
            Some("landscape") => Orientation::Landscape,
            Some(_) => Orientation::Portrait,
            None if width > height => Orientation::Landscape,
            None => Orientation::Portrait,
        };
        let margin = sect
            .child("w:pgMar")
            .map(|m| PageMargins {
                top: parse_i64(m, "w:top"),
                bottom: parse_i64(m, "w:bottom"),
                left: parse_i64(m, "w:left"),
                right: parse_i64(m, "w:right"),
            })
            .unwrap_or_default();
        Some(PageSetup {
            size: "custom".to_string(),
            width,
            height,
            orientation,
            margin,
        })
    });
    Meta {
        page,
        default_style: styles.default_paragraph.clone(),
        language: styles.language(),
    }
}
