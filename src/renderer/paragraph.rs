use crate::ast::{InlineImage, InlineItem, Paragraph, RawXml, StyleType, TextRun};
use crate::docx::props::{insert_ordered, synthesize_ppr, synthesize_rpr, PPR_ORDER};
use crate::docx::shadow::{adopt, sanitize_ppr, sanitize_rpr};
use crate::docx::template::DOCUMENT_NS;
use crate::docx::xml::XmlElement;
use crate::units::twips_to_emu;

use super::Renderer;

/// Parses and sanitizes a shadow; `None` (with a warning) when it does not parse.
pub(crate) fn usable_shadow(
    raw: Option<&RawXml>,
    expected: &str,
    sanitize: fn(&mut XmlElement),
) -> Option<XmlElement> {
    let raw = raw?;
    match raw.parse(expected) {
        Ok(mut el) => {
            sanitize(&mut el);
            adopt(&mut el, &DOCUMENT_NS);
            Some(el)
        }
        Err(err) => {
            tracing::warn!(error = %err, "shadow dropped; synthesizing from fields");
            None
        }
    }
}

pub(crate) fn render_paragraph(r: &mut Renderer<'_>, p: &Paragraph) -> XmlElement {
    let mut ppr = usable_shadow(p.paragraph_format.raw.as_ref(), "w:pPr", sanitize_ppr)
        .unwrap_or_else(|| synthesize_ppr(&p.paragraph_format));
    if let Some(style) = p.style.as_deref() {
        if let Some(id) = r.catalogue.resolve(style, r.ast_styles, StyleType::Paragraph) {
            insert_ordered(
                &mut ppr,
                XmlElement::new("w:pStyle").with_attr("w:val", &id),
                PPR_ORDER,
            );
        }
    }

    let mut out = XmlElement::new("w:p");
    if !ppr.children.is_empty() {
        out.push(ppr);
    }
    for item in &p.content {
        match item {
            InlineItem::Text(run) => out.push(render_run(p, run)),
            InlineItem::InlineImage(image) => out.push(render_image_run(r, image)),
        }
    }
    out
}

fn render_run(p: &Paragraph, run: &TextRun) -> XmlElement {
    let rpr = usable_shadow(run.overrides.raw.as_ref(), "w:rPr", sanitize_rpr)
        .unwrap_or_else(|| synthesize_rpr(&p.default_run.overlaid_with(&run.overrides.format)));
    let mut out = XmlElement::new("w:r");
    if !rpr.children.is_empty() {
        out.push(rpr);
    }
    push_text(&mut out, &run.text);
    out
}

/// Maps `\t` and `\n` back to `w:tab` / `w:br` between `w:t` segments.
fn push_text(run: &mut XmlElement, text: &str) {
    let mut segment = String::new();
    let flush = |run: &mut XmlElement, segment: &mut String| {
        if segment.is_empty() {
            return;
        }
        let mut t = XmlElement::new("w:t");
        if segment.starts_with(char::is_whitespace) || segment.ends_with(char::is_whitespace) {
            t.set_attr("xml:space", "preserve");
        }
        run.push(t.with_text(std::mem::take(segment)));
    };
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush(run, &mut segment);
                run.push(XmlElement::new("w:tab"));
            }
            '\n' => {
                flush(run, &mut segment);
                run.push(XmlElement::new("w:br"));
            }
            '\r' => {}
            c => segment.push(c),
        }
    }
    flush(run, &mut segment);
}

fn render_image_run(r: &mut Renderer<'_>, image: &InlineImage) -> XmlElement {
    let (rel_id, name) = r.add_image(image);
    let id = r.next_drawing_id().to_string();
    let cx = twips_to_emu(image.width.max(0)).to_string();
    let cy = twips_to_emu(image.height.max(0)).to_string();

    let pic = XmlElement::new("pic:pic")
        .with_child(
            XmlElement::new("pic:nvPicPr")
                .with_child(
                    XmlElement::new("pic:cNvPr")
                        .with_attr("id", "0")
                        .with_attr("name", &name),
                )
                .with_child(XmlElement::new("pic:cNvPicPr")),
        )
        .with_child(
            XmlElement::new("pic:blipFill")
                .with_child(XmlElement::new("a:blip").with_attr("r:embed", &rel_id))
                .with_child(XmlElement::new("a:stretch").with_child(XmlElement::new("a:fillRect"))),
        )
        .with_child(
            XmlElement::new("pic:spPr")
                .with_child(
                    XmlElement::new("a:xfrm")
                        .with_child(XmlElement::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                        .with_child(XmlElement::new("a:ext").with_attr("cx", &cx).with_attr("cy", &cy)),
                )
                .with_child(
                    XmlElement::new("a:prstGeom")
                        .with_attr("prst", "rect")
                        .with_child(XmlElement::new("a:avLst")),
                ),
        );

    let inline = XmlElement::new("wp:inline")
        .with_attr("distT", "0")
        .with_attr("distB", "0")
        .with_attr("distL", "0")
        .with_attr("distR", "0")
        .with_child(XmlElement::new("wp:extent").with_attr("cx", &cx).with_attr("cy", &cy))
        .with_child(
            XmlElement::new("wp:docPr")
                .with_attr("id", &id)
                .with_attr("name", &format!("Picture {id}")),
        )
        .with_child(
            XmlElement::new("wp:cNvGraphicFramePr").with_child(
                XmlElement::new("a:graphicFrameLocks").with_attr("noChangeAspect", "1"),
            ),
        )
        .with_child(
            XmlElement::new("a:graphic").with_child(
                XmlElement::new("a:graphicData")
                    .with_attr("uri", "http://schemas.openxmlformats.org/drawingml/2006/picture")
                    .with_child(pic),
            ),
        );

    XmlElement::new("w:r").with_child(XmlElement::new("w:drawing").with_child(inline))
}
