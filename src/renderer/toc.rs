use crate::ast::Toc;
use crate::docx::xml::XmlElement;

use super::paragraph::render_paragraph;
use super::Renderer;

fn field_char(kind: &str) -> XmlElement {
    let mut fld = XmlElement::new("w:fldChar").with_attr("w:fldCharType", kind);
    if kind == "begin" {
        // Word refreshes the entries on open.
        fld.set_attr("w:dirty", "true");
    }
    XmlElement::new("w:r").with_child(fld)
}

/// A `Table of Contents` content control holding an empty TOC field.
pub(crate) fn render_toc(r: &mut Renderer<'_>, toc: &Toc) -> XmlElement {
    let instruction = match toc.instruction.trim() {
        "" => r.opts.default_toc_instruction.trim(),
        s => s,
    };

    let sdt_pr = XmlElement::new("w:sdtPr").with_child(
        XmlElement::new("w:docPartObj")
            .with_child(XmlElement::new("w:docPartGallery").with_attr("w:val", "Table of Contents"))
            .with_child(XmlElement::new("w:docPartUnique")),
    );

    let mut content = XmlElement::new("w:sdtContent");
    if let Some(title) = &toc.title {
        content.push(render_paragraph(r, title));
    }
    let instr = XmlElement::new("w:instrText")
        .with_attr("xml:space", "preserve")
        .with_text(format!(" {instruction} "));
    content.push(
        XmlElement::new("w:p")
            .with_child(field_char("begin"))
            .with_child(XmlElement::new("w:r").with_child(instr))
            .with_child(field_char("separate")),
    );
    content.push(XmlElement::new("w:p").with_child(field_char("end")));

    XmlElement::new("w:sdt").with_child(sdt_pr).with_child(content)
}
