use crate::ast::{InlineImage, InlineItem, Paragraph, RunFormat, RunOverrides, TextRun};
use crate::docx::opc::{image_content_type_for_ext, resolve_target};
use crate::docx::props::{
    insert_ordered, paragraph_format_from_ppr, run_format_from_rpr, PPR_ORDER, RPR_ORDER,
};
use crate::docx::shadow::capture;
use crate::docx::xml::XmlElement;
use crate::error::AstResult;
use crate::units::emu_to_twips;

use super::styles::StyleEntry;
use super::ParseContext;

/// Paragraph properties a style chain may contribute to the `w:pPr` shadow.
const PARAGRAPH_INHERITABLE: &[&str] = &[
    "w:jc",
    "w:ind",
    "w:spacing",
    "w:keepNext",
    "w:keepLines",
    "w:pageBreakBefore",
    "w:outlineLvl",
    "w:shd",
    "w:pBdr",
];

/// Run properties a style chain may contribute to the `w:rPr` shadow.
const RUN_INHERITABLE: &[&str] = &[
    "w:rFonts",
    "w:sz",
    "w:szCs",
    "w:color",
    "w:lang",
    "w:kern",
    "w:spacing",
];

/// Containers whose runs belong to the paragraph text.
const INLINE_WRAPPERS: &[&str] = &[
    "w:hyperlink",
    "w:ins",
    "w:del",
    "w:moveFrom",
    "w:moveTo",
    "w:smartTag",
    "w:fldSimple",
    "w:customXml",
    "w:dir",
    "w:bdo",
];

/// Copies whitelisted children of each ancestor's properties into `target`; closer
/// levels win because an already present child is never replaced.
fn inherit_into(
    target: &mut XmlElement,
    ancestors: &[Option<&XmlElement>],
    whitelist: &[&str],
    order: &[&str],
) {
    for props in ancestors.iter().flatten() {
        for child in props.elements() {
            if !whitelist.contains(&child.name.as_str()) || target.has_child(&child.name) {
                continue;
            }
            // Theme colors stay implicit so theme recoloring still applies.
            if child.name == "w:color" && child.attr("w:themeColor").is_some() {
                continue;
            }
            insert_ordered(target, child.clone(), order);
        }
    }
}

pub(crate) fn parse_paragraph(
    ctx: &ParseContext<'_>,
    p: &XmlElement,
    id: String,
) -> AstResult<Paragraph> {
    let mut ppr = p
        .child("w:pPr")
        .cloned()
        .unwrap_or_else(|| XmlElement::new("w:pPr"));
    let style = ppr
        .child_attr("w:pStyle", "w:val")
        .or_else(|| ctx.styles.default_paragraph.clone());
    let chain: Vec<&StyleEntry> = style
        .as_deref()
        .map(|s| ctx.styles.chain(s))
        .unwrap_or_default();

    if ctx.opts.inherit_style_properties {
        let ancestors: Vec<Option<&XmlElement>> = chain.iter().map(|e| e.ppr.as_ref()).collect();
        inherit_into(&mut ppr, &ancestors, PARAGRAPH_INHERITABLE, PPR_ORDER);
    }
    let mut paragraph_format = paragraph_format_from_ppr(&ppr);
    paragraph_format.raw = capture(&ppr, &ctx.ns)?;

    let mut default_run = RunFormat::default();
    for entry in &chain {
        if let Some(rpr) = &entry.rpr {
            default_run = run_format_from_rpr(rpr, true).overlaid_with(&default_run);
        }
    }

    let mut content = Vec::new();
    let mut inline = InlineCollector {
        ctx,
        chain: &chain,
        out: &mut content,
    };
    inline.visit_children(p)?;
    if ctx.opts.coalesce_runs {
        content = coalesce(content);
    }

    Ok(Paragraph {
        id,
        style,
        paragraph_format,
        default_run,
        content,
    })
}

struct InlineCollector<'c, 'a> {
    ctx: &'c ParseContext<'a>,
    chain: &'c [&'c StyleEntry],
    out: &'c mut Vec<InlineItem>,
}

impl InlineCollector<'_, '_> {
    fn visit_children(&mut self, parent: &XmlElement) -> AstResult<()> {
        for el in parent.elements() {
            match el.name.as_str() {
                "w:r" => self.run(el)?,
                "w:sdt" => {
                    if let Some(content) = el.child("w:sdtContent") {
                        self.visit_children(content)?;
                    }
                }
                name if INLINE_WRAPPERS.contains(&name) => self.visit_children(el)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn run(&mut self, r: &XmlElement) -> AstResult<()> {
        let mut rpr = r
            .child("w:rPr")
            .cloned()
            .unwrap_or_else(|| XmlElement::new("w:rPr"));
        if self.ctx.opts.inherit_style_properties {
            let run_chain = rpr
                .child_attr("w:rStyle", "w:val")
                .map(|s| self.ctx.styles.chain(&s))
                .unwrap_or_default();
            let ancestors: Vec<Option<&XmlElement>> = run_chain
                .iter()
                .chain(self.chain.iter())
                .map(|e| e.rpr.as_ref())
                .collect();
            inherit_into(&mut rpr, &ancestors, RUN_INHERITABLE, RPR_ORDER);
        }
        let overrides = RunOverrides {
            format: run_format_from_rpr(&rpr, false),
            raw: capture(&rpr, &self.ctx.ns)?,
        };

        let mut text = String::new();
        for child in r.elements() {
            match child.name.as_str() {
                "w:t" | "w:delText" => text.push_str(&child.text()),
                "w:tab" | "w:ptab" => text.push('\t'),
                "w:br" => {
                    if matches!(child.attr("w:type"), None | Some("textWrapping")) {
                        text.push('\n');
                    }
                }
                "w:cr" => text.push('\n'),
                "w:noBreakHyphen" => text.push('-'),
                "w:drawing" => {
                    self.flush_text(&mut text, &overrides);
                    if let Some(image) = self.image(child) {
                        self.out.push(InlineItem::InlineImage(image));
                    }
                }
                _ => {}
            }
        }
        self.flush_text(&mut text, &overrides);
        Ok(())
    }

    fn flush_text(&mut self, text: &mut String, overrides: &RunOverrides) {
        if text.is_empty() {
            return;
        }
        self.out.push(InlineItem::Text(TextRun {
            text: std::mem::take(text),
            overrides: overrides.clone(),
        }));
    }

    fn image(&self, drawing: &XmlElement) -> Option<InlineImage> {
        let blip = drawing.find_descendant("a:blip")?;
        let Some(rel_id) = blip.attr_value("r:embed") else {
            tracing::warn!("drawing without embedded blip skipped");
            return None;
        };
        let Some(rel) = self.ctx.rels.get(&rel_id).filter(|r| !r.external) else {
            tracing::warn!(rel_id = %rel_id, "image relationship not found");
            return None;
        };
        let part = resolve_target(&self.ctx.part_name, &rel.target);
        let Some(data) = self.ctx.pkg.data(&part) else {
            tracing::warn!(part = %part, "image part missing from package");
            return None;
        };
        let content_type = self
            .ctx
            .content_types
            .content_type_of(&part)
            .map(str::to_string)
            .unwrap_or_else(|| {
                let ext = part.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
                image_content_type_for_ext(ext).to_string()
            });
        let extent = drawing.find_descendant("wp:extent");
        let emu = |attr: &str| {
            extent
                .and_then(|e| e.attr(attr))
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(0)
        };
        Some(InlineImage {
            data: data.to_vec(),
            content_type,
            width: emu_to_twips(emu("cx")),
            height: emu_to_twips(emu("cy")),
        })
    }
}

/// Joins adjacent text items whose overrides (shadow included) are identical.
fn coalesce(items: Vec<InlineItem>) -> Vec<InlineItem> {
    let mut out: Vec<InlineItem> = Vec::with_capacity(items.len());
    for item in items {
        if let (Some(InlineItem::Text(prev)), InlineItem::Text(next)) = (out.last_mut(), &item) {
            if prev.overrides == next.overrides {
                prev.text.push_str(&next.text);
                continue;
            }
        }
        out.push(item);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::{parse_package, ParseOptions};
    use crate::ast::{Alignment, Block, InlineItem, Paragraph};
    use crate::testutil::{body_package, DocxBuilder, PNG_1X1};

    fn first_paragraph(body: &str, styles: &str) -> Paragraph {
        let pkg = DocxBuilder::new(body).styles(styles).build();
        let ast = parse_package(&pkg, &ParseOptions::default()).expect("parse");
        match ast.document.body.into_iter().next() {
            Some(Block::Paragraph(p)) => p,
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    fn texts(p: &Paragraph) -> Vec<String> {
        p.content
            .iter()
            .filter_map(|i| match i {
                InlineItem::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn bold_run_and_alignment() {
        let p = first_paragraph(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr>
                 <w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r>
                 <w:r><w:t xml:space="preserve"> plain</w:t></w:r></w:p>"#,
            "",
        );
        assert_eq!(p.paragraph_format.alignment, Some(Alignment::Center));
        assert!(p.paragraph_format.raw.is_some());
        let InlineItem::Text(first) = &p.content[0] else {
            panic!("text expected");
        };
        assert_eq!(first.text, "Bold");
        assert_eq!(first.overrides.format.bold, Some(true));
        assert_eq!(texts(&p), ["Bold", " plain"]);
    }

    #[test]
    fn wrapped_runs_are_flattened_in_order() {
        let p = first_paragraph(
            r#"<w:p><w:r><w:t>a</w:t></w:r>
                 <w:hyperlink r:id="rId9"><w:r><w:rPr><w:i/></w:rPr><w:t>b</w:t></w:r></w:hyperlink>
                 <w:ins w:id="1"><w:r><w:rPr><w:b/></w:rPr><w:t>c</w:t></w:r></w:ins>
                 <w:del w:id="2"><w:r><w:rPr><w:u w:val="single"/></w:rPr><w:delText>d</w:delText></w:r></w:del>
                 <w:smartTag><w:r><w:rPr><w:sz w:val="30"/></w:rPr><w:t>e</w:t></w:r></w:smartTag>
                 <w:fldSimple w:instr="PAGE"><w:r><w:rPr><w:sz w:val="32"/></w:rPr><w:t>f</w:t></w:r></w:fldSimple>
                 <w:sdt><w:sdtContent><w:r><w:rPr><w:sz w:val="34"/></w:rPr><w:t>g</w:t></w:r></w:sdtContent></w:sdt>
                 <w:customXml><w:r><w:rPr><w:sz w:val="36"/></w:rPr><w:t>h</w:t></w:r></w:customXml></w:p>"#,
            "",
        );
        assert_eq!(texts(&p), ["a", "b", "c", "d", "e", "f", "g", "h"]);
    }

    #[test]
    fn moved_runs_keep_both_sides_like_insertions_and_deletions() {
        let p = first_paragraph(
            r#"<w:p><w:moveFrom w:id="3"><w:r><w:rPr><w:b/></w:rPr><w:t>old</w:t></w:r></w:moveFrom>
                 <w:r><w:t> | </w:t></w:r>
                 <w:moveTo w:id="4"><w:r><w:rPr><w:i/></w:rPr><w:t>new</w:t></w:r></w:moveTo></w:p>"#,
            "",
        );
        assert_eq!(texts(&p), ["old", " | ", "new"]);
    }

    #[test]
    fn identical_runs_coalesce() {
        let p = first_paragraph(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Hel</w:t></w:r>
                 <w:r><w:rPr><w:b/></w:rPr><w:t>lo</w:t></w:r>
                 <w:r><w:t> world</w:t></w:r></w:p>"#,
            "",
        );
        assert_eq!(texts(&p), ["Hello", " world"]);
    }

    #[test]
    fn coalescing_can_be_disabled() {
        let pkg = body_package(
            r#"<w:p><w:r><w:t>a</w:t></w:r><w:r><w:t>b</w:t></w:r></w:p>"#,
        );
        let opts = ParseOptions {
            coalesce_runs: false,
            ..Default::default()
        };
        let ast = parse_package(&pkg, &opts).expect("parse");
        let Block::Paragraph(p) = &ast.document.body[0] else {
            panic!("paragraph expected");
        };
        assert_eq!(p.content.len(), 2);
    }

    #[test]
    fn special_run_children_map_to_text() {
        let p = first_paragraph(
            r#"<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t><w:noBreakHyphen/><w:t>d</w:t><w:br w:type="page"/></w:r></w:p>"#,
            "",
        );
        assert_eq!(texts(&p), ["a\tb\nc-d"]);
    }

    #[test]
    fn heading_font_from_style_is_captured_on_the_run() {
        let p = first_paragraph(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>"#,
            r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
               <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/>
                 <w:pPr><w:keepNext/><w:spacing w:before="240"/></w:pPr>
                 <w:rPr><w:rFonts w:ascii="X" w:hAnsi="X"/><w:b/><w:sz w:val="32"/></w:rPr></w:style>"#,
        );
        assert_eq!(p.style.as_deref(), Some("Heading1"));
        let InlineItem::Text(run) = &p.content[0] else {
            panic!("text expected");
        };
        let raw = run.overrides.raw.as_ref().expect("run shadow");
        assert!(raw.as_str().contains(r#"w:ascii="X""#));
        assert_eq!(run.overrides.format.font_ascii.as_deref(), Some("X"));
        assert_eq!(p.default_run.font_ascii.as_deref(), Some("X"));
        assert_eq!(p.default_run.bold, Some(true));

        let ppr = p.paragraph_format.raw.as_ref().expect("paragraph shadow");
        assert!(ppr.as_str().contains("<w:keepNext/>"));
        assert_eq!(p.paragraph_format.space_before, Some(240));
    }

    #[test]
    fn theme_colors_are_not_materialized() {
        let p = first_paragraph(
            r#"<w:p><w:pPr><w:pStyle w:val="Accent"/></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"#,
            r#"<w:style w:type="paragraph" w:styleId="Accent"><w:name w:val="Accent"/>
                 <w:rPr><w:color w:val="365F91" w:themeColor="accent1"/><w:sz w:val="24"/></w:rPr></w:style>"#,
        );
        let InlineItem::Text(run) = &p.content[0] else {
            panic!("text expected");
        };
        let raw = run.overrides.raw.as_ref().expect("run shadow");
        assert!(!raw.as_str().contains("w:color"));
        assert_eq!(run.overrides.format.color, None);
        assert_eq!(run.overrides.format.size, Some(24));
        assert_eq!(p.default_run.color, None);
    }

    #[test]
    fn explicit_properties_win_over_style() {
        let p = first_paragraph(
            r#"<w:p><w:pPr><w:pStyle w:val="S"/><w:jc w:val="right"/></w:pPr>
                 <w:r><w:rPr><w:sz w:val="20"/></w:rPr><w:t>x</w:t></w:r></w:p>"#,
            r#"<w:style w:type="paragraph" w:styleId="S"><w:name w:val="S"/>
                 <w:pPr><w:jc w:val="center"/></w:pPr><w:rPr><w:sz w:val="40"/></w:rPr></w:style>"#,
        );
        assert_eq!(p.paragraph_format.alignment, Some(Alignment::Right));
        let InlineItem::Text(run) = &p.content[0] else {
            panic!("text expected");
        };
        assert_eq!(run.overrides.format.size, Some(20));
    }

    #[test]
    fn inline_image_is_read_with_extent_in_twips() {
        let pkg = DocxBuilder::new(
            r#"<w:p><w:r><w:t>before</w:t><w:drawing><wp:inline><wp:extent cx="914400" cy="457200"/>
                 <a:graphic><a:graphicData><pic:pic><pic:blipFill><a:blip r:embed="rIdImg"/></pic:blipFill></pic:pic></a:graphicData></a:graphic>
               </wp:inline></w:drawing></w:r></w:p>"#,
        )
        .image("rIdImg", "media/image1.png", PNG_1X1)
        .build();
        let ast = parse_package(&pkg, &ParseOptions::default()).expect("parse");
        let Block::Paragraph(p) = &ast.document.body[0] else {
            panic!("paragraph expected");
        };
        assert_eq!(p.content.len(), 2);
        let InlineItem::InlineImage(img) = &p.content[1] else {
            panic!("image expected");
        };
        assert_eq!(img.content_type, "image/png");
        assert_eq!((img.width, img.height), (1440, 720));
        assert_eq!(img.data, PNG_1X1);
    }

    #[test]
    fn empty_runs_are_skipped() {
        let p = first_paragraph(
            r#"<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:bookmarkStart w:id="0" w:name="x"/><w:r><w:t>t</w:t></w:r></w:p>"#,
            "",
        );
        assert_eq!(p.content.len(), 1);
    }
}
