use crate::ast::Toc;
use crate::docx::xml::XmlElement;
use crate::error::AstResult;

use super::paragraph::parse_paragraph;
use super::ParseContext;

pub const DEFAULT_TOC_INSTRUCTION: &str = r#"TOC \o "1-3" \h \z \u"#;

fn gallery(sdt: &XmlElement) -> Option<String> {
    sdt.child("w:sdtPr")?
        .child("w:docPartObj")?
        .child_attr("w:docPartGallery", "w:val")
}

pub(crate) fn is_toc_sdt(sdt: &XmlElement) -> bool {
    if gallery(sdt).is_some_and(|g| g.contains("Table of Contents")) {
        return true;
    }
    sdt.child("w:sdtContent").is_some_and(|content| {
        content.descendants().into_iter().any(|el| {
            el.name == "w:instrText" && el.text().trim().to_ascii_uppercase().starts_with("TOC")
        })
    })
}

fn field_char(r: &XmlElement) -> Option<String> {
    r.child_attr("w:fldChar", "w:fldCharType")
}

/// Instruction text of the first complex field in the content: `w:instrText` fragments
/// between its `begin` and the next `separate`/`end`.
fn first_instruction(content: &XmlElement) -> String {
    let mut parts = String::new();
    let mut in_field = false;
    for p in content.children_named("w:p") {
        for r in p.descendants().into_iter().filter(|el| el.name == "w:r") {
            match field_char(r).as_deref() {
                Some("begin") => {
                    in_field = true;
                    continue;
                }
                Some("separate") | Some("end") => {
                    if in_field && !parts.trim().is_empty() {
                        return parts.trim().to_string();
                    }
                    in_field = false;
                    continue;
                }
                _ => {}
            }
            if in_field {
                for instr in r.children_named("w:instrText") {
                    parts.push_str(&instr.text());
                }
            }
        }
    }
    parts.trim().to_string()
}

pub(crate) fn parse_toc(ctx: &ParseContext<'_>, sdt: &XmlElement, id: String) -> AstResult<Toc> {
    let Some(content) = sdt.child("w:sdtContent") else {
        return Ok(Toc {
            id,
            instruction: DEFAULT_TOC_INSTRUCTION.to_string(),
            title: None,
        });
    };

    let mut instruction = first_instruction(content);
    if instruction.is_empty() {
        instruction = DEFAULT_TOC_INSTRUCTION.to_string();
    }

    let mut title = None;
    for p in content.children_named("w:p") {
        let begins_field = p
            .descendants()
            .into_iter()
            .any(|el| el.name == "w:fldChar" && el.attr("w:fldCharType") == Some("begin"));
        if begins_field {
            break;
        }
        let candidate = parse_paragraph(ctx, p, format!("{id}.title"))?;
        if !candidate.plain_text().trim().is_empty() {
            title = Some(candidate);
            break;
        }
    }

    Ok(Toc {
        id,
        instruction,
        title,
    })
}
