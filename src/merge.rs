//! Reconciles an edited view with the full AST it was projected from.
//!
//! The view is a sparse overlay: blocks are paired by id, blocks the view omits pass
//! through untouched, and nothing is reordered or deleted. For every paired paragraph
//! the tracked fields that changed are written into the semantic fields and patched into
//! the shadow one property at a time. A shadow that cannot be patched is dropped so the
//! renderer synthesizes from the (updated) fields instead.

use std::collections::HashMap;

use crate::ast::{Ast, Block, InlineItem, Paragraph, RawXml, Table, TextRun, Toc};
use crate::docx::props::{patch_ppr, patch_rpr, ParagraphChange, RunChange};
use crate::view::View;

/// Applies `edit` to a shadow; `None` when the shadow does not parse.
fn patch_shadow(
    raw: &RawXml,
    expected: &str,
    owner: &str,
    edit: impl FnOnce(&mut crate::docx::xml::XmlElement),
) -> Option<RawXml> {
    match raw.patch(expected, edit) {
        Ok(patched) => Some(patched),
        Err(err) => {
            tracing::warn!(id = %owner, error = %err, "shadow dropped during merge");
            None
        }
    }
}

fn merge_run(owner: &str, orig: &TextRun, edited: &TextRun) -> TextRun {
    let mut out = orig.clone();
    if orig.text != edited.text {
        out.text = edited.text.clone();
    }
    let changes = RunChange::diff(&orig.overrides.format, &edited.overrides.format);
    if changes.is_empty() {
        return out;
    }
    for change in &changes {
        change.apply_to(&mut out.overrides.format);
    }
    if let Some(raw) = &orig.overrides.raw {
        out.overrides.raw = patch_shadow(raw, "w:rPr", owner, |rpr| patch_rpr(rpr, &changes));
    }
    out
}

fn merge_paragraph(orig: &Paragraph, edited: &Paragraph) -> Paragraph {
    let mut out = orig.clone();
    if orig.style != edited.style {
        out.style = edited.style.clone();
    }

    let changes = ParagraphChange::diff(&orig.paragraph_format, &edited.paragraph_format);
    if !changes.is_empty() {
        for change in &changes {
            change.apply_to(&mut out.paragraph_format);
        }
        if let Some(raw) = &orig.paragraph_format.raw {
            out.paragraph_format.raw =
                patch_shadow(raw, "w:pPr", &orig.id, |ppr| patch_ppr(ppr, &changes));
        }
    }

    // Positional pairing; items past the shorter list are left as they were.
    for (slot, edited_item) in out.content.iter_mut().zip(edited.content.iter()) {
        if let (InlineItem::Text(run), InlineItem::Text(edited_run)) = (slot, edited_item) {
            *run = merge_run(&orig.id, run, edited_run);
        }
    }
    out
}

fn merge_paragraph_list(orig: &[Paragraph], edited: &[Paragraph]) -> Vec<Paragraph> {
    let by_id: HashMap<&str, &Paragraph> = edited.iter().map(|p| (p.id.as_str(), p)).collect();
    orig.iter()
        .map(|p| match by_id.get(p.id.as_str()) {
            Some(e) => merge_paragraph(p, e),
            None => p.clone(),
        })
        .collect()
}

/// Cell text and formatting only; the table shape is never changed.
fn merge_table(orig: &Table, edited: &Table) -> Table {
    let edited_cells: HashMap<&str, &[Paragraph]> = edited
        .rows
        .iter()
        .flat_map(|r| r.cells.iter())
        .map(|c| (c.id.as_str(), c.content.as_slice()))
        .collect();
    let mut out = orig.clone();
    for cell in out.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
        if let Some(content) = edited_cells.get(cell.id.as_str()) {
            cell.content = merge_paragraph_list(&cell.content, content);
        }
    }
    out
}

fn merge_toc(orig: &Toc, edited: &Toc) -> Toc {
    let mut out = orig.clone();
    if !edited.instruction.trim().is_empty() && edited.instruction != orig.instruction {
        out.instruction = edited.instruction.clone();
    }
    out.title = match (&orig.title, &edited.title) {
        (Some(o), Some(e)) => Some(merge_paragraph(o, e)),
        (None, Some(e)) => Some(e.clone()),
        (o, None) => o.clone(),
    };
    out
}

fn merge_block(orig: &Block, edited: &Block) -> Block {
    match (orig, edited) {
        (Block::Paragraph(o), Block::Paragraph(e)) => Block::Paragraph(merge_paragraph(o, e)),
        (Block::Table(o), Block::Table(e)) => Block::Table(merge_table(o, e)),
        (Block::Toc(o), Block::Toc(e)) => Block::Toc(merge_toc(o, e)),
        _ => {
            tracing::warn!(id = %orig.id(), "block kind changed in view; original kept");
            orig.clone()
        }
    }
}

/// Produces a new AST: `original` with the edits carried by `edited` applied.
pub fn merge(original: &Ast, edited: &View) -> Ast {
    let edited_body = &edited.ast().document.body;
    let index: HashMap<&str, usize> = edited_body
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id(), i))
        .collect();

    let mut out = original.clone();
    let mut matched = 0usize;
    for block in &mut out.document.body {
        if let Some(&i) = index.get(block.id()) {
            *block = merge_block(block, &edited_body[i]);
            matched += 1;
        }
    }
    tracing::debug!(
        blocks = out.document.body.len(),
        matched,
        "merged edited view"
    );
    out
}
