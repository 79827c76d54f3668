use crate::ast::{Cell, Paragraph, Row, Table};
use crate::docx::shadow::capture;
use crate::docx::xml::XmlElement;
use crate::error::AstResult;

use super::paragraph::parse_paragraph;
use super::ParseContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VMerge {
    None,
    Start,
    Continue,
}

/// A `w:tc` placed on the logical grid.
struct SourceCell<'x> {
    el: &'x XmlElement,
    grid_col: usize,
    span: usize,
    vmerge: VMerge,
}

struct SourceRow<'x> {
    el: &'x XmlElement,
    cells: Vec<SourceCell<'x>>,
}

/// Children named `name`, looking through content-control and custom-XML wrappers.
fn collect_wrapped<'x>(parent: &'x XmlElement, name: &str, out: &mut Vec<&'x XmlElement>) {
    for el in parent.elements() {
        if el.name == name {
            out.push(el);
        } else if el.name == "w:sdt" {
            if let Some(content) = el.child("w:sdtContent") {
                collect_wrapped(content, name, out);
            }
        } else if el.name == "w:customXml" {
            collect_wrapped(el, name, out);
        }
    }
}

fn int_val(el: Option<&XmlElement>) -> Option<usize> {
    el.and_then(|e| e.attr("w:val"))
        .and_then(|v| v.trim().parse::<usize>().ok())
}

fn layout_row(tr: &XmlElement) -> SourceRow<'_> {
    let mut col = int_val(tr.child("w:trPr").and_then(|p| p.child("w:gridBefore"))).unwrap_or(0);
    let mut tcs = Vec::new();
    collect_wrapped(tr, "w:tc", &mut tcs);
    let mut cells = Vec::with_capacity(tcs.len());
    for tc in tcs {
        let tcpr = tc.child("w:tcPr");
        let span = int_val(tcpr.and_then(|p| p.child("w:gridSpan")))
            .unwrap_or(1)
            .max(1);
        let vmerge = match tcpr.and_then(|p| p.child("w:vMerge")) {
            None => VMerge::None,
            Some(v) => match v.attr("w:val") {
                Some("restart") => VMerge::Start,
                _ => VMerge::Continue,
            },
        };
        cells.push(SourceCell {
            el: tc,
            grid_col: col,
            span,
            vmerge,
        });
        col += span;
    }
    SourceRow { el: tr, cells }
}

/// Rows below `row` whose cell at `grid_col` continues the merge with the same span.
fn vertical_span(rows: &[SourceRow<'_>], row: usize, grid_col: usize, span: usize) -> usize {
    let mut row_span = 1;
    for next in &rows[row + 1..] {
        match next.cells.iter().find(|c| c.grid_col == grid_col) {
            Some(c) if c.vmerge == VMerge::Continue && c.span == span => row_span += 1,
            _ => break,
        }
    }
    row_span
}

/// Cell paragraphs in order; nested tables contribute their paragraphs inline.
fn cell_paragraphs<'x>(tc: &'x XmlElement, out: &mut Vec<&'x XmlElement>) {
    for el in tc.elements() {
        match el.name.as_str() {
            "w:p" => out.push(el),
            "w:tbl" => {
                tracing::debug!("nested table flattened into its cell");
                let mut rows = Vec::new();
                collect_wrapped(el, "w:tr", &mut rows);
                for tr in rows {
                    let mut tcs = Vec::new();
                    collect_wrapped(tr, "w:tc", &mut tcs);
                    for inner in tcs {
                        cell_paragraphs(inner, out);
                    }
                }
            }
            "w:sdt" => {
                if let Some(content) = el.child("w:sdtContent") {
                    cell_paragraphs(content, out);
                }
            }
            "w:customXml" => cell_paragraphs(el, out),
            _ => {}
        }
    }
}

pub(crate) fn parse_table(ctx: &ParseContext<'_>, tbl: &XmlElement, id: String) -> AstResult<Table> {
    let tblpr = tbl.child("w:tblPr");
    let style = tblpr.and_then(|p| p.child_attr("w:tblStyle", "w:val"));
    let raw = match tblpr {
        Some(p) => capture(p, &ctx.ns)?,
        None => None,
    };

    let mut trs = Vec::new();
    collect_wrapped(tbl, "w:tr", &mut trs);
    let layout: Vec<SourceRow<'_>> = trs.into_iter().map(layout_row).collect();

    let mut rows = Vec::with_capacity(layout.len());
    for (r, src_row) in layout.iter().enumerate() {
        let mut cells = Vec::new();
        for src in &src_row.cells {
            if src.vmerge == VMerge::Continue {
                continue;
            }
            let cell_id = format!("{id}.r{r}c{}", src.grid_col);
            let mut paragraphs = Vec::new();
            cell_paragraphs(src.el, &mut paragraphs);
            let content = paragraphs
                .into_iter()
                .enumerate()
                .map(|(k, p)| parse_paragraph(ctx, p, format!("{cell_id}.p{k}")))
                .collect::<AstResult<Vec<Paragraph>>>()?;
            let raw = match src.el.child("w:tcPr") {
                Some(p) => capture(p, &ctx.ns)?,
                None => None,
            };
            cells.push(Cell {
                row_span: vertical_span(&layout, r, src.grid_col, src.span),
                id: cell_id,
                content,
                grid_col: src.grid_col,
                col_span: src.span,
                raw,
            });
        }
        let raw = match src_row.el.child("w:trPr") {
            Some(p) => capture(p, &ctx.ns)?,
            None => None,
        };
        rows.push(Row { cells, raw });
    }

    Ok(Table {
        id,
        style,
        rows,
        raw,
    })
}
