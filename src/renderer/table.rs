use crate::ast::{Cell, StyleType, Table};
use crate::docx::props::{insert_ordered, replace_ordered, TBLPR_ORDER, TCPR_ORDER};
use crate::docx::shadow::{sanitize_tblpr, sanitize_tcpr, sanitize_trpr};
use crate::docx::xml::XmlElement;

use super::paragraph::{render_paragraph, usable_shadow};
use super::Renderer;

/// Word refuses tables wider than this many grid columns.
pub(crate) const MAX_GRID_COLS: usize = 63;

/// A source cell after clamping, anchored at `(row, col)`.
struct Placement<'t> {
    cell: &'t Cell,
    row: usize,
    col: usize,
    col_span: usize,
    row_span: usize,
}

/// Lays cells onto a `rows x cols` occupancy grid. Spans of 0 count as 1, row spans are
/// clamped to the table height, a span running into occupied space is shrunk to the
/// free region, and a cell whose origin is already covered is dropped.
fn place_cells(t: &Table, cols: usize) -> (Vec<Placement<'_>>, Vec<Vec<Option<usize>>>) {
    let rows = t.rows.len();
    let mut grid: Vec<Vec<Option<usize>>> = vec![vec![None; cols]; rows];
    let mut placements = Vec::new();

    for (r, row) in t.rows.iter().enumerate() {
        for cell in &row.cells {
            let col = cell.grid_col;
            if col >= cols {
                tracing::warn!(table = %t.id, cell = %cell.id, grid_col = col, "cell outside the grid; dropped");
                continue;
            }
            if grid[r][col].is_some() {
                tracing::warn!(table = %t.id, cell = %cell.id, "cell origin already covered; dropped");
                continue;
            }
            let want_cols = cell.col_span.max(1);
            let col_span = (col..col.saturating_add(want_cols).min(cols))
                .take_while(|&c| grid[r][c].is_none())
                .count();
            let want_rows = cell.row_span.max(1).min(rows - r);
            let mut row_span = 1;
            while row_span < want_rows
                && (col..col + col_span).all(|c| grid[r + row_span][c].is_none())
            {
                row_span += 1;
            }
            if col_span != want_cols || row_span != cell.row_span.max(1) {
                tracing::warn!(
                    table = %t.id,
                    cell = %cell.id,
                    col_span,
                    row_span,
                    "cell span clamped"
                );
            }
            let idx = placements.len();
            for grid_row in grid.iter_mut().skip(r).take(row_span) {
                for slot in grid_row.iter_mut().skip(col).take(col_span) {
                    *slot = Some(idx);
                }
            }
            placements.push(Placement {
                cell,
                row: r,
                col,
                col_span,
                row_span,
            });
        }
    }
    (placements, grid)
}

fn cell_properties(base: Option<&XmlElement>, width: i64, col_span: usize) -> XmlElement {
    let mut tcpr = base.cloned().unwrap_or_else(|| XmlElement::new("w:tcPr"));
    replace_ordered(
        &mut tcpr,
        XmlElement::new("w:tcW")
            .with_attr("w:w", &width.saturating_mul(col_span as i64).to_string())
            .with_attr("w:type", "dxa"),
        TCPR_ORDER,
    );
    if col_span > 1 {
        replace_ordered(
            &mut tcpr,
            XmlElement::new("w:gridSpan").with_attr("w:val", &col_span.to_string()),
            TCPR_ORDER,
        );
    }
    tcpr
}

pub(crate) fn render_table(r: &mut Renderer<'_>, t: &Table) -> Option<XmlElement> {
    if t.rows.is_empty() {
        tracing::warn!(table = %t.id, "table without rows skipped");
        return None;
    }
    let cols = t
        .rows
        .iter()
        .flat_map(|row| row.cells.iter())
        .map(|c| c.grid_col.saturating_add(c.col_span.max(1)))
        .max()
        .unwrap_or(1)
        .clamp(1, MAX_GRID_COLS);
    let col_width = (r.text_width / cols as i64).max(1);
    let (placements, grid) = place_cells(t, cols);

    let mut tblpr = usable_shadow(t.raw.as_ref(), "w:tblPr", sanitize_tblpr)
        .unwrap_or_else(|| XmlElement::new("w:tblPr"));
    if let Some(style) = t.style.as_deref() {
        if let Some(id) = r.catalogue.resolve(style, r.ast_styles, StyleType::Table) {
            insert_ordered(
                &mut tblpr,
                XmlElement::new("w:tblStyle").with_attr("w:val", &id),
                TBLPR_ORDER,
            );
        }
    }
    if !tblpr.has_child("w:tblW") {
        insert_ordered(
            &mut tblpr,
            XmlElement::new("w:tblW")
                .with_attr("w:w", "0")
                .with_attr("w:type", "auto"),
            TBLPR_ORDER,
        );
    }

    let mut tbl = XmlElement::new("w:tbl").with_child(tblpr);
    let mut tbl_grid = XmlElement::new("w:tblGrid");
    for _ in 0..cols {
        tbl_grid.push(XmlElement::new("w:gridCol").with_attr("w:w", &col_width.to_string()));
    }
    tbl.push(tbl_grid);

    // Sanitized tcPr shadows per placement, shared by origin and continuation cells.
    let shadows: Vec<Option<XmlElement>> = placements
        .iter()
        .map(|p| usable_shadow(p.cell.raw.as_ref(), "w:tcPr", sanitize_tcpr))
        .collect();

    for (ri, row) in t.rows.iter().enumerate() {
        let mut tr = XmlElement::new("w:tr");
        if let Some(trpr) = usable_shadow(row.raw.as_ref(), "w:trPr", sanitize_trpr) {
            if !trpr.children.is_empty() {
                tr.push(trpr);
            }
        }
        let mut c = 0;
        while c < cols {
            let Some(idx) = grid[ri][c] else {
                let tcpr = cell_properties(None, col_width, 1);
                tr.push(
                    XmlElement::new("w:tc")
                        .with_child(tcpr)
                        .with_child(XmlElement::new("w:p")),
                );
                c += 1;
                continue;
            };
            let p = &placements[idx];
            let mut tcpr = cell_properties(shadows[idx].as_ref(), col_width, p.col_span);
            let mut tc = XmlElement::new("w:tc");
            if p.row == ri {
                if p.row_span > 1 {
                    replace_ordered(
                        &mut tcpr,
                        XmlElement::new("w:vMerge").with_attr("w:val", "restart"),
                        TCPR_ORDER,
                    );
                }
                tc.push(tcpr);
                for para in &p.cell.content {
                    tc.push(render_paragraph(r, para));
                }
                if p.cell.content.is_empty() {
                    tc.push(XmlElement::new("w:p"));
                }
            } else {
                replace_ordered(&mut tcpr, XmlElement::new("w:vMerge"), TCPR_ORDER);
                tc.push(tcpr);
                tc.push(XmlElement::new("w:p"));
            }
            tr.push(tc);
            c = p.col + p.col_span.max(1);
        }
        tbl.push(tr);
    }
    Some(tbl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Paragraph, Row};

    fn cell(id: &str, grid_col: usize, col_span: usize, row_span: usize) -> Cell {
        Cell {
            id: id.into(),
            content: vec![Paragraph {
                id: format!("{id}.p0"),
                ..Default::default()
            }],
            grid_col,
            col_span,
            row_span,
            raw: None,
        }
    }

    fn table(rows: Vec<Vec<Cell>>) -> Table {
        Table {
            id: "t0".into(),
            rows: rows
                .into_iter()
                .map(|cells| Row { cells, raw: None })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn spans_fill_grid_without_overlap() {
        let t = table(vec![
            vec![cell("a", 0, 2, 1), cell("b", 2, 1, 1)],
            vec![cell("c", 0, 1, 1), cell("d", 1, 1, 1), cell("e", 2, 1, 2)],
            vec![cell("f", 0, 1, 1), cell("g", 1, 1, 1)],
        ]);
        let (placements, grid) = place_cells(&t, 3);
        assert_eq!(placements.len(), 7);
        assert_eq!(grid[0][0], grid[0][1]);
        assert_eq!(grid[1][2], grid[2][2]);
        assert!(grid.iter().flatten().all(Option::is_some));
    }

    #[test]
    fn oversized_and_conflicting_spans_are_clamped() {
        let t = table(vec![
            vec![cell("a", 0, 0, 5)],
            vec![cell("b", 0, 1, 1), cell("c", 1, 1, 1)],
        ]);
        let (placements, _) = place_cells(&t, 2);
        // "a" is clamped to the table height; "b" lands on covered space and is dropped.
        assert_eq!((placements[0].col_span, placements[0].row_span), (1, 2));
        let ids: Vec<&str> = placements.iter().map(|p| p.cell.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[test]
    fn horizontal_overlap_shrinks_span() {
        let t = table(vec![
            vec![cell("a", 0, 1, 2), cell("b", 1, 1, 1)],
            vec![cell("c", 1, 1, 1)],
        ]);
        let t2 = table(vec![vec![cell("x", 1, 1, 1), cell("y", 0, 3, 1)]]);
        let (placements, _) = place_cells(&t, 2);
        assert_eq!(placements.len(), 3);
        let (placements, _) = place_cells(&t2, 3);
        assert_eq!(placements[1].cell.id, "y");
        assert_eq!(placements[1].col_span, 1);
    }

    fn render_one(t: &Table) -> XmlElement {
        let ast = crate::ast::Ast::new(crate::ast::Document {
            body: vec![crate::ast::Block::Table(t.clone())],
            ..Default::default()
        });
        let pkg = crate::renderer::render_ast(&ast, &crate::renderer::RenderOptions::default())
            .expect("render");
        let xml = pkg.data("word/document.xml").expect("document");
        let root = crate::docx::xml::parse_xml_document("word/document.xml", xml)
            .expect("xml")
            .root;
        root.find_descendant("w:tbl").expect("table").clone()
    }

    fn grid_cols(tbl: &XmlElement) -> usize {
        tbl.child("w:tblGrid").expect("grid").children_named("w:gridCol").count()
    }

    #[test]
    fn unbounded_col_span_is_capped_at_grid_limit() {
        let tbl = render_one(&table(vec![vec![cell("a", 0, usize::MAX, 1)]]));
        assert_eq!(grid_cols(&tbl), MAX_GRID_COLS);
        let tr = tbl.child("w:tr").expect("row");
        let tcs: Vec<&XmlElement> = tr.children_named("w:tc").collect();
        assert_eq!(tcs.len(), 1);
        assert_eq!(
            tcs[0].child("w:tcPr").and_then(|p| p.child_attr("w:gridSpan", "w:val")),
            Some(MAX_GRID_COLS.to_string())
        );
    }

    #[test]
    fn far_grid_col_is_dropped_not_allocated() {
        let t = table(vec![vec![cell("a", 0, 1, 1), cell("far", 5_000_000, 1, 1)]]);
        let (placements, grid) = place_cells(&t, MAX_GRID_COLS);
        assert_eq!(placements.len(), 1);
        assert_eq!(grid[0].len(), MAX_GRID_COLS);

        let tbl = render_one(&table(vec![vec![cell("far", 5_000_000, 1, 1)]]));
        assert_eq!(grid_cols(&tbl), MAX_GRID_COLS);
        let tr = tbl.child("w:tr").expect("row");
        assert_eq!(tr.children_named("w:tc").count(), MAX_GRID_COLS);
    }
}
