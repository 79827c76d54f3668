//! Agent-facing projection: the AST with every `_raw_*` shadow removed.

use serde::{Deserialize, Serialize};

use crate::ast::{Ast, Block, InlineItem, Paragraph};
use crate::error::AstResult;

const RAW_PREFIX: &str = "_raw_";

/// Same JSON shape as [`Ast`], guaranteed shadow-free when built by [`to_view`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct View(pub Ast);

impl View {
    pub fn ast(&self) -> &Ast {
        &self.0
    }

    pub fn into_ast(self) -> Ast {
        self.0
    }

    pub fn from_json(text: &str) -> AstResult<Self> {
        Ast::from_json(text).map(View)
    }

    pub fn to_json(&self, pretty: bool) -> AstResult<String> {
        self.0.to_json(pretty)
    }
}

fn strip_paragraph(p: &mut Paragraph) {
    p.paragraph_format.raw = None;
    for item in &mut p.content {
        if let InlineItem::Text(run) = item {
            run.overrides.raw = None;
        }
    }
}

fn strip_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|k, _| !k.starts_with(RAW_PREFIX));
            map.values_mut().for_each(strip_json);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(strip_json),
        _ => {}
    }
}

/// Deep copy of `ast` with all shadows dropped. The input is left untouched.
pub fn to_view(ast: &Ast) -> View {
    let mut out = ast.clone();
    let doc = &mut out.document;
    for block in &mut doc.body {
        match block {
            Block::Paragraph(p) => strip_paragraph(p),
            Block::Table(t) => {
                t.raw = None;
                for row in &mut t.rows {
                    row.raw = None;
                    for cell in &mut row.cells {
                        cell.raw = None;
                        cell.content.iter_mut().for_each(strip_paragraph);
                    }
                }
            }
            Block::Toc(toc) => {
                if let Some(title) = &mut toc.title {
                    strip_paragraph(title);
                }
            }
        }
    }
    doc.passthrough.retain(|k, _| !k.starts_with(RAW_PREFIX));
    doc.passthrough.values_mut().for_each(strip_json);
    View(out)
}
