//! DOCX <-> JSON AST codec that keeps untouched formatting intact across agent edits.
//!
//! `parse_docx` -> [`Ast`] -> [`to_view`] -> (edit) -> [`merge`] -> `render_docx`.

pub mod ast;
pub mod config;
pub mod docx;
pub mod error;
pub mod merge;
pub mod parser;
pub mod progress;
pub mod renderer;
pub mod units;
pub mod view;

#[cfg(test)]
mod testutil;

pub use ast::{Ast, SCHEMA_VERSION};
pub use error::{AstError, AstResult};
pub use merge::merge;
pub use parser::{parse_docx, parse_package, ParseOptions};
pub use renderer::{render_ast, render_docx, RenderOptions};
pub use view::{to_view, View};
