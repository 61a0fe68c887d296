pub mod ast;
mod blocks;
mod expr;
mod game_file;
pub mod keywords;
mod lexer;
mod parser;
mod statements;

pub use ast::{CodeBlock, CodeLine, Expr, Statement};
pub use blocks::{compile_code, split_lines, SourceLine};
pub use game_file::{decode_bundle, encode_game_file};
pub use keywords::{normalize_var_name, Builtin, Command};
pub use lexer::is_name_char;
pub use parser::{parse_expression, parse_format};

/// Bounds applied while compiling a single expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_expression_items: usize,
    pub max_expression_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_expression_items: 200,
            max_expression_depth: 30,
        }
    }
}
