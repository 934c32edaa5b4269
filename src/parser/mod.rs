//! Parsing pipeline: source string to AST
//!
//! Staged exactly as the front of the evaluator pipeline: validate input,
//! scan, insert implicit multiplication, then build the tree.

pub(crate) mod commands;
pub(crate) mod grammar;
pub(crate) mod implicit_mul;
pub(crate) mod lexer;
pub mod tokens;

use std::sync::Arc;

use crate::ast::Expr;
use crate::core::error::{SyntaxError, TexprError};
use crate::extensions::ExtensionRegistry;
use crate::parser::lexer::{Lexer, LexerOptions};


/// Options threaded from the facade into the pipeline.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseOptions {
    /// Insert synthetic multiplication between juxtaposed operands.
    pub implicit_multiplication: bool,
    /// Recursion-depth ceiling for the parser.
    pub max_recursion_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            implicit_multiplication: true,
            max_recursion_depth: crate::DEFAULT_MAX_RECURSION_DEPTH as usize,
        }
    }
}

/// Parse one source string into an AST root (strict mode: the first error
/// is fatal).
pub(crate) fn parse_source(
    source: &str,
    options: ParseOptions,
    extensions: Option<&ExtensionRegistry>,
) -> Result<Arc<Expr>, TexprError> {
    let tokens = tokenize(source, options, extensions)?;
    let root = grammar::parse_tokens(
        &tokens,
        grammar::ParserOptions {
            max_recursion_depth: options.max_recursion_depth,
            recover: false,
        },
    )?;
    Ok(root)
}

/// Parse with recovery: collects every error instead of stopping at the
/// first, synthesising stand-ins to keep going.
pub(crate) fn parse_source_recovering(
    source: &str,
    options: ParseOptions,
    extensions: Option<&ExtensionRegistry>,
) -> (Option<Arc<Expr>>, Vec<TexprError>) {
    let tokens = match tokenize(source, options, extensions) {
        Ok(tokens) => tokens,
        Err(err) => return (None, vec![err]),
    };
    let (root, errors) = grammar::parse_tokens_recovering(
        &tokens,
        grammar::ParserOptions {
            max_recursion_depth: options.max_recursion_depth,
            recover: true,
        },
    );
    (root, errors.into_iter().map(TexprError::from).collect())
}

fn tokenize(
    source: &str,
    options: ParseOptions,
    extensions: Option<&ExtensionRegistry>,
) -> Result<Vec<tokens::Token>, TexprError> {
    if source.trim().is_empty() {
        return Err(SyntaxError::new("empty expression", None).into());
    }
    let scanned = Lexer::new(
        source,
        LexerOptions {
            split_letters: options.implicit_multiplication,
        },
        extensions,
    )
    .tokenize()?;
    Ok(if options.implicit_multiplication {
        implicit_mul::insert_implicit_multiplication(scanned)
    } else {
        scanned
    })
}
