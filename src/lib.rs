#![forbid(unsafe_code)]
//! LaTeX Mathematical Expression Evaluator
//!
//! TeXpr parses a subset of LaTeX into a typed abstract syntax tree and
//! evaluates it against a caller-supplied variable environment, producing a
//! typed result: real scalar, complex number, vector, matrix, interval, or
//! boolean. It is a library for embedding, not an application.
//!
//! # Features
//! - Context-sensitive lexer with implicit multiplication (`2x` is `2*x`)
//! - Recursive-descent parser with error recovery and did-you-mean hints
//! - Typed results with safe downcasts (`as_number`, `as_matrix`, ...)
//! - Symbolic differentiation, numeric integration, limits, series
//! - Four-layer memoisation (parsed trees, results, derivatives,
//!   transient sub-expressions) with LRU/LFU eviction and optional TTL
//! - Per-instance extension hooks for custom commands and evaluators
//!
//! # Usage
//!
//! ```
//! use texpr::{Texpr, Variables};
//!
//! let mut texpr = Texpr::new();
//! let vars: Variables = [("x", 3.0), ("y", 4.0)].into_iter().collect();
//! let result = texpr.evaluate("\\sqrt{x^2 + y^2}", &vars).unwrap();
//! assert_eq!(result.as_number().unwrap(), 5.0);
//! ```
//!
//! Evaluation is synchronous and single-threaded: a `Texpr` instance owns
//! unsynchronised caches, so concurrent workers each own an instance. The
//! built-in constant and function tables are immutable after start-up and
//! shared freely.

mod api;
pub mod ast;
mod cache;
mod calculus;
mod core;
mod evaluator;
mod extensions;
mod parser;

#[cfg(test)]
mod tests;

pub use api::{Texpr, TexprConfig, ValidationResult};
pub use ast::{BinaryOp, CompareOp, Expr, ExprKind, PiecewiseCase, UnaryOp};
pub use cache::keys::Variables;
pub use cache::{CacheConfig, CacheStatistics, EvictionPolicy, LayerStatistics};
pub use core::error::{
    EvalErrorKind, EvaluationError, LexicalError, LexicalErrorKind, SyntaxError, TexprError,
};
pub use core::value::Value;
pub use core::visitor::{ExprVisitor, walk_children};
pub use extensions::{CommandHandler, EvaluatorHandler, ExtensionRegistry, Recurse};
pub use parser::tokens::{Token, TokenKind};

/// Default recursion ceiling for parsing and evaluation.
pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 500;
/// Hard ceiling on AST nodes per parse.
pub const MAX_NODE_COUNT: usize = 10_000;

/// Parse a source string with the default configuration.
///
/// # Example
/// ```
/// let ast = texpr::parse("2x + 1").unwrap();
/// assert_eq!(ast.to_latex(), "2 \\cdot x + 1");
/// ```
pub fn parse(source: &str) -> Result<std::sync::Arc<Expr>, TexprError> {
    Texpr::new().parse(source)
}

/// Evaluate a source string with the default configuration.
///
/// # Example
/// ```
/// use texpr::Variables;
///
/// let vars: Variables = [("x", 2.0)].into_iter().collect();
/// let result = texpr::evaluate("x^3", &vars).unwrap();
/// assert_eq!(result.as_number().unwrap(), 8.0);
/// ```
pub fn evaluate(source: &str, vars: &Variables) -> Result<Value, TexprError> {
    Texpr::new().evaluate(source, vars)
}

/// Differentiate a source string with the default configuration.
///
/// # Example
/// ```
/// let derivative = texpr::differentiate("x^2", "x", 1).unwrap();
/// // The output is unsimplified: 2 * x^1 * 1.
/// assert!(derivative.to_latex().contains("2"));
/// ```
pub fn differentiate(
    source: &str,
    var: &str,
    order: u32,
) -> Result<std::sync::Arc<Expr>, TexprError> {
    Texpr::new().differentiate(source, var, order)
}
