//! Per-instance extension points
//!
//! Two hooks, both consulted before the built-in paths:
//!
//! - **Command handlers** run in the lexer when a `\command` is not in the
//!   built-in table, and may produce a token for it.
//! - **Evaluator handlers** run before built-in dispatch for every
//!   function-call node and for unresolved variables; returning `None`
//!   falls through to the built-ins.
//!
//! Unlike the built-in tables (process-wide, immutable), an
//! `ExtensionRegistry` belongs to one `Texpr` instance.

use rustc_hash::FxHashMap;

use crate::ast::Expr;
use crate::cache::keys::Variables;
use crate::core::error::EvaluationError;
use crate::core::value::Value;
use crate::parser::tokens::Token;

/// Lexer hook: `(command_name, byte_offset) -> Option<Token>`.
pub type CommandHandler = Box<dyn Fn(&str, usize) -> Option<Token>>;

/// Recursive evaluation callback handed to evaluator hooks.
pub type Recurse<'a> = dyn FnMut(&Expr) -> Result<Value, EvaluationError> + 'a;

/// Evaluator hook: inspect a node, optionally produce its value. The
/// callback evaluates sub-expressions with the full evaluator.
pub type EvaluatorHandler =
    Box<dyn Fn(&Expr, &Variables, &mut Recurse<'_>) -> Option<Result<Value, EvaluationError>>>;

/// Registered handlers for one `Texpr` instance.
#[derive(Default)]
pub struct ExtensionRegistry {
    commands: FxHashMap<String, CommandHandler>,
    evaluators: Vec<EvaluatorHandler>,
}

impl ExtensionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ExtensionRegistry::default()
    }

    /// Register a lexer hook for `\name`. Replaces any previous handler
    /// for the same name. Built-in commands always win; the hook only sees
    /// names the table does not know.
    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&str, usize) -> Option<Token> + 'static,
    ) {
        self.commands.insert(name.into(), Box::new(handler));
    }

    /// Register an evaluator hook. Hooks run in registration order; the
    /// first `Some` wins.
    pub fn register_evaluator(
        &mut self,
        handler: impl Fn(&Expr, &Variables, &mut Recurse<'_>) -> Option<Result<Value, EvaluationError>>
        + 'static,
    ) {
        self.evaluators.push(Box::new(handler));
    }

    /// Whether any evaluator hooks exist (cheap pre-check for the hot path).
    pub(crate) fn has_evaluators(&self) -> bool {
        !self.evaluators.is_empty()
    }

    /// Lexer-side resolution of an unknown command.
    pub(crate) fn resolve_command(&self, name: &str, offset: usize) -> Option<Token> {
        self.commands.get(name).and_then(|h| h(name, offset))
    }

    /// Evaluator-side hook dispatch; `None` means no hook claimed the node.
    pub(crate) fn evaluate(
        &self,
        expr: &Expr,
        vars: &Variables,
        recurse: &mut Recurse<'_>,
    ) -> Option<Result<Value, EvaluationError>> {
        self.evaluators.iter().find_map(|h| h(expr, vars, recurse))
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("commands", &self.commands.len())
            .field("evaluators", &self.evaluators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokens::TokenKind;

    #[test]
    fn command_handler_resolves() {
        let mut registry = ExtensionRegistry::new();
        registry.register_command("half", |_, offset| {
            Some(Token::number("0.5", 0.5, offset))
        });
        let token = registry.resolve_command("half", 3).expect("token");
        assert_eq!(token.kind, TokenKind::Number);
        assert_eq!(token.offset, 3);
        assert!(registry.resolve_command("unknown", 0).is_none());
    }

    #[test]
    fn evaluator_handlers_run_in_order() {
        let mut registry = ExtensionRegistry::new();
        registry.register_evaluator(|_, _, _| None);
        registry.register_evaluator(|_, _, _| Some(Ok(Value::Number(7.0))));
        let vars = Variables::new();
        let expr = Expr::variable("anything");
        let result = registry
            .evaluate(&expr, &vars, &mut |_| Ok(Value::Number(0.0)))
            .expect("claimed")
            .expect("ok");
        assert_eq!(result, Value::Number(7.0));
    }
}
