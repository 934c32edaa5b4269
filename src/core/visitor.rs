//! Immutable AST traversal
//!
//! External consumers (exporters, printers, linters) walk the tree through
//! [`ExprVisitor`]: a visit method parameterised by a result type and a typed
//! context, plus [`walk_children`] for the default recursion. The AST itself
//! never mutates during a visit.

use std::sync::Arc;

use crate::ast::Expr;

/// A read-only visitor over the expression tree.
///
/// `Output` is the per-node result; `Context` is threaded down unchanged by
/// the caller (indentation level, precedence, sink handles, ...). The
/// canonical LaTeX printer and the JSON/MathML exporters are all instances
/// of this trait.
pub trait ExprVisitor {
    /// Per-node result type.
    type Output;
    /// Read-only context passed to every visit.
    type Context;

    /// Visit one node. Implementations recurse explicitly, typically via
    /// [`walk_children`] or by visiting specific children.
    fn visit(&mut self, expr: &Expr, ctx: &Self::Context) -> Self::Output;
}

/// Visit every direct child of `expr` in evaluation order, discarding
/// individual outputs. The default recursion for visitors that only care
/// about a subset of node kinds.
pub fn walk_children<V: ExprVisitor>(visitor: &mut V, expr: &Expr, ctx: &V::Context) {
    let mut children: Vec<Arc<Expr>> = Vec::new();
    expr.for_each_child(&mut |child| children.push(Arc::clone(child)));
    for child in children {
        visitor.visit(&child, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr};

    struct VariableCounter {
        seen: usize,
    }

    impl ExprVisitor for VariableCounter {
        type Output = ();
        type Context = ();

        fn visit(&mut self, expr: &Expr, ctx: &()) {
            if expr.as_variable().is_some() {
                self.seen += 1;
            }
            walk_children(self, expr, ctx);
        }
    }

    #[test]
    fn visitor_reaches_every_node() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::variable("x"),
            Expr::binary(BinaryOp::Mul, Expr::variable("y"), Expr::variable("x")),
        );
        let mut counter = VariableCounter { seen: 0 };
        counter.visit(&e, &());
        assert_eq!(counter.seen, 3);
    }
}
