//! Abstract syntax tree for LaTeX mathematical expressions
//!
//! The tree is an owned, acyclic structure of [`Expr`] nodes with `Arc`
//! children: parents own their subtrees, caches hold shared-immutable
//! handles to roots, and nothing mutates a node after construction.
//!
//! Every node carries a monotonically increasing `id` assigned at
//! construction. Equality and hashing are structural (kind only); the id is
//! the node's *identity* and feeds the cache keys, which must hash without
//! traversing the tree.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHasher;

// =============================================================================
// EXPRESSION ID COUNTER
// =============================================================================

static EXPR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    EXPR_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// OPERATORS
// =============================================================================

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`, `\cdot`, `\times`, or implicit juxtaposition
    Mul,
    /// `/`, `\div`, `\frac`
    Div,
    /// `^` (right-associative)
    Pow,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Prefix `-`
    Negate,
}

/// Comparison operators, including set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `\leq`
    LessEq,
    /// `\geq`
    GreaterEq,
    /// `=`
    Equal,
    /// `\in`
    Member,
}

/// One arm of a piecewise definition. `condition == None` is the
/// catch-all ("otherwise") arm; at most one arm may be a catch-all.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseCase {
    /// The value of this arm.
    pub value: Arc<Expr>,
    /// The guard, or `None` for the otherwise arm.
    pub condition: Option<Arc<Expr>>,
}

// =============================================================================
// EXPR
// =============================================================================

/// One AST node: a kind plus a construction-time identity id.
#[derive(Debug, Clone)]
pub struct Expr {
    id: u64,
    /// The node's structure.
    pub kind: ExprKind,
}

/// The sealed variant set.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Numeric literal.
    Number(f64),
    /// Variable reference. Names may contain `_` for subscripted
    /// composites (`R_crit`, `H_0`) and a `mathbf:` style prefix for
    /// font-decorated identifiers.
    Variable(String),
    /// Binary operation. `source_command` preserves the spelling the
    /// operator was written with (`\cdot` vs `\times`), which the
    /// evaluator uses to pick dot vs cross product.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Arc<Expr>,
        /// Right operand.
        right: Arc<Expr>,
        /// Original command name, when the operator came from one.
        source_command: Option<String>,
    },
    /// Unary operation (prefix negation).
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Arc<Expr>,
    },
    /// `|expr|` — absolute value, vector magnitude, or matrix determinant
    /// depending on the operand's result variant.
    Abs(Arc<Expr>),
    /// Function application. `base` is the subscript (log base, min/max
    /// pair); `param` is the bracketed optional parameter (root index).
    FunctionCall {
        /// Function name as written (without backslash).
        name: String,
        /// Positional arguments, at least one.
        args: Vec<Arc<Expr>>,
        /// Subscript argument.
        base: Option<Arc<Expr>>,
        /// Bracketed optional parameter.
        param: Option<Arc<Expr>>,
    },
    /// `\lim_{var \to target} body`
    Limit {
        /// Bound variable.
        var: String,
        /// Approach target.
        target: Arc<Expr>,
        /// Body.
        body: Arc<Expr>,
    },
    /// `\sum_{var=start}^{end} body`
    SumSeries {
        /// Bound index variable.
        var: String,
        /// Inclusive lower bound.
        start: Arc<Expr>,
        /// Inclusive upper bound.
        end: Arc<Expr>,
        /// Summand.
        body: Arc<Expr>,
    },
    /// `\prod_{var=start}^{end} body`
    ProductSeries {
        /// Bound index variable.
        var: String,
        /// Inclusive lower bound.
        start: Arc<Expr>,
        /// Inclusive upper bound.
        end: Arc<Expr>,
        /// Factor.
        body: Arc<Expr>,
    },
    /// `\int_{lower}^{upper} body d(var)`; `closed` marks `\oint`.
    Integral {
        /// Lower bound, absent for indefinite integrals.
        lower: Option<Arc<Expr>>,
        /// Upper bound, absent for indefinite integrals.
        upper: Option<Arc<Expr>>,
        /// Integrand.
        body: Arc<Expr>,
        /// Integration variable from the trailing differential.
        var: String,
        /// True for `\oint`.
        closed: bool,
    },
    /// `\iint` / `\iiint` with two or three differentials.
    MultiIntegral {
        /// 2 or 3.
        order: u8,
        /// Shared lower bound, applied per axis.
        lower: Option<Arc<Expr>>,
        /// Shared upper bound, applied per axis.
        upper: Option<Arc<Expr>>,
        /// Integrand.
        body: Arc<Expr>,
        /// Integration variables, `order` of them.
        vars: Vec<String>,
    },
    /// `\frac{d^order}{d var^order} body`
    Derivative {
        /// Expression being differentiated.
        body: Arc<Expr>,
        /// Differentiation variable.
        var: String,
        /// Order, at least 1.
        order: u32,
    },
    /// `\frac{\partial^order}{\partial var^order} body`
    PartialDerivative {
        /// Expression being differentiated.
        body: Arc<Expr>,
        /// Differentiation variable.
        var: String,
        /// Order, at least 1.
        order: u32,
    },
    /// `\nabla body`, optionally restricted to named variables.
    Gradient {
        /// Expression whose gradient is taken.
        body: Arc<Expr>,
        /// Differentiation variables; `None` means every free variable
        /// supplied by the environment.
        vars: Option<Vec<String>>,
    },
    /// `\binom{n}{k}`
    Binom {
        /// Upper entry.
        n: Arc<Expr>,
        /// Lower entry.
        k: Arc<Expr>,
    },
    /// Single comparison, yielding a boolean.
    Comparison {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        left: Arc<Expr>,
        /// Right operand.
        right: Arc<Expr>,
    },
    /// `a < b < c` — `ops.len() == exprs.len() - 1`, every link must hold.
    ChainedComparison {
        /// Chained operands, `k + 1` of them.
        exprs: Vec<Arc<Expr>>,
        /// Operators between adjacent operands, `k` of them.
        ops: Vec<CompareOp>,
    },
    /// `value, condition` — the trailing-condition sugar and the
    /// `{expr}{cond}` double-brace form.
    Conditional {
        /// Value when the condition holds.
        value: Arc<Expr>,
        /// Guard expression.
        condition: Arc<Expr>,
    },
    /// `\begin{cases} ... \end{cases}` — first matching arm wins.
    Piecewise {
        /// The arms, at least one; at most one catch-all.
        cases: Vec<PiecewiseCase>,
    },
    /// Matrix environment. Rows are non-empty and rectangular.
    Matrix {
        /// Row-major entries.
        rows: Vec<Vec<Arc<Expr>>>,
    },
    /// `\vec{...}` / `\hat{...}` component list.
    Vector {
        /// Components, at least one.
        components: Vec<Arc<Expr>>,
        /// True for `\hat` — normalise to unit length on evaluation.
        unit: bool,
    },
    /// `[lower, upper]` interval literal.
    Interval {
        /// Lower endpoint.
        lower: Arc<Expr>,
        /// Upper endpoint.
        upper: Arc<Expr>,
    },
    /// `let name = value`
    Assignment {
        /// Bound name.
        name: String,
        /// Bound value.
        value: Arc<Expr>,
    },
    /// `name(p1, ..., pn) = body`
    FunctionDefinition {
        /// Function name.
        name: String,
        /// Parameter names.
        params: Vec<String>,
        /// Definition body.
        body: Arc<Expr>,
    },
}

// Structural equality and hashing are over the kind only; `id` is identity.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl Hash for ExprKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ExprKind::Number(n) => n.to_bits().hash(state),
            ExprKind::Variable(name) => name.hash(state),
            ExprKind::Binary {
                op,
                left,
                right,
                source_command,
            } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
                source_command.hash(state);
            }
            ExprKind::Unary { op, operand } => {
                op.hash(state);
                operand.hash(state);
            }
            ExprKind::Abs(inner) => inner.hash(state),
            ExprKind::FunctionCall {
                name,
                args,
                base,
                param,
            } => {
                name.hash(state);
                args.hash(state);
                base.hash(state);
                param.hash(state);
            }
            ExprKind::Limit { var, target, body } => {
                var.hash(state);
                target.hash(state);
                body.hash(state);
            }
            ExprKind::SumSeries {
                var,
                start,
                end,
                body,
            }
            | ExprKind::ProductSeries {
                var,
                start,
                end,
                body,
            } => {
                var.hash(state);
                start.hash(state);
                end.hash(state);
                body.hash(state);
            }
            ExprKind::Integral {
                lower,
                upper,
                body,
                var,
                closed,
            } => {
                lower.hash(state);
                upper.hash(state);
                body.hash(state);
                var.hash(state);
                closed.hash(state);
            }
            ExprKind::MultiIntegral {
                order,
                lower,
                upper,
                body,
                vars,
            } => {
                order.hash(state);
                lower.hash(state);
                upper.hash(state);
                body.hash(state);
                vars.hash(state);
            }
            ExprKind::Derivative { body, var, order }
            | ExprKind::PartialDerivative { body, var, order } => {
                body.hash(state);
                var.hash(state);
                order.hash(state);
            }
            ExprKind::Gradient { body, vars } => {
                body.hash(state);
                vars.hash(state);
            }
            ExprKind::Binom { n, k } => {
                n.hash(state);
                k.hash(state);
            }
            ExprKind::Comparison { op, left, right } => {
                op.hash(state);
                left.hash(state);
                right.hash(state);
            }
            ExprKind::ChainedComparison { exprs, ops } => {
                exprs.hash(state);
                ops.hash(state);
            }
            ExprKind::Conditional { value, condition } => {
                value.hash(state);
                condition.hash(state);
            }
            ExprKind::Piecewise { cases } => {
                cases.len().hash(state);
                for case in cases {
                    case.value.hash(state);
                    case.condition.hash(state);
                }
            }
            ExprKind::Matrix { rows } => {
                rows.len().hash(state);
                for row in rows {
                    row.hash(state);
                }
            }
            ExprKind::Vector { components, unit } => {
                components.hash(state);
                unit.hash(state);
            }
            ExprKind::Interval { lower, upper } => {
                lower.hash(state);
                upper.hash(state);
            }
            ExprKind::Assignment { name, value } => {
                name.hash(state);
                value.hash(state);
            }
            ExprKind::FunctionDefinition { name, params, body } => {
                name.hash(state);
                params.hash(state);
                body.hash(state);
            }
        }
    }
}

// =============================================================================
// CONSTRUCTORS AND ACCESSORS
// =============================================================================

impl Expr {
    /// Wrap a kind with a fresh identity id.
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            id: next_id(),
            kind,
        }
    }

    /// The node's construction-time identity id. Stable for the node's
    /// lifetime; never reused within a process.
    #[inline]
    pub fn identity(&self) -> u64 {
        self.id
    }

    /// Structural hash of the whole subtree (FxHasher over the kind).
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.kind.hash(&mut hasher);
        hasher.finish()
    }

    /// Numeric literal.
    pub fn number(value: f64) -> Self {
        Expr::new(ExprKind::Number(value))
    }

    /// Variable reference.
    pub fn variable(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::Variable(name.into()))
    }

    /// Binary operation with no source command.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::new(ExprKind::Binary {
            op,
            left: Arc::new(left),
            right: Arc::new(right),
            source_command: None,
        })
    }

    /// Prefix negation.
    pub fn negate(operand: Expr) -> Self {
        Expr::new(ExprKind::Unary {
            op: UnaryOp::Negate,
            operand: Arc::new(operand),
        })
    }

    /// Single-argument function call with no subscript or parameter.
    pub fn call(name: impl Into<String>, arg: Expr) -> Self {
        Expr::new(ExprKind::FunctionCall {
            name: name.into(),
            args: vec![Arc::new(arg)],
            base: None,
            param: None,
        })
    }

    /// Multi-argument function call with no subscript or parameter.
    pub fn call_multi(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::FunctionCall {
            name: name.into(),
            args: args.into_iter().map(Arc::new).collect(),
            base: None,
            param: None,
        })
    }

    /// The literal value if this node is a number.
    pub fn as_number(&self) -> Option<f64> {
        match &self.kind {
            ExprKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The name if this node is a variable.
    pub fn as_variable(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Variable(name) => Some(name),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// Invoke `f` on every direct child subtree, in evaluation order.
    pub fn for_each_child(&self, f: &mut dyn FnMut(&Arc<Expr>)) {
        match &self.kind {
            ExprKind::Number(_) | ExprKind::Variable(_) => {}
            ExprKind::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            ExprKind::Unary { operand, .. } => f(operand),
            ExprKind::Abs(inner) => f(inner),
            ExprKind::FunctionCall {
                args, base, param, ..
            } => {
                for arg in args {
                    f(arg);
                }
                if let Some(b) = base {
                    f(b);
                }
                if let Some(p) = param {
                    f(p);
                }
            }
            ExprKind::Limit { target, body, .. } => {
                f(target);
                f(body);
            }
            ExprKind::SumSeries {
                start, end, body, ..
            }
            | ExprKind::ProductSeries {
                start, end, body, ..
            } => {
                f(start);
                f(end);
                f(body);
            }
            ExprKind::Integral {
                lower, upper, body, ..
            }
            | ExprKind::MultiIntegral {
                lower, upper, body, ..
            } => {
                if let Some(l) = lower {
                    f(l);
                }
                if let Some(u) = upper {
                    f(u);
                }
                f(body);
            }
            ExprKind::Derivative { body, .. }
            | ExprKind::PartialDerivative { body, .. }
            | ExprKind::Gradient { body, .. } => f(body),
            ExprKind::Binom { n, k } => {
                f(n);
                f(k);
            }
            ExprKind::Comparison { left, right, .. } => {
                f(left);
                f(right);
            }
            ExprKind::ChainedComparison { exprs, .. } => {
                for e in exprs {
                    f(e);
                }
            }
            ExprKind::Conditional { value, condition } => {
                f(value);
                f(condition);
            }
            ExprKind::Piecewise { cases } => {
                for case in cases {
                    f(&case.value);
                    if let Some(cond) = &case.condition {
                        f(cond);
                    }
                }
            }
            ExprKind::Matrix { rows } => {
                for row in rows {
                    for cell in row {
                        f(cell);
                    }
                }
            }
            ExprKind::Vector { components, .. } => {
                for c in components {
                    f(c);
                }
            }
            ExprKind::Interval { lower, upper } => {
                f(lower);
                f(upper);
            }
            ExprKind::Assignment { value, .. } => f(value),
            ExprKind::FunctionDefinition { body, .. } => f(body),
        }
    }

    /// Total number of nodes in the subtree.
    pub fn node_count(&self) -> usize {
        let mut count = 1;
        self.for_each_child(&mut |child| count += child.node_count());
        count
    }

    /// Maximum nesting depth of the subtree.
    pub fn max_depth(&self) -> usize {
        let mut deepest = 0;
        self.for_each_child(&mut |child| deepest = deepest.max(child.max_depth()));
        1 + deepest
    }

    /// Whether the subtree references `var` (binder occurrences count).
    pub fn contains_var(&self, var: &str) -> bool {
        if let ExprKind::Variable(name) = &self.kind {
            return name == var;
        }
        if self.binds_var(var) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| found = found || child.contains_var(var));
        found
    }

    /// All variable names occurring in the subtree, binders included.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names.sort();
        names.dedup();
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match &self.kind {
            ExprKind::Variable(name) => names.push(name.clone()),
            ExprKind::Limit { var, .. }
            | ExprKind::SumSeries { var, .. }
            | ExprKind::ProductSeries { var, .. }
            | ExprKind::Integral { var, .. }
            | ExprKind::Derivative { var, .. }
            | ExprKind::PartialDerivative { var, .. } => names.push(var.clone()),
            ExprKind::MultiIntegral { vars, .. } => names.extend(vars.iter().cloned()),
            _ => {}
        }
        self.for_each_child(&mut |child| child.collect_variables(names));
    }

    fn binds_var(&self, var: &str) -> bool {
        match &self.kind {
            ExprKind::Limit { var: v, .. }
            | ExprKind::SumSeries { var: v, .. }
            | ExprKind::ProductSeries { var: v, .. }
            | ExprKind::Integral { var: v, .. }
            | ExprKind::Derivative { var: v, .. }
            | ExprKind::PartialDerivative { var: v, .. } => v == var,
            ExprKind::MultiIntegral { vars, .. } => vars.iter().any(|v| v == var),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = Expr::number(1.0);
        let b = Expr::number(1.0);
        assert!(b.identity() > a.identity());
        // Structurally equal, distinct identity.
        assert_eq!(a, b);
    }

    #[test]
    fn structural_hash_matches_equality() {
        let a = Expr::binary(BinaryOp::Add, Expr::variable("x"), Expr::number(1.0));
        let b = Expr::binary(BinaryOp::Add, Expr::variable("x"), Expr::number(1.0));
        assert_eq!(a.structural_hash(), b.structural_hash());

        let c = Expr::binary(BinaryOp::Sub, Expr::variable("x"), Expr::number(1.0));
        assert_ne!(a, c);
    }

    #[test]
    fn node_count_and_depth() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::number(2.0),
            Expr::binary(BinaryOp::Pow, Expr::variable("x"), Expr::number(2.0)),
        );
        assert_eq!(e.node_count(), 5);
        assert_eq!(e.max_depth(), 3);
    }

    #[test]
    fn contains_var_sees_binders() {
        let sum = Expr::new(ExprKind::SumSeries {
            var: "k".into(),
            start: Arc::new(Expr::number(0.0)),
            end: Arc::new(Expr::number(10.0)),
            body: Arc::new(Expr::variable("k")),
        });
        assert!(sum.contains_var("k"));
        assert!(!sum.contains_var("x"));
        assert_eq!(sum.variables(), vec!["k".to_string()]);
    }
}
