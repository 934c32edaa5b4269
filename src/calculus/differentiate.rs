//! Symbolic differentiation
//!
//! Structural rules over the AST: sum/product/quotient rules, the three
//! power-rule cases (literal exponent, literal base, logarithmic
//! differentiation for `f^g`), and a chain-rule table for the known
//! functions. Output trees are not simplified here; callers may hand them
//! to a rewrite engine.
//!
//! Higher orders repeat the first-order rule, consulting the L3 cache per
//! intermediate step.

use std::sync::Arc;

use crate::ast::{BinaryOp, Expr, ExprKind, PiecewiseCase, UnaryOp};
use crate::cache::CacheManager;
use crate::cache::keys::DiffKey;
use crate::core::error::{EvalErrorKind, EvaluationError};

/// Differentiate `expr` `order` times with respect to `var`.
pub(crate) fn differentiate(
    expr: &Arc<Expr>,
    var: &str,
    order: u32,
    mut caches: Option<&mut CacheManager>,
) -> Result<Arc<Expr>, EvaluationError> {
    let mut current = Arc::clone(expr);
    for _ in 0..order {
        let key = DiffKey {
            ast: current.identity(),
            var: var.to_string(),
            order: 1,
        };
        if let Some(manager) = caches.as_deref_mut() {
            if let Some(hit) = manager.get_derivative(&key) {
                current = hit;
                continue;
            }
        }
        let next = Arc::new(first_derivative(&current, var)?);
        if let Some(manager) = caches.as_deref_mut() {
            manager.store_derivative(key, Arc::clone(&next));
        }
        current = next;
    }
    Ok(current)
}

fn unsupported(what: &str) -> EvaluationError {
    EvaluationError::new(
        EvalErrorKind::Unsupported,
        format!("cannot differentiate {}", what),
    )
}

// Construction shorthands; derivative trees are built outside the parser's
// node counter; the evaluator's ceilings still bound them.
fn num(x: f64) -> Expr {
    Expr::number(x)
}

fn mul(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Mul, a, b)
}

fn div(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Div, a, b)
}

fn add(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Add, a, b)
}

fn sub(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Sub, a, b)
}

fn pow(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Pow, a, b)
}

fn call(name: &str, arg: Expr) -> Expr {
    Expr::call(name, arg)
}

fn clone_expr(e: &Arc<Expr>) -> Expr {
    e.as_ref().clone()
}

fn first_derivative(expr: &Expr, var: &str) -> Result<Expr, EvaluationError> {
    match &expr.kind {
        ExprKind::Number(_) => Ok(num(0.0)),
        ExprKind::Variable(name) => Ok(num(if name == var { 1.0 } else { 0.0 })),

        ExprKind::Binary {
            op, left, right, ..
        } => binary_rule(*op, left, right, var),

        ExprKind::Unary { op, operand } => {
            let UnaryOp::Negate = op;
            Ok(Expr::negate(first_derivative(operand, var)?))
        }

        // d|u| = sgn(u) * u'
        ExprKind::Abs(inner) => Ok(mul(
            call("sgn", clone_expr(inner)),
            first_derivative(inner, var)?,
        )),

        ExprKind::FunctionCall {
            name,
            args,
            base,
            param,
        } => chain_rule(name, args, base.as_ref(), param.as_ref(), var),

        ExprKind::Conditional { value, condition } => Ok(Expr::new(ExprKind::Conditional {
            value: Arc::new(first_derivative(value, var)?),
            condition: Arc::clone(condition),
        })),

        // Differentiate every branch; conditions are preserved.
        ExprKind::Piecewise { cases } => {
            let mut derived = Vec::with_capacity(cases.len());
            for case in cases {
                derived.push(PiecewiseCase {
                    value: Arc::new(first_derivative(&case.value, var)?),
                    condition: case.condition.clone(),
                });
            }
            Ok(Expr::new(ExprKind::Piecewise { cases: derived }))
        }

        ExprKind::Matrix { rows } => {
            let mut derived = Vec::with_capacity(rows.len());
            for row in rows {
                let mut cells = Vec::with_capacity(row.len());
                for cell in row {
                    cells.push(Arc::new(first_derivative(cell, var)?));
                }
                derived.push(cells);
            }
            Ok(Expr::new(ExprKind::Matrix { rows: derived }))
        }

        ExprKind::Vector { components, unit } => {
            if *unit {
                return Err(unsupported("a unit vector"));
            }
            let mut derived = Vec::with_capacity(components.len());
            for c in components {
                derived.push(Arc::new(first_derivative(c, var)?));
            }
            Ok(Expr::new(ExprKind::Vector {
                components: derived,
                unit: false,
            }))
        }

        // A nested derivative is expanded first, then differentiated.
        ExprKind::Derivative {
            body,
            var: inner_var,
            order,
        }
        | ExprKind::PartialDerivative {
            body,
            var: inner_var,
            order,
        } => {
            let inner = differentiate(body, inner_var, *order, None)?;
            first_derivative(&inner, var)
        }

        ExprKind::SumSeries {
            var: index,
            start,
            end,
            body,
        } => {
            if index == var {
                // The sum binds its index; the whole is constant in it.
                return Ok(num(0.0));
            }
            Ok(Expr::new(ExprKind::SumSeries {
                var: index.clone(),
                start: Arc::clone(start),
                end: Arc::clone(end),
                body: Arc::new(first_derivative(body, var)?),
            }))
        }

        ExprKind::ProductSeries { .. } => Err(unsupported("a running product")),
        ExprKind::Limit { .. } => Err(unsupported("a limit")),
        ExprKind::Integral { .. } | ExprKind::MultiIntegral { .. } => {
            Err(unsupported("an integral"))
        }
        ExprKind::Gradient { .. } => Err(unsupported("a gradient")),
        ExprKind::Binom { .. } => Err(unsupported("a binomial coefficient")),
        ExprKind::Comparison { .. } | ExprKind::ChainedComparison { .. } => {
            Err(unsupported("a comparison"))
        }
        ExprKind::Interval { .. } => Err(unsupported("an interval")),
        ExprKind::Assignment { .. } => Err(unsupported("an assignment")),
        ExprKind::FunctionDefinition { .. } => Err(unsupported("a function definition")),
    }
}

fn binary_rule(
    op: BinaryOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
    var: &str,
) -> Result<Expr, EvaluationError> {
    match op {
        BinaryOp::Add => Ok(add(
            first_derivative(left, var)?,
            first_derivative(right, var)?,
        )),
        BinaryOp::Sub => Ok(sub(
            first_derivative(left, var)?,
            first_derivative(right, var)?,
        )),
        // (uv)' = u'v + uv'
        BinaryOp::Mul => {
            let du = first_derivative(left, var)?;
            let dv = first_derivative(right, var)?;
            Ok(add(
                mul(du, clone_expr(right)),
                mul(clone_expr(left), dv),
            ))
        }
        // (u/v)' = (u'v - uv') / v^2
        BinaryOp::Div => {
            let du = first_derivative(left, var)?;
            let dv = first_derivative(right, var)?;
            Ok(div(
                sub(
                    mul(du, clone_expr(right)),
                    mul(clone_expr(left), dv),
                ),
                pow(clone_expr(right), num(2.0)),
            ))
        }
        BinaryOp::Pow => power_rule(left, right, var),
    }
}

fn power_rule(
    base: &Arc<Expr>,
    exponent: &Arc<Expr>,
    var: &str,
) -> Result<Expr, EvaluationError> {
    let du = first_derivative(base, var)?;

    // Literal exponent: n * u^(n-1) * u'
    if let ExprKind::Number(n) = exponent.kind {
        return Ok(mul(
            mul(num(n), pow(clone_expr(base), num(n - 1.0))),
            du,
        ));
    }

    let dv = first_derivative(exponent, var)?;

    // Literal base: a^v * ln(a) * v'
    if let ExprKind::Number(a) = base.kind {
        return Ok(mul(
            mul(
                pow(num(a), clone_expr(exponent)),
                call("ln", num(a)),
            ),
            dv,
        ));
    }

    // General case, logarithmic differentiation:
    // (f^g)' = f^g * (g' ln f + g f'/f)
    Ok(mul(
        pow(clone_expr(base), clone_expr(exponent)),
        add(
            mul(dv, call("ln", clone_expr(base))),
            div(
                mul(clone_expr(exponent), du),
                clone_expr(base),
            ),
        ),
    ))
}

fn chain_rule(
    name: &str,
    args: &[Arc<Expr>],
    base: Option<&Arc<Expr>>,
    param: Option<&Arc<Expr>>,
    var: &str,
) -> Result<Expr, EvaluationError> {
    if args.len() != 1 {
        return Err(unsupported(&format!(
            "the {}-argument function '{}'",
            args.len(),
            name
        )));
    }
    let u = &args[0];
    let du = first_derivative(u, var)?;
    let arg = || clone_expr(u);

    let outer = match name {
        "sin" => call("cos", arg()),
        "cos" => Expr::negate(call("sin", arg())),
        "tan" => pow(call("sec", arg()), num(2.0)),
        "cot" => Expr::negate(pow(call("csc", arg()), num(2.0))),
        "sec" => mul(call("sec", arg()), call("tan", arg())),
        "csc" => Expr::negate(mul(call("csc", arg()), call("cot", arg()))),
        "sinh" => call("cosh", arg()),
        "cosh" => call("sinh", arg()),
        "tanh" => sub(num(1.0), pow(call("tanh", arg()), num(2.0))),
        "coth" => sub(num(1.0), pow(call("coth", arg()), num(2.0))),
        "exp" => call("exp", arg()),
        "ln" => div(num(1.0), arg()),
        "log" => {
            // d log_b(u) = u' / (u ln b); the base defaults to 10.
            let b = base.map_or_else(|| num(10.0), clone_expr);
            div(num(1.0), mul(arg(), call("ln", b)))
        }
        "lg" => div(num(1.0), mul(arg(), call("ln", num(10.0)))),
        "sqrt" => match param {
            // d u^(1/n) = (1/n) u^(1/n - 1)
            Some(index) => {
                let ExprKind::Number(n) = index.kind else {
                    return Err(unsupported("a root with a symbolic index"));
                };
                mul(
                    num(1.0 / n),
                    pow(arg(), num(1.0 / n - 1.0)),
                )
            }
            None => div(num(1.0), mul(num(2.0), call("sqrt", arg()))),
        },
        "cbrt" => mul(num(1.0 / 3.0), pow(arg(), num(-2.0 / 3.0))),
        "arcsin" | "asin" => div(
            num(1.0),
            call("sqrt", sub(num(1.0), pow(arg(), num(2.0)))),
        ),
        "arccos" | "acos" => Expr::negate(div(
            num(1.0),
            call("sqrt", sub(num(1.0), pow(arg(), num(2.0)))),
        )),
        "arctan" | "atan" => div(num(1.0), add(num(1.0), pow(arg(), num(2.0)))),
        "dot" | "ddot" | "bar" => {
            // Decorations pass through to their argument.
            return Ok(du);
        }
        other => return Err(unsupported(&format!("the function '{}'", other))),
    };
    Ok(mul(outer, du))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::Variables;
    use crate::evaluator::{EvalOptions, Evaluator};
    use crate::parser::{ParseOptions, parse_source};

    fn derivative_at(src: &str, var: &str, order: u32, x: f64) -> f64 {
        let ast = parse_source(src, ParseOptions::default(), None).expect("parse");
        let d = differentiate(&ast, var, order, None).expect("differentiate");
        let vars: Variables = [(var, x)].into_iter().collect();
        let mut ev = Evaluator::new(
            EvalOptions {
                real_only: false,
                max_recursion_depth: 500,
            },
            &vars,
            None,
            None,
        );
        ev.eval(&d).expect("eval").as_number().expect("number")
    }

    #[test]
    fn power_rule_literal_exponent() {
        // d/dx x^10 at 2 = 10 * 2^9 = 5120
        assert_eq!(derivative_at("x^{10}", "x", 1, 2.0), 5120.0);
    }

    #[test]
    fn chain_rule_through_sin() {
        // d/dx sin(x^2) = cos(x^2) * 2x
        let x: f64 = 0.7;
        let expected = (x * x).cos() * 2.0 * x;
        assert!((derivative_at("\\sin{x^2}", "x", 1, x) - expected).abs() < 1e-12);
    }

    #[test]
    fn quotient_rule() {
        // d/dx (x / (x+1)) = 1/(x+1)^2
        let x = 2.0;
        let expected = 1.0 / ((x + 1.0) * (x + 1.0));
        assert!((derivative_at("\\frac{x}{x+1}", "x", 1, x) - expected).abs() < 1e-12);
    }

    #[test]
    fn logarithmic_differentiation() {
        // d/dx x^x = x^x (ln x + 1)
        let x: f64 = 1.5;
        let expected = x.powf(x) * (x.ln() + 1.0);
        assert!((derivative_at("x^x", "x", 1, x) - expected).abs() < 1e-12);
    }

    #[test]
    fn higher_order_matches_repeated_first_order() {
        // d^2/dx^2 x^3 = 6x
        assert!((derivative_at("x^3", "x", 2, 2.0) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn constants_vanish() {
        assert_eq!(derivative_at("\\pi", "x", 1, 1.0), 0.0);
        assert_eq!(derivative_at("y", "x", 1, 1.0), 0.0);
    }

    #[test]
    fn abs_differentiates_to_sign() {
        assert_eq!(derivative_at("|x|", "x", 1, -3.0), -1.0);
        assert_eq!(derivative_at("|x|", "x", 1, 3.0), 1.0);
    }

    #[test]
    fn unknown_functions_are_rejected() {
        let ast = parse_source("\\fibonacci{x}", ParseOptions::default(), None).expect("parse");
        let err = differentiate(&ast, "x", 1, None).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::Unsupported);
    }

    #[test]
    fn l3_cache_round_trips() {
        let config = crate::cache::CacheConfig::with_statistics();
        let mut caches = crate::cache::CacheManager::new(&config);
        let ast = parse_source("x^2", ParseOptions::default(), None).expect("parse");

        let first = differentiate(&ast, "x", 1, Some(&mut caches)).expect("differentiate");
        let second = differentiate(&ast, "x", 1, Some(&mut caches)).expect("differentiate");
        // The second call returns the cached tree: same identity.
        assert_eq!(first.identity(), second.identity());
        assert!(caches.statistics().differentiation.hits >= 1);
    }
}
