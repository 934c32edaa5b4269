//! Integration: a small symbolic class, composite Simpson for the rest
//!
//! The symbolic recogniser covers polynomials (power rule, `1/x -> ln|x|`),
//! linearity, constant multiples, and `exp/sin/cos` of a linear argument.
//! Everything else falls back to composite Simpson's rule with exactly
//! 10 000 sub-intervals; infinite bounds are substituted with ±100.0
//! (documented limitation). Indefinite integrals without a symbolic rule
//! are errors.

use std::sync::Arc;

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::core::error::{EvalErrorKind, EvaluationError};
use crate::core::value::Value;
use crate::evaluator::Evaluator;

/// Fixed sub-interval count for single integrals.
const SIMPSON_INTERVALS: usize = 10_000;
/// Sub-intervals per axis for `\iint` / `\iiint`.
const MULTI_INTERVALS: usize = 100;
/// Stand-in for an infinite bound.
const INFINITE_BOUND: f64 = 100.0;

fn clamp_bound(x: f64) -> f64 {
    if x == f64::INFINITY {
        INFINITE_BOUND
    } else if x == f64::NEG_INFINITY {
        -INFINITE_BOUND
    } else {
        x
    }
}

/// Evaluate a definite integral; called by the evaluator.
pub(crate) fn definite(
    ev: &mut Evaluator<'_>,
    lower: Option<&Expr>,
    upper: Option<&Expr>,
    body: &Expr,
    var: &str,
) -> Result<Value, EvaluationError> {
    let (Some(lower), Some(upper)) = (lower, upper) else {
        return Err(EvaluationError::new(
            EvalErrorKind::SymbolicOnly,
            "an indefinite integral has no numeric value",
        )
        .with_suggestion(Some("add bounds, or ask for the antiderivative".to_string())));
    };
    let a = clamp_bound(ev.eval(lower)?.as_number()?);
    let b = clamp_bound(ev.eval(upper)?.as_number()?);

    if let Some(anti) = antiderivative(body, var) {
        let upper_value = ev.eval_bound(var, b, &anti)?.as_number()?;
        let lower_value = ev.eval_bound(var, a, &anti)?.as_number()?;
        return Ok(Value::Number(upper_value - lower_value));
    }
    Ok(Value::Number(simpson(ev, body, var, a, b, SIMPSON_INTERVALS)?))
}

/// Evaluate a double or triple integral as nested Simpson sweeps; the
/// parsed bound pair applies to every axis.
pub(crate) fn multi(
    ev: &mut Evaluator<'_>,
    lower: Option<&Expr>,
    upper: Option<&Expr>,
    body: &Expr,
    vars: &[String],
) -> Result<Value, EvaluationError> {
    let (Some(lower), Some(upper)) = (lower, upper) else {
        return Err(EvaluationError::new(
            EvalErrorKind::SymbolicOnly,
            "a multiple integral needs bounds to evaluate",
        ));
    };
    let a = clamp_bound(ev.eval(lower)?.as_number()?);
    let b = clamp_bound(ev.eval(upper)?.as_number()?);
    Ok(Value::Number(nested_simpson(ev, vars, a, b, body)?))
}

fn nested_simpson(
    ev: &mut Evaluator<'_>,
    vars: &[String],
    a: f64,
    b: f64,
    body: &Expr,
) -> Result<f64, EvaluationError> {
    let var = &vars[0];
    let n = MULTI_INTERVALS;
    let h = (b - a) / n as f64;
    let mut total = 0.0;
    for i in 0..=n {
        let x = a + h * i as f64;
        let weight = simpson_weight(i, n);
        let sample = if vars.len() == 1 {
            ev.eval_bound(var, x, body)?.as_number()?
        } else {
            ev.push_binding(var, x);
            let inner = nested_simpson(ev, &vars[1..], a, b, body);
            ev.pop_binding();
            inner?
        };
        total += weight * sample;
    }
    Ok(total * h / 3.0)
}

fn simpson_weight(i: usize, n: usize) -> f64 {
    if i == 0 || i == n {
        1.0
    } else if i % 2 == 1 {
        4.0
    } else {
        2.0
    }
}

fn simpson(
    ev: &mut Evaluator<'_>,
    body: &Expr,
    var: &str,
    a: f64,
    b: f64,
    n: usize,
) -> Result<f64, EvaluationError> {
    let h = (b - a) / n as f64;
    let mut total = 0.0;
    for i in 0..=n {
        let x = a + h * i as f64;
        total += simpson_weight(i, n) * ev.eval_bound(var, x, body)?.as_number()?;
    }
    Ok(total * h / 3.0)
}

// =============================================================================
// Symbolic recognition
// =============================================================================

/// Antiderivative of `expr` in `var`, when the integrand falls inside the
/// recognised class. Public to the crate: the facade's `integrate` entry
/// point returns this tree.
pub(crate) fn antiderivative(expr: &Expr, var: &str) -> Option<Expr> {
    let x = || Expr::variable(var);
    match &expr.kind {
        // c -> c x
        ExprKind::Number(c) => Some(Expr::binary(BinaryOp::Mul, Expr::number(*c), x())),

        ExprKind::Variable(name) => {
            if name == var {
                // x -> x^2 / 2
                Some(Expr::binary(
                    BinaryOp::Div,
                    Expr::binary(BinaryOp::Pow, x(), Expr::number(2.0)),
                    Expr::number(2.0),
                ))
            } else {
                // A foreign symbol is a constant factor.
                Some(Expr::binary(BinaryOp::Mul, expr.clone(), x()))
            }
        }

        ExprKind::Unary {
            op: UnaryOp::Negate,
            operand,
        } => Some(Expr::negate(antiderivative(operand, var)?)),

        ExprKind::Binary {
            op, left, right, ..
        } => match op {
            // Linearity.
            BinaryOp::Add | BinaryOp::Sub => {
                let l = antiderivative(left, var)?;
                let r = antiderivative(right, var)?;
                Some(Expr::binary(*op, l, r))
            }
            // Constant multiples, either side.
            BinaryOp::Mul => {
                if !left.contains_var(var) {
                    let r = antiderivative(right, var)?;
                    Some(Expr::binary(BinaryOp::Mul, left.as_ref().clone(), r))
                } else if !right.contains_var(var) {
                    let l = antiderivative(left, var)?;
                    Some(Expr::binary(BinaryOp::Mul, l, right.as_ref().clone()))
                } else {
                    None
                }
            }
            BinaryOp::Div => {
                if !right.contains_var(var) {
                    // u / c
                    let l = antiderivative(left, var)?;
                    Some(Expr::binary(BinaryOp::Div, l, right.as_ref().clone()))
                } else if !left.contains_var(var) && matches!(&right.kind, ExprKind::Variable(n) if n == var)
                {
                    // c / x -> c ln|x|
                    Some(Expr::binary(
                        BinaryOp::Mul,
                        left.as_ref().clone(),
                        Expr::call("ln", Expr::new(ExprKind::Abs(Arc::new(x())))),
                    ))
                } else {
                    None
                }
            }
            // Power rule on x^n, including n = -1.
            BinaryOp::Pow => {
                let is_var = matches!(&left.kind, ExprKind::Variable(n) if n == var);
                if !is_var {
                    return None;
                }
                let ExprKind::Number(n) = right.kind else {
                    return None;
                };
                if n == -1.0 {
                    return Some(Expr::call("ln", Expr::new(ExprKind::Abs(Arc::new(x())))));
                }
                Some(Expr::binary(
                    BinaryOp::Div,
                    Expr::binary(BinaryOp::Pow, x(), Expr::number(n + 1.0)),
                    Expr::number(n + 1.0),
                ))
            }
        },

        // exp/sin/cos of a linear argument a x + b.
        ExprKind::FunctionCall {
            name,
            args,
            base: None,
            param: None,
        } if args.len() == 1 => {
            let slope = linear_slope(&args[0], var)?;
            if slope == 0.0 {
                return None;
            }
            let u = args[0].as_ref().clone();
            let scaled = |e: Expr| Expr::binary(BinaryOp::Div, e, Expr::number(slope));
            match name.as_str() {
                "exp" => Some(scaled(Expr::call("exp", u))),
                "sin" => Some(scaled(Expr::negate(Expr::call("cos", u)))),
                "cos" => Some(scaled(Expr::call("sin", u))),
                _ => None,
            }
        }

        _ => None,
    }
}

/// The slope `a` when `expr = a*var + b` with literal coefficients.
fn linear_slope(expr: &Expr, var: &str) -> Option<f64> {
    match &expr.kind {
        ExprKind::Number(_) => Some(0.0),
        ExprKind::Variable(name) => Some(if name == var { 1.0 } else { 0.0 }),
        ExprKind::Unary {
            op: UnaryOp::Negate,
            operand,
        } => Some(-linear_slope(operand, var)?),
        ExprKind::Binary {
            op, left, right, ..
        } => match op {
            BinaryOp::Add => Some(linear_slope(left, var)? + linear_slope(right, var)?),
            BinaryOp::Sub => Some(linear_slope(left, var)? - linear_slope(right, var)?),
            BinaryOp::Mul => {
                if let ExprKind::Number(k) = left.kind {
                    Some(k * linear_slope(right, var)?)
                } else if let ExprKind::Number(k) = right.kind {
                    Some(k * linear_slope(left, var)?)
                } else {
                    None
                }
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::Variables;
    use crate::evaluator::EvalOptions;
    use crate::parser::{ParseOptions, parse_source};

    fn integrate_str(src: &str) -> f64 {
        let ast = parse_source(src, ParseOptions::default(), None).expect("parse");
        let vars = Variables::new();
        let mut ev = Evaluator::new(
            EvalOptions {
                real_only: false,
                max_recursion_depth: 500,
            },
            &vars,
            None,
            None,
        );
        ev.eval(&ast).expect("eval").as_number().expect("number")
    }

    #[test]
    fn polynomial_is_exact() {
        // Symbolic path: exactly 1/3.
        let v = integrate_str("\\int_{0}^{1} x^2 dx");
        assert!((v - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn sin_over_half_period() {
        let v = integrate_str("\\int_{0}^{\\pi} \\sin{x} dx");
        assert!((v - 2.0).abs() < 1e-9);
    }

    #[test]
    fn one_over_x_uses_log() {
        let v = integrate_str("\\int_{1}^{e} \\frac{1}{x} dx");
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn simpson_handles_the_unrecognised() {
        // x * sin(x) has no symbolic rule here; Simpson gets within 1e-9.
        // Exact value over [0, pi] is pi.
        let v = integrate_str("\\int_{0}^{\\pi} x \\sin{x} dx");
        assert!((v - std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn infinite_bounds_are_clamped() {
        // exp(-x) from 0 to "infinity" (substituted with 100).
        let v = integrate_str("\\int_{0}^{\\infty} \\exp{-x} dx");
        assert!((v - 1.0).abs() < 1e-6);
    }

    #[test]
    fn double_integral_over_a_square() {
        // iint xy over [0,1]^2 = 1/4.
        let v = integrate_str("\\iint_{0}^{1} xy dx dy");
        assert!((v - 0.25).abs() < 1e-6);
    }

    #[test]
    fn indefinite_integral_is_symbolic_only() {
        let ast = parse_source("\\int x^2 dx", ParseOptions::default(), None).expect("parse");
        let vars = Variables::new();
        let mut ev = Evaluator::new(
            EvalOptions {
                real_only: false,
                max_recursion_depth: 500,
            },
            &vars,
            None,
            None,
        );
        let err = ev.eval(&ast).unwrap_err();
        assert_eq!(err.kind, crate::core::error::EvalErrorKind::SymbolicOnly);
    }

    #[test]
    fn antiderivative_of_a_polynomial() {
        let ast = parse_source("3x^2 + 2x", ParseOptions::default(), None).expect("parse");
        let anti = antiderivative(&ast, "x").expect("in class");
        // Evaluate the antiderivative at 2: x^3 + x^2 = 12.
        let vars: Variables = [("x", 2.0)].into_iter().collect();
        let mut ev = Evaluator::new(
            EvalOptions {
                real_only: false,
                max_recursion_depth: 500,
            },
            &vars,
            None,
            None,
        );
        let v = ev.eval(&anti).unwrap().as_number().unwrap();
        assert!((v - 12.0).abs() < 1e-12);
    }
}
