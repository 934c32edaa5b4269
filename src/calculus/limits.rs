//! Limits and bounded series
//!
//! A finite limit target is direct substitution. An infinite target is
//! probed at ±10^2, ±10^4, ±10^6, ±10^8 and the last sample wins — there
//! is no L'Hôpital pass. Sums and products iterate integer bounds with a
//! 100 000-iteration ceiling; a non-finite term aborts.

use crate::ast::Expr;
use crate::core::error::{EvalErrorKind, EvaluationError};
use crate::core::value::Value;
use crate::evaluator::Evaluator;

/// Iteration ceiling for `\sum` and `\prod`.
const MAX_ITERATIONS: f64 = 100_000.0;

/// Probe points for limits at infinity.
const INFINITY_PROBES: [f64; 4] = [1e2, 1e4, 1e6, 1e8];

pub(crate) fn limit(
    ev: &mut Evaluator<'_>,
    var: &str,
    target: &Expr,
    body: &Expr,
) -> Result<Value, EvaluationError> {
    let t = ev.eval(target)?.as_number()?;
    if t.is_finite() {
        return ev.eval_bound(var, t, body);
    }
    if t.is_nan() {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            "limit target is not a number",
        ));
    }
    let sign = t.signum();
    let mut last = Value::Number(f64::NAN);
    for probe in INFINITY_PROBES {
        last = ev.eval_bound(var, sign * probe, body)?;
    }
    Ok(last)
}

pub(crate) fn series(
    ev: &mut Evaluator<'_>,
    var: &str,
    start: &Expr,
    end: &Expr,
    body: &Expr,
    is_sum: bool,
) -> Result<Value, EvaluationError> {
    let what = if is_sum { "sum" } else { "product" };
    let first = ev.eval(start)?.as_number()?;
    let last = ev.eval(end)?.as_number()?;
    if !first.is_finite() || !last.is_finite() {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            format!("{} bounds must be finite", what),
        ));
    }
    let first = first.round();
    let last = last.round();
    if last - first + 1.0 > MAX_ITERATIONS {
        return Err(EvaluationError::new(
            EvalErrorKind::IterationLimit,
            format!("{} spans more than 100000 iterations", what),
        ));
    }

    ev.push_binding(var, first);
    let result = run_series(ev, body, first, last, is_sum, what);
    ev.pop_binding();
    result
}

fn run_series(
    ev: &mut Evaluator<'_>,
    body: &Expr,
    first: f64,
    last: f64,
    is_sum: bool,
    what: &str,
) -> Result<Value, EvaluationError> {
    let mut acc = if is_sum { 0.0 } else { 1.0 };
    let mut k = first;
    while k <= last {
        ev.set_binding(k);
        let term = ev.eval(body)?.as_number()?;
        if !term.is_finite() {
            return Err(EvaluationError::new(
                EvalErrorKind::DomainError,
                format!("{} term overflowed at index {}", what, k),
            ));
        }
        if is_sum {
            acc += term;
        } else {
            acc *= term;
        }
        k += 1.0;
    }
    Ok(Value::Number(acc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::Variables;
    use crate::evaluator::EvalOptions;
    use crate::parser::{ParseOptions, parse_source};

    fn eval_str(src: &str) -> Result<Value, EvaluationError> {
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
        ev.eval(&ast)
    }

    #[test]
    fn finite_limit_is_substitution() {
        let v = eval_str("\\lim_{x \\to 0} (x + 1)").unwrap();
        assert_eq!(v, Value::Number(1.0));
    }

    #[test]
    fn limit_at_infinity_probes() {
        let v = eval_str("\\lim_{x \\to \\infty} \\frac{1}{x}")
            .unwrap()
            .as_number()
            .unwrap();
        assert!((v - 1e-8).abs() < 1e-12);
    }

    #[test]
    fn limit_at_negative_infinity() {
        let v = eval_str("\\lim_{x \\to -\\infty} \\frac{1}{x}")
            .unwrap()
            .as_number()
            .unwrap();
        assert!((v + 1e-8).abs() < 1e-12);
    }

    #[test]
    fn gauss_sum() {
        let v = eval_str("\\sum_{k=1}^{100} k").unwrap();
        assert_eq!(v, Value::Number(5050.0));
    }

    #[test]
    fn empty_sum_and_product() {
        assert_eq!(eval_str("\\sum_{k=5}^{1} k").unwrap(), Value::Number(0.0));
        assert_eq!(eval_str("\\prod_{k=5}^{1} k").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn product_as_factorial() {
        let v = eval_str("\\prod_{k=1}^{5} k").unwrap();
        assert_eq!(v, Value::Number(120.0));
    }

    #[test]
    fn iteration_ceiling() {
        let err = eval_str("\\sum_{k=1}^{200000} k").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::IterationLimit);
    }

    #[test]
    fn overflowing_term_aborts() {
        // exp(k^2) overflows to infinity well before k = 100.
        let err = eval_str("\\sum_{k=1}^{100} \\exp{k^2}").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DomainError);
    }
}
