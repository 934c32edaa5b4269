//! Built-in function registry
//!
//! A process-wide immutable dispatch table keyed by function name,
//! initialised once. Each entry declares its arity and an evaluation
//! function over typed [`Value`] arguments. Real-domain failures promote to
//! complex when a complex rule exists — unless the evaluator runs in
//! `real_only` mode, in which case they stay NaN.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use num_complex::Complex64;
use num_traits::Zero;
use rustc_hash::FxHashMap;

use crate::core::error::{EvalErrorKind, EvaluationError};
use crate::core::value::Value;
use crate::evaluator::linalg;

/// Everything a built-in sees for one call.
pub(crate) struct FunctionArgs<'a> {
    /// Evaluated positional arguments.
    pub values: &'a [Value],
    /// Evaluated subscript (`\log_{b}`), when present.
    pub base: Option<&'a Value>,
    /// Evaluated bracket parameter (`\sqrt[n]`), when present.
    pub param: Option<&'a Value>,
    /// Domain-restricted results stay NaN instead of going complex.
    pub real_only: bool,
}

/// One registry entry.
pub(crate) struct FunctionDef {
    /// Canonical name.
    pub name: &'static str,
    /// Acceptable argument count.
    pub arity: RangeInclusive<usize>,
    /// Evaluation over typed arguments.
    pub eval: fn(&FunctionArgs) -> Result<Value, EvaluationError>,
}

static REGISTRY: OnceLock<FxHashMap<&'static str, FunctionDef>> = OnceLock::new();

fn registry() -> &'static FxHashMap<&'static str, FunctionDef> {
    REGISTRY.get_or_init(build_registry)
}

/// Look up a built-in by name.
pub(crate) fn lookup(name: &str) -> Option<&'static FunctionDef> {
    registry().get(name)
}

/// Registry names, for "did you mean" suggestions.
pub(crate) fn names() -> impl Iterator<Item = &'static str> {
    registry().keys().copied()
}

/// Dispatch a call; the caller has already tried the extension registry.
pub(crate) fn call(name: &str, args: &FunctionArgs) -> Option<Result<Value, EvaluationError>> {
    let def = lookup(name)?;
    if !def.arity.contains(&args.values.len()) {
        return Some(Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            format!(
                "function '{}' expects {} argument(s), got {}",
                name,
                describe_arity(&def.arity),
                args.values.len()
            ),
        )));
    }
    Some((def.eval)(args))
}

fn describe_arity(arity: &RangeInclusive<usize>) -> String {
    if arity.start() == arity.end() {
        format!("{}", arity.start())
    } else if *arity.end() == usize::MAX {
        format!("at least {}", arity.start())
    } else {
        format!("{} to {}", arity.start(), arity.end())
    }
}

// =============================================================================
// Shared evaluation helpers
// =============================================================================

fn complex_value(c: Complex64) -> Value {
    if c.im.is_zero() {
        Value::Number(c.re)
    } else {
        Value::Complex(c)
    }
}

fn type_error(name: &str, value: &Value) -> EvaluationError {
    EvaluationError::new(
        EvalErrorKind::TypeMismatch,
        format!("function '{}' cannot take a {} argument", name, value.type_name()),
    )
}

/// One-argument function with a real rule and an optional complex rule.
/// A NaN real result on a finite in-range argument is treated as a domain
/// failure and retried on the complex rule unless `real_only` holds.
fn map1(
    name: &'static str,
    args: &FunctionArgs,
    real: fn(f64) -> f64,
    complex: Option<fn(Complex64) -> Complex64>,
) -> Result<Value, EvaluationError> {
    match &args.values[0] {
        Value::Number(x) => {
            let result = real(*x);
            if result.is_nan() && x.is_finite() && !args.real_only {
                if let Some(cf) = complex {
                    return Ok(complex_value(cf(Complex64::new(*x, 0.0))));
                }
            }
            Ok(Value::Number(result))
        }
        Value::Complex(c) => match complex {
            Some(cf) => Ok(complex_value(cf(*c))),
            None => Err(type_error(name, &args.values[0])),
        },
        other => Err(type_error(name, other)),
    }
}

fn number_arg(name: &str, value: &Value) -> Result<f64, EvaluationError> {
    value.as_number().map_err(|_| type_error(name, value))
}

// =============================================================================
// Individual functions
// =============================================================================

fn eval_log(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let base = match args.base {
        Some(b) => number_arg("log", b)?,
        None => 10.0,
    };
    if base <= 0.0 || base == 1.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            format!("invalid logarithm base {}", base),
        ));
    }
    match &args.values[0] {
        Value::Number(x) => {
            let result = x.log(base);
            if result.is_nan() && x.is_finite() && !args.real_only {
                let c = Complex64::new(*x, 0.0).ln() / Complex64::new(base, 0.0).ln();
                return Ok(complex_value(c));
            }
            Ok(Value::Number(result))
        }
        Value::Complex(c) => Ok(complex_value(c.ln() / Complex64::new(base, 0.0).ln())),
        other => Err(type_error("log", other)),
    }
}

fn eval_sqrt(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let index = match args.param {
        Some(p) => number_arg("sqrt", p)?,
        None => 2.0,
    };
    if index == 0.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            "zeroth root is undefined",
        ));
    }
    match &args.values[0] {
        Value::Number(x) => {
            if *x >= 0.0 {
                if index == 2.0 {
                    return Ok(Value::Number(x.sqrt()));
                }
                return Ok(Value::Number(x.powf(1.0 / index)));
            }
            // Negative radicand: an odd integer index keeps a real root.
            if index.fract() == 0.0 && (index as i64).rem_euclid(2) == 1 {
                return Ok(Value::Number(-((-x).powf(1.0 / index))));
            }
            if args.real_only {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(complex_value(
                Complex64::new(*x, 0.0).powc(Complex64::new(1.0 / index, 0.0)),
            ))
        }
        Value::Complex(c) => Ok(complex_value(c.powc(Complex64::new(1.0 / index, 0.0)))),
        other => Err(type_error("sqrt", other)),
    }
}

fn eval_factorial(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let n = number_arg("factorial", &args.values[0])?;
    if n < 0.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            "factorial of a negative number",
        ));
    }
    if n.fract() != 0.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            "factorial of a non-integer",
        ));
    }
    if n > 170.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::FactorialOverflow,
            format!("factorial({}) exceeds the double-precision range", n),
        ));
    }
    let mut result = 1.0;
    let mut k = 2.0;
    while k <= n {
        result *= k;
        k += 1.0;
    }
    Ok(Value::Number(result))
}

fn eval_fibonacci(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let n = number_arg("fibonacci", &args.values[0])?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            "fibonacci requires a non-negative integer",
        ));
    }
    if n >= 1477.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::FibonacciOverflow,
            format!("fibonacci({}) exceeds the double-precision range", n),
        ));
    }
    let (mut a, mut b) = (0.0f64, 1.0f64);
    let mut k = 0.0;
    while k < n {
        let next = a + b;
        a = b;
        b = next;
        k += 1.0;
    }
    Ok(Value::Number(a))
}

/// Lanczos approximation of the gamma function (g = 7, n = 9).
fn gamma_fn(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 8] = [
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection formula.
        return std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * gamma_fn(1.0 - x));
    }
    let x = x - 1.0;
    let mut acc = 0.999_999_999_999_809_93;
    for (i, c) in COEFFICIENTS.iter().enumerate() {
        acc += c / (x + (i as f64) + 1.0);
    }
    let t = x + 7.5;
    (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * acc
}

fn eval_gamma(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let x = number_arg("Gamma", &args.values[0])?;
    if x <= 0.0 && x.fract() == 0.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            "gamma has poles at non-positive integers",
        ));
    }
    Ok(Value::Number(gamma_fn(x)))
}

fn eval_min(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let mut best = f64::INFINITY;
    for v in args.values {
        best = best.min(number_arg("min", v)?);
    }
    Ok(Value::Number(best))
}

fn eval_max(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let mut best = f64::NEG_INFINITY;
    for v in args.values {
        best = best.max(number_arg("max", v)?);
    }
    Ok(Value::Number(best))
}

fn eval_abs(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    match &args.values[0] {
        Value::Number(x) => Ok(Value::Number(x.abs())),
        Value::Complex(c) => Ok(Value::Number(c.norm())),
        Value::Vector(v) => Ok(Value::Number(linalg::norm(v))),
        other => Err(type_error("abs", other)),
    }
}

fn eval_det(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let m = args.values[0]
        .as_matrix()
        .map_err(|_| type_error("det", &args.values[0]))?;
    Ok(Value::Number(linalg::determinant(m)?))
}

fn eval_trace(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let m = args.values[0]
        .as_matrix()
        .map_err(|_| type_error("tr", &args.values[0]))?;
    Ok(Value::Number(linalg::trace(m)?))
}

/// `\dot{x}` is a decoration and passes through; `dot(a, b)` with two
/// vector arguments is the dot product.
fn eval_dot(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    if args.values.len() == 1 {
        return Ok(args.values[0].clone());
    }
    let a = args.values[0]
        .as_vector()
        .map_err(|_| type_error("dot", &args.values[0]))?;
    let b = args.values[1]
        .as_vector()
        .map_err(|_| type_error("dot", &args.values[1]))?;
    Ok(Value::Number(linalg::dot(a, b)?))
}

fn eval_transpose(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let m = args.values[0]
        .as_matrix()
        .map_err(|_| type_error("transpose", &args.values[0]))?;
    Ok(Value::Matrix(linalg::transpose(m)))
}

fn eval_cross(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let a = args.values[0]
        .as_vector()
        .map_err(|_| type_error("cross", &args.values[0]))?;
    let b = args.values[1]
        .as_vector()
        .map_err(|_| type_error("cross", &args.values[1]))?;
    Ok(Value::Vector(linalg::cross(a, b)?))
}

fn eval_norm(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let v = args.values[0]
        .as_vector()
        .map_err(|_| type_error("norm", &args.values[0]))?;
    Ok(Value::Number(linalg::norm(v)))
}

fn eval_identity(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    Ok(args.values[0].clone())
}

fn eval_sgn(args: &FunctionArgs) -> Result<Value, EvaluationError> {
    let x = number_arg("sgn", &args.values[0])?;
    Ok(Value::Number(if x == 0.0 { 0.0 } else { x.signum() }))
}

// =============================================================================
// Registry construction
// =============================================================================

fn build_registry() -> FxHashMap<&'static str, FunctionDef> {
    let mut map = FxHashMap::default();
    let mut def =
        |name: &'static str,
         arity: RangeInclusive<usize>,
         eval: fn(&FunctionArgs) -> Result<Value, EvaluationError>| {
            map.insert(name, FunctionDef { name, arity, eval });
        };

    // Trigonometric.
    def("sin", 1..=1, |a| map1("sin", a, f64::sin, Some(Complex64::sin)));
    def("cos", 1..=1, |a| map1("cos", a, f64::cos, Some(Complex64::cos)));
    def("tan", 1..=1, |a| map1("tan", a, f64::tan, Some(Complex64::tan)));
    def("cot", 1..=1, |a| {
        map1("cot", a, |x| x.cos() / x.sin(), Some(|c: Complex64| c.cos() / c.sin()))
    });
    def("sec", 1..=1, |a| {
        map1("sec", a, |x| 1.0 / x.cos(), Some(|c: Complex64| c.cos().inv()))
    });
    def("csc", 1..=1, |a| {
        map1("csc", a, |x| 1.0 / x.sin(), Some(|c: Complex64| c.sin().inv()))
    });

    // Inverse trigonometric, both spellings.
    def("arcsin", 1..=1, |a| map1("arcsin", a, f64::asin, Some(Complex64::asin)));
    def("asin", 1..=1, |a| map1("asin", a, f64::asin, Some(Complex64::asin)));
    def("arccos", 1..=1, |a| map1("arccos", a, f64::acos, Some(Complex64::acos)));
    def("acos", 1..=1, |a| map1("acos", a, f64::acos, Some(Complex64::acos)));
    def("arctan", 1..=1, |a| map1("arctan", a, f64::atan, Some(Complex64::atan)));
    def("atan", 1..=1, |a| map1("atan", a, f64::atan, Some(Complex64::atan)));

    // Hyperbolic.
    def("sinh", 1..=1, |a| map1("sinh", a, f64::sinh, Some(Complex64::sinh)));
    def("cosh", 1..=1, |a| map1("cosh", a, f64::cosh, Some(Complex64::cosh)));
    def("tanh", 1..=1, |a| map1("tanh", a, f64::tanh, Some(Complex64::tanh)));
    def("coth", 1..=1, |a| {
        map1("coth", a, |x| 1.0 / x.tanh(), Some(|c: Complex64| c.tanh().inv()))
    });

    // Exponential and logarithmic.
    def("exp", 1..=1, |a| map1("exp", a, f64::exp, Some(Complex64::exp)));
    def("ln", 1..=1, |a| map1("ln", a, f64::ln, Some(Complex64::ln)));
    def("log", 1..=1, eval_log);
    def("lg", 1..=1, |a| map1("lg", a, f64::log10, None));

    // Roots.
    def("sqrt", 1..=1, eval_sqrt);
    def("cbrt", 1..=1, |a| map1("cbrt", a, f64::cbrt, None));

    // Rounding and sign.
    def("abs", 1..=1, eval_abs);
    def("floor", 1..=1, |a| map1("floor", a, f64::floor, None));
    def("ceil", 1..=1, |a| map1("ceil", a, f64::ceil, None));
    def("round", 1..=1, |a| map1("round", a, f64::round, None));
    def("sgn", 1..=1, eval_sgn);
    def("sign", 1..=1, eval_sgn);

    // Aggregates.
    def("min", 1..=usize::MAX, eval_min);
    def("max", 1..=usize::MAX, eval_max);

    // Combinatorics and special functions.
    def("factorial", 1..=1, eval_factorial);
    def("fibonacci", 1..=1, eval_fibonacci);
    def("Gamma", 1..=1, eval_gamma);

    // Linear algebra.
    def("det", 1..=1, eval_det);
    def("tr", 1..=1, eval_trace);
    def("trace", 1..=1, eval_trace);
    def("transpose", 1..=1, eval_transpose);
    def("dot", 1..=2, eval_dot);
    def("cross", 2..=2, eval_cross);
    def("norm", 1..=1, eval_norm);

    // Decorations evaluate to their argument. `\vec`/`\hat` never reach
    // the registry: the parser builds Vector nodes for them directly.
    def("ddot", 1..=1, eval_identity);
    def("bar", 1..=1, eval_identity);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call1(name: &str, v: Value) -> Result<Value, EvaluationError> {
        let values = [v];
        let args = FunctionArgs {
            values: &values,
            base: None,
            param: None,
            real_only: false,
        };
        call(name, &args).expect("known function")
    }

    #[test]
    fn trig_identity() {
        let s = call1("sin", Value::Number(0.3)).unwrap().as_number().unwrap();
        let c = call1("cos", Value::Number(0.3)).unwrap().as_number().unwrap();
        assert!((s * s + c * c - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sqrt_of_negative_goes_complex() {
        let v = call1("sqrt", Value::Number(-4.0)).unwrap();
        match v {
            Value::Complex(c) => {
                assert!((c.re).abs() < 1e-12);
                assert!((c.im - 2.0).abs() < 1e-12);
            }
            other => panic!("expected complex, got {:?}", other),
        }
    }

    #[test]
    fn sqrt_of_negative_stays_nan_in_real_only() {
        let values = [Value::Number(-4.0)];
        let args = FunctionArgs {
            values: &values,
            base: None,
            param: None,
            real_only: true,
        };
        let v = call("sqrt", &args).unwrap().unwrap();
        assert!(matches!(v, Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn cube_root_of_negative_is_real() {
        let values = [Value::Number(-8.0)];
        let param = Value::Number(3.0);
        let args = FunctionArgs {
            values: &values,
            base: None,
            param: Some(&param),
            real_only: false,
        };
        let v = call("sqrt", &args).unwrap().unwrap();
        assert!(matches!(v, Value::Number(n) if (n + 2.0).abs() < 1e-12));
    }

    #[test]
    fn log_uses_its_base() {
        let values = [Value::Number(8.0)];
        let base = Value::Number(2.0);
        let args = FunctionArgs {
            values: &values,
            base: Some(&base),
            param: None,
            real_only: false,
        };
        let v = call("log", &args).unwrap().unwrap().as_number().unwrap();
        assert!((v - 3.0).abs() < 1e-12);
    }

    #[test]
    fn factorial_limits() {
        assert_eq!(
            call1("factorial", Value::Number(5.0)).unwrap(),
            Value::Number(120.0)
        );
        let err = call1("factorial", Value::Number(171.0)).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::FactorialOverflow);
        let err = call1("factorial", Value::Number(-1.0)).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DomainError);
    }

    #[test]
    fn fibonacci_values_and_limit() {
        assert_eq!(
            call1("fibonacci", Value::Number(12.0)).unwrap(),
            Value::Number(144.0)
        );
        let err = call1("fibonacci", Value::Number(1477.0)).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::FibonacciOverflow);
        // The largest representable Fibonacci number is finite.
        let v = call1("fibonacci", Value::Number(1476.0)).unwrap();
        assert!(matches!(v, Value::Number(n) if n.is_finite()));
    }

    #[test]
    fn gamma_matches_factorial() {
        let g = call1("Gamma", Value::Number(6.0)).unwrap().as_number().unwrap();
        assert!((g - 120.0).abs() < 1e-6);
    }

    #[test]
    fn arity_is_checked() {
        let values = [Value::Number(1.0), Value::Number(2.0)];
        let args = FunctionArgs {
            values: &values,
            base: None,
            param: None,
            real_only: false,
        };
        let err = call("sin", &args).unwrap().unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DomainError);
    }
}
