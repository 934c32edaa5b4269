//! End-to-end scenarios through the public facade.

use crate::{EvalErrorKind, Texpr, TexprError, Value, Variables};

fn eval(source: &str) -> Value {
    Texpr::new().evaluate(source, &Variables::new()).expect(source)
}

fn eval_with(source: &str, vars: &Variables) -> Value {
    Texpr::new().evaluate(source, vars).expect(source)
}

fn number(source: &str) -> f64 {
    eval(source).as_number().expect(source)
}

#[test]
fn sin_plus_cos_at_zero() {
    assert_eq!(number("\\sin{0} + \\cos{0}"), 1.0);
}

#[test]
fn fraction_addition() {
    assert_eq!(number("\\frac{1}{2} + \\frac{1}{4}"), 0.75);
}

#[test]
fn hypotenuse() {
    let vars: Variables = [("x", 3.0), ("y", 4.0)].into_iter().collect();
    assert_eq!(
        eval_with("\\sqrt{x^2 + y^2}", &vars).as_number().unwrap(),
        5.0
    );
}

#[test]
fn definite_integral_of_x_squared() {
    let v = number("\\int_{0}^{1} x^2 dx");
    assert!((v - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn derivative_of_tenth_power() {
    let vars: Variables = [("x", 2.0)].into_iter().collect();
    assert_eq!(
        eval_with("\\frac{d}{dx}(x^{10})", &vars).as_number().unwrap(),
        5120.0
    );
}

#[test]
fn matrix_inverse() {
    let v = eval("\\begin{pmatrix} 1 & 2 \\\\ 3 & 4 \\end{pmatrix}^{-1}");
    let m = v.as_matrix().expect("matrix");
    let expected = [[-2.0, 1.0], [1.5, -0.5]];
    for (row, want) in m.iter().zip(expected.iter()) {
        for (x, w) in row.iter().zip(want.iter()) {
            assert!((x - w).abs() < 1e-9);
        }
    }
}

#[test]
fn vector_dot_product() {
    assert_eq!(number("\\vec{1,2,3} \\cdot \\vec{4,5,6}"), 32.0);
}

#[test]
fn out_of_range_condition_is_nan() {
    let vars: Variables = [("x", 3.0)].into_iter().collect();
    let v = eval_with("x^2 - 2, -1 < x < 2", &vars).as_number().unwrap();
    assert!(v.is_nan());
}

#[test]
fn fibonacci_twelve() {
    assert_eq!(number("\\fibonacci{12}"), 144.0);
}

#[test]
fn simple_limit() {
    assert_eq!(number("\\lim_{x \\to 0} (x + 1)"), 1.0);
}

// -----------------------------------------------------------------------------
// Boundary behaviours
// -----------------------------------------------------------------------------

#[test]
fn unbalanced_braces_strict_vs_recovery() {
    let mut texpr = Texpr::new();
    // Strict: exactly one error.
    let err = texpr.parse("\\sqrt{x");
    assert!(err.is_err());
    // Recovery: at least one error, but a report, not a failure.
    let report = texpr.validate("\\sqrt{x");
    assert!(!report.is_valid);
    assert!(!report.errors.is_empty());
}

#[test]
fn factorial_boundaries() {
    assert!(matches!(
        number("\\factorial{170}"),
        n if n.is_finite()
    ));
    let err = Texpr::new()
        .evaluate("\\factorial{171}", &Variables::new())
        .unwrap_err();
    assert!(matches!(
        err,
        TexprError::Evaluation(e) if e.kind == EvalErrorKind::FactorialOverflow
    ));
    let err = Texpr::new()
        .evaluate("(-3)!", &Variables::new())
        .unwrap_err();
    assert!(matches!(
        err,
        TexprError::Evaluation(e) if e.kind == EvalErrorKind::DomainError
    ));
}

#[test]
fn fibonacci_boundary() {
    let err = Texpr::new()
        .evaluate("\\fibonacci{1477}", &Variables::new())
        .unwrap_err();
    assert!(matches!(
        err,
        TexprError::Evaluation(e) if e.kind == EvalErrorKind::FibonacciOverflow
    ));
}

#[test]
fn deep_nesting_hits_the_recursion_limit() {
    let source = format!("{}1{}", "(".repeat(600), ")".repeat(600));
    let err = Texpr::new().parse(&source).unwrap_err();
    assert!(err.to_string().contains("recursion limit"));
}

#[test]
fn huge_sum_hits_the_iteration_limit() {
    let err = Texpr::new()
        .evaluate("\\sum_{k=1}^{500000} k", &Variables::new())
        .unwrap_err();
    assert!(matches!(
        err,
        TexprError::Evaluation(e) if e.kind == EvalErrorKind::IterationLimit
    ));
}

#[test]
fn evaluation_is_surfaced_not_substituted() {
    // An undefined variable is an error, never silently zero.
    let err = Texpr::new().evaluate("q + 1", &Variables::new()).unwrap_err();
    assert!(matches!(
        err,
        TexprError::Evaluation(e) if e.kind == EvalErrorKind::UndefinedVariable
    ));
}

#[test]
fn division_by_zero_follows_ieee() {
    assert_eq!(number("\\frac{1}{0}"), f64::INFINITY);
    assert!(number("\\frac{0}{0}").is_nan());
}

#[test]
fn complex_results_surface() {
    let v = eval("\\sqrt{-1}");
    match v {
        Value::Complex(c) => {
            assert!((c.im - 1.0).abs() < 1e-12);
        }
        other => panic!("expected complex, got {:?}", other),
    }
    // i^2 folds back to a real.
    assert_eq!(number("i^2"), -1.0);
}

#[test]
fn textbook_sin_squared() {
    // \sin^2{x} at x = 1 equals sin(1)^2.
    let vars: Variables = [("x", 1.0)].into_iter().collect();
    let v = eval_with("\\sin^2{x}", &vars).as_number().unwrap();
    assert!((v - 1.0f64.sin().powi(2)).abs() < 1e-12);
}

#[test]
fn log_bases() {
    assert!((number("\\log_{2}(8)") - 3.0).abs() < 1e-12);
    assert!((number("\\log(100)") - 2.0).abs() < 1e-12);
    assert!((number("\\ln{e}") - 1.0).abs() < 1e-12);
}

#[test]
fn greek_variables_and_constants() {
    let vars: Variables = [("alpha", 2.0)].into_iter().collect();
    assert_eq!(eval_with("3\\alpha", &vars).as_number().unwrap(), 6.0);
    assert!((number("2\\pi") - std::f64::consts::TAU).abs() < 1e-12);
}

#[test]
fn subscripted_composite_names() {
    let vars: Variables = [("H_0", 70.0)].into_iter().collect();
    assert_eq!(eval_with("H_0 + 1", &vars).as_number().unwrap(), 71.0);
    let vars: Variables = [("R_crit", 2.0)].into_iter().collect();
    assert_eq!(eval_with("R_{crit}^2", &vars).as_number().unwrap(), 4.0);
}

#[test]
fn piecewise_cases_environment() {
    let source = "\\begin{cases} x^2 & x > 0 \\\\ -x & \\text{otherwise} \\end{cases}";
    let vars: Variables = [("x", 3.0)].into_iter().collect();
    assert_eq!(eval_with(source, &vars).as_number().unwrap(), 9.0);
    let vars: Variables = [("x", -3.0)].into_iter().collect();
    assert_eq!(eval_with(source, &vars).as_number().unwrap(), 3.0);
}

#[test]
fn matrix_times_vector() {
    let v = eval("\\begin{pmatrix} 1 & 0 \\\\ 0 & 2 \\end{pmatrix} \\vec{3, 4}");
    assert_eq!(v, Value::Vector(vec![3.0, 8.0]));
}

#[test]
fn closed_integral_notation() {
    // \oint evaluates like \int over the same bounds.
    let v = number("\\oint_{0}^{1} x dx");
    assert!((v - 0.5).abs() < 1e-9);
}

#[test]
fn comparison_results_are_boolean() {
    assert_eq!(eval("1 < 2"), Value::Boolean(true));
    assert_eq!(eval("2 \\leq 1"), Value::Boolean(false));
    assert_eq!(eval("3 = 3"), Value::Boolean(true));
}

#[test]
fn mathbf_decorated_variables() {
    let vars: Variables = [("mathbf:E", 5.0)].into_iter().collect();
    assert_eq!(eval_with("\\mathbf{E} + 1", &vars).as_number().unwrap(), 6.0);
}

#[test]
fn facade_differentiate_and_integrate() {
    let mut texpr = Texpr::new();
    let derivative = texpr.differentiate("x^3", "x", 2).unwrap();
    let vars: Variables = [("x", 2.0)].into_iter().collect();
    let v = texpr.evaluate_parsed(&derivative, &vars).unwrap();
    assert!((v.as_number().unwrap() - 12.0).abs() < 1e-12);

    let anti = texpr.integrate("x^2", "x").unwrap();
    let v = texpr.evaluate_parsed(&anti, &vars).unwrap();
    assert!((v.as_number().unwrap() - 8.0 / 3.0).abs() < 1e-12);

    let err = texpr.integrate("\\tan{x}", "x").unwrap_err();
    assert!(matches!(
        err,
        TexprError::Evaluation(e) if e.kind == EvalErrorKind::SymbolicOnly
    ));
}
