//! Universal properties, checked with quickcheck over a generated
//! expression subset.

use quickcheck::{Gen, QuickCheck, TestResult};

use crate::ast::{BinaryOp, Expr};
use crate::calculus::differentiate::differentiate;
use crate::parser::{ParseOptions, parse_source};
use crate::{Texpr, Value, Variables};

/// A random expression over `x` and `y` drawn from the printable,
/// evaluable, differentiable subset: small integer literals, the two
/// variables, `+ - * /`, integer powers, and `sin`/`cos`/`exp`.
fn arbitrary_expr(g: &mut Gen, depth: usize) -> Expr {
    let leaf = depth == 0 || u8::arbitrary_choice(g, 4) == 0;
    if leaf {
        return match u8::arbitrary_choice(g, 4) {
            0 => Expr::variable("x"),
            1 => Expr::variable("y"),
            2 => Expr::number(f64::from(u8::arbitrary_choice(g, 9))),
            _ => Expr::number(f64::from(u8::arbitrary_choice(g, 5)) + 1.0),
        };
    }
    match u8::arbitrary_choice(g, 7) {
        0 => Expr::binary(
            BinaryOp::Add,
            arbitrary_expr(g, depth - 1),
            arbitrary_expr(g, depth - 1),
        ),
        1 => Expr::binary(
            BinaryOp::Sub,
            arbitrary_expr(g, depth - 1),
            arbitrary_expr(g, depth - 1),
        ),
        2 => Expr::binary(
            BinaryOp::Mul,
            arbitrary_expr(g, depth - 1),
            arbitrary_expr(g, depth - 1),
        ),
        3 => Expr::binary(
            BinaryOp::Div,
            arbitrary_expr(g, depth - 1),
            arbitrary_expr(g, depth - 1),
        ),
        4 => Expr::binary(
            BinaryOp::Pow,
            arbitrary_expr(g, depth - 1),
            Expr::number(f64::from(u8::arbitrary_choice(g, 3) + 1)),
        ),
        5 => Expr::call("sin", arbitrary_expr(g, depth - 1)),
        _ => Expr::call("cos", arbitrary_expr(g, depth - 1)),
    }
}

trait ArbitraryChoice {
    fn arbitrary_choice(g: &mut Gen, bound: u8) -> u8;
}

impl ArbitraryChoice for u8 {
    fn arbitrary_choice(g: &mut Gen, bound: u8) -> u8 {
        let value: u8 = quickcheck::Arbitrary::arbitrary(g);
        value % bound
    }
}

fn parse(src: &str) -> Option<std::sync::Arc<Expr>> {
    parse_source(src, ParseOptions::default(), None).ok()
}

fn checks(tests: u64) -> QuickCheck {
    QuickCheck::new().tests(tests).max_tests(tests * 10)
}

#[test]
fn printer_reaches_a_fixpoint() {
    fn property(seed: u64) -> TestResult {
        let mut g = Gen::new(seed as usize % 17 + 3);
        let expr = arbitrary_expr(&mut g, 3);
        let printed = expr.to_latex();
        let Some(reparsed) = parse(&printed) else {
            return TestResult::error(format!("canonical output failed to parse: {}", printed));
        };
        let reprinted = reparsed.to_latex();
        if printed == reprinted {
            TestResult::passed()
        } else {
            TestResult::error(format!("'{}' reprinted as '{}'", printed, reprinted))
        }
    }
    checks(300).quickcheck(property as fn(u64) -> TestResult);
}

#[test]
fn evaluation_is_bit_deterministic() {
    fn property(seed: u64, x_raw: i32, y_raw: i32) -> TestResult {
        let mut g = Gen::new(seed as usize % 17 + 3);
        let expr = std::sync::Arc::new(arbitrary_expr(&mut g, 3));
        let vars: Variables = [
            ("x", f64::from(x_raw % 100) / 10.0),
            ("y", f64::from(y_raw % 100) / 10.0),
        ]
        .into_iter()
        .collect();

        let mut texpr = Texpr::new();
        let first = texpr.evaluate_parsed(&expr, &vars);
        // A second, cache-free instance must agree bit for bit.
        let mut cold = Texpr::with_config(
            crate::TexprConfig::new().cache(crate::CacheConfig::disabled()),
        );
        let second = cold.evaluate_parsed(&expr, &vars);

        match (first, second) {
            (Ok(Value::Number(a)), Ok(Value::Number(b))) => {
                TestResult::from_bool(a.to_bits() == b.to_bits())
            }
            (Ok(Value::Complex(a)), Ok(Value::Complex(b))) => TestResult::from_bool(
                a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits(),
            ),
            (Err(_), Err(_)) => TestResult::passed(),
            _ => TestResult::failed(),
        }
    }
    checks(300).quickcheck(property as fn(u64, i32, i32) -> TestResult);
}

#[test]
fn derivative_orders_compose() {
    fn property(seed: u64) -> TestResult {
        let mut g = Gen::new(seed as usize % 17 + 3);
        let expr = std::sync::Arc::new(arbitrary_expr(&mut g, 2));

        for order in 0u32..3 {
            let stacked = match differentiate(&expr, "x", order + 1, None) {
                Ok(d) => d,
                Err(_) => return TestResult::discard(),
            };
            let inner = match differentiate(&expr, "x", order, None) {
                Ok(d) => d,
                Err(_) => return TestResult::discard(),
            };
            let once_more = match differentiate(&inner, "x", 1, None) {
                Ok(d) => d,
                Err(_) => return TestResult::discard(),
            };
            if *stacked != *once_more {
                return TestResult::error(format!(
                    "order {} + 1 disagreed for {}",
                    order,
                    expr.to_latex()
                ));
            }
        }
        TestResult::passed()
    }
    checks(200).quickcheck(property as fn(u64) -> TestResult);
}

#[test]
fn cold_and_warm_evaluators_agree() {
    fn property(seed: u64, x_raw: i32) -> TestResult {
        let mut g = Gen::new(seed as usize % 17 + 3);
        let expr = arbitrary_expr(&mut g, 3);
        let source = expr.to_latex();
        let vars: Variables = [("x", f64::from(x_raw % 50) / 5.0), ("y", 1.5)]
            .into_iter()
            .collect();

        let mut warmed = Texpr::new();
        warmed.warm_up_cache([source.as_str()]);
        let warm_first = warmed.evaluate(&source, &vars);
        let warm_second = warmed.evaluate(&source, &vars);

        let mut cold = Texpr::with_config(
            crate::TexprConfig::new().cache(crate::CacheConfig::disabled()),
        );
        let cold_result = cold.evaluate(&source, &vars);

        match (warm_first, warm_second, cold_result) {
            (Ok(a), Ok(b), Ok(c)) => TestResult::from_bool(values_agree(&a, &b) && values_agree(&a, &c)),
            (Err(_), Err(_), Err(_)) => TestResult::passed(),
            _ => TestResult::failed(),
        }
    }
    checks(200).quickcheck(property as fn(u64, i32) -> TestResult);
}

fn values_agree(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
        (Value::Complex(x), Value::Complex(y)) => {
            x.re.to_bits() == y.re.to_bits() && x.im.to_bits() == y.im.to_bits()
        }
        _ => a == b,
    }
}

#[test]
fn canonical_printing_round_trips_concrete_sources() {
    // parse -> print -> parse -> print must stabilise for every node kind.
    let sources = [
        "2x + 1",
        "\\frac{1}{2} + \\frac{1}{4}",
        "\\sqrt{x^2 + y^2}",
        "\\sqrt[3]{x}",
        "\\sin{x} \\cdot \\cos{y}",
        "\\vec{1, 2, 3} \\times \\vec{4, 5, 6}",
        "|x - 1|",
        "x_0 + R_{crit}",
        "\\alpha + \\pi",
        "\\mathbf{E} + \\text{flux}",
        "\\binom{7}{2}",
        "\\lim_{x \\to 0} (x + 1)",
        "\\sum_{k=1}^{10} k^2",
        "\\prod_{k=1}^{4} k",
        "\\int_{0}^{1} x^2 dx",
        "\\iint_{0}^{1} xy dx dy",
        "\\frac{d}{dx} (x^{10})",
        "\\frac{\\partial^{2}}{\\partial x^{2}} (x^3)",
        "\\nabla (x^2 + y^2)",
        "\\nabla^2 (x^2 + y^2)",
        "\\begin{pmatrix} 1 & 2 \\\\ 3 & 4 \\end{pmatrix}",
        "\\begin{cases} x & x > 0 \\\\ -x & \\text{otherwise} \\end{cases}",
        "-1 < x < 2",
        "x \\in [0, 1]",
        "x^2 - 2, -1 < x < 2",
        "{x + 1}{x > 0}",
        "let y = x + 1",
        "f(a, b) = a + b",
        "5!",
        "\\log_{2}(8)",
        "\\sin^2{x}",
        "x^{-1}",
        "\\begin{pmatrix} 1 & 2 \\\\ 3 & 4 \\end{pmatrix}^{-1}",
    ];
    for source in sources {
        let first = parse(source).unwrap_or_else(|| panic!("failed to parse {:?}", source));
        let printed = first.to_latex();
        let second = parse(&printed)
            .unwrap_or_else(|| panic!("canonical form of {:?} failed to parse: {:?}", source, printed));
        let reprinted = second.to_latex();
        assert_eq!(printed, reprinted, "printer did not stabilise for {:?}", source);
    }
}

#[test]
fn implicit_multiplication_is_insertion_only() {
    // The parse of juxtaposition equals the parse of explicit `*`.
    let pairs = [
        ("2x", "2*x"),
        ("2(x+1)", "2*(x+1)"),
        ("xy", "x*y"),
        ("2\\pi", "2*\\pi"),
        ("(x)(y)", "(x)*(y)"),
        ("3x^2", "3*x^2"),
    ];
    for (implicit, explicit) in pairs {
        let a = parse(implicit).expect(implicit);
        let b = parse(explicit).expect(explicit);
        assert_eq!(*a, *b, "{} vs {}", implicit, explicit);
    }
}
