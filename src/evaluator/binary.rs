//! Binary and unary operator semantics over [`Value`] operands
//!
//! Numeric promotion: a complex operand promotes the other side, an interval
//! operand keeps interval arithmetic, and matrix/vector operands dispatch to
//! the linear-algebra kernels. Scalar arithmetic follows IEEE-754 — division
//! by zero produces ±∞ or NaN, never an error.

use num_complex::Complex64;
use num_traits::Zero;

use crate::ast::BinaryOp;
use crate::core::error::{EvalErrorKind, EvaluationError};
use crate::core::value::Value;
use crate::evaluator::linalg;

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> EvaluationError {
    EvaluationError::new(
        EvalErrorKind::TypeMismatch,
        format!(
            "cannot apply {:?} to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
    )
}

/// Collapse a complex result with a zero imaginary part back to a real.
fn complex_value(c: Complex64) -> Value {
    if c.im.is_zero() {
        Value::Number(c.re)
    } else {
        Value::Complex(c)
    }
}

/// Apply a binary operator. `source_command` distinguishes `\times` (cross
/// product) from `\cdot` (dot product) on vector operands; `real_only`
/// keeps scalar powers out of the complex plane.
pub(crate) fn apply(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    source_command: Option<&str>,
    real_only: bool,
) -> Result<Value, EvaluationError> {
    use Value::{Complex, Interval, Matrix, Number, Vector};

    match (left, right) {
        (Number(a), Number(b)) => Ok(scalar(op, *a, *b, real_only)),

        // A complex operand promotes the other side.
        (Complex(_) | Number(_), Complex(_)) | (Complex(_), Number(_)) => {
            let a = left.as_complex()?;
            let b = right.as_complex()?;
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Pow => complex_pow(a, b),
            };
            Ok(complex_value(result))
        }

        // Interval arithmetic; a scalar widens to a point interval.
        (Interval { .. }, Interval { .. } | Number(_)) | (Number(_), Interval { .. }) => {
            let (al, au) = point_interval(left)?;
            let (bl, bu) = point_interval(right)?;
            interval(op, al, au, bl, bu)
        }

        (Vector(a), Vector(b)) => match op {
            BinaryOp::Add => Ok(Vector(linalg::vector_add(a, b, false)?)),
            BinaryOp::Sub => Ok(Vector(linalg::vector_add(a, b, true)?)),
            BinaryOp::Mul => {
                if source_command == Some("times") {
                    Ok(Vector(linalg::cross(a, b)?))
                } else {
                    Ok(Number(linalg::dot(a, b)?))
                }
            }
            _ => Err(unsupported(op, left, right)),
        },
        (Vector(v), Number(k)) => match op {
            BinaryOp::Mul => Ok(Vector(linalg::vector_scale(v, *k))),
            BinaryOp::Div => Ok(Vector(linalg::vector_scale(v, 1.0 / k))),
            _ => Err(unsupported(op, left, right)),
        },
        (Number(k), Vector(v)) => match op {
            BinaryOp::Mul => Ok(Vector(linalg::vector_scale(v, *k))),
            _ => Err(unsupported(op, left, right)),
        },

        (Matrix(a), Matrix(b)) => match op {
            BinaryOp::Add => Ok(Matrix(linalg::matrix_add(a, b, false)?)),
            BinaryOp::Sub => Ok(Matrix(linalg::matrix_add(a, b, true)?)),
            BinaryOp::Mul => Ok(Matrix(linalg::matrix_mul(a, b)?)),
            _ => Err(unsupported(op, left, right)),
        },
        (Matrix(m), Number(k)) => match op {
            BinaryOp::Mul => Ok(Matrix(linalg::matrix_scale(m, *k))),
            BinaryOp::Div => Ok(Matrix(linalg::matrix_scale(m, 1.0 / k))),
            _ => Err(unsupported(op, left, right)),
        },
        (Number(k), Matrix(m)) => match op {
            BinaryOp::Mul => Ok(Matrix(linalg::matrix_scale(m, *k))),
            _ => Err(unsupported(op, left, right)),
        },
        (Matrix(m), Vector(v)) => match op {
            BinaryOp::Mul => Ok(Vector(linalg::matrix_vector(m, v)?)),
            _ => Err(unsupported(op, left, right)),
        },
        (Vector(v), Matrix(m)) => match op {
            BinaryOp::Mul => Ok(Vector(linalg::vector_matrix(v, m)?)),
            _ => Err(unsupported(op, left, right)),
        },

        _ => Err(unsupported(op, left, right)),
    }
}

fn scalar(op: BinaryOp, a: f64, b: f64, real_only: bool) -> Value {
    match op {
        BinaryOp::Add => Value::Number(a + b),
        BinaryOp::Sub => Value::Number(a - b),
        BinaryOp::Mul => Value::Number(a * b),
        BinaryOp::Div => Value::Number(a / b),
        BinaryOp::Pow => {
            // Integer exponents multiply out exactly.
            if b.fract() == 0.0 && b.abs() <= f64::from(i32::MAX) {
                #[allow(clippy::cast_possible_truncation)]
                return Value::Number(a.powi(b as i32));
            }
            let real = a.powf(b);
            // Negative base with a fractional exponent has no real answer;
            // go complex unless real_only pins the result to NaN.
            if real.is_nan() && a < 0.0 && b.is_finite() && !real_only {
                complex_value(Complex64::new(a, 0.0).powc(Complex64::new(b, 0.0)))
            } else {
                Value::Number(real)
            }
        }
    }
}

/// Integer exponents multiply out exactly (`i^2` is -1, not -1 + εi);
/// everything else goes through the principal branch.
fn complex_pow(a: Complex64, b: Complex64) -> Complex64 {
    if b.im == 0.0 && b.re.fract() == 0.0 && b.re.abs() <= f64::from(i32::MAX) {
        #[allow(clippy::cast_possible_truncation)]
        return a.powi(b.re as i32);
    }
    a.powc(b)
}

fn point_interval(v: &Value) -> Result<(f64, f64), EvaluationError> {
    match v {
        Value::Interval { lower, upper } => Ok((*lower, *upper)),
        Value::Number(n) => Ok((*n, *n)),
        other => Err(other.mismatch_interval()),
    }
}

impl Value {
    fn mismatch_interval(&self) -> EvaluationError {
        EvaluationError::new(
            EvalErrorKind::TypeMismatch,
            format!("expected interval or number, got {}", self.type_name()),
        )
    }
}

fn interval(op: BinaryOp, al: f64, au: f64, bl: f64, bu: f64) -> Result<Value, EvaluationError> {
    let from_candidates = |candidates: &[f64]| {
        let lower = candidates.iter().copied().fold(f64::INFINITY, f64::min);
        let upper = candidates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Value::Interval { lower, upper }
    };

    match op {
        BinaryOp::Add => Ok(Value::Interval {
            lower: al + bl,
            upper: au + bu,
        }),
        BinaryOp::Sub => Ok(Value::Interval {
            lower: al - bu,
            upper: au - bl,
        }),
        BinaryOp::Mul => Ok(from_candidates(&[al * bl, al * bu, au * bl, au * bu])),
        BinaryOp::Div => {
            if bl <= 0.0 && bu >= 0.0 {
                return Err(EvaluationError::new(
                    EvalErrorKind::DivisionByZero,
                    "interval division by an interval containing zero",
                ));
            }
            Ok(from_candidates(&[al / bl, al / bu, au / bl, au / bu]))
        }
        BinaryOp::Pow => {
            // Integer exponents only; the power is taken endpoint-wise,
            // adding zero when an even power spans it.
            if bl != bu || bl.fract() != 0.0 || bl < 0.0 {
                return Err(EvaluationError::new(
                    EvalErrorKind::DomainError,
                    "interval powers require a non-negative integer exponent",
                ));
            }
            let n = bl;
            let mut candidates = vec![al.powf(n), au.powf(n)];
            let even = (n as i64) % 2 == 0;
            if even && al <= 0.0 && au >= 0.0 {
                candidates.push(0.0);
            }
            Ok(from_candidates(&candidates))
        }
    }
}

/// Component-wise sign flip; booleans cannot be negated.
pub(crate) fn negate(value: &Value) -> Result<Value, EvaluationError> {
    match value {
        Value::Number(n) => Ok(Value::Number(-n)),
        Value::Complex(c) => Ok(Value::Complex(-c)),
        Value::Vector(v) => Ok(Value::Vector(linalg::vector_scale(v, -1.0))),
        Value::Matrix(m) => Ok(Value::Matrix(linalg::matrix_scale(m, -1.0))),
        Value::Interval { lower, upper } => Ok(Value::Interval {
            lower: -upper,
            upper: -lower,
        }),
        other => Err(EvaluationError::new(
            EvalErrorKind::TypeMismatch,
            format!("cannot negate {}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(x: f64) -> Value {
        Value::Number(x)
    }

    #[test]
    fn ieee_division_by_zero() {
        let v = apply(BinaryOp::Div, &num(1.0), &num(0.0), None, false).unwrap();
        assert_eq!(v, Value::Number(f64::INFINITY));
        let v = apply(BinaryOp::Div, &num(0.0), &num(0.0), None, false).unwrap();
        assert!(matches!(v, Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn negative_base_fractional_power_goes_complex() {
        let v = apply(BinaryOp::Pow, &num(-1.0), &num(0.5), None, false).unwrap();
        assert!(matches!(v, Value::Complex(_)));
    }

    #[test]
    fn real_only_pins_to_nan() {
        let v = apply(BinaryOp::Pow, &num(-1.0), &num(0.5), None, true).unwrap();
        assert!(matches!(v, Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn complex_promotes() {
        let i = Value::Complex(Complex64::new(0.0, 1.0));
        let v = apply(BinaryOp::Mul, &i, &i, None, false).unwrap();
        assert_eq!(v, Value::Number(-1.0));
    }

    #[test]
    fn vector_dot_and_cross() {
        let a = Value::Vector(vec![1.0, 2.0, 3.0]);
        let b = Value::Vector(vec![4.0, 5.0, 6.0]);
        assert_eq!(
            apply(BinaryOp::Mul, &a, &b, Some("cdot"), false).unwrap(),
            Value::Number(32.0)
        );
        assert_eq!(
            apply(BinaryOp::Mul, &a, &b, Some("times"), false).unwrap(),
            Value::Vector(vec![-3.0, 6.0, -3.0])
        );
    }

    #[test]
    fn interval_arithmetic() {
        let a = Value::Interval {
            lower: 1.0,
            upper: 2.0,
        };
        let b = Value::Interval {
            lower: 3.0,
            upper: 4.0,
        };
        assert_eq!(
            apply(BinaryOp::Add, &a, &b, None, false).unwrap(),
            Value::Interval {
                lower: 4.0,
                upper: 6.0
            }
        );
        let spans_zero = Value::Interval {
            lower: -1.0,
            upper: 1.0,
        };
        let err = apply(BinaryOp::Div, &a, &spans_zero, None, false).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::DivisionByZero);
    }

    #[test]
    fn boolean_arithmetic_is_a_type_error() {
        let err = apply(BinaryOp::Add, &Value::Boolean(true), &num(1.0), None, false).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    }

    #[test]
    fn negate_flips_componentwise() {
        assert_eq!(
            negate(&Value::Vector(vec![1.0, -2.0])).unwrap(),
            Value::Vector(vec![-1.0, 2.0])
        );
        assert_eq!(
            negate(&Value::Interval {
                lower: 1.0,
                upper: 2.0
            })
            .unwrap(),
            Value::Interval {
                lower: -2.0,
                upper: -1.0
            }
        );
    }
}
