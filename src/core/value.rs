//! Typed evaluation results
//!
//! Evaluating an AST produces one of the [`Value`] variants. Callers narrow
//! with the `as_*` downcasts, which fail with a typed [`EvaluationError`]
//! instead of panicking when the variant does not match.

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;

use crate::ast::Expr;
use crate::core::error::{EvalErrorKind, EvaluationError};

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// Real scalar.
    Number(f64),
    /// Complex scalar.
    Complex(Complex64),
    /// Row-major matrix of reals; non-empty and rectangular.
    Matrix(Vec<Vec<f64>>),
    /// Real vector; non-empty.
    Vector(Vec<f64>),
    /// Closed real interval.
    Interval {
        /// Lower endpoint.
        lower: f64,
        /// Upper endpoint.
        upper: f64,
    },
    /// Comparison result.
    Boolean(bool),
    /// A function definition (`f(x) = body`) handed back to the caller.
    FunctionDef {
        /// Function name.
        name: String,
        /// Parameter names.
        params: Vec<String>,
        /// Definition body.
        body: Arc<Expr>,
    },
}

impl Value {
    /// Short variant name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Complex(_) => "complex",
            Value::Matrix(_) => "matrix",
            Value::Vector(_) => "vector",
            Value::Interval { .. } => "interval",
            Value::Boolean(_) => "boolean",
            Value::FunctionDef { .. } => "function definition",
        }
    }

    fn mismatch(&self, wanted: &str) -> EvaluationError {
        EvaluationError::new(
            EvalErrorKind::TypeMismatch,
            format!("expected {}, got {}", wanted, self.type_name()),
        )
    }

    /// Narrow to a real scalar. A complex value with a zero imaginary part
    /// narrows successfully.
    pub fn as_number(&self) -> Result<f64, EvaluationError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Complex(c) if c.im == 0.0 => Ok(c.re),
            other => Err(other.mismatch("number")),
        }
    }

    /// Narrow to a complex scalar; real numbers promote.
    pub fn as_complex(&self) -> Result<Complex64, EvaluationError> {
        match self {
            Value::Number(n) => Ok(Complex64::new(*n, 0.0)),
            Value::Complex(c) => Ok(*c),
            other => Err(other.mismatch("complex")),
        }
    }

    /// Narrow to a boolean.
    pub fn as_boolean(&self) -> Result<bool, EvaluationError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.mismatch("boolean")),
        }
    }

    /// Narrow to a vector.
    pub fn as_vector(&self) -> Result<&[f64], EvaluationError> {
        match self {
            Value::Vector(v) => Ok(v),
            other => Err(other.mismatch("vector")),
        }
    }

    /// Narrow to a matrix.
    pub fn as_matrix(&self) -> Result<&[Vec<f64>], EvaluationError> {
        match self {
            Value::Matrix(m) => Ok(m),
            other => Err(other.mismatch("matrix")),
        }
    }

    /// Narrow to an interval.
    pub fn as_interval(&self) -> Result<(f64, f64), EvaluationError> {
        match self {
            Value::Interval { lower, upper } => Ok((*lower, *upper)),
            other => Err(other.mismatch("interval")),
        }
    }

    /// Truthiness for conditional selection: a boolean is itself, a number
    /// is true when non-zero and not NaN.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Complex(c) => {
                if c.im >= 0.0 {
                    write!(f, "{} + {}i", c.re, c.im)
                } else {
                    write!(f, "{} - {}i", c.re, -c.im)
                }
            }
            Value::Matrix(rows) => {
                write!(f, "[")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "[")?;
                    for (j, x) in row.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", x)?;
                    }
                    write!(f, "]")?;
                }
                write!(f, "]")
            }
            Value::Vector(v) => {
                write!(f, "(")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, ")")
            }
            Value::Interval { lower, upper } => write!(f, "[{}, {}]", lower, upper),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::FunctionDef { name, params, .. } => {
                write!(f, "{}({})", name, params.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EvalErrorKind;

    #[test]
    fn downcast_success_and_failure() {
        assert_eq!(Value::Number(2.5).as_number().unwrap(), 2.5);
        assert_eq!(
            Value::Complex(Complex64::new(3.0, 0.0)).as_number().unwrap(),
            3.0
        );
        let err = Value::Boolean(true).as_number().unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    }

    #[test]
    fn truthiness() {
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::Vector(vec![1.0]).is_truthy());
    }

    #[test]
    fn display_complex() {
        assert_eq!(Value::Complex(Complex64::new(1.0, -2.0)).to_string(), "1 - 2i");
    }
}
