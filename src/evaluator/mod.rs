//! AST walker producing typed results
//!
//! Structural dispatch over the variant set. A recursion-depth counter is
//! bumped at every entry (default ceiling 500); loop variables of sums,
//! products, integrals, and limits live on a local binding stack consulted
//! before the caller environment; expensive nodes (series, integrals,
//! limits) go through the transient L4 sub-expression cache.
//!
//! Variable lookup order: local bindings, caller environment, built-in
//! constants, the imaginary unit `i`, then registered extension handlers.
//! Extension handlers for function calls run before built-in dispatch.

pub(crate) mod binary;
pub(crate) mod constants;
pub(crate) mod functions;
pub(crate) mod linalg;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use num_complex::Complex64;
use rustc_hash::FxHasher;

use crate::ast::{BinaryOp, CompareOp, Expr, ExprKind, PiecewiseCase};
use crate::cache::CacheManager;
use crate::cache::keys::Variables;
use crate::calculus;
use crate::core::error::{EvalErrorKind, EvaluationError};
use crate::core::suggest;
use crate::core::value::Value;
use crate::evaluator::functions::FunctionArgs;
use crate::extensions::ExtensionRegistry;

/// Evaluator knobs taken from the facade configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvalOptions {
    /// Domain-restricted operations return NaN instead of complex results.
    pub real_only: bool,
    /// Recursion-depth ceiling.
    pub max_recursion_depth: usize,
}

pub(crate) struct Evaluator<'a> {
    options: EvalOptions,
    vars: &'a Variables,
    extensions: Option<&'a ExtensionRegistry>,
    caches: Option<&'a mut CacheManager>,
    locals: Vec<(String, f64)>,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(
        options: EvalOptions,
        vars: &'a Variables,
        extensions: Option<&'a ExtensionRegistry>,
        caches: Option<&'a mut CacheManager>,
    ) -> Self {
        Evaluator {
            options,
            vars,
            extensions,
            caches,
            locals: Vec::new(),
            depth: 0,
        }
    }

    /// Evaluate one node. Every recursion funnels through here so the
    /// depth ceiling sees every path.
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        self.depth += 1;
        if self.depth > self.options.max_recursion_depth {
            self.depth -= 1;
            return Err(EvaluationError::new(
                EvalErrorKind::RecursionLimit,
                "evaluation exceeded the recursion limit",
            ));
        }
        let result = self.dispatch(expr);
        self.depth -= 1;
        result
    }

    /// Evaluate `body` with `name` temporarily bound to `value`.
    pub(crate) fn eval_bound(
        &mut self,
        name: &str,
        value: f64,
        body: &Expr,
    ) -> Result<Value, EvaluationError> {
        self.locals.push((name.to_string(), value));
        let result = self.eval(body);
        self.locals.pop();
        result
    }

    /// Push a loop binding; pair with [`Evaluator::pop_binding`].
    pub(crate) fn push_binding(&mut self, name: &str, value: f64) {
        self.locals.push((name.to_string(), value));
    }

    /// Update the most recent binding (the running loop index).
    pub(crate) fn set_binding(&mut self, value: f64) {
        if let Some(last) = self.locals.last_mut() {
            last.1 = value;
        }
    }

    pub(crate) fn pop_binding(&mut self) {
        self.locals.pop();
    }

    fn dispatch(&mut self, expr: &Expr) -> Result<Value, EvaluationError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Variable(name) => self.variable(expr, name),
            ExprKind::Binary {
                op,
                left,
                right,
                source_command,
            } => {
                let left_value = self.eval(left)?;
                if *op == BinaryOp::Pow {
                    if let Value::Matrix(m) = &left_value {
                        return self.matrix_power(m, right);
                    }
                }
                let right_value = self.eval(right)?;
                binary::apply(
                    *op,
                    &left_value,
                    &right_value,
                    source_command.as_deref(),
                    self.options.real_only,
                )
            }
            ExprKind::Unary { operand, .. } => {
                let value = self.eval(operand)?;
                binary::negate(&value)
            }
            ExprKind::Abs(inner) => {
                let value = self.eval(inner)?;
                absolute(&value)
            }
            ExprKind::FunctionCall {
                name,
                args,
                base,
                param,
            } => self.function_call(expr, name, args, base.as_deref(), param.as_deref()),
            ExprKind::Limit { var, target, body } => {
                self.cached_numeric(expr, |ev| calculus::limits::limit(ev, var, target, body))
            }
            ExprKind::SumSeries {
                var,
                start,
                end,
                body,
            } => self.cached_numeric(expr, |ev| {
                calculus::limits::series(ev, var, start, end, body, true)
            }),
            ExprKind::ProductSeries {
                var,
                start,
                end,
                body,
            } => self.cached_numeric(expr, |ev| {
                calculus::limits::series(ev, var, start, end, body, false)
            }),
            ExprKind::Integral {
                lower,
                upper,
                body,
                var,
                ..
            } => self.cached_numeric(expr, |ev| {
                calculus::integrate::definite(ev, lower.as_deref(), upper.as_deref(), body, var)
            }),
            ExprKind::MultiIntegral {
                lower,
                upper,
                body,
                vars,
                ..
            } => self.cached_numeric(expr, |ev| {
                calculus::integrate::multi(ev, lower.as_deref(), upper.as_deref(), body, vars)
            }),
            ExprKind::Derivative { body, var, order }
            | ExprKind::PartialDerivative { body, var, order } => {
                let derivative = calculus::differentiate::differentiate(
                    body,
                    var,
                    *order,
                    self.caches.as_deref_mut(),
                )?;
                self.eval(&derivative)
            }
            ExprKind::Gradient { body, vars } => self.gradient(body, vars.as_deref()),
            ExprKind::Binom { n, k } => {
                let n = self.eval(n)?.as_number()?;
                let k = self.eval(k)?.as_number()?;
                binomial(n, k)
            }
            ExprKind::Comparison { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(Value::Boolean(compare(*op, &left, &right)?))
            }
            ExprKind::ChainedComparison { exprs, ops } => {
                let values: Vec<Value> = exprs
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<Result<_, _>>()?;
                for (i, op) in ops.iter().enumerate() {
                    if !compare(*op, &values[i], &values[i + 1])? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            ExprKind::Conditional { value, condition } => {
                let guard = self.eval(condition)?;
                if guard.is_truthy() {
                    self.eval(value)
                } else {
                    Ok(Value::Number(f64::NAN))
                }
            }
            ExprKind::Piecewise { cases } => self.piecewise(cases),
            ExprKind::Matrix { rows } => {
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut entries = Vec::with_capacity(row.len());
                    for cell in row {
                        entries.push(self.eval(cell)?.as_number()?);
                    }
                    out.push(entries);
                }
                Ok(Value::Matrix(out))
            }
            ExprKind::Vector { components, unit } => {
                let mut out = Vec::with_capacity(components.len());
                for c in components {
                    out.push(self.eval(c)?.as_number()?);
                }
                if *unit {
                    let magnitude = linalg::norm(&out);
                    if magnitude == 0.0 {
                        return Err(EvaluationError::new(
                            EvalErrorKind::DivisionByZero,
                            "cannot normalise the zero vector",
                        ));
                    }
                    out = linalg::vector_scale(&out, 1.0 / magnitude);
                }
                Ok(Value::Vector(out))
            }
            ExprKind::Interval { lower, upper } => {
                let lower = self.eval(lower)?.as_number()?;
                let upper = self.eval(upper)?.as_number()?;
                Ok(Value::Interval { lower, upper })
            }
            ExprKind::Assignment { value, .. } => self.eval(value),
            ExprKind::FunctionDefinition { name, params, body } => Ok(Value::FunctionDef {
                name: name.clone(),
                params: params.clone(),
                body: Arc::clone(body),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Variables
    // -------------------------------------------------------------------------

    fn variable(&mut self, node: &Expr, name: &str) -> Result<Value, EvaluationError> {
        for (local, value) in self.locals.iter().rev() {
            if local == name {
                return Ok(Value::Number(*value));
            }
        }
        if let Some(value) = self.vars.get(name) {
            return Ok(Value::Number(value));
        }
        if let Some(value) = constants::value(name) {
            return Ok(Value::Number(value));
        }
        if name == "i" {
            return Ok(Value::Complex(Complex64::new(0.0, 1.0)));
        }
        if let Some(result) = self.try_extensions(node) {
            return result;
        }

        let mut candidates: Vec<String> = self.vars.names().map(str::to_string).collect();
        candidates.extend(constants::names().map(str::to_string));
        candidates.push("i".to_string());
        let suggestion = suggest::did_you_mean(name, candidates.iter().map(String::as_str));
        Err(EvaluationError::new(
            EvalErrorKind::UndefinedVariable,
            format!("variable '{}' is not defined", name),
        )
        .with_suggestion(suggestion))
    }

    fn try_extensions(&mut self, node: &Expr) -> Option<Result<Value, EvaluationError>> {
        let extensions = self.extensions?;
        if !extensions.has_evaluators() {
            return None;
        }
        let vars = self.vars;
        // The recurse callback gives handlers the full evaluator.
        extensions.evaluate(node, vars, &mut |e| self.eval(e))
    }

    // -------------------------------------------------------------------------
    // Function calls
    // -------------------------------------------------------------------------

    fn function_call(
        &mut self,
        node: &Expr,
        name: &str,
        args: &[Arc<Expr>],
        base: Option<&Expr>,
        param: Option<&Expr>,
    ) -> Result<Value, EvaluationError> {
        if let Some(result) = self.try_extensions(node) {
            return result;
        }
        if name == "laplacian" {
            return self.laplacian(&args[0]);
        }

        let values: Vec<Value> = args
            .iter()
            .map(|a| self.eval(a))
            .collect::<Result<_, _>>()?;
        let base_value = base.map(|b| self.eval(b)).transpose()?;
        let param_value = param.map(|p| self.eval(p)).transpose()?;

        let call = FunctionArgs {
            values: &values,
            base: base_value.as_ref(),
            param: param_value.as_ref(),
            real_only: self.options.real_only,
        };
        match functions::call(name, &call) {
            Some(result) => result,
            None => {
                let suggestion = suggest::did_you_mean(name, functions::names());
                Err(EvaluationError::new(
                    EvalErrorKind::Unsupported,
                    format!("unknown function '{}'", name),
                )
                .with_suggestion(suggestion))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Matrix powers
    // -------------------------------------------------------------------------

    /// `M^T` transposes, `M^{-1}` inverts, `M^n` repeats multiplication.
    fn matrix_power(
        &mut self,
        matrix: &[Vec<f64>],
        exponent: &Expr,
    ) -> Result<Value, EvaluationError> {
        if let ExprKind::Variable(name) = &exponent.kind {
            if name == "T" {
                return Ok(Value::Matrix(linalg::transpose(matrix)));
            }
        }
        let n = self.eval(exponent)?.as_number()?;
        if n == -1.0 {
            return Ok(Value::Matrix(linalg::inverse(matrix)?));
        }
        if n < 0.0 || n.fract() != 0.0 {
            return Err(EvaluationError::new(
                EvalErrorKind::DomainError,
                "matrix exponent must be -1, T, or a non-negative integer",
            ));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(Value::Matrix(linalg::matrix_pow(matrix, n as u32)?))
    }

    // -------------------------------------------------------------------------
    // Gradient and Laplacian
    // -------------------------------------------------------------------------

    fn gradient(
        &mut self,
        body: &Arc<Expr>,
        requested: Option<&[String]>,
    ) -> Result<Value, EvaluationError> {
        let names: Vec<String> = match requested {
            Some(names) => names.to_vec(),
            None => self.environment_vars_in(body),
        };
        if names.is_empty() {
            return Err(EvaluationError::new(
                EvalErrorKind::DomainError,
                "gradient target has no differentiable variables",
            ));
        }
        let mut components = Vec::with_capacity(names.len());
        for name in &names {
            let derivative =
                calculus::differentiate::differentiate(body, name, 1, self.caches.as_deref_mut())?;
            components.push(self.eval(&derivative)?.as_number()?);
        }
        Ok(Value::Vector(components))
    }

    fn laplacian(&mut self, body: &Arc<Expr>) -> Result<Value, EvaluationError> {
        let names = self.environment_vars_in(body);
        if names.is_empty() {
            return Err(EvaluationError::new(
                EvalErrorKind::DomainError,
                "laplacian target has no differentiable variables",
            ));
        }
        let mut total = 0.0;
        for name in &names {
            let second =
                calculus::differentiate::differentiate(body, name, 2, self.caches.as_deref_mut())?;
            total += self.eval(&second)?.as_number()?;
        }
        Ok(Value::Number(total))
    }

    /// Environment variables that actually occur in `body`, sorted for a
    /// deterministic component order.
    fn environment_vars_in(&self, body: &Expr) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .names()
            .filter(|name| body.contains_var(name))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    // -------------------------------------------------------------------------
    // Piecewise
    // -------------------------------------------------------------------------

    fn piecewise(&mut self, cases: &[PiecewiseCase]) -> Result<Value, EvaluationError> {
        let mut otherwise: Option<&PiecewiseCase> = None;
        for case in cases {
            match &case.condition {
                Some(condition) => {
                    if self.eval(condition)?.is_truthy() {
                        return self.eval(&case.value);
                    }
                }
                None => otherwise = Some(case),
            }
        }
        match otherwise {
            Some(case) => self.eval(&case.value),
            None => Ok(Value::Number(f64::NAN)),
        }
    }

    // -------------------------------------------------------------------------
    // L4 sub-expression cache
    // -------------------------------------------------------------------------

    /// Route an expensive node through the transient sub-expression cache.
    /// The key mixes the structural hash with the current local bindings so
    /// a loop body re-evaluated under a different index never aliases.
    fn cached_numeric(
        &mut self,
        expr: &Expr,
        compute: impl FnOnce(&mut Self) -> Result<Value, EvaluationError>,
    ) -> Result<Value, EvaluationError> {
        let key = self.sub_expression_key(expr);
        if let Some(caches) = self.caches.as_deref_mut() {
            if let Some(hit) = caches.get_sub_expression(key) {
                return Ok(Value::Number(hit));
            }
        }
        let value = compute(self)?;
        if let Value::Number(n) = &value {
            if let Some(caches) = self.caches.as_deref_mut() {
                caches.store_sub_expression(key, *n);
            }
        }
        Ok(value)
    }

    fn sub_expression_key(&self, expr: &Expr) -> u64 {
        let mut hasher = FxHasher::default();
        expr.structural_hash().hash(&mut hasher);
        for (name, value) in &self.locals {
            name.hash(&mut hasher);
            value.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

// =============================================================================
// Value-level helpers
// =============================================================================

/// `|x|`: scalar magnitude, complex modulus, vector norm, matrix
/// determinant, interval magnitude.
fn absolute(value: &Value) -> Result<Value, EvaluationError> {
    match value {
        Value::Number(n) => Ok(Value::Number(n.abs())),
        Value::Complex(c) => Ok(Value::Number(c.norm())),
        Value::Vector(v) => Ok(Value::Number(linalg::norm(v))),
        Value::Matrix(m) => Ok(Value::Number(linalg::determinant(m)?)),
        Value::Interval { lower, upper } => {
            let spans_zero = *lower <= 0.0 && *upper >= 0.0;
            let low = if spans_zero {
                0.0
            } else {
                lower.abs().min(upper.abs())
            };
            Ok(Value::Interval {
                lower: low,
                upper: lower.abs().max(upper.abs()),
            })
        }
        other => Err(EvaluationError::new(
            EvalErrorKind::TypeMismatch,
            format!("cannot take the absolute value of a {}", other.type_name()),
        )),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvaluationError> {
    if op == CompareOp::Member {
        let x = left.as_number()?;
        let (lower, upper) = right.as_interval()?;
        let (lo, hi) = if lower <= upper {
            (lower, upper)
        } else {
            (upper, lower)
        };
        return Ok(x >= lo && x <= hi);
    }

    let a = left.as_number()?;
    let b = right.as_number()?;
    Ok(match op {
        CompareOp::Less => a < b,
        CompareOp::Greater => a > b,
        CompareOp::LessEq => a <= b,
        CompareOp::GreaterEq => a >= b,
        CompareOp::Equal => a == b,
        CompareOp::Member => unreachable!("handled above"),
    })
}

/// `\binom{n}{k}` by the multiplicative formula; stays finite wherever the
/// result is representable.
fn binomial(n: f64, k: f64) -> Result<Value, EvaluationError> {
    if n.fract() != 0.0 || k.fract() != 0.0 {
        return Err(EvaluationError::new(
            EvalErrorKind::DomainError,
            "binomial coefficients require integer arguments",
        ));
    }
    if k < 0.0 || k > n || n < 0.0 {
        return Ok(Value::Number(0.0));
    }
    let k = k.min(n - k);
    let mut result = 1.0f64;
    let mut i = 1.0;
    while i <= k {
        result = result * (n - k + i) / i;
        i += 1.0;
    }
    Ok(Value::Number(result.round()))
}
