//! The `Texpr` facade
//!
//! One instance owns its lexer/parser configuration, its extension
//! registry, and its four cache layers. Methods take `&mut self`: the
//! caches use unsynchronised collections, so exclusive access is the
//! contract — multi-threaded embedders instantiate one `Texpr` per worker.

use std::sync::Arc;

use crate::ast::Expr;
use crate::cache::keys::Variables;
use crate::cache::{CacheConfig, CacheManager, CacheStatistics};
use crate::calculus;
use crate::core::error::{EvalErrorKind, EvaluationError, TexprError};
use crate::core::value::Value;
use crate::evaluator::{EvalOptions, Evaluator};
use crate::extensions::ExtensionRegistry;
use crate::parser::{self, ParseOptions};

/// Facade configuration, builder style.
#[derive(Debug)]
pub struct TexprConfig {
    /// Insert multiplication between juxtaposed operands (default true).
    pub allow_implicit_multiplication: bool,
    /// Parser and evaluator recursion ceiling (default 500).
    pub max_recursion_depth: u32,
    /// Domain-restricted operations return NaN instead of complex results
    /// (default false).
    pub real_only: bool,
    /// Cache layer configuration.
    pub cache: CacheConfig,
    /// Optional extension registry, consumed by the instance.
    pub extensions: Option<ExtensionRegistry>,
}

impl Default for TexprConfig {
    fn default() -> Self {
        TexprConfig {
            allow_implicit_multiplication: true,
            max_recursion_depth: crate::DEFAULT_MAX_RECURSION_DEPTH,
            real_only: false,
            cache: CacheConfig::default(),
            extensions: None,
        }
    }
}

impl TexprConfig {
    /// Start from the defaults.
    pub fn new() -> Self {
        TexprConfig::default()
    }

    /// Toggle implicit multiplication.
    pub fn allow_implicit_multiplication(mut self, on: bool) -> Self {
        self.allow_implicit_multiplication = on;
        self
    }

    /// Set the recursion ceiling for both parsing and evaluation.
    pub fn max_recursion_depth(mut self, depth: u32) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Toggle real-only evaluation.
    pub fn real_only(mut self, on: bool) -> Self {
        self.real_only = on;
        self
    }

    /// Replace the cache configuration.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Attach an extension registry.
    pub fn extensions(mut self, registry: ExtensionRegistry) -> Self {
        self.extensions = Some(registry);
        self
    }
}

/// Result of [`Texpr::validate`]: never an `Err`, always the full error
/// list the recovery parser collected.
#[derive(Debug)]
pub struct ValidationResult {
    /// True when the source parsed without any error.
    pub is_valid: bool,
    /// Every error collected in recovery mode.
    pub errors: Vec<TexprError>,
    /// The (possibly sentinel-carrying) tree, when one could be built.
    pub ast: Option<Arc<Expr>>,
}

/// LaTeX expression parser and evaluator.
///
/// # Example
///
/// ```
/// use texpr::{Texpr, Variables};
///
/// let mut texpr = Texpr::new();
/// let vars: Variables = [("x", 3.0), ("y", 4.0)].into_iter().collect();
/// let result = texpr.evaluate("\\sqrt{x^2 + y^2}", &vars).unwrap();
/// assert_eq!(result.as_number().unwrap(), 5.0);
/// ```
pub struct Texpr {
    config: TexprConfig,
    caches: CacheManager,
}

impl Default for Texpr {
    fn default() -> Self {
        Texpr::new()
    }
}

impl Texpr {
    /// An instance with the default configuration.
    pub fn new() -> Self {
        Texpr::with_config(TexprConfig::default())
    }

    /// An instance with an explicit configuration.
    pub fn with_config(config: TexprConfig) -> Self {
        let caches = CacheManager::new(&config.cache);
        Texpr { config, caches }
    }

    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            implicit_multiplication: self.config.allow_implicit_multiplication,
            max_recursion_depth: self.config.max_recursion_depth as usize,
        }
    }

    fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            real_only: self.config.real_only,
            max_recursion_depth: self.config.max_recursion_depth as usize,
        }
    }

    // -------------------------------------------------------------------------
    // Parsing
    // -------------------------------------------------------------------------

    /// Parse `source` into an AST, consulting the L1 parse cache first.
    pub fn parse(&mut self, source: &str) -> Result<Arc<Expr>, TexprError> {
        if let Some(hit) = self.caches.get_parsed(source) {
            return Ok(hit);
        }
        let ast = parser::parse_source(source, self.parse_options(), self.config.extensions.as_ref())?;
        self.caches.store_parsed(source, Arc::clone(&ast));
        Ok(ast)
    }

    /// Parse with recovery and report every error; never fails.
    pub fn validate(&mut self, source: &str) -> ValidationResult {
        let (ast, errors) = parser::parse_source_recovering(
            source,
            self.parse_options(),
            self.config.extensions.as_ref(),
        );
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            ast,
        }
    }

    /// Whether `source` parses cleanly.
    pub fn is_valid(&mut self, source: &str) -> bool {
        self.validate(source).is_valid
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    /// Parse (through L1) and evaluate (through L2) in one call.
    pub fn evaluate(&mut self, source: &str, vars: &Variables) -> Result<Value, TexprError> {
        let ast = self.parse(source)?;
        self.evaluate_parsed(&ast, vars)
    }

    /// Evaluate an already-parsed tree against `vars`, consulting the L2
    /// evaluation cache first. The transient L4 sub-expression entries are
    /// released before this returns.
    pub fn evaluate_parsed(
        &mut self,
        ast: &Arc<Expr>,
        vars: &Variables,
    ) -> Result<Value, TexprError> {
        if let Some(hit) = self.caches.get_eval(ast, vars) {
            return Ok(hit);
        }
        let options = self.eval_options();
        let result = {
            let mut evaluator = Evaluator::new(
                options,
                vars,
                self.config.extensions.as_ref(),
                Some(&mut self.caches),
            );
            evaluator.eval(ast)
        };
        self.caches.end_evaluation();
        let value = result?;
        self.caches.store_eval(ast, vars, value.clone());
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Calculus entry points
    // -------------------------------------------------------------------------

    /// Differentiate `source` with respect to `var`, `order` times.
    pub fn differentiate(
        &mut self,
        source: &str,
        var: &str,
        order: u32,
    ) -> Result<Arc<Expr>, TexprError> {
        let ast = self.parse(source)?;
        self.differentiate_parsed(&ast, var, order)
    }

    /// Differentiate a parsed tree; the L3 cache serves repeated requests.
    pub fn differentiate_parsed(
        &mut self,
        ast: &Arc<Expr>,
        var: &str,
        order: u32,
    ) -> Result<Arc<Expr>, TexprError> {
        let derivative =
            calculus::differentiate::differentiate(ast, var, order, Some(&mut self.caches))?;
        Ok(derivative)
    }

    /// Symbolic antiderivative of `source` in `var`. Only the recognised
    /// class (polynomials, linearity, constant multiples, `exp`/`sin`/`cos`
    /// of a linear argument) succeeds; anything else is `SymbolicOnly`.
    pub fn integrate(&mut self, source: &str, var: &str) -> Result<Arc<Expr>, TexprError> {
        let ast = self.parse(source)?;
        self.integrate_parsed(&ast, var)
    }

    /// Symbolic antiderivative of a parsed tree.
    pub fn integrate_parsed(
        &mut self,
        ast: &Arc<Expr>,
        var: &str,
    ) -> Result<Arc<Expr>, TexprError> {
        match calculus::integrate::antiderivative(ast, var) {
            Some(anti) => Ok(Arc::new(anti)),
            None => Err(EvaluationError::new(
                EvalErrorKind::SymbolicOnly,
                "integrand is outside the symbolic class",
            )
            .into()),
        }
    }

    // -------------------------------------------------------------------------
    // Cache maintenance
    // -------------------------------------------------------------------------

    /// Drop every cached entry in all four layers.
    pub fn clear_all_caches(&mut self) {
        self.caches.clear_all();
    }

    /// Drop the L1 parse cache only.
    pub fn clear_parsed_expression_cache(&mut self) {
        self.caches.clear_parse();
    }

    /// Pre-parse a batch of sources into the L1 cache. Sources that fail
    /// to parse are skipped.
    pub fn warm_up_cache<'s>(&mut self, sources: impl IntoIterator<Item = &'s str>) {
        for source in sources {
            drop(self.parse(source));
        }
    }

    /// Purge entries whose TTL has lapsed, in every layer.
    pub fn remove_expired_cache_entries(&mut self) {
        self.caches.remove_expired();
    }

    /// Per-layer hit/miss/eviction counters (all zero unless
    /// `collect_statistics` is set in the cache configuration).
    pub fn cache_statistics(&self) -> CacheStatistics {
        self.caches.statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cache_returns_the_same_root() {
        let mut texpr = Texpr::new();
        let a = texpr.parse("x + 1").unwrap();
        let b = texpr.parse("x + 1").unwrap();
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn evaluation_cache_hits_with_a_reused_environment() {
        let mut texpr = Texpr::with_config(TexprConfig::new().cache(CacheConfig::with_statistics()));
        let vars: Variables = [("x", 2.0)].into_iter().collect();
        let first = texpr.evaluate("x^2 + 1", &vars).unwrap();
        let second = texpr.evaluate("x^2 + 1", &vars).unwrap();
        assert_eq!(first, second);
        assert!(texpr.cache_statistics().evaluation.hits >= 1);
    }

    #[test]
    fn constant_sub_cache_serves_empty_environments() {
        let mut texpr = Texpr::with_config(TexprConfig::new().cache(CacheConfig::with_statistics()));
        let empty = Variables::new();
        drop(texpr.evaluate("2 + 3", &empty).unwrap());
        // A fresh empty environment still hits: the key is the AST id,
        // and L1 returns the shared root.
        let other = Variables::new();
        drop(texpr.evaluate("2 + 3", &other).unwrap());
        assert!(texpr.cache_statistics().evaluation.hits >= 1);
    }

    #[test]
    fn validate_never_fails() {
        let mut texpr = Texpr::new();
        let report = texpr.validate("\\frac{1}{");
        assert!(!report.is_valid);
        assert!(!report.errors.is_empty());
        assert!(texpr.is_valid("1 + 1"));
    }

    #[test]
    fn disabled_caches_still_evaluate() {
        let mut texpr = Texpr::with_config(TexprConfig::new().cache(CacheConfig::disabled()));
        let vars: Variables = [("x", 2.0)].into_iter().collect();
        assert_eq!(
            texpr.evaluate("2x", &vars).unwrap(),
            Value::Number(4.0)
        );
    }

    #[test]
    fn warm_up_populates_l1() {
        let mut texpr = Texpr::with_config(TexprConfig::new().cache(CacheConfig::with_statistics()));
        texpr.warm_up_cache(["x + 1", "x + 2", "not ) valid ("]);
        drop(texpr.parse("x + 1").unwrap());
        assert!(texpr.cache_statistics().parse.hits >= 1);
    }

    #[test]
    fn real_only_mode_keeps_sqrt_real() {
        let mut texpr = Texpr::with_config(TexprConfig::new().real_only(true));
        let empty = Variables::new();
        let v = texpr.evaluate("\\sqrt{-4}", &empty).unwrap();
        assert!(matches!(v, Value::Number(n) if n.is_nan()));

        let mut texpr = Texpr::new();
        let v = texpr.evaluate("\\sqrt{-4}", &empty).unwrap();
        assert!(matches!(v, Value::Complex(_)));
    }

    #[test]
    fn extension_commands_and_evaluators() {
        use crate::parser::tokens::Token;

        let mut registry = ExtensionRegistry::new();
        registry.register_command("answer", |_, offset| {
            Some(Token::number("42", 42.0, offset))
        });
        registry.register_evaluator(|expr, _, recurse| match &expr.kind {
            crate::ast::ExprKind::FunctionCall { name, args, .. } if name == "g" => {
                let inner = match recurse(&args[0]) {
                    Ok(v) => v,
                    Err(e) => return Some(Err(e)),
                };
                let doubled = inner.as_number().map(|n| Value::Number(2.0 * n));
                Some(doubled)
            }
            _ => None,
        });

        let mut texpr = Texpr::with_config(TexprConfig::new().extensions(registry));
        let empty = Variables::new();
        assert_eq!(
            texpr.evaluate("\\answer + 1", &empty).unwrap(),
            Value::Number(43.0)
        );
        assert_eq!(
            texpr.evaluate("g(3, 3)", &empty).unwrap(),
            Value::Number(6.0)
        );
    }
}
