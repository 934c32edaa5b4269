//! Built-in mathematical and physical constants
//!
//! Consulted after the caller environment and before the imaginary unit:
//! a user binding for `pi` shadows the table. The table is immutable and
//! initialised once.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

static CONSTANTS: LazyLock<FxHashMap<&'static str, f64>> = LazyLock::new(|| {
    let mut table = FxHashMap::default();
    table.insert("pi", std::f64::consts::PI);
    table.insert("e", std::f64::consts::E);
    table.insert("tau", std::f64::consts::TAU);
    // Golden ratio, both spellings.
    table.insert("phi", 1.618_033_988_749_895_f64);
    table.insert("varphi", 1.618_033_988_749_895_f64);
    // Euler–Mascheroni.
    table.insert("gamma", 0.577_215_664_901_532_9_f64);
    // Omega constant: Omega * e^Omega = 1.
    table.insert("Omega", 0.567_143_290_409_783_8_f64);
    // Feigenbaum delta.
    table.insert("delta", 4.669_201_609_102_99_f64);
    // Apery's constant zeta(3).
    table.insert("zeta3", 1.202_056_903_159_594_3_f64);
    // Gravitational constant (CODATA 2018).
    table.insert("G", 6.674_30e-11);
    // Reduced Planck constant.
    table.insert("hbar", 1.054_571_817e-34);
    table.insert("infty", f64::INFINITY);
    table.insert("sqrt2", std::f64::consts::SQRT_2);
    table.insert("sqrt3", 1.732_050_807_568_877_2_f64);
    table.insert("ln2", std::f64::consts::LN_2);
    table.insert("ln10", std::f64::consts::LN_10);
    table
});

/// The value of a built-in constant, if `name` is one.
pub(crate) fn value(name: &str) -> Option<f64> {
    CONSTANTS.get(name).copied()
}

/// Constant names, for "did you mean" suggestions.
pub(crate) fn names() -> impl Iterator<Item = &'static str> {
    CONSTANTS.keys().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn familiar_values() {
        assert_eq!(value("pi"), Some(std::f64::consts::PI));
        assert_eq!(value("e"), Some(std::f64::consts::E));
        assert!(value("infty").is_some_and(f64::is_infinite));
        assert_eq!(value("nope"), None);
    }

    #[test]
    fn phi_satisfies_its_equation() {
        let phi = value("phi").unwrap();
        assert!((phi * phi - phi - 1.0).abs() < 1e-12);
    }
}
