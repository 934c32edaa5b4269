//! The LaTeX command table
//!
//! Every `\command` the lexer accepts resolves here. The table is built once
//! behind a `OnceLock` and keyed by the textual command name; the lexer and
//! the suggestion machinery both read it.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::parser::tokens::TokenKind;

/// What a recognised command means to the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// A known function: emits a `Function` token with the canonical name.
    Function,
    /// A structural command with a dedicated token kind (`\frac`, `\lim`).
    Structural(TokenKind),
    /// An operator spelling (`\cdot`, `\leq`); the lexeme keeps the command
    /// name so the parser can preserve it as `source_command`.
    Operator(TokenKind),
    /// A Greek letter: emits a `Variable` token with the command name.
    Greek,
    /// A named constant (`\pi`): emits a `Constant` token.
    Constant,
    /// Sizing and spacing commands, recognised and discarded.
    Discard,
}

/// Functions the lexer recognises by name.
const FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "cot", "sec", "csc", "arcsin", "arccos", "arctan", "asin", "acos",
    "atan", "sinh", "cosh", "tanh", "coth", "ln", "log", "lg", "exp", "min", "max", "det", "tr",
    "trace", "transpose", "norm", "cross", "sgn", "floor", "ceil", "round", "vec", "hat", "dot",
    "ddot", "bar", "factorial", "fibonacci", "Gamma",
];

/// Greek letters that lex as variables.
const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "varepsilon", "zeta", "eta", "theta",
    "vartheta", "iota", "kappa", "lambda", "mu", "nu", "xi", "rho", "varrho", "sigma", "tau",
    "upsilon", "phi", "varphi", "chi", "psi", "omega", "Delta", "Theta", "Lambda", "Xi", "Sigma",
    "Upsilon", "Phi", "Psi", "Omega",
];

/// Font commands: `\mathbf{E}` lexes as a decorated variable.
const FONTS: &[&str] = &["mathbf", "mathrm", "mathit", "mathcal", "boldsymbol"];

/// Sizing and spacing commands, recognised and dropped.
const DISCARDED: &[&str] = &[
    "left", "right", "big", "Big", "bigg", "Bigg", "quad", "qquad", "displaystyle",
];

fn build_table() -> FxHashMap<&'static str, Command> {
    let mut table = FxHashMap::default();

    for name in FUNCTIONS {
        table.insert(*name, Command::Function);
    }
    for name in GREEK {
        table.insert(*name, Command::Greek);
    }
    for name in FONTS {
        table.insert(*name, Command::Structural(TokenKind::FontCommand));
    }
    for name in DISCARDED {
        table.insert(*name, Command::Discard);
    }

    table.insert("pi", Command::Constant);
    table.insert("hbar", Command::Constant);

    table.insert("cdot", Command::Operator(TokenKind::Multiply));
    table.insert("times", Command::Operator(TokenKind::Multiply));
    table.insert("div", Command::Operator(TokenKind::Divide));
    table.insert("leq", Command::Operator(TokenKind::LessEq));
    table.insert("le", Command::Operator(TokenKind::LessEq));
    table.insert("geq", Command::Operator(TokenKind::GreaterEq));
    table.insert("ge", Command::Operator(TokenKind::GreaterEq));
    table.insert("lt", Command::Operator(TokenKind::Less));
    table.insert("gt", Command::Operator(TokenKind::Greater));
    table.insert("in", Command::Operator(TokenKind::Member));

    table.insert("frac", Command::Structural(TokenKind::Frac));
    table.insert("sqrt", Command::Structural(TokenKind::Sqrt));
    table.insert("binom", Command::Structural(TokenKind::Binom));
    table.insert("begin", Command::Structural(TokenKind::Begin));
    table.insert("end", Command::Structural(TokenKind::End));
    table.insert("to", Command::Structural(TokenKind::To));
    table.insert("lim", Command::Structural(TokenKind::Lim));
    table.insert("sum", Command::Structural(TokenKind::Sum));
    table.insert("prod", Command::Structural(TokenKind::Prod));
    table.insert("int", Command::Structural(TokenKind::Int));
    table.insert("iint", Command::Structural(TokenKind::IInt));
    table.insert("iiint", Command::Structural(TokenKind::IIIInt));
    table.insert("oint", Command::Structural(TokenKind::OInt));
    table.insert("partial", Command::Structural(TokenKind::Partial));
    table.insert("nabla", Command::Structural(TokenKind::Nabla));
    table.insert("infty", Command::Structural(TokenKind::Infty));
    table.insert("text", Command::Structural(TokenKind::Text));

    table
}

fn table() -> &'static FxHashMap<&'static str, Command> {
    static TABLE: OnceLock<FxHashMap<&'static str, Command>> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Resolve a command name.
pub(crate) fn lookup(name: &str) -> Option<Command> {
    table().get(name).copied()
}

/// Every command name, for "did you mean" suggestions.
pub(crate) fn command_names() -> impl Iterator<Item = &'static str> {
    table().keys().copied()
}

/// Whether `name` is a font command (`mathbf`, ...).
pub(crate) fn is_font_command(name: &str) -> bool {
    FONTS.contains(&name)
}

/// Whether `name` lexes as a `Function` token (used by the canonical
/// printer to decide between `\sin(...)` and a bare `f(...)`).
pub(crate) fn is_function_command(name: &str) -> bool {
    matches!(lookup(name), Some(Command::Function))
}

/// Whether a multi-letter variable name has a backslash spelling the lexer
/// would accept (`alpha`, `pi`, `infty`). Used by the canonical printer.
pub(crate) fn is_symbol_name(name: &str) -> bool {
    GREEK.contains(&name) || matches!(name, "pi" | "hbar" | "infty")
}

/// Map a recognised Unicode math codepoint to its command-table name.
pub(crate) fn unicode_letter(c: char) -> Option<&'static str> {
    Some(match c {
        'α' => "alpha",
        'β' => "beta",
        'γ' => "gamma",
        'δ' => "delta",
        'ε' => "epsilon",
        'ζ' => "zeta",
        'η' => "eta",
        'θ' => "theta",
        'ι' => "iota",
        'κ' => "kappa",
        'λ' => "lambda",
        'μ' => "mu",
        'ν' => "nu",
        'ξ' => "xi",
        'ρ' => "rho",
        'σ' => "sigma",
        'τ' => "tau",
        'υ' => "upsilon",
        'φ' => "phi",
        'χ' => "chi",
        'ψ' => "psi",
        'ω' => "omega",
        'Δ' => "Delta",
        'Θ' => "Theta",
        'Λ' => "Lambda",
        'Ξ' => "Xi",
        'Σ' => "Sigma",
        'Φ' => "Phi",
        'Ψ' => "Psi",
        'Ω' => "Omega",
        _ => return None,
    })
}
