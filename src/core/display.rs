//! Canonical LaTeX printing for expressions
//!
//! `Display` renders an [`Expr`] back into the LaTeX subset the parser
//! accepts. The printer is canonical: re-parsing its output yields a
//! structurally equivalent tree. Multiplication is always explicit
//! (`\cdot`), powers brace both sides, and calculus bodies are
//! parenthesised so precedence survives the trip.

use std::fmt;

use crate::ast::{BinaryOp, CompareOp, Expr, ExprKind, UnaryOp};
use crate::parser::commands;

// Precedence levels used to decide parenthesisation.
const PREC_LOWEST: u8 = 0;
const PREC_CMP: u8 = 1;
const PREC_ADD: u8 = 2;
const PREC_MUL: u8 = 3;
const PREC_UNARY: u8 = 4;

impl Expr {
    /// Render as canonical LaTeX.
    pub fn to_latex(&self) -> String {
        self.to_string()
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        let own = self.precedence();
        if own < parent {
            write!(f, "(")?;
            self.fmt_inner(f)?;
            write!(f, ")")
        } else {
            self.fmt_inner(f)
        }
    }

    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Binary { op, .. } => match op {
                BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
                BinaryOp::Mul => PREC_MUL,
                // \frac and {..}^{..} brace their operands; nothing to protect.
                BinaryOp::Div | BinaryOp::Pow => u8::MAX,
            },
            ExprKind::Unary { .. } => PREC_UNARY,
            ExprKind::Comparison { .. } | ExprKind::ChainedComparison { .. } => PREC_CMP,
            ExprKind::Assignment { .. } | ExprKind::FunctionDefinition { .. } => PREC_LOWEST,
            _ => u8::MAX,
        }
    }

    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Number(n) => fmt_number(f, *n),
            ExprKind::Variable(name) => fmt_variable(f, name),
            ExprKind::Binary {
                op, left, right, ..
            } => self.fmt_binary(f, *op, left, right),
            ExprKind::Unary { op, operand } => {
                let UnaryOp::Negate = op;
                write!(f, "-")?;
                operand.fmt_prec(f, PREC_UNARY)
            }
            ExprKind::Abs(inner) => {
                write!(f, "|")?;
                inner.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "|")
            }
            ExprKind::FunctionCall {
                name,
                args,
                base,
                param,
            } => {
                if name == "laplacian" {
                    write!(f, "\\nabla^{{2}} (")?;
                    args[0].fmt_prec(f, PREC_LOWEST)?;
                    return write!(f, ")");
                }
                if commands::is_function_command(name) {
                    write!(f, "\\{}", name)?;
                } else {
                    // User function-like call: `f(x, y)` re-lexes as one.
                    write!(f, "{}", LatexName(name))?;
                }
                if let Some(p) = param {
                    write!(f, "[")?;
                    p.fmt_prec(f, PREC_LOWEST)?;
                    write!(f, "]")?;
                }
                if let Some(b) = base {
                    write!(f, "_{{")?;
                    b.fmt_prec(f, PREC_LOWEST)?;
                    write!(f, "}}")?;
                }
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    arg.fmt_prec(f, PREC_LOWEST)?;
                }
                write!(f, ")")
            }
            ExprKind::Limit { var, target, body } => {
                write!(f, "\\lim_{{{} \\to ", LatexName(var))?;
                target.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}} (")?;
                body.fmt_prec(f, PREC_LOWEST)?;
                write!(f, ")")
            }
            ExprKind::SumSeries {
                var,
                start,
                end,
                body,
            } => fmt_series(f, "sum", var, start, end, body),
            ExprKind::ProductSeries {
                var,
                start,
                end,
                body,
            } => fmt_series(f, "prod", var, start, end, body),
            ExprKind::Integral {
                lower,
                upper,
                body,
                var,
                closed,
            } => {
                write!(f, "\\{}", if *closed { "oint" } else { "int" })?;
                fmt_bounds(f, lower.as_deref(), upper.as_deref())?;
                write!(f, " (")?;
                body.fmt_prec(f, PREC_LOWEST)?;
                write!(f, ") d{}", LatexName(var))
            }
            ExprKind::MultiIntegral {
                order,
                lower,
                upper,
                body,
                vars,
            } => {
                write!(f, "\\{}", if *order == 2 { "iint" } else { "iiint" })?;
                fmt_bounds(f, lower.as_deref(), upper.as_deref())?;
                write!(f, " (")?;
                body.fmt_prec(f, PREC_LOWEST)?;
                write!(f, ")")?;
                for v in vars {
                    write!(f, " d{}", LatexName(v))?;
                }
                Ok(())
            }
            ExprKind::Derivative { body, var, order } => {
                if *order == 1 {
                    write!(f, "\\frac{{d}}{{d{}}} (", LatexName(var))?;
                } else {
                    write!(
                        f,
                        "\\frac{{d^{{{o}}}}}{{d{v}^{{{o}}}}} (",
                        o = order,
                        v = LatexName(var)
                    )?;
                }
                body.fmt_prec(f, PREC_LOWEST)?;
                write!(f, ")")
            }
            ExprKind::PartialDerivative { body, var, order } => {
                if *order == 1 {
                    write!(f, "\\frac{{\\partial}}{{\\partial {}}} (", LatexName(var))?;
                } else {
                    write!(
                        f,
                        "\\frac{{\\partial^{{{o}}}}}{{\\partial {v}^{{{o}}}}} (",
                        o = order,
                        v = LatexName(var)
                    )?;
                }
                body.fmt_prec(f, PREC_LOWEST)?;
                write!(f, ")")
            }
            ExprKind::Gradient { body, .. } => {
                write!(f, "\\nabla (")?;
                body.fmt_prec(f, PREC_LOWEST)?;
                write!(f, ")")
            }
            ExprKind::Binom { n, k } => {
                write!(f, "\\binom{{")?;
                n.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}{{")?;
                k.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}")
            }
            ExprKind::Comparison { op, left, right } => {
                left.fmt_prec(f, PREC_ADD)?;
                write!(f, " {} ", cmp_symbol(*op))?;
                right.fmt_prec(f, PREC_ADD)
            }
            ExprKind::ChainedComparison { exprs, ops } => {
                exprs[0].fmt_prec(f, PREC_ADD)?;
                for (op, e) in ops.iter().zip(exprs.iter().skip(1)) {
                    write!(f, " {} ", cmp_symbol(*op))?;
                    e.fmt_prec(f, PREC_ADD)?;
                }
                Ok(())
            }
            ExprKind::Conditional { value, condition } => {
                write!(f, "{{")?;
                value.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}{{")?;
                condition.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}")
            }
            ExprKind::Piecewise { cases } => {
                write!(f, "\\begin{{cases}} ")?;
                for (i, case) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, " \\\\ ")?;
                    }
                    case.value.fmt_prec(f, PREC_LOWEST)?;
                    write!(f, " & ")?;
                    match &case.condition {
                        Some(cond) => cond.fmt_prec(f, PREC_LOWEST)?,
                        None => write!(f, "\\text{{otherwise}}")?,
                    }
                }
                write!(f, " \\end{{cases}}")
            }
            ExprKind::Matrix { rows } => {
                write!(f, "\\begin{{pmatrix}} ")?;
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        write!(f, " \\\\ ")?;
                    }
                    for (j, cell) in row.iter().enumerate() {
                        if j > 0 {
                            write!(f, " & ")?;
                        }
                        cell.fmt_prec(f, PREC_LOWEST)?;
                    }
                }
                write!(f, " \\end{{pmatrix}}")
            }
            ExprKind::Vector { components, unit } => {
                write!(f, "\\{}{{", if *unit { "hat" } else { "vec" })?;
                for (i, c) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    c.fmt_prec(f, PREC_LOWEST)?;
                }
                write!(f, "}}")
            }
            ExprKind::Interval { lower, upper } => {
                write!(f, "[")?;
                lower.fmt_prec(f, PREC_LOWEST)?;
                write!(f, ", ")?;
                upper.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "]")
            }
            ExprKind::Assignment { name, value } => {
                write!(f, "let {} = ", LatexName(name))?;
                value.fmt_prec(f, PREC_CMP)
            }
            ExprKind::FunctionDefinition { name, params, body } => {
                write!(f, "{}(", LatexName(name))?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", LatexName(p))?;
                }
                write!(f, ") = ")?;
                body.fmt_prec(f, PREC_CMP)
            }
        }
    }

    fn fmt_binary(
        &self,
        f: &mut fmt::Formatter<'_>,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> fmt::Result {
        match op {
            BinaryOp::Add => {
                left.fmt_prec(f, PREC_ADD)?;
                write!(f, " + ")?;
                // Right side may be Add again; same level keeps it unparenthesised.
                right.fmt_prec(f, PREC_ADD)
            }
            BinaryOp::Sub => {
                left.fmt_prec(f, PREC_ADD)?;
                write!(f, " - ")?;
                // a - (b + c): the right side must bind tighter than +.
                right.fmt_prec(f, PREC_MUL)
            }
            BinaryOp::Mul => {
                let symbol = match &self.kind {
                    ExprKind::Binary {
                        source_command: Some(cmd),
                        ..
                    } if cmd == "times" => "\\times",
                    _ => "\\cdot",
                };
                left.fmt_prec(f, PREC_MUL)?;
                write!(f, " {} ", symbol)?;
                right.fmt_prec(f, PREC_UNARY)
            }
            BinaryOp::Div => {
                write!(f, "\\frac{{")?;
                left.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}{{")?;
                right.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}")
            }
            BinaryOp::Pow => {
                write!(f, "{{")?;
                left.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}^{{")?;
                right.fmt_prec(f, PREC_LOWEST)?;
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, PREC_LOWEST)
    }
}

fn fmt_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_infinite() {
        return write!(f, "{}\\infty", if n < 0.0 { "-" } else { "" });
    }
    write!(f, "{}", n)
}

/// A variable name rendered back into lexable LaTeX: Greek names and named
/// constants get their backslash back, subscripted composites get `_{...}`,
/// font-decorated names get their font command, and multi-letter names that
/// came from `\text{...}` are wrapped again.
struct LatexName<'a>(&'a str);

impl fmt::Display for LatexName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_variable(f, self.0)
    }
}

fn fmt_variable(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if let Some((font, rest)) = name.split_once(':') {
        if commands::is_font_command(font) {
            return write!(f, "\\{}{{{}}}", font, rest);
        }
    }
    if let Some((head, sub)) = name.split_once('_') {
        fmt_bare_name(f, head)?;
        return write!(f, "_{{{}}}", sub);
    }
    fmt_bare_name(f, name)
}

fn fmt_bare_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if name.chars().count() == 1 {
        return f.write_str(name);
    }
    if commands::is_symbol_name(name) {
        return write!(f, "\\{}", name);
    }
    write!(f, "\\text{{{}}}", name)
}

fn fmt_bounds(
    f: &mut fmt::Formatter<'_>,
    lower: Option<&Expr>,
    upper: Option<&Expr>,
) -> fmt::Result {
    if let Some(lo) = lower {
        write!(f, "_{{")?;
        lo.fmt_prec(f, PREC_LOWEST)?;
        write!(f, "}}")?;
    }
    if let Some(hi) = upper {
        write!(f, "^{{")?;
        hi.fmt_prec(f, PREC_LOWEST)?;
        write!(f, "}}")?;
    }
    Ok(())
}

fn fmt_series(
    f: &mut fmt::Formatter<'_>,
    command: &str,
    var: &str,
    start: &Expr,
    end: &Expr,
    body: &Expr,
) -> fmt::Result {
    write!(f, "\\{}_{{{} = ", command, LatexName(var))?;
    start.fmt_prec(f, PREC_LOWEST)?;
    write!(f, "}}^{{")?;
    end.fmt_prec(f, PREC_LOWEST)?;
    write!(f, "}} (")?;
    body.fmt_prec(f, PREC_LOWEST)?;
    write!(f, ")")
}

fn cmp_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Less => "<",
        CompareOp::Greater => ">",
        CompareOp::LessEq => "\\leq",
        CompareOp::GreaterEq => "\\geq",
        CompareOp::Equal => "=",
        CompareOp::Member => "\\in",
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinaryOp, Expr};

    #[test]
    fn prints_explicit_multiplication() {
        let e = Expr::binary(BinaryOp::Mul, Expr::number(2.0), Expr::variable("x"));
        assert_eq!(e.to_latex(), "2 \\cdot x");
    }

    #[test]
    fn power_braces_both_sides() {
        let e = Expr::binary(
            BinaryOp::Pow,
            Expr::binary(BinaryOp::Add, Expr::variable("x"), Expr::number(1.0)),
            Expr::number(2.0),
        );
        assert_eq!(e.to_latex(), "{x + 1}^{2}");
    }

    #[test]
    fn division_prints_as_frac() {
        let e = Expr::binary(BinaryOp::Div, Expr::number(1.0), Expr::number(2.0));
        assert_eq!(e.to_latex(), "\\frac{1}{2}");
    }

    #[test]
    fn greek_names_keep_their_backslash() {
        let e = Expr::variable("alpha");
        assert_eq!(e.to_latex(), "\\alpha");
    }

    #[test]
    fn subscripted_names_rebuild_subscripts() {
        let e = Expr::variable("R_crit");
        assert_eq!(e.to_latex(), "R_{crit}");
    }
}
