//! Implicit multiplication insertion
//!
//! Runs between the lexer and the parser: wherever a token that ends an
//! operand is followed by one that begins an operand, a synthetic `Multiply`
//! token is inserted. Insertion is the only change this pass makes, so the
//! parse of `2x` is the parse of `2*x`.
//!
//! One exception: `f(a, b)` — a variable directly followed by a
//! parenthesised list with a comma at depth 1 — is function application, not
//! a product, and no token is inserted there.

use crate::parser::tokens::{Token, TokenKind};

/// Insert synthetic `Multiply` tokens between juxtaposed operands.
pub(crate) fn insert_implicit_multiplication(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len() * 2);

    for (i, token) in tokens.iter().enumerate() {
        if let Some(prev) = out.last() {
            if prev.ends_operand()
                && token.starts_operand()
                && !is_function_application(&tokens, i)
            {
                out.push(Token::synthetic_multiply(token.offset));
            }
        }
        out.push(token.clone());
    }
    out
}

/// `tokens[at]` is the candidate right-hand token. Application holds when
/// the tokens before it spell a variable (with an optional `_subscript`)
/// and `tokens[at]` opens a parenthesised tail containing a comma at depth
/// 1 — commas nested deeper do not count.
fn is_function_application(tokens: &[Token], at: usize) -> bool {
    if tokens[at].kind != TokenKind::LParen {
        return false;
    }
    if !ends_with_callable_name(tokens, at) {
        return false;
    }

    let mut depth = 0usize;
    for token in &tokens[at..] {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return false;
                }
            }
            TokenKind::Comma if depth == 1 => return true,
            TokenKind::Eof => return false,
            _ => {}
        }
    }
    false
}

/// Whether `tokens[..at]` ends in `Variable`, `Variable _ tok`, or
/// `Variable _ { ... }` — the shapes the parser folds into one name.
fn ends_with_callable_name(tokens: &[Token], at: usize) -> bool {
    if at == 0 {
        return false;
    }
    let prev = at - 1;
    if tokens[prev].kind == TokenKind::Variable {
        // Either a bare variable, or the single-token subscript of one.
        if prev >= 2
            && tokens[prev - 1].kind == TokenKind::Underscore
            && tokens[prev - 2].kind == TokenKind::Variable
        {
            return true;
        }
        return true;
    }
    if tokens[prev].kind == TokenKind::Number
        && prev >= 2
        && tokens[prev - 1].kind == TokenKind::Underscore
        && tokens[prev - 2].kind == TokenKind::Variable
    {
        return true;
    }
    if tokens[prev].kind == TokenKind::RBrace {
        // Walk back over the braced subscript.
        let mut depth = 0usize;
        let mut i = prev;
        loop {
            match tokens[i].kind {
                TokenKind::RBrace => depth += 1,
                TokenKind::LBrace => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            if i == 0 {
                return false;
            }
            i -= 1;
        }
        return i >= 2
            && tokens[i - 1].kind == TokenKind::Underscore
            && tokens[i - 2].kind == TokenKind::Variable;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::{Lexer, LexerOptions};

    fn pass(src: &str) -> Vec<Token> {
        let tokens = Lexer::new(src, LexerOptions { split_letters: true }, None)
            .tokenize()
            .expect("lex");
        insert_implicit_multiplication(tokens)
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        pass(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn number_times_variable() {
        assert_eq!(
            kinds("2x"),
            vec![
                TokenKind::Number,
                TokenKind::Multiply,
                TokenKind::Variable,
                TokenKind::Eof
            ]
        );
        let tokens = pass("2x");
        assert!(tokens[1].synthetic);
    }

    #[test]
    fn no_insertion_around_operators() {
        assert_eq!(
            kinds("x + y"),
            vec![
                TokenKind::Variable,
                TokenKind::Plus,
                TokenKind::Variable,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn paren_juxtaposition() {
        // (x)(y) -> (x) * (y)
        let ks = kinds("(x)(y)");
        assert_eq!(ks[3], TokenKind::Multiply);
    }

    #[test]
    fn function_application_is_not_a_product() {
        // f(a, b): comma at depth 1 suppresses the synthetic token.
        let ks = kinds("f(a, b)");
        assert_eq!(ks[1], TokenKind::LParen);
    }

    #[test]
    fn nested_commas_do_not_suppress() {
        // x((a, b)): the comma sits at depth 2, so this is a product.
        let ks = kinds("x((a, b))");
        assert_eq!(ks[1], TokenKind::Multiply);
    }

    #[test]
    fn variable_before_function_command() {
        // 2\sin(x) -> 2 * sin(x)
        let ks = kinds("2\\sin(x)");
        assert_eq!(ks[1], TokenKind::Multiply);
        assert_eq!(ks[2], TokenKind::Function);
    }

    #[test]
    fn closing_pipe_then_operand() {
        // |x|y -> |x| * y
        let ks = kinds("|x|y");
        assert_eq!(
            ks,
            vec![
                TokenKind::Pipe,
                TokenKind::Variable,
                TokenKind::Pipe,
                TokenKind::Multiply,
                TokenKind::Variable,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operand_then_opening_pipe() {
        // 2|x| -> 2 * |x|
        let ks = kinds("2|x|");
        assert_eq!(ks[1], TokenKind::Multiply);
    }
}
