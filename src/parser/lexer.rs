//! Single-pass, context-sensitive scanner
//!
//! One left-to-right pass, no backtracking: at each position whitespace is
//! skipped and the first character decides the branch. Backslash commands
//! resolve through the command table (extensions are consulted before the
//! unknown-command error), pipes are classified opening/closing by position,
//! and sizing/spacing commands are recognised and dropped.

use crate::core::error::{LexicalError, LexicalErrorKind};
use crate::core::suggest;
use crate::extensions::ExtensionRegistry;
use crate::parser::commands::{self, Command};
use crate::parser::tokens::{Token, TokenKind};

/// Scanner configuration; mirrors the facade options the lexer cares about.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LexerOptions {
    /// When false, alphabetic runs coalesce into one `Variable` token
    /// instead of splitting into single letters.
    pub split_letters: bool,
}

pub(crate) struct Lexer<'src> {
    src: &'src str,
    chars: std::iter::Peekable<std::str::CharIndices<'src>>,
    tokens: Vec<Token>,
    pipe_depth: usize,
    options: LexerOptions,
    extensions: Option<&'src ExtensionRegistry>,
}

impl<'src> Lexer<'src> {
    pub(crate) fn new(
        src: &'src str,
        options: LexerOptions,
        extensions: Option<&'src ExtensionRegistry>,
    ) -> Self {
        Lexer {
            src,
            chars: src.char_indices().peekable(),
            tokens: Vec::new(),
            pipe_depth: 0,
            options,
            extensions,
        }
    }

    /// Scan the whole input into a token vector ending in `Eof`.
    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, LexicalError> {
        while let Some(&(offset, c)) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '0'..='9' => self.number(offset)?,
                '.' => {
                    // A leading dot is a number only if a digit follows.
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek().is_some_and(|(_, d)| d.is_ascii_digit()) {
                        self.number(offset)?;
                    } else {
                        return Err(LexicalError::new(
                            LexicalErrorKind::InvalidCharacter('.'),
                            offset,
                        ));
                    }
                }
                '\\' => self.command(offset)?,
                '+' => self.simple(TokenKind::Plus, "+", offset),
                '-' => self.simple(TokenKind::Minus, "-", offset),
                '/' => self.simple(TokenKind::Divide, "/", offset),
                '*' => {
                    self.chars.next();
                    if self.chars.peek().is_some_and(|&(_, d)| d == '*') {
                        self.chars.next();
                        self.tokens.push(Token::new(TokenKind::Power, "**", offset));
                    } else {
                        self.tokens.push(Token::new(TokenKind::Multiply, "*", offset));
                    }
                }
                '^' => self.simple(TokenKind::Power, "^", offset),
                '!' => self.simple(TokenKind::Bang, "!", offset),
                '(' => self.simple(TokenKind::LParen, "(", offset),
                ')' => self.simple(TokenKind::RParen, ")", offset),
                '{' => self.simple(TokenKind::LBrace, "{", offset),
                '}' => self.simple(TokenKind::RBrace, "}", offset),
                '[' => self.simple(TokenKind::LBracket, "[", offset),
                ']' => self.simple(TokenKind::RBracket, "]", offset),
                '⟨' => self.simple(TokenKind::LAngle, "⟨", offset),
                '⟩' => self.simple(TokenKind::RAngle, "⟩", offset),
                '<' => self.simple(TokenKind::Less, "<", offset),
                '>' => self.simple(TokenKind::Greater, ">", offset),
                '=' => self.simple(TokenKind::Equal, "=", offset),
                ',' => self.simple(TokenKind::Comma, ",", offset),
                '_' => self.simple(TokenKind::Underscore, "_", offset),
                '&' => self.simple(TokenKind::Ampersand, "&", offset),
                '|' => self.pipe(offset),
                '∞' => {
                    self.chars.next();
                    self.tokens.push(Token::new(TokenKind::Infty, "infty", offset));
                }
                'π' => {
                    self.chars.next();
                    self.tokens.push(Token::new(TokenKind::Constant, "pi", offset));
                }
                c if c.is_alphabetic() => self.letters(offset),
                c => {
                    if let Some(name) = commands::unicode_letter(c) {
                        self.chars.next();
                        self.tokens.push(Token::new(TokenKind::Variable, name, offset));
                    } else {
                        return Err(LexicalError::new(
                            LexicalErrorKind::InvalidCharacter(c),
                            offset,
                        ));
                    }
                }
            }
        }
        let end = self.src.len();
        self.tokens.push(Token::new(TokenKind::Eof, "", end));
        Ok(self.tokens)
    }

    fn simple(&mut self, kind: TokenKind, lexeme: &str, offset: usize) {
        self.chars.next();
        self.tokens.push(Token::new(kind, lexeme, offset));
    }

    /// Longest-match numeric literal: integer part, at most one fraction,
    /// optional `[eE][+-]?digits` exponent. A second decimal point fails.
    fn number(&mut self, offset: usize) -> Result<(), LexicalError> {
        let mut lexeme = String::new();
        let mut seen_dot = false;

        while let Some(&(at, c)) = self.chars.peek() {
            match c {
                '0'..='9' => {
                    lexeme.push(c);
                    self.chars.next();
                }
                '.' => {
                    if seen_dot {
                        // Second decimal point inside one literal.
                        lexeme.push(c);
                        return Err(LexicalError::new(
                            LexicalErrorKind::MalformedNumber(lexeme),
                            at,
                        ));
                    }
                    seen_dot = true;
                    lexeme.push(c);
                    self.chars.next();
                }
                'e' | 'E' => {
                    // Exponent only when digits (optionally signed) follow.
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    let next = ahead.peek().map(|&(_, d)| d);
                    let signed = matches!(next, Some('+' | '-'));
                    let digit_after = if signed {
                        let mut ahead2 = ahead.clone();
                        ahead2.next();
                        ahead2.peek().is_some_and(|(_, d)| d.is_ascii_digit())
                    } else {
                        next.is_some_and(|d| d.is_ascii_digit())
                    };
                    if !digit_after {
                        break;
                    }
                    lexeme.push(c);
                    self.chars.next();
                    if signed {
                        let (_, sign) = self.chars.next().unwrap_or((at, '+'));
                        lexeme.push(sign);
                    }
                    while let Some(&(_, d)) = self.chars.peek() {
                        if d.is_ascii_digit() {
                            lexeme.push(d);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    break;
                }
                _ => break,
            }
        }

        let value: f64 = lexeme
            .parse()
            .map_err(|_| LexicalError::new(LexicalErrorKind::MalformedNumber(lexeme.clone()), offset))?;
        self.tokens.push(Token::number(lexeme, value, offset));
        Ok(())
    }

    /// Pipe classification by depth counter: at depth zero a pipe always
    /// opens; inside a group it opens again directly after another opening
    /// pipe (`||x||` nests) or where no operand just ended, and closes
    /// otherwise.
    fn pipe(&mut self, offset: usize) {
        self.chars.next();
        let prev = self.tokens.last();
        let opens = if self.pipe_depth == 0 {
            true
        } else if prev.is_some_and(|t| t.kind == TokenKind::Pipe && t.opens_group) {
            true
        } else {
            !prev.is_some_and(Token::ends_operand)
        };
        if opens {
            self.pipe_depth += 1;
        } else {
            self.pipe_depth = self.pipe_depth.saturating_sub(1);
        }
        let mut token = Token::new(TokenKind::Pipe, "|", offset);
        token.opens_group = opens;
        self.tokens.push(token);
    }

    /// Alphabetic run: `let` is the one keyword; otherwise either single
    /// letters (implicit multiplication on) or one coalesced identifier.
    fn letters(&mut self, offset: usize) {
        let mut run = String::new();
        let mut offsets = Vec::new();
        while let Some(&(at, c)) = self.chars.peek() {
            if c.is_alphabetic() {
                run.push(c);
                offsets.push(at);
                self.chars.next();
            } else {
                break;
            }
        }

        if run == "let" {
            self.tokens.push(Token::new(TokenKind::LetKeyword, run, offset));
            return;
        }

        if self.options.split_letters {
            for (c, at) in run.chars().zip(offsets) {
                let name = commands::unicode_letter(c)
                    .map(str::to_string)
                    .unwrap_or_else(|| c.to_string());
                self.tokens.push(Token::new(TokenKind::Variable, name, at));
            }
        } else {
            self.tokens.push(Token::new(TokenKind::Variable, run, offset));
        }
    }

    /// `\command`: row separators, discarded spacing, table lookups, the
    /// extension hook, and the did-you-mean error path, in that order.
    fn command(&mut self, offset: usize) -> Result<(), LexicalError> {
        self.chars.next(); // consume the backslash
        match self.chars.peek().map(|&(_, c)| c) {
            Some('\\') => {
                self.chars.next();
                self.tokens.push(Token::new(TokenKind::Backslash, "\\\\", offset));
                return Ok(());
            }
            Some(',' | ';' | ':' | '!' | ' ') => {
                // Thin/medium/thick space and friends: recognised, dropped.
                self.chars.next();
                return Ok(());
            }
            _ => {}
        }

        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphabetic() {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            let c = self.chars.peek().map_or('\\', |&(_, c)| c);
            return Err(LexicalError::new(
                LexicalErrorKind::InvalidCharacter(c),
                offset,
            ));
        }

        match commands::lookup(&name) {
            Some(Command::Function) => {
                self.tokens.push(Token::new(TokenKind::Function, name, offset));
            }
            Some(Command::Greek) => {
                self.tokens.push(Token::new(TokenKind::Variable, name, offset));
            }
            Some(Command::Constant) => {
                self.tokens.push(Token::new(TokenKind::Constant, name, offset));
            }
            Some(Command::Operator(kind)) => {
                self.tokens.push(Token::new(kind, name, offset));
            }
            Some(Command::Structural(TokenKind::Begin)) => {
                let env = self.braced_word(offset)?;
                self.tokens.push(Token::new(TokenKind::Begin, env, offset));
            }
            Some(Command::Structural(TokenKind::End)) => {
                let env = self.braced_word(offset)?;
                self.tokens.push(Token::new(TokenKind::End, env, offset));
            }
            Some(Command::Structural(TokenKind::Text)) => {
                let contents = self.braced_text(offset)?;
                self.tokens.push(Token::new(TokenKind::Text, contents, offset));
            }
            Some(Command::Structural(kind)) => {
                self.tokens.push(Token::new(kind, name, offset));
            }
            Some(Command::Discard) => {}
            None => {
                if let Some(token) = self
                    .extensions
                    .and_then(|ext| ext.resolve_command(&name, offset))
                {
                    self.tokens.push(token);
                    return Ok(());
                }
                let suggestion = suggest::did_you_mean(&name, commands::command_names());
                return Err(LexicalError::new(
                    LexicalErrorKind::UnknownCommand(name),
                    offset,
                )
                .with_suggestion(suggestion));
            }
        }
        Ok(())
    }

    /// Read `{word}` after `\begin` / `\end`.
    fn braced_word(&mut self, offset: usize) -> Result<String, LexicalError> {
        self.skip_whitespace();
        match self.chars.peek() {
            Some(&(_, '{')) => {
                self.chars.next();
            }
            _ => {
                return Err(LexicalError::new(
                    LexicalErrorKind::InvalidCharacter('{'),
                    offset,
                ));
            }
        }
        let mut word = String::new();
        loop {
            match self.chars.next() {
                Some((_, '}')) => break,
                Some((_, c)) if c.is_ascii_alphanumeric() || c == '*' => word.push(c),
                Some((at, c)) => {
                    return Err(LexicalError::new(
                        LexicalErrorKind::InvalidCharacter(c),
                        at,
                    ));
                }
                None => {
                    return Err(LexicalError::new(
                        LexicalErrorKind::UnterminatedText,
                        offset,
                    ));
                }
            }
        }
        Ok(word)
    }

    /// Read the braced run after `\text`, verbatim up to the closing brace.
    fn braced_text(&mut self, offset: usize) -> Result<String, LexicalError> {
        self.skip_whitespace();
        match self.chars.peek() {
            Some(&(_, '{')) => {
                self.chars.next();
            }
            _ => {
                return Err(LexicalError::new(
                    LexicalErrorKind::UnterminatedText,
                    offset,
                ));
            }
        }
        let mut contents = String::new();
        loop {
            match self.chars.next() {
                Some((_, '}')) => break,
                Some((_, c)) => contents.push(c),
                None => {
                    return Err(LexicalError::new(
                        LexicalErrorKind::UnterminatedText,
                        offset,
                    ));
                }
            }
        }
        Ok(contents.trim().to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            self.chars.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src, LexerOptions { split_letters: true }, None)
            .tokenize()
            .expect("lex")
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers_with_exponents() {
        let tokens = lex("2.5e-3");
        assert_eq!(tokens[0].value, Some(0.0025));
        assert_eq!(tokens[0].lexeme, "2.5e-3");
    }

    #[test]
    fn second_decimal_point_fails() {
        let err = Lexer::new("3.14.15", LexerOptions { split_letters: true }, None)
            .tokenize()
            .unwrap_err();
        assert!(matches!(err.kind, LexicalErrorKind::MalformedNumber(_)));
    }

    #[test]
    fn commands_resolve_to_kinds() {
        assert_eq!(
            kinds("\\sin \\frac \\pi"),
            vec![
                TokenKind::Function,
                TokenKind::Frac,
                TokenKind::Constant,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unknown_command_suggests() {
        let err = Lexer::new("\\sine{x}", LexerOptions { split_letters: true }, None)
            .tokenize()
            .unwrap_err();
        assert!(matches!(err.kind, LexicalErrorKind::UnknownCommand(_)));
        assert_eq!(err.suggestion.as_deref(), Some("sin"));
    }

    #[test]
    fn sizing_and_spacing_are_dropped() {
        assert_eq!(
            kinds("\\left( x \\right)"),
            vec![
                TokenKind::LParen,
                TokenKind::Variable,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
        assert_eq!(kinds("x \\, y").len(), 3);
    }

    #[test]
    fn letters_split_when_implicit_mul_is_on() {
        assert_eq!(
            kinds("xy"),
            vec![TokenKind::Variable, TokenKind::Variable, TokenKind::Eof]
        );
    }

    #[test]
    fn letters_coalesce_when_implicit_mul_is_off() {
        let tokens = Lexer::new("xy", LexerOptions { split_letters: false }, None)
            .tokenize()
            .expect("lex");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].lexeme, "xy");
    }

    #[test]
    fn let_is_a_keyword() {
        assert_eq!(kinds("let")[0], TokenKind::LetKeyword);
    }

    #[test]
    fn pipes_alternate_by_position() {
        let tokens = lex("|x| + 2|y|");
        let pipes: Vec<bool> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Pipe)
            .map(|t| t.opens_group)
            .collect();
        assert_eq!(pipes, vec![true, false, true, false]);
    }

    #[test]
    fn nested_pipes() {
        let tokens = lex("||x||");
        let pipes: Vec<bool> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Pipe)
            .map(|t| t.opens_group)
            .collect();
        assert_eq!(pipes, vec![true, true, false, false]);
    }

    #[test]
    fn begin_end_carry_environment_names() {
        let tokens = lex("\\begin{pmatrix} 1 \\end{pmatrix}");
        assert_eq!(tokens[0].kind, TokenKind::Begin);
        assert_eq!(tokens[0].lexeme, "pmatrix");
        assert_eq!(tokens[2].kind, TokenKind::End);
    }

    #[test]
    fn text_reads_braced_run() {
        let tokens = lex("\\text{velocity}");
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].lexeme, "velocity");
    }

    #[test]
    fn unterminated_text_fails() {
        let err = Lexer::new("\\text{velo", LexerOptions { split_letters: true }, None)
            .tokenize()
            .unwrap_err();
        assert_eq!(err.kind, LexicalErrorKind::UnterminatedText);
    }

    #[test]
    fn row_separator() {
        assert_eq!(kinds("\\\\")[0], TokenKind::Backslash);
    }
}
