//! Tokenizer for snippet source

use crate::ast::Span;
use crate::error::SyntaxError;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// Token variants
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal, escapes resolved
    Str(String),
    /// Identifier
    Ident(String),
    /// `{{keyspec}}`, contents trimmed
    Template(String),

    /// `if`
    If,
    /// `elif`
    Elif,
    /// `else`
    Else,
    /// `for`
    For,
    /// `in`
    In,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `.`
    Dot,
    /// Line break outside parentheses and brackets
    Newline,

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `=`
    Assign,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `*=`
    StarAssign,
    /// `/=`
    SlashAssign,
    /// `%=`
    PercentAssign,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `=~`
    Tilde,
    /// `!`
    Bang,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,

    /// End of input
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Int(n) => return write!(f, "{n}"),
            TokenKind::Float(n) => return write!(f, "{n}"),
            TokenKind::Str(s) => return write!(f, "{s:?}"),
            TokenKind::Ident(name) => return write!(f, "{name}"),
            TokenKind::Template(spec) => return write!(f, "{{{{{spec}}}}}"),
            TokenKind::If => "if",
            TokenKind::Elif => "elif",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::Newline => "newline",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::StarAssign => "*=",
            TokenKind::SlashAssign => "/=",
            TokenKind::PercentAssign => "%=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::Tilde => "=~",
            TokenKind::Bang => "!",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// A token and where it starts
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token variant
    pub kind: TokenKind,
    /// Start position
    pub span: Span,
}

/// Tokenize a whole snippet. The result always ends with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    // Open `(` and `[`; line breaks inside them are not statement separators.
    depth: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            depth: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn position(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        loop {
            match self.chars.peek() {
                Some('\n') if self.depth == 0 => {
                    let span = self.position();
                    self.bump();
                    return Ok(Token {
                        kind: TokenKind::Newline,
                        span,
                    });
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while self.chars.peek().is_some_and(|&c| c != '\n') {
                        self.bump();
                    }
                }
                _ => break,
            }
        }

        let span = self.position();
        let Some(c) = self.bump() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span,
            });
        };

        let kind = match c {
            '0'..='9' => self.number(c, span)?,
            '"' | '\'' => TokenKind::Str(self.string(c, span)?),
            c if c.is_alphabetic() || c == '_' => self.word(c),
            '{' if self.bump_if('{') => TokenKind::Template(self.template(span)?),
            '(' => {
                self.depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RParen
            }
            '[' => {
                self.depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                TokenKind::RBracket
            }
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '+' => self.with_assign(TokenKind::Plus, TokenKind::PlusAssign),
            '-' => self.with_assign(TokenKind::Minus, TokenKind::MinusAssign),
            '*' => self.with_assign(TokenKind::Star, TokenKind::StarAssign),
            '/' => self.with_assign(TokenKind::Slash, TokenKind::SlashAssign),
            '%' => self.with_assign(TokenKind::Percent, TokenKind::PercentAssign),
            '=' if self.bump_if('=') => TokenKind::EqEq,
            '=' if self.bump_if('~') => TokenKind::Tilde,
            '=' => TokenKind::Assign,
            '!' => self.with_assign(TokenKind::Bang, TokenKind::NotEq),
            '<' => self.with_assign(TokenKind::Lt, TokenKind::Le),
            '>' => self.with_assign(TokenKind::Gt, TokenKind::Ge),
            '&' if self.bump_if('&') => TokenKind::AndAnd,
            '|' if self.bump_if('|') => TokenKind::OrOr,
            other => {
                return Err(SyntaxError::new(
                    span,
                    format!("invalid character '{other}'"),
                ))
            }
        };

        Ok(Token { kind, span })
    }

    fn with_assign(&mut self, plain: TokenKind, with_eq: TokenKind) -> TokenKind {
        if self.bump_if('=') {
            with_eq
        } else {
            plain
        }
    }

    fn word(&mut self, first: char) -> TokenKind {
        let mut word = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }

        match word.as_str() {
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Ident(word),
        }
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
    }

    fn number(&mut self, first: char, span: Span) -> Result<TokenKind, SyntaxError> {
        let mut text = String::from(first);
        let mut is_float = false;
        self.digits(&mut text);

        if self.bump_if('.') {
            if !self.chars.peek().is_some_and(char::is_ascii_digit) {
                return Err(SyntaxError::new(span, format!("invalid number '{text}.'")));
            }
            is_float = true;
            text.push('.');
            self.digits(&mut text);
        }

        if let Some(&e) = self.chars.peek() {
            if e == 'e' || e == 'E' {
                is_float = true;
                self.bump();
                text.push('e');
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.bump();
                    }
                }
                if !self.chars.peek().is_some_and(char::is_ascii_digit) {
                    return Err(SyntaxError::new(span, format!("invalid number '{text}'")));
                }
                self.digits(&mut text);
            }
        }

        if is_float {
            text.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(TokenKind::Float)
                .ok_or_else(|| SyntaxError::new(span, format!("invalid number '{text}'")))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| SyntaxError::new(span, format!("integer literal too large: {text}")))
        }
    }

    fn string(&mut self, quote: char, span: Span) -> Result<String, SyntaxError> {
        let mut out = String::new();
        loop {
            let c = match self.bump() {
                Some('\n') | None => {
                    return Err(SyntaxError::new(span, "unterminated string"));
                }
                Some(c) => c,
            };

            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escape_span = self.position();
            match self.bump() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some('/') => out.push('/'),
                Some('u') => out.push(self.unicode_escape(escape_span)?),
                Some('\n') | None => {
                    return Err(SyntaxError::new(span, "unterminated string"));
                }
                Some(other) => {
                    return Err(SyntaxError::new(
                        escape_span,
                        format!("invalid escape '\\{other}'"),
                    ))
                }
            }
        }
    }

    fn unicode_escape(&mut self, span: Span) -> Result<char, SyntaxError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .chars
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| SyntaxError::new(span, "\\u escape needs four hex digits"))?;
            self.bump();
            code = code * 16 + digit;
        }
        char::from_u32(code)
            .ok_or_else(|| SyntaxError::new(span, format!("invalid code point \\u{code:04x}")))
    }

    fn template(&mut self, span: Span) -> Result<String, SyntaxError> {
        let mut spec = String::new();
        loop {
            match self.bump() {
                Some('}') if self.bump_if('}') => {
                    let spec = spec.trim();
                    if spec.is_empty() {
                        return Err(SyntaxError::new(span, "empty {{}} template"));
                    }
                    return Ok(spec.to_string());
                }
                Some('\n') | None => {
                    return Err(SyntaxError::new(span, "unterminated {{ template"));
                }
                Some(c) => spec.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn numbers_keep_integer_and_float_apart() {
        assert_eq!(
            kinds("42 2.5 1e3 1_000"),
            vec![
                TokenKind::Int(42),
                TokenKind::Float(2.5),
                TokenKind::Float(1000.0),
                TokenKind::Int(1000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_resolve_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\tbé" 'x\/y'"#),
            vec![
                TokenKind::Str("it's".to_string()),
                TokenKind::Str("a\tbé".to_string()),
                TokenKind::Str("x/y".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn templates_keep_keyspec_text() {
        assert_eq!(
            kinds("{{ items/#0 }} = {{a\\/b}}"),
            vec![
                TokenKind::Template("items/#0".to_string()),
                TokenKind::Assign,
                TokenKind::Template("a\\/b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_newlines() {
        assert_eq!(
            kinds("a = 1 # set a\nb"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_skipped() {
        assert_eq!(
            kinds("f(1,\n2)"),
            vec![
                TokenKind::Ident("f".to_string()),
                TokenKind::LParen,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            kinds("+= -= *= /= %= == != <= >= =~ && || !"),
            vec![
                TokenKind::PlusAssign,
                TokenKind::MinusAssign,
                TokenKind::StarAssign,
                TokenKind::SlashAssign,
                TokenKind::PercentAssign,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Tilde,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn spans_are_one_based() {
        let tokens = tokenize("a\n  bc").unwrap();
        assert_eq!(tokens[0].span, Span::new(1, 1));
        assert_eq!(tokens[2].span, Span::new(2, 3));
    }

    #[test]
    fn lexical_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("{{ a").is_err());
        assert!(tokenize("a $ b").is_err());
        assert!(tokenize("99999999999999999999").is_err());
        let err = tokenize("x = 1.").unwrap_err();
        assert_eq!(err.column, 5);
    }
}
