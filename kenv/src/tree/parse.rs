//! Lexer and recursive descent parser for tree expressions.
//!
//! The grammar is a small, self-contained subset of the usual tree-query
//! notation: rooted paths (`.a.b`, `.items[]`, `.items[0]`), assignment
//! (`=`), array update (`|= map(...)`), pipelines (`|`), alternative on
//! absent values (`//`), concatenation (`+`), deletion (`del(...)`), array
//! collection (`[expr]`), object/scalar literals, and positional variables
//! (`$0`, `$1`, ...).

use serde_json::Value;

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::env_error;

/// A parsed expression program: a pipeline of stages applied left to right.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Program {
    pub stages: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// A rooted path, e.g. `.webhooks[].clientConfig.url`.
    Path(Vec<PathSeg>),
    /// A positional argument, e.g. `$0`.
    Var(usize),
    /// A JSON scalar literal.
    Literal(Value),
    /// `path = expr`
    Assign(Vec<PathSeg>, Box<Expr>),
    /// `path |= map(pipeline)`
    UpdateMap(Vec<PathSeg>, Program),
    /// `del(path)`
    Del(Vec<PathSeg>),
    /// `lhs // rhs`: rhs when lhs is absent, null, or false.
    Alternative(Box<Expr>, Box<Expr>),
    /// `lhs + rhs`
    Add(Box<Expr>, Box<Expr>),
    /// `[elem, elem, ...]`: each element contributes all of its results.
    Array(Vec<Program>),
    /// `{"key": expr, ...}`
    Object(Vec<(String, Program)>),
    /// `(pipeline)`
    Group(Program),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathSeg {
    /// `.key`
    Key(String),
    /// `[n]`
    Index(usize),
    /// `[]`: fan out over every element.
    IterateAll,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Pipe,
    PipeAssign,
    Assign,
    Plus,
    Alternative,
    Var(usize),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Eof,
}

fn parse_error(detail: String) -> EnvError {
    env_error!(
        ErrorKind::ExpressionParseFailed,
        "failed to parse tree expression",
        detail
    )
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> EnvResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '.' => {
                    self.chars.next();
                    tokens.push(Token::Dot);
                }
                '[' => {
                    self.chars.next();
                    tokens.push(Token::LBracket);
                }
                ']' => {
                    self.chars.next();
                    tokens.push(Token::RBracket);
                }
                '{' => {
                    self.chars.next();
                    tokens.push(Token::LBrace);
                }
                '}' => {
                    self.chars.next();
                    tokens.push(Token::RBrace);
                }
                '(' => {
                    self.chars.next();
                    tokens.push(Token::LParen);
                }
                ')' => {
                    self.chars.next();
                    tokens.push(Token::RParen);
                }
                ',' => {
                    self.chars.next();
                    tokens.push(Token::Comma);
                }
                ':' => {
                    self.chars.next();
                    tokens.push(Token::Colon);
                }
                '+' => {
                    self.chars.next();
                    tokens.push(Token::Plus);
                }
                '=' => {
                    self.chars.next();
                    tokens.push(Token::Assign);
                }
                '|' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::PipeAssign);
                    } else {
                        tokens.push(Token::Pipe);
                    }
                }
                '/' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'/') {
                        self.chars.next();
                        tokens.push(Token::Alternative);
                    } else {
                        return Err(parse_error("unexpected character '/'".to_string()));
                    }
                }
                '$' => {
                    self.chars.next();
                    let mut digits = String::new();
                    while let Some(&d) = self.chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    if digits.is_empty() {
                        return Err(parse_error("expected digits after '$'".to_string()));
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|e| parse_error(format!("invalid variable index: {e}")))?;
                    tokens.push(Token::Var(index));
                }
                '"' => {
                    tokens.push(Token::Str(self.lex_string()?));
                }
                c if c.is_ascii_digit() || c == '-' => {
                    tokens.push(self.lex_number()?);
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&i) = self.chars.peek() {
                        if i.is_ascii_alphanumeric() || i == '_' {
                            ident.push(i);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push(Token::Ident(ident));
                }
                other => {
                    return Err(parse_error(format!("unexpected character '{other}'")));
                }
            }
        }

        tokens.push(Token::Eof);

        Ok(tokens)
    }

    fn lex_string(&mut self) -> EnvResult<String> {
        // Consume the opening quote.
        self.chars.next();

        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => {
                        return Err(parse_error(format!("unsupported escape '\\{other}'")));
                    }
                    None => return Err(parse_error("unterminated string literal".to_string())),
                },
                Some(c) => out.push(c),
                None => return Err(parse_error("unterminated string literal".to_string())),
            }
        }
    }

    fn lex_number(&mut self) -> EnvResult<Token> {
        let mut text = String::new();
        if self.chars.peek() == Some(&'-') {
            text.push('-');
            self.chars.next();
        }

        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.chars.next();
            } else if c == '.' && !is_float {
                // Only a fractional part if a digit follows; a trailing dot
                // belongs to a path expression.
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                    is_float = true;
                    text.push(c);
                    self.chars.next();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|e| parse_error(format!("invalid number '{text}': {e}")))?;
            Ok(Token::Float(value))
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|e| parse_error(format!("invalid number '{text}': {e}")))?;
            Ok(Token::Int(value))
        }
    }
}

pub(crate) fn parse(input: &str) -> EnvResult<Program> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let program = parser.parse_pipeline()?;
    parser.expect(Token::Eof)?;

    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> EnvResult<()> {
        let token = self.next();
        if token != expected {
            return Err(parse_error(format!(
                "expected {expected:?}, found {token:?}"
            )));
        }
        Ok(())
    }

    fn parse_pipeline(&mut self) -> EnvResult<Program> {
        let mut stages = vec![self.parse_expr()?];
        while *self.peek() == Token::Pipe {
            self.next();
            stages.push(self.parse_expr()?);
        }
        Ok(Program { stages })
    }

    /// expr := alternative (('=' | '|= map(...)') alternative)?
    fn parse_expr(&mut self) -> EnvResult<Expr> {
        let lhs = self.parse_alternative()?;

        match self.peek() {
            Token::Assign => {
                self.next();
                let path = Self::require_path(lhs)?;
                let rhs = self.parse_alternative()?;
                Ok(Expr::Assign(path, Box::new(rhs)))
            }
            Token::PipeAssign => {
                self.next();
                let path = Self::require_path(lhs)?;
                let body = self.parse_map_call()?;
                Ok(Expr::UpdateMap(path, body))
            }
            _ => Ok(lhs),
        }
    }

    fn require_path(expr: Expr) -> EnvResult<Vec<PathSeg>> {
        match expr {
            Expr::Path(path) => Ok(path),
            other => Err(parse_error(format!(
                "left-hand side of an assignment must be a path, found {other:?}"
            ))),
        }
    }

    fn parse_map_call(&mut self) -> EnvResult<Program> {
        match self.next() {
            Token::Ident(name) if name == "map" => {}
            other => {
                return Err(parse_error(format!(
                    "only map(...) is supported after '|=', found {other:?}"
                )));
            }
        }
        self.expect(Token::LParen)?;
        let body = self.parse_pipeline()?;
        self.expect(Token::RParen)?;
        Ok(body)
    }

    fn parse_alternative(&mut self) -> EnvResult<Expr> {
        let mut lhs = self.parse_additive()?;
        while *self.peek() == Token::Alternative {
            self.next();
            let rhs = self.parse_additive()?;
            lhs = Expr::Alternative(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> EnvResult<Expr> {
        let mut lhs = self.parse_primary()?;
        while *self.peek() == Token::Plus {
            self.next();
            let rhs = self.parse_primary()?;
            lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> EnvResult<Expr> {
        match self.next() {
            Token::Dot => Ok(Expr::Path(self.parse_path_segments()?)),
            Token::Var(index) => Ok(Expr::Var(index)),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                "del" => {
                    self.expect(Token::LParen)?;
                    self.expect(Token::Dot)?;
                    let path = self.parse_path_segments()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::Del(path))
                }
                other => Err(parse_error(format!("unknown identifier '{other}'"))),
            },
            Token::LBracket => {
                let mut elements = Vec::new();
                if *self.peek() != Token::RBracket {
                    elements.push(self.parse_pipeline()?);
                    while *self.peek() == Token::Comma {
                        self.next();
                        elements.push(self.parse_pipeline()?);
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(elements))
            }
            Token::LBrace => {
                let mut fields = Vec::new();
                if *self.peek() != Token::RBrace {
                    fields.push(self.parse_object_field()?);
                    while *self.peek() == Token::Comma {
                        self.next();
                        fields.push(self.parse_object_field()?);
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Object(fields))
            }
            Token::LParen => {
                let inner = self.parse_pipeline()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Group(inner))
            }
            other => Err(parse_error(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_object_field(&mut self) -> EnvResult<(String, Program)> {
        let key = match self.next() {
            Token::Str(s) => s,
            Token::Ident(s) => s,
            other => {
                return Err(parse_error(format!(
                    "expected object key, found {other:?}"
                )));
            }
        };
        self.expect(Token::Colon)?;
        let value = self.parse_pipeline()?;
        Ok((key, value))
    }

    /// Parses the segments following the leading dot of a path.
    fn parse_path_segments(&mut self) -> EnvResult<Vec<PathSeg>> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Token::Ident(_) => {
                    // Only consume the ident if it directly continues a path:
                    // a bare `.` identity has no following ident.
                    if let Token::Ident(name) = self.next() {
                        segments.push(PathSeg::Key(name));
                    }
                    // Consume a chaining dot, if any.
                    if *self.peek() == Token::Dot {
                        self.next();
                        continue;
                    }
                }
                Token::LBracket => {
                    self.next();
                    match self.next() {
                        Token::RBracket => segments.push(PathSeg::IterateAll),
                        Token::Int(n) if n >= 0 => {
                            segments.push(PathSeg::Index(n as usize));
                            self.expect(Token::RBracket)?;
                        }
                        other => {
                            return Err(parse_error(format!(
                                "expected ']' or index, found {other:?}"
                            )));
                        }
                    }
                    if *self.peek() == Token::Dot {
                        self.next();
                        continue;
                    }
                }
                _ => break,
            }
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_path() {
        let program = parse(".spec.replicas").unwrap();
        assert_eq!(program.stages.len(), 1);
        assert_eq!(
            program.stages[0],
            Expr::Path(vec![
                PathSeg::Key("spec".to_string()),
                PathSeg::Key("replicas".to_string())
            ])
        );
    }

    #[test]
    fn test_parse_identity_path() {
        let program = parse(".").unwrap();
        assert_eq!(program.stages[0], Expr::Path(vec![]));
    }

    #[test]
    fn test_parse_iterate_and_collect() {
        let program = parse("[.webhooks[].clientConfig.url]").unwrap();
        let Expr::Array(elements) = &program.stages[0] else {
            panic!("expected array expression");
        };
        assert_eq!(elements.len(), 1);
        assert_eq!(
            elements[0].stages[0],
            Expr::Path(vec![
                PathSeg::Key("webhooks".to_string()),
                PathSeg::IterateAll,
                PathSeg::Key("clientConfig".to_string()),
                PathSeg::Key("url".to_string()),
            ])
        );
    }

    #[test]
    fn test_parse_assignment_pipeline() {
        let program = parse(".a = $0 | .b = \"x\"").unwrap();
        assert_eq!(program.stages.len(), 2);
        assert!(matches!(program.stages[0], Expr::Assign(_, _)));
        assert!(matches!(program.stages[1], Expr::Assign(_, _)));
    }

    #[test]
    fn test_parse_update_map_with_alternative_and_del() {
        let program = parse(
            ".webhooks |= map(.clientConfig.url = $0 + (.clientConfig.service.path // \"/\") \
             | .clientConfig.caBundle = $1 \
             | del(.clientConfig.service))",
        )
        .unwrap();
        let Expr::UpdateMap(path, body) = &program.stages[0] else {
            panic!("expected update-map expression");
        };
        assert_eq!(path, &vec![PathSeg::Key("webhooks".to_string())]);
        assert_eq!(body.stages.len(), 3);
        assert!(matches!(body.stages[2], Expr::Del(_)));
    }

    #[test]
    fn test_parse_object_literal() {
        let program = parse(
            ".spec.conversion = {\"strategy\": \"Webhook\", \"webhook\": {\"conversionReviewVersions\": [\"v1\", \"v1beta1\"]}}",
        )
        .unwrap();
        let Expr::Assign(_, rhs) = &program.stages[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(**rhs, Expr::Object(_)));
    }

    #[test]
    fn test_parse_error_reports_detail() {
        let err = parse(".a = = 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionParseFailed);
        assert!(err.detail().is_some());
    }

    #[test]
    fn test_assignment_lhs_must_be_path() {
        let err = parse("\"a\" = 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionParseFailed);
        assert!(err.detail().unwrap().contains("path"));
    }

    #[test]
    fn test_pipe_assign_requires_map() {
        let err = parse(".a |= del(.b)").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionParseFailed);
        assert!(err.detail().unwrap().contains("map"));
    }
}
