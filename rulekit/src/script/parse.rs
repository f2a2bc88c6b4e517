//! Tokenizer and Pratt parser for the script language.

use super::value::ScriptValue;
use crate::error::{RuleError, RuleResult};

const MAX_DEPTH: usize = 128;

const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!",
    "?", ":", "(", ")", "[", "]", "{", "}", ",", ".", ";", "=",
];

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Regex { source: String, flags: String },
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    Literal(ScriptValue),
    Ident(String),
    Array(Vec<Expr>),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Stmt {
    Let(String, Option<Expr>),
    Assign(String, Expr),
    Return(Option<Expr>),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    Function(String, Vec<String>, Vec<Stmt>),
    Expr(Expr),
}

fn error(message: impl Into<String>) -> RuleError {
    RuleError::Script(message.into())
}

// ── Tokenizer ──────────────────────────────────────────────────────────

/// A `/` starts a regex literal unless it follows something with a value.
fn regex_allowed(previous: Option<&Token>) -> bool {
    match previous {
        None => true,
        Some(Token::Punct(p)) => !matches!(*p, ")" | "]" | "}"),
        Some(Token::Ident(word)) => matches!(word.as_str(), "return" | "typeof"),
        Some(_) => false,
    }
}

pub(super) fn tokenize(source: &str) -> RuleResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            i += 2;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            if c == '0' && matches!(chars.get(i + 1), Some('x' | 'X')) {
                i += 2;
                while i < chars.len() && chars[i].is_ascii_hexdigit() {
                    i += 1;
                }
                let hex: String = chars[start + 2..i].iter().collect();
                let n = i64::from_str_radix(&hex, 16)
                    .map_err(|_| error(format!("invalid hex literal 0x{hex}")))?;
                tokens.push(Token::Number(n as f64));
                continue;
            }
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                i += 1;
                if i < chars.len() && matches!(chars[i], '+' | '-') {
                    i += 1;
                }
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| error(format!("invalid number '{text}'")))?;
            tokens.push(Token::Number(n));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i + 1, c)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }

        if c == '/' && regex_allowed(tokens.last()) {
            let (token, next) = read_regex(&chars, i + 1)?;
            tokens.push(token);
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        match PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            Some(p) => {
                tokens.push(Token::Punct(*p));
                i += p.chars().count();
            }
            None => return Err(error(format!("unexpected character '{c}'"))),
        }
    }
    Ok(tokens)
}

fn read_string(chars: &[char], mut i: usize, quote: char) -> RuleResult<(String, usize)> {
    let mut out = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' {
            i += 1;
            let Some(&escaped) = chars.get(i) else {
                break;
            };
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'u' => {
                    let hex: String = chars.get(i + 1..i + 5).unwrap_or_default().iter().collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| error(format!("invalid escape \\u{hex}")))?;
                    out.push(code);
                    i += 4;
                }
                other => out.push(other),
            }
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(error("unterminated string literal"))
}

fn read_regex(chars: &[char], mut i: usize) -> RuleResult<(Token, usize)> {
    let mut source = String::new();
    let mut in_class = false;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                source.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    source.push(next);
                }
                i += 2;
                continue;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let flags = chars[start..i].iter().collect();
                return Ok((Token::Regex { source, flags }, i));
            }
            '\n' => break,
            _ => {}
        }
        source.push(c);
        i += 1;
    }
    Err(error("unterminated regex literal"))
}

// ── Parser ─────────────────────────────────────────────────────────────

pub(super) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

fn infix_power(op: &str) -> Option<(u8, u8)> {
    let power = match op {
        "||" => (3, 4),
        "&&" => (5, 6),
        "==" | "!=" | "===" | "!==" => (7, 8),
        "<" | "<=" | ">" | ">=" => (9, 10),
        "+" | "-" => (11, 12),
        "*" | "/" | "%" => (13, 14),
        _ => return None,
    };
    Some(power)
}

const PREFIX_POWER: u8 = 15;
const TERNARY_POWER: u8 = 2;

impl Parser {
    pub(super) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(q)) if *q == p)
    }

    fn at_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> RuleResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(error(format!("expected '{p}', found {:?}", self.peek())))
        }
    }

    fn ident(&mut self) -> RuleResult<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(error(format!("expected identifier, found {other:?}"))),
        }
    }

    pub(super) fn program(&mut self) -> RuleResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            if self.eat_punct(";") {
                continue;
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    fn block(&mut self) -> RuleResult<Vec<Stmt>> {
        if !self.eat_punct("{") {
            return Ok(vec![self.statement()?]);
        }
        let mut statements = Vec::new();
        while !self.eat_punct("}") {
            if self.peek().is_none() {
                return Err(error("unterminated block"));
            }
            if self.eat_punct(";") {
                continue;
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    fn statement(&mut self) -> RuleResult<Stmt> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.depth -= 1;
        stmt
    }

    fn statement_inner(&mut self) -> RuleResult<Stmt> {
        if self.at_word("let") || self.at_word("var") || self.at_word("const") {
            self.pos += 1;
            let name = self.ident()?;
            let init = if self.eat_punct("=") {
                Some(self.expression(0)?)
            } else {
                None
            };
            return Ok(Stmt::Let(name, init));
        }

        if self.at_word("function") {
            self.pos += 1;
            let name = self.ident()?;
            self.expect_punct("(")?;
            let mut params = Vec::new();
            while !self.eat_punct(")") {
                params.push(self.ident()?);
                if !self.at_punct(")") {
                    self.expect_punct(",")?;
                }
            }
            if !self.at_punct("{") {
                return Err(error(format!("function {name} has no body")));
            }
            return Ok(Stmt::Function(name, params, self.block()?));
        }

        if self.at_word("return") {
            self.pos += 1;
            if self.peek().is_none() || self.at_punct(";") || self.at_punct("}") {
                return Ok(Stmt::Return(None));
            }
            return Ok(Stmt::Return(Some(self.expression(0)?)));
        }

        if self.at_word("if") {
            self.pos += 1;
            self.expect_punct("(")?;
            let condition = self.expression(0)?;
            self.expect_punct(")")?;
            let then = self.block()?;
            let otherwise = if self.at_word("else") {
                self.pos += 1;
                self.block()?
            } else {
                Vec::new()
            };
            return Ok(Stmt::If(condition, then, otherwise));
        }

        if let (Some(Token::Ident(name)), Some(Token::Punct("="))) = (self.peek(), self.peek_at(1))
        {
            let name = name.clone();
            self.pos += 2;
            return Ok(Stmt::Assign(name, self.expression(0)?));
        }

        Ok(Stmt::Expr(self.expression(0)?))
    }

    fn enter(&mut self) -> RuleResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(error("script nested too deeply"));
        }
        Ok(())
    }

    pub(super) fn expression(&mut self, min_power: u8) -> RuleResult<Expr> {
        self.enter()?;
        let expr = self.expression_inner(min_power);
        self.depth -= 1;
        expr
    }

    fn expression_inner(&mut self, min_power: u8) -> RuleResult<Expr> {
        let mut lhs = self.prefix()?;

        loop {
            let op = match self.peek() {
                Some(Token::Punct(op)) => *op,
                _ => break,
            };

            // Postfix: call, member, index
            match op {
                "(" => {
                    self.pos += 1;
                    let args = self.arguments(")")?;
                    lhs = Expr::Call(Box::new(lhs), args);
                    continue;
                }
                "." => {
                    self.pos += 1;
                    let name = self.ident()?;
                    lhs = Expr::Member(Box::new(lhs), name);
                    continue;
                }
                "[" => {
                    self.pos += 1;
                    let index = self.expression(0)?;
                    self.expect_punct("]")?;
                    lhs = Expr::Index(Box::new(lhs), Box::new(index));
                    continue;
                }
                _ => {}
            }

            if op == "?" {
                if TERNARY_POWER < min_power {
                    break;
                }
                self.pos += 1;
                let then = self.expression(0)?;
                self.expect_punct(":")?;
                let otherwise = self.expression(TERNARY_POWER)?;
                lhs = Expr::Conditional(Box::new(lhs), Box::new(then), Box::new(otherwise));
                continue;
            }

            let Some((left_power, right_power)) = infix_power(op) else {
                break;
            };
            if left_power < min_power {
                break;
            }
            self.pos += 1;
            let rhs = self.expression(right_power)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> RuleResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(ScriptValue::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(ScriptValue::String(s))),
            Some(Token::Regex { source, flags }) => Ok(Expr::Literal(ScriptValue::Regex {
                source,
                global: flags.contains('g'),
                ignore_case: flags.contains('i'),
            })),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "true" => Expr::Literal(ScriptValue::Bool(true)),
                "false" => Expr::Literal(ScriptValue::Bool(false)),
                "null" => Expr::Literal(ScriptValue::Null),
                "undefined" => Expr::Literal(ScriptValue::Undefined),
                "typeof" => Expr::Unary("typeof", Box::new(self.expression(PREFIX_POWER)?)),
                _ => Expr::Ident(word),
            }),
            Some(Token::Punct(op @ ("!" | "-" | "+"))) => {
                Ok(Expr::Unary(op, Box::new(self.expression(PREFIX_POWER)?)))
            }
            Some(Token::Punct("(")) => {
                let inner = self.expression(0)?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Some(Token::Punct("[")) => Ok(Expr::Array(self.arguments("]")?)),
            Some(other) => Err(error(format!("unexpected token {other:?}"))),
            None => Err(error("unexpected end of script")),
        }
    }

    fn arguments(&mut self, close: &str) -> RuleResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat_punct(close) {
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            if self.eat_punct(close) {
                return Ok(args);
            }
            self.expect_punct(",")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> Expr {
        Parser::new(tokenize(source).unwrap()).expression(0).unwrap()
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize(r#"a.b("x\n", 1.5) === !c"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Punct("."),
                Token::Ident("b".into()),
                Token::Punct("("),
                Token::Str("x\n".into()),
                Token::Punct(","),
                Token::Number(1.5),
                Token::Punct(")"),
                Token::Punct("==="),
                Token::Punct("!"),
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let tokens = tokenize("a / 2").unwrap();
        assert_eq!(tokens[1], Token::Punct("/"));

        let tokens = tokenize(r"s.replace(/\d+/g, '')").unwrap();
        assert_eq!(
            tokens[4],
            Token::Regex {
                source: r"\d+".into(),
                flags: "g".into()
            }
        );
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expr("1 + 2 * 3");
        let Expr::Binary("+", _, rhs) = expr else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*rhs, Expr::Binary("*", _, _)));

        let expr = parse_expr("a || b ? 1 : 2");
        assert!(matches!(expr, Expr::Conditional(..)));
    }

    #[test]
    fn test_function_declaration() {
        let program = Parser::new(tokenize("function add(a, b) { return a + b }").unwrap())
            .program()
            .unwrap();
        let [Stmt::Function(name, params, body)] = program.as_slice() else {
            panic!("expected a single function declaration");
        };
        assert_eq!(name, "add");
        assert_eq!(params, &["a", "b"]);
        assert!(matches!(body.as_slice(), [Stmt::Return(Some(_))]));

        assert!(Parser::new(tokenize("function f(a b) {}").unwrap()).program().is_err());
        assert!(Parser::new(tokenize("function f() 1").unwrap()).program().is_err());
    }

    #[test]
    fn test_depth_limit() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let result = Parser::new(tokenize(&source).unwrap()).expression(0);
        assert!(result.is_err());
    }

    #[test]
    fn test_statements() {
        let program = Parser::new(tokenize("let a = 1; if (a) { return a } else return 2").unwrap())
            .program()
            .unwrap();
        assert_eq!(program.len(), 2);
        assert!(matches!(program[1], Stmt::If(..)));
    }
}
