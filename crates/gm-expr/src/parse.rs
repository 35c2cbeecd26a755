//! Tokenizer and recursive-descent parser for the query dialect.
//!
//! Grammar (lowest precedence first):
//!   or         → and ( ("or" | "|") and )*
//!   and        → not ( ("and" | "&") not )*
//!   not        → ("not" | "~") not | comparison
//!   comparison → arith ( CMP arith )* | arith ("in" | "not in") list
//!   arith      → term ( ("+" | "-") term )*
//!   term       → unary ( ("*" | "/" | "//" | "%") unary )*
//!   unary      → ("-" | "+") unary | power
//!   power      → atom ( "**" unary )?
//!   atom       → NUMBER | STRING | "True" | "False" | IDENT | `quoted`
//!              | FUNC "(" or ("," or)* ")" | "(" or ")"
//!   list       → "[" ( literal ("," literal)* ","? )? "]"
//!
//! Anything that could reach outside the table (`@name`, `a.b`, `a[0]`,
//! `__dunder__` names, non-whitelisted calls) is rejected here, before
//! evaluation ever sees it.

use gm_columnar::{ArithmeticOp, ComparisonOp};
use gm_runtime::EvalLimits;
use gm_types::Scalar;

use crate::{ColumnRef, Expr, ExprError, Function};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Quoted(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    // Comparison
    EqEq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    // Arithmetic
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    // Logical (keywords and their operator spellings)
    And,
    Or,
    Not,
    In,
}

impl Token {
    fn describe(&self) -> String {
        let symbol = match self {
            Self::Ident(name) => return format!("name '{name}'"),
            Self::Quoted(name) => return format!("name `{name}`"),
            Self::Int(value) => return format!("number {value}"),
            Self::Float(value) => return format!("number {value}"),
            Self::Str(_) => return "string literal".to_owned(),
            Self::True => "True",
            Self::False => "False",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::StarStar => "**",
            Self::Slash => "/",
            Self::SlashSlash => "//",
            Self::Percent => "%",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::In => "in",
        };
        format!("'{symbol}'")
    }

    /// Whether the token ends an operand, so a following `.` or `[` would
    /// be attribute access or a subscript.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Self::Ident(_)
                | Self::Quoted(_)
                | Self::Int(_)
                | Self::Float(_)
                | Self::Str(_)
                | Self::True
                | Self::False
                | Self::RParen
                | Self::RBracket
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Lexeme {
    token: Token,
    /// Character offset of the token in the input.
    offset: usize,
}

fn syntax(offset: usize, message: impl Into<String>) -> ExprError {
    ExprError::Syntax {
        offset,
        message: message.into(),
    }
}

fn ends_operand(lexemes: &[Lexeme]) -> bool {
    lexemes.last().is_some_and(|last| last.token.ends_operand())
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn reserved(name: &str) -> bool {
    name.starts_with("__")
}

fn tokenize(input: &str) -> Result<Vec<Lexeme>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut lexemes: Vec<Lexeme> = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let next = chars.get(i + 1).copied();
        let token = match c {
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '*' if next == Some('*') => {
                i += 2;
                Token::StarStar
            }
            '*' => {
                i += 1;
                Token::Star
            }
            '/' if next == Some('/') => {
                i += 2;
                Token::SlashSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '%' => {
                i += 1;
                Token::Percent
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '[' => {
                if ends_operand(&lexemes) {
                    return Err(ExprError::Subscript { offset: start });
                }
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '&' => {
                i += 1;
                Token::And
            }
            '|' => {
                i += 1;
                Token::Or
            }
            '~' => {
                i += 1;
                Token::Not
            }
            '=' if next == Some('=') => {
                i += 2;
                Token::EqEq
            }
            '=' => return Err(syntax(start, "expected '==' but found single '='")),
            '!' if next == Some('=') => {
                i += 2;
                Token::NotEq
            }
            '!' => return Err(syntax(start, "expected '!=' but found single '!'")),
            '>' if next == Some('=') => {
                i += 2;
                Token::Ge
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '<' if next == Some('=') => {
                i += 2;
                Token::Le
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '@' => {
                let name: String = chars[i + 1..]
                    .iter()
                    .take_while(|ch| is_ident_continue(**ch))
                    .collect();
                return Err(ExprError::LocalReference {
                    name,
                    offset: start,
                });
            }
            '.' if ends_operand(&lexemes) => {
                return Err(ExprError::AttributeAccess { offset: start });
            }
            '.' if next.is_some_and(|ch| ch.is_ascii_digit()) => lex_number(&chars, &mut i)?,
            '\'' | '"' => lex_string(&chars, &mut i, c)?,
            '`' => {
                i += 1;
                let name_start = i;
                while i < chars.len() && chars[i] != '`' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(syntax(start, "unterminated backtick-quoted name"));
                }
                let name: String = chars[name_start..i].iter().collect();
                i += 1;
                if name.trim().is_empty() {
                    return Err(syntax(start, "empty backtick-quoted name"));
                }
                if reserved(&name) {
                    return Err(ExprError::ReservedName { name });
                }
                Token::Quoted(name)
            }
            _ if c.is_ascii_digit() => lex_number(&chars, &mut i)?,
            _ if is_ident_start(c) => {
                while i < chars.len() && is_ident_continue(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "True" => Token::True,
                    "False" => Token::False,
                    _ if reserved(&word) => return Err(ExprError::ReservedName { name: word }),
                    _ => Token::Ident(word),
                }
            }
            _ => return Err(syntax(start, format!("unexpected character '{c}'"))),
        };
        lexemes.push(Lexeme {
            token,
            offset: start,
        });
    }
    Ok(lexemes)
}

fn lex_number(chars: &[char], i: &mut usize) -> Result<Token, ExprError> {
    let start = *i;
    let digits = |i: &mut usize| {
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
    };

    digits(i);
    let mut is_float = false;
    if chars.get(*i) == Some(&'.') {
        is_float = true;
        *i += 1;
        digits(i);
    }
    if matches!(chars.get(*i), Some('e' | 'E')) {
        let mut j = *i + 1;
        if matches!(chars.get(j), Some('+' | '-')) {
            j += 1;
        }
        if chars.get(j).is_some_and(char::is_ascii_digit) {
            is_float = true;
            *i = j;
            digits(i);
        }
    }

    let text: String = chars[start..*i].iter().collect();
    let float = || {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| syntax(start, format!("invalid number '{text}'")))
    };
    if is_float {
        return float();
    }
    // Integers beyond int64 degrade to float rather than failing.
    text.parse::<i64>().map(Token::Int).or_else(|_| float())
}

fn lex_string(chars: &[char], i: &mut usize, quote: char) -> Result<Token, ExprError> {
    let start = *i;
    *i += 1;
    let mut value = String::new();
    loop {
        match chars.get(*i).copied() {
            None => return Err(syntax(start, "unterminated string literal")),
            Some(ch) if ch == quote => {
                *i += 1;
                return Ok(Token::Str(value));
            }
            Some('\\') => {
                let escaped = chars
                    .get(*i + 1)
                    .copied()
                    .ok_or_else(|| syntax(start, "unterminated string literal"))?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                *i += 2;
            }
            Some(ch) => {
                value.push(ch);
                *i += 1;
            }
        }
    }
}

fn comparison_op(token: &Token) -> Option<ComparisonOp> {
    match token {
        Token::EqEq => Some(ComparisonOp::Eq),
        Token::NotEq => Some(ComparisonOp::Ne),
        Token::Gt => Some(ComparisonOp::Gt),
        Token::Ge => Some(ComparisonOp::Ge),
        Token::Lt => Some(ComparisonOp::Lt),
        Token::Le => Some(ComparisonOp::Le),
        _ => None,
    }
}

struct Parser<'t> {
    lexemes: &'t [Lexeme],
    pos: usize,
    /// Offset reported for errors at end of input.
    end: usize,
    depth: usize,
    max_depth: usize,
}

impl<'t> Parser<'t> {
    fn new(lexemes: &'t [Lexeme], end: usize, max_depth: usize) -> Self {
        Self {
            lexemes,
            pos: 0,
            end,
            depth: 0,
            max_depth,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.lexemes.get(self.pos).map(|lexeme| &lexeme.token)
    }

    fn peek_second(&self) -> Option<&'t Token> {
        self.lexemes.get(self.pos + 1).map(|lexeme| &lexeme.token)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn offset(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .map_or(self.end, |lexeme| lexeme.offset)
    }

    fn unexpected(&self) -> ExprError {
        match self.peek() {
            Some(token) => syntax(self.offset(), format!("unexpected {}", token.describe())),
            None => syntax(self.end, "unexpected end of expression"),
        }
    }

    /// Run `f` one nesting level deeper, failing once `max_depth` is passed.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ExprError::TooDeep {
                max: self.max_depth,
            });
        }
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not {
                expr: Box::new(inner),
            });
        }
        self.parse_comparison()
    }

    /// `a < b < c` becomes `(a < b) and (b < c)`.
    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_arith()?;
        let mut chain: Option<Expr> = None;
        loop {
            if let Some(op) = self.peek().and_then(comparison_op) {
                self.advance();
                let right = self.parse_arith()?;
                let link = Expr::Compare {
                    left: Box::new(left),
                    right: Box::new(right.clone()),
                    op,
                };
                chain = Some(join_chain(chain, link));
                left = right;
                continue;
            }

            let negated = match (self.peek(), self.peek_second()) {
                (Some(Token::In), _) => false,
                (Some(Token::Not), Some(Token::In)) => true,
                _ => break,
            };
            self.pos += if negated { 2 } else { 1 };
            let values = self.parse_list()?;
            let link = Expr::In {
                expr: Box::new(left),
                values,
                negated,
            };
            if self.peek().is_some_and(|token| {
                comparison_op(token).is_some() || matches!(token, Token::In)
            }) {
                return Err(syntax(
                    self.offset(),
                    "a comparison cannot follow an 'in' test",
                ));
            }
            return Ok(join_chain(chain, link));
        }
        Ok(chain.unwrap_or(left))
    }

    fn parse_list(&mut self) -> Result<Vec<Scalar>, ExprError> {
        if self.peek() != Some(&Token::LBracket) {
            return Err(syntax(self.offset(), "expected a '[...]' list after 'in'"));
        }
        self.advance();
        let mut values = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.advance();
            return Ok(values);
        }
        loop {
            values.push(self.parse_list_literal()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                    if self.peek() == Some(&Token::RBracket) {
                        self.advance();
                        break;
                    }
                }
                Some(Token::RBracket) => {
                    self.advance();
                    break;
                }
                _ => return Err(syntax(self.offset(), "expected ',' or ']' in list")),
            }
        }
        Ok(values)
    }

    fn parse_list_literal(&mut self) -> Result<Scalar, ExprError> {
        let negative = self.peek() == Some(&Token::Minus);
        if negative {
            self.advance();
        }
        let value = match self.peek() {
            Some(Token::Int(v)) if negative => v
                .checked_neg()
                .map_or(Scalar::Float64(-(*v as f64)), Scalar::Int64),
            Some(Token::Int(v)) => Scalar::Int64(*v),
            Some(Token::Float(v)) => Scalar::Float64(if negative { -v } else { *v }),
            Some(Token::Str(s)) if !negative => Scalar::Utf8(s.clone()),
            Some(Token::True) if !negative => Scalar::Bool(true),
            Some(Token::False) if !negative => Scalar::Bool(false),
            _ => return Err(syntax(self.offset(), "list items must be literals")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_arith(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithmeticOp::Add,
                Some(Token::Minus) => ArithmeticOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithmeticOp::Mul,
                Some(Token::Slash) => ArithmeticOp::Div,
                Some(Token::SlashSlash) => ArithmeticOp::FloorDiv,
                Some(Token::Percent) => ArithmeticOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let inner = self.nested(Self::parse_unary)?;
                Ok(negate(inner))
            }
            Some(Token::Plus) => {
                self.advance();
                let inner = self.nested(Self::parse_unary)?;
                Ok(Expr::Pos {
                    expr: Box::new(inner),
                })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_atom()?;
        if self.peek() == Some(&Token::StarStar) {
            self.advance();
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::Arith {
                op: ArithmeticOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        let Some(token) = self.peek() else {
            return Err(self.unexpected());
        };
        let literal = |value: Scalar| Ok(Expr::Literal { value });
        match token {
            Token::Int(v) => {
                self.advance();
                literal(Scalar::Int64(*v))
            }
            Token::Float(v) => {
                self.advance();
                literal(Scalar::Float64(*v))
            }
            Token::Str(s) => {
                self.advance();
                literal(Scalar::Utf8(s.clone()))
            }
            Token::True => {
                self.advance();
                literal(Scalar::Bool(true))
            }
            Token::False => {
                self.advance();
                literal(Scalar::Bool(false))
            }
            Token::Quoted(name) => {
                self.advance();
                Ok(Expr::Column {
                    name: ColumnRef(name.clone()),
                })
            }
            Token::Ident(name) => {
                self.advance();
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Column {
                        name: ColumnRef(name.clone()),
                    });
                }
                let function =
                    Function::from_name(name).ok_or_else(|| ExprError::UnknownFunction {
                        name: name.clone(),
                        offset,
                    })?;
                self.advance();
                let args = self.nested(Self::parse_args)?;
                if args.len() != function.arity() {
                    return Err(ExprError::WrongArity {
                        function,
                        expected: function.arity(),
                        found: args.len(),
                    });
                }
                Ok(Expr::Call { function, args })
            }
            Token::LParen => {
                self.advance();
                let inner = self.nested(Self::parse_or)?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(syntax(self.offset(), "expected closing ')'"));
                }
                self.advance();
                Ok(inner)
            }
            Token::LBracket => Err(syntax(
                offset,
                "list literals are only allowed after 'in' or 'not in'",
            )),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.peek() {
                Some(Token::Comma) => self.advance(),
                Some(Token::RParen) => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err(syntax(self.offset(), "expected ',' or ')' in call")),
            }
        }
    }
}

fn join_chain(chain: Option<Expr>, link: Expr) -> Expr {
    match chain {
        None => link,
        Some(previous) => Expr::And {
            left: Box::new(previous),
            right: Box::new(link),
        },
    }
}

/// Fold `-<number>` into a negative literal; anything else becomes `Neg`.
fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Literal {
            value: Scalar::Int64(v),
        } if v != i64::MIN => Expr::Literal {
            value: Scalar::Int64(-v),
        },
        Expr::Literal {
            value: Scalar::Float64(v),
        } => Expr::Literal {
            value: Scalar::Float64(-v),
        },
        other => Expr::Neg {
            expr: Box::new(other),
        },
    }
}

/// Parse with the default [`EvalLimits`].
pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    parse_expr_with_limits(input, &EvalLimits::default())
}

pub fn parse_expr_with_limits(input: &str, limits: &EvalLimits) -> Result<Expr, ExprError> {
    let len = input.chars().count();
    if len > limits.max_expression_len {
        return Err(ExprError::TooLong {
            len,
            max: limits.max_expression_len,
        });
    }

    let lexemes = tokenize(input)?;
    let mut parser = Parser::new(&lexemes, len, limits.max_depth);
    let expr = parser.parse_or()?;
    if parser.pos < lexemes.len() {
        return Err(parser.unexpected());
    }
    // Operator chains build depth without recursing in the parser.
    if expr.depth() > limits.max_depth {
        return Err(ExprError::TooDeep {
            max: limits.max_depth,
        });
    }
    Ok(expr)
}
