//! Guard expressions for `if` / `when` tests and `bind` values.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or      := and (("or" | "||") and)*
//! and     := unary (("and" | "&&") unary)*
//! unary   := ("not" | "!") unary | compare
//! compare := primary (op primary)?
//! op      := == | = | != | <> | < | <= | > | >= | eq | ne | lt | lte | gt | gte
//! primary := "(" or ")" | string | number | true | false | null | nil
//!          | len(path) | path
//! ```
//!
//! Expressions are parsed once, when SQL is registered, and evaluated
//! against each render's parameters.

use crate::render::Scope;
use nom::{
    Finish, IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    error::VerboseError,
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};
use sqlmapper_core::Value;
use std::cmp::Ordering;

pub(crate) type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed guard expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted parameter path; missing values evaluate to NULL
    Path(String),
    /// Length of the text, sequence or object at a path
    Len(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parse an expression, returning a readable message on failure.
    pub fn parse(input: &str) -> Result<Self, String> {
        match all_consuming(ws(or_expr))(input).finish() {
            Ok((_, expr)) => Ok(expr),
            Err(err) => {
                let near = err
                    .errors
                    .first()
                    .map(|(rest, _)| rest.trim())
                    .unwrap_or_default();
                if near.is_empty() {
                    Err(format!("incomplete expression '{}'", input.trim()))
                } else {
                    Err(format!("invalid expression '{}' near '{}'", input.trim(), near))
                }
            }
        }
    }

    /// Evaluate against the current render scope.
    pub(crate) fn evaluate(&self, scope: &Scope<'_>) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Path(path) => scope.lookup(path).unwrap_or(Value::Null),
            Expr::Len(path) => {
                let len = scope.lookup(path).and_then(|v| v.len()).unwrap_or(0);
                Value::BigInt(i64::try_from(len).unwrap_or(i64::MAX))
            }
            Expr::Not(inner) => Value::Bool(!inner.evaluate(scope).is_truthy()),
            Expr::And(lhs, rhs) => {
                Value::Bool(lhs.evaluate(scope).is_truthy() && rhs.evaluate(scope).is_truthy())
            }
            Expr::Or(lhs, rhs) => {
                Value::Bool(lhs.evaluate(scope).is_truthy() || rhs.evaluate(scope).is_truthy())
            }
            Expr::Compare(op, lhs, rhs) => {
                let (lhs, rhs) = (lhs.evaluate(scope), rhs.evaluate(scope));
                let result = match op {
                    CmpOp::Eq => lhs.loose_eq(&rhs),
                    CmpOp::Ne => !lhs.loose_eq(&rhs),
                    CmpOp::Lt => lhs.loose_cmp(&rhs) == Some(Ordering::Less),
                    CmpOp::Le => matches!(
                        lhs.loose_cmp(&rhs),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    CmpOp::Gt => lhs.loose_cmp(&rhs) == Some(Ordering::Greater),
                    CmpOp::Ge => matches!(
                        lhs.loose_cmp(&rhs),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                };
                Value::Bool(result)
            }
        }
    }

    /// Evaluate as a guard.
    pub(crate) fn is_true(&self, scope: &Scope<'_>) -> bool {
        self.evaluate(scope).is_truthy()
    }
}

pub(crate) fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> ParseResult<'a, O>,
) -> impl FnMut(&'a str) -> ParseResult<'a, O> {
    delimited(multispace0, inner, multispace0)
}

/// A keyword that is not immediately followed by an identifier character.
pub(crate) fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> ParseResult<'a, &'a str> {
    terminated(
        tag(word),
        not(satisfy(|c: char| c.is_alphanumeric() || c == '_')),
    )
}

pub(crate) fn identifier(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

/// `a.b.0.c`, optionally written with a leading dot.
pub(crate) fn path(input: &str) -> ParseResult<'_, String> {
    map(
        recognize(pair(
            opt(char('.')),
            separated_list1(
                char('.'),
                take_while1(|c: char| c.is_alphanumeric() || c == '_'),
            ),
        )),
        |p: &str| p.trim_start_matches('.').to_string(),
    )(input)
}

pub(crate) fn quoted(input: &str) -> ParseResult<'_, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        str::to_string,
    )(input)
}

fn number(input: &str) -> ParseResult<'_, Value> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        |s: &str| {
            if s.contains('.') {
                s.parse::<f64>().map(Value::Double).map_err(|e| e.to_string())
            } else {
                s.parse::<i64>().map(Value::BigInt).map_err(|e| e.to_string())
            }
        },
    )(input)
}

fn cmp_op(input: &str) -> ParseResult<'_, CmpOp> {
    alt((
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Ne, tag("<>")),
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Eq, tag("=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
        value(CmpOp::Eq, keyword("eq")),
        value(CmpOp::Ne, keyword("ne")),
        value(CmpOp::Le, keyword("lte")),
        value(CmpOp::Lt, keyword("lt")),
        value(CmpOp::Ge, keyword("gte")),
        value(CmpOp::Gt, keyword("gt")),
    ))(input)
}

fn primary(input: &str) -> ParseResult<'_, Expr> {
    ws(alt((
        delimited(char('('), or_expr, char(')')),
        map(quoted, |s| Expr::Literal(Value::Text(s))),
        map(number, Expr::Literal),
        value(Expr::Literal(Value::Bool(true)), keyword("true")),
        value(Expr::Literal(Value::Bool(false)), keyword("false")),
        value(Expr::Literal(Value::Null), keyword("null")),
        value(Expr::Literal(Value::Null), keyword("nil")),
        map(
            preceded(
                pair(tag("len"), ws(char('('))),
                terminated(path, ws(char(')'))),
            ),
            Expr::Len,
        ),
        map(path, Expr::Path),
    )))(input)
}

fn compare(input: &str) -> ParseResult<'_, Expr> {
    let (input, lhs) = primary(input)?;
    let (input, rhs) = opt(pair(ws(cmp_op), primary))(input)?;
    let expr = match rhs {
        Some((op, rhs)) => Expr::Compare(op, Box::new(lhs), Box::new(rhs)),
        None => lhs,
    };
    Ok((input, expr))
}

fn unary(input: &str) -> ParseResult<'_, Expr> {
    alt((
        map(
            preceded(ws(alt((keyword("not"), tag("!")))), unary),
            |e| Expr::Not(Box::new(e)),
        ),
        compare,
    ))(input)
}

fn and_expr(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("&&"), keyword("and")))), unary))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)));
    Ok((input, expr))
}

fn or_expr(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(alt((tag("||"), keyword("or")))), and_expr))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e)));
    Ok((input, expr))
}
