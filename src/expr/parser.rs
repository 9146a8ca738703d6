//! 基于 nom 的表达式语法分析，优先级由低到高：
//! `?:` < `||` < `&&` < `== !=` < `< <= > >=` < `+ -` < `* / %` < 一元 `! -` < 后缀 `[i] .f`。
//!
//! 嵌套深度受 [`MAX_DEPTH`] 限制，因此求值器与编译期检查的递归深度同样有界。
use std::cell::Cell;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, cut, map, opt, recognize, value};
use nom::error::{Error, ErrorKind};
use nom::multi::separated_list0;
use nom::sequence::{delimited, pair, preceded, separated_pair};
use nom::{IResult, Parser};

use crate::expr::ast::{BinaryOp, Expr, UnaryOp};
use crate::net::color::Color;

type Res<'a, O> = IResult<&'a str, O>;

/// 每层括号计两层（`?:` 与一元各一次），每个前缀运算符计一层。
pub const MAX_DEPTH: usize = 64;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter(input: &str) -> Result<Self, nom::Err<Error<&str>>> {
        let depth = DEPTH.with(|d| {
            d.set(d.get() + 1);
            d.get()
        });
        // 先构造再判断，失败时由 Drop 回退计数
        let guard = DepthGuard;
        if depth > MAX_DEPTH {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }
        Ok(guard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// 解析完整表达式；失败时返回出错位置的字节偏移与简短描述。
pub fn parse(text: &str) -> Result<Expr, (usize, String)> {
    match all_consuming(ws(ternary)).parse(text) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            let offset = text.len() - err.input.len();
            let message = if err.code == ErrorKind::TooLarge {
                "expression nested too deeply".to_string()
            } else if err.input.is_empty() {
                "unexpected end of expression".to_string()
            } else {
                format!("unexpected input {:?} ({:?})", preview(err.input), err.code)
            };
            Err((offset, message))
        }
        Err(nom::Err::Incomplete(_)) => Err((text.len(), "incomplete expression".to_string())),
    }
}

fn preview(input: &str) -> &str {
    match input.char_indices().nth(12) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn sym<'a>(c: char) -> impl Parser<&'a str, Output = char, Error = Error<&'a str>> {
    ws(char(c))
}

fn ternary(input: &str) -> Res<'_, Expr> {
    let _depth = DepthGuard::enter(input)?;
    let (input, cond) = logic_or(input)?;
    match preceded(sym('?'), cut(separated_pair(ternary, sym(':'), ternary))).parse(input) {
        Ok((rest, (then, otherwise))) => Ok((
            rest,
            Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)),
        )),
        Err(nom::Err::Error(_)) => Ok((input, cond)),
        Err(err) => Err(err),
    }
}

/// 左结合二元运算层。
fn binary_level<'a>(
    input: &'a str,
    operand: fn(&'a str) -> Res<'a, Expr>,
    operator: fn(&'a str) -> Res<'a, BinaryOp>,
) -> Res<'a, Expr> {
    let (mut input, mut lhs) = operand(input)?;
    loop {
        match pair(operator, cut(operand)).parse(input) {
            Ok((rest, (op, rhs))) => {
                lhs = Expr::binary(op, lhs, rhs);
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, lhs)),
            Err(err) => return Err(err),
        }
    }
}

fn logic_or(input: &str) -> Res<'_, Expr> {
    binary_level(input, logic_and, or_op)
}

fn logic_and(input: &str) -> Res<'_, Expr> {
    binary_level(input, equality, and_op)
}

fn equality(input: &str) -> Res<'_, Expr> {
    binary_level(input, comparison, equality_op)
}

fn comparison(input: &str) -> Res<'_, Expr> {
    binary_level(input, additive, comparison_op)
}

fn additive(input: &str) -> Res<'_, Expr> {
    binary_level(input, multiplicative, additive_op)
}

fn multiplicative(input: &str) -> Res<'_, Expr> {
    binary_level(input, unary, multiplicative_op)
}

fn or_op(input: &str) -> Res<'_, BinaryOp> {
    ws(value(BinaryOp::Or, tag("||"))).parse(input)
}

fn and_op(input: &str) -> Res<'_, BinaryOp> {
    ws(value(BinaryOp::And, tag("&&"))).parse(input)
}

fn equality_op(input: &str) -> Res<'_, BinaryOp> {
    ws(alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
    )))
    .parse(input)
}

fn comparison_op(input: &str) -> Res<'_, BinaryOp> {
    ws(alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
    )))
    .parse(input)
}

fn additive_op(input: &str) -> Res<'_, BinaryOp> {
    ws(alt((
        value(BinaryOp::Add, tag("+")),
        value(BinaryOp::Sub, tag("-")),
    )))
    .parse(input)
}

fn multiplicative_op(input: &str) -> Res<'_, BinaryOp> {
    ws(alt((
        value(BinaryOp::Mul, tag("*")),
        value(BinaryOp::Div, tag("/")),
        value(BinaryOp::Rem, tag("%")),
    )))
    .parse(input)
}

fn unary(input: &str) -> Res<'_, Expr> {
    let _depth = DepthGuard::enter(input)?;
    alt((
        map(preceded(not_op, cut(unary)), |e| Expr::unary(UnaryOp::Not, e)),
        map(preceded(sym('-'), cut(unary)), |e| Expr::unary(UnaryOp::Neg, e)),
        postfix,
    ))
    .parse(input)
}

// `!` 但不是 `!=`
fn not_op(input: &str) -> Res<'_, char> {
    let (rest, bang) = sym('!').parse(input)?;
    if rest.starts_with('=') {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Char)));
    }
    Ok((rest, bang))
}

fn postfix(input: &str) -> Res<'_, Expr> {
    let (mut input, mut expr) = primary(input)?;
    loop {
        match preceded(sym('['), cut(pair(ternary, sym(']')))).parse(input) {
            Ok((rest, (index, _))) => {
                expr = Expr::Index(Box::new(expr), Box::new(index));
                input = rest;
                continue;
            }
            Err(nom::Err::Error(_)) => {}
            Err(err) => return Err(err),
        }
        match preceded(sym('.'), cut(identifier)).parse(input) {
            Ok((rest, field)) => {
                expr = Expr::Member(Box::new(expr), field.to_owned());
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, expr)),
            Err(err) => return Err(err),
        }
    }
}

fn primary(input: &str) -> Res<'_, Expr> {
    ws(alt((
        number,
        map(string_literal, |s| Expr::Literal(Color::String(s))),
        list_literal,
        map_literal,
        parenthesized,
        identifier_or_call,
    )))
    .parse(input)
}

fn digits(input: &str) -> Res<'_, &str> {
    digit1(input)
}

fn number(input: &str) -> Res<'_, Expr> {
    let (rest, text) = recognize(pair(digits, opt(pair(char('.'), digits)))).parse(input)?;
    if text.contains('.') {
        match text.parse::<f64>() {
            Ok(v) => Ok((rest, Expr::Literal(Color::Float(v)))),
            Err(_) => Err(nom::Err::Failure(Error::new(input, ErrorKind::Float))),
        }
    } else {
        match text.parse::<i64>() {
            Ok(v) => Ok((rest, Expr::Literal(Color::Int(v)))),
            Err(_) => Err(nom::Err::Failure(Error::new(input, ErrorKind::Digit))),
        }
    }
}

/// `"…"` 或 `'…'`，支持 `\n \t \r \0` 以及对引号、反斜杠的转义。
fn string_literal(input: &str) -> Res<'_, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('"' | '\''))) => c,
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
    };
    let mut out = String::new();
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[idx + c.len_utf8()..], out));
        } else {
            out.push(c);
        }
    }
    Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)))
}

fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn identifier_or_call(input: &str) -> Res<'_, Expr> {
    let (input, name) = identifier(input)?;
    match name {
        "true" => return Ok((input, Expr::Literal(Color::Bool(true)))),
        "false" => return Ok((input, Expr::Literal(Color::Bool(false)))),
        "nil" | "null" => return Ok((input, Expr::Literal(Color::Null))),
        _ => {}
    }
    match preceded(
        sym('('),
        cut(pair(separated_list0(sym(','), ternary), sym(')'))),
    )
    .parse(input)
    {
        Ok((rest, (args, _))) => Ok((rest, Expr::Call(name.to_owned(), args))),
        Err(nom::Err::Error(_)) => Ok((input, Expr::Var(name.to_owned()))),
        Err(err) => Err(err),
    }
}

fn list_literal(input: &str) -> Res<'_, Expr> {
    map(
        preceded(
            char('['),
            cut(pair(separated_list0(sym(','), ternary), sym(']'))),
        ),
        |(items, _)| Expr::List(items),
    )
    .parse(input)
}

fn map_key(input: &str) -> Res<'_, String> {
    ws(alt((
        string_literal,
        map(identifier, |s: &str| s.to_owned()),
    )))
    .parse(input)
}

fn map_literal(input: &str) -> Res<'_, Expr> {
    map(
        preceded(
            char('{'),
            cut(pair(
                separated_list0(sym(','), separated_pair(map_key, sym(':'), ternary)),
                sym('}'),
            )),
        ),
        |(entries, _)| Expr::Map(entries),
    )
    .parse(input)
}

fn parenthesized(input: &str) -> Res<'_, Expr> {
    map(
        preceded(char('('), cut(pair(ternary, sym(')')))),
        |(inner, _)| inner,
    )
    .parse(input)
}
