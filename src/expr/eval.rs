//! 表达式求值：对 AST 直接解释执行。
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::expr::ast::{BinaryOp, Expr, UnaryOp};
use crate::expr::error::EvalError;
use crate::expr::{Bindings, Builtin, RandomSource};
use crate::net::color::Color;

pub(crate) struct Evaluator<'a, 'b> {
    pub bindings: &'a Bindings<'a>,
    pub rng: &'b mut dyn RandomSource,
}

impl Evaluator<'_, '_> {
    pub fn eval(&mut self, expr: &Expr) -> Result<Color, EvalError> {
        match expr {
            Expr::Literal(color) => Ok(color.clone()),
            Expr::Var(name) => self
                .bindings
                .lookup(name)
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Color::List),
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Color::Map(map))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                if self.eval_bool(lhs, "&&")? {
                    Ok(Color::Bool(self.eval_bool(rhs, "&&")?))
                } else {
                    Ok(Color::Bool(false))
                }
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if self.eval_bool(lhs, "||")? {
                    Ok(Color::Bool(true))
                } else {
                    Ok(Color::Bool(self.eval_bool(rhs, "||")?))
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let left = self.eval(lhs)?;
                let right = self.eval(rhs)?;
                binary(*op, left, right)
            }
            Expr::Ternary(cond, then, otherwise) => match self.eval(cond)? {
                Color::Bool(true) => self.eval(then),
                Color::Bool(false) => self.eval(otherwise),
                other => Err(EvalError::NonBooleanCondition(other.type_name())),
            },
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_into(target, index)
            }
            Expr::Member(target, field) => match self.eval(target)? {
                Color::Map(mut map) => Ok(map.remove(field).unwrap_or(Color::Null)),
                other => Err(EvalError::NotIndexable {
                    target: other.type_name(),
                    index: "field",
                }),
            },
            Expr::Call(name, args) => {
                let builtin = Builtin::from_name(name)
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(builtin, args)
            }
        }
    }

    fn eval_bool(&mut self, expr: &Expr, op: &'static str) -> Result<bool, EvalError> {
        match self.eval(expr)? {
            Color::Bool(b) => Ok(b),
            other => Err(EvalError::UnaryType {
                op,
                operand: other.type_name(),
            }),
        }
    }

    fn call(&mut self, builtin: Builtin, args: Vec<Color>) -> Result<Color, EvalError> {
        let name = builtin.name();
        let bad_argument = |found: &Color| EvalError::Argument {
            func: name,
            found: found.type_name(),
        };
        match builtin {
            Builtin::Rand => Ok(Color::Float(self.rng.next_f64())),
            Builtin::Len => match &args[0] {
                Color::String(s) => Ok(Color::Int(s.chars().count() as i64)),
                Color::List(items) => Ok(Color::Int(items.len() as i64)),
                Color::Map(map) => Ok(Color::Int(map.len() as i64)),
                other => Err(bad_argument(other)),
            },
            Builtin::Abs => match &args[0] {
                Color::Int(i) => i
                    .checked_abs()
                    .map(Color::Int)
                    .ok_or(EvalError::Overflow("abs")),
                Color::Float(f) => Ok(Color::Float(f.abs())),
                other => Err(bad_argument(other)),
            },
            Builtin::Min | Builtin::Max => {
                let want = if builtin == Builtin::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let mut best: Option<Color> = None;
                for arg in args {
                    if arg.as_f64().is_none() {
                        return Err(bad_argument(&arg));
                    }
                    best = match best {
                        Some(current) if compare_numbers(&arg, &current) != Some(want) => {
                            Some(current)
                        }
                        _ => Some(arg),
                    };
                }
                Ok(best.unwrap_or(Color::Null))
            }
            Builtin::Int => match &args[0] {
                Color::Int(i) => Ok(Color::Int(*i)),
                Color::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                    Ok(Color::Int(f.trunc() as i64))
                }
                Color::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Color::Int)
                    .map_err(|_| bad_argument(&args[0])),
                other => Err(bad_argument(other)),
            },
            Builtin::Float => match &args[0] {
                Color::Int(i) => Ok(Color::Float(*i as f64)),
                Color::Float(f) => Ok(Color::Float(*f)),
                Color::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Color::Float)
                    .map_err(|_| bad_argument(&args[0])),
                other => Err(bad_argument(other)),
            },
            Builtin::String => match &args[0] {
                Color::String(s) => Ok(Color::String(s.clone())),
                other => Ok(Color::String(other.to_string())),
            },
        }
    }
}

fn unary(op: UnaryOp, value: Color) -> Result<Color, EvalError> {
    match (op, value) {
        (UnaryOp::Not, Color::Bool(b)) => Ok(Color::Bool(!b)),
        (UnaryOp::Neg, Color::Int(i)) => i
            .checked_neg()
            .map(Color::Int)
            .ok_or(EvalError::Overflow("-")),
        (UnaryOp::Neg, Color::Float(f)) => Ok(Color::Float(-f)),
        (op, other) => Err(EvalError::UnaryType {
            op: op.symbol(),
            operand: other.type_name(),
        }),
    }
}

fn binary(op: BinaryOp, left: Color, right: Color) -> Result<Color, EvalError> {
    let mismatch = |left: &Color, right: &Color| EvalError::BinaryType {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    };
    match op {
        BinaryOp::Eq => Ok(Color::Bool(left.loose_eq(&right))),
        BinaryOp::Ne => Ok(Color::Bool(!left.loose_eq(&right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Color::String(a), Color::String(b)) => Some(a.cmp(b)),
                _ if left.as_f64().is_some() && right.as_f64().is_some() => {
                    compare_numbers(&left, &right)
                }
                _ => return Err(mismatch(&left, &right)),
            };
            // NaN 参与比较时一律为 false
            let result = match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
            };
            Ok(Color::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (Color::Int(a), Color::Int(b)) => a
                .checked_add(b)
                .map(Color::Int)
                .ok_or(EvalError::Overflow("+")),
            (Color::String(a), Color::String(b)) => Ok(Color::String(a + &b)),
            (Color::List(mut a), Color::List(b)) => {
                a.extend(b);
                Ok(Color::List(a))
            }
            (left, right) => float_op(&left, &right, |a, b| a + b).ok_or(mismatch(&left, &right)),
        },
        BinaryOp::Sub => match (left, right) {
            (Color::Int(a), Color::Int(b)) => a
                .checked_sub(b)
                .map(Color::Int)
                .ok_or(EvalError::Overflow("-")),
            (left, right) => float_op(&left, &right, |a, b| a - b).ok_or(mismatch(&left, &right)),
        },
        BinaryOp::Mul => match (left, right) {
            (Color::Int(a), Color::Int(b)) => a
                .checked_mul(b)
                .map(Color::Int)
                .ok_or(EvalError::Overflow("*")),
            (left, right) => float_op(&left, &right, |a, b| a * b).ok_or(mismatch(&left, &right)),
        },
        BinaryOp::Div => match (left.as_f64(), right.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(EvalError::DivisionByZero),
            (Some(a), Some(b)) => Ok(Color::Float(a / b)),
            _ => Err(mismatch(&left, &right)),
        },
        BinaryOp::Rem => match (&left, &right) {
            (Color::Int(_), Color::Int(0)) => Err(EvalError::DivisionByZero),
            (Color::Int(a), Color::Int(b)) => a
                .checked_rem(*b)
                .map(Color::Int)
                .ok_or(EvalError::Overflow("%")),
            _ => Err(mismatch(&left, &right)),
        },
        BinaryOp::And | BinaryOp::Or => match (&left, &right) {
            (Color::Bool(a), Color::Bool(b)) => Ok(Color::Bool(if op == BinaryOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch(&left, &right)),
        },
    }
}

fn float_op(left: &Color, right: &Color, f: impl Fn(f64, f64) -> f64) -> Option<Color> {
    Some(Color::Float(f(left.as_f64()?, right.as_f64()?)))
}

fn compare_numbers(left: &Color, right: &Color) -> Option<Ordering> {
    match (left, right) {
        (Color::Int(a), Color::Int(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn index_into(target: Color, index: Color) -> Result<Color, EvalError> {
    match (target, index) {
        (Color::List(mut items), Color::Int(i)) => {
            let len = items.len();
            let resolved = if i < 0 { len as i64 + i } else { i };
            if resolved < 0 || resolved as usize >= len {
                return Err(EvalError::IndexOutOfBounds { index: i, len });
            }
            Ok(items.swap_remove(resolved as usize))
        }
        (Color::Map(mut map), Color::String(key)) => Ok(map.remove(&key).unwrap_or(Color::Null)),
        (target, index) => Err(EvalError::NotIndexable {
            target: target.type_name(),
            index: index.type_name(),
        }),
    }
}
