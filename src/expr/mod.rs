//! # 弧表达式
//!
//! 输入弧携带守卫表达式，绑定唯一变量 `color`（候选 token 的颜色），结果必须为
//! bool；输出弧携带颜色生成表达式，绑定 `colors`（本次发生按输入库所顺序消耗的
//! 颜色列表）。
//!
//! ```rust
//! use rustcpn::expr::{compile, Bindings, Scope};
//! use rustcpn::net::Color;
//! use rand::SeedableRng;
//!
//! let program = compile("colors[0] + 42", Scope::Production).unwrap();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let colors = [Color::Int(42)];
//! let out = program.run(&Bindings::Production { colors: &colors }, &mut rng).unwrap();
//! assert_eq!(out, Color::Int(84));
//! ```
pub mod ast;
pub mod cache;
pub mod error;
mod eval;
pub mod parser;

use std::fmt;

use rand::Rng;

pub use cache::ExprCache;
pub use error::{CompileError, EvalError};

use crate::expr::ast::Expr;
use crate::expr::eval::Evaluator;
use crate::net::color::Color;

/// `rand()` 的均匀随机源，每次求值显式传入，由各运行器自行掌控熵。
pub trait RandomSource {
    /// `[0, 1)` 上的一次均匀抽样。
    fn next_f64(&mut self) -> f64;
}

impl<R: Rng> RandomSource for R {
    fn next_f64(&mut self) -> f64 {
        self.random::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Guard,
    Production,
}

impl Scope {
    pub fn variable(self) -> &'static str {
        match self {
            Scope::Guard => "color",
            Scope::Production => "colors",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Guard => write!(f, "guard"),
            Scope::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Bindings<'a> {
    Guard { color: &'a Color },
    Production { colors: &'a [Color] },
}

impl Bindings<'_> {
    fn lookup(&self, name: &str) -> Option<Color> {
        match (self, name) {
            (Bindings::Guard { color }, "color") => Some((*color).clone()),
            (Bindings::Production { colors }, "colors") => Some(Color::List(colors.to_vec())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Rand,
    Len,
    Abs,
    Min,
    Max,
    Int,
    Float,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "rand" => Builtin::Rand,
            "len" => Builtin::Len,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "string" => Builtin::String,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Rand => "rand",
            Builtin::Len => "len",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::String => "string",
        }
    }

    fn arity(self) -> Arity {
        match self {
            Builtin::Rand => Arity::Exact(0),
            Builtin::Min | Builtin::Max => Arity::AtLeast(1),
            _ => Arity::Exact(1),
        }
    }
}

/// 编译后的弧表达式。
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    scope: Scope,
    root: Expr,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn run(
        &self,
        bindings: &Bindings<'_>,
        rng: &mut dyn RandomSource,
    ) -> Result<Color, EvalError> {
        Evaluator { bindings, rng }.eval(&self.root)
    }
}

/// 解析 `text`，并按 `scope` 检查其引用的每个名字。
pub fn compile(text: &str, scope: Scope) -> Result<Program, CompileError> {
    let root = parser::parse(text).map_err(|(offset, message)| CompileError::Syntax {
        expr: text.to_owned(),
        offset,
        message,
    })?;

    let mut problem = None;
    root.walk(&mut |node| {
        if problem.is_some() {
            return;
        }
        problem = check_node(node, text, scope).err();
    });
    if let Some(err) = problem {
        return Err(err);
    }

    Ok(Program {
        source: text.to_owned(),
        scope,
        root,
    })
}

fn check_node(node: &Expr, text: &str, scope: Scope) -> Result<(), CompileError> {
    match node {
        Expr::Var(name) if name != scope.variable() => Err(CompileError::UnknownVariable {
            expr: text.to_owned(),
            name: name.clone(),
            available: scope.variable(),
        }),
        Expr::Call(name, args) => {
            let builtin =
                Builtin::from_name(name).ok_or_else(|| CompileError::UnknownFunction {
                    expr: text.to_owned(),
                    name: name.clone(),
                })?;
            let (ok, expected) = match builtin.arity() {
                Arity::Exact(n) => (args.len() == n, n.to_string()),
                Arity::AtLeast(n) => (args.len() >= n, format!("at least {}", n)),
            };
            if ok {
                Ok(())
            } else {
                Err(CompileError::Arity {
                    expr: text.to_owned(),
                    name: name.clone(),
                    expected,
                    found: args.len(),
                })
            }
        }
        _ => Ok(()),
    }
}
