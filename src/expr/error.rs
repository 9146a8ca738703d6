use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("syntax error in `{expr}` at offset {offset}: {message}")]
    Syntax {
        expr: String,
        offset: usize,
        message: String,
    },
    #[error("unknown variable `{name}` in `{expr}` (only `{available}` is bound here)")]
    UnknownVariable {
        expr: String,
        name: String,
        available: &'static str,
    },
    #[error("unknown function `{name}` in `{expr}`")]
    UnknownFunction { expr: String, name: String },
    #[error("function `{name}` in `{expr}` expects {expected} argument(s), got {found}")]
    Arity {
        expr: String,
        name: String,
        expected: String,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("cannot apply `{op}` to {left} and {right}")]
    BinaryType {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("cannot apply `{op}` to {operand}")]
    UnaryType {
        op: &'static str,
        operand: &'static str,
    },
    #[error("ternary condition must be bool, got {0}")]
    NonBooleanCondition(&'static str),
    #[error("cannot index {target} with {index}")]
    NotIndexable {
        target: &'static str,
        index: &'static str,
    },
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in `{0}`")]
    Overflow(&'static str),
    #[error("`{func}` does not accept {found}")]
    Argument {
        func: &'static str,
        found: &'static str,
    },
    #[error("variable `{0}` is not bound")]
    UnboundVariable(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
}
