use thiserror::Error;

use crate::expr::EvalError;
use crate::net::ids::{FireId, TransitionId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FireError {
    #[error("unknown transition {0:?}")]
    UnknownTransition(TransitionId),
    #[error("transition {0:?} is not enabled")]
    NotEnabled(TransitionId),
    #[error("no transition is enabled")]
    NoneEnabled,
    /// 可激发检查通过，但消耗阶段重新搜索时找不到匹配（守卫不确定时可能发生）。
    #[error("transition {0:?} passed the enabled check but no consumable binding was found")]
    ConsumeFailed(TransitionId),
    #[error("guard `{expr}` on arc {arc} failed: {source}")]
    Guard {
        arc: String,
        expr: String,
        source: EvalError,
    },
    #[error("guard `{expr}` on arc {arc} returned {found}, expected bool")]
    NonBooleanGuard {
        arc: String,
        expr: String,
        found: &'static str,
    },
    #[error("production `{expr}` on arc {arc} failed: {source}")]
    Production {
        arc: String,
        expr: String,
        source: EvalError,
    },
    #[error("unknown or already finished fire {0:?}")]
    UnknownFire(FireId),
}
