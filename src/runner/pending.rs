//! 异步发生：已消耗、尚未生产的一次发生。
use serde::Serialize;
use smallvec::SmallVec;

use crate::net::color::Color;
use crate::net::definition::Token;
use crate::net::ids::{FireId, PlaceIdx, TransitionId, TransitionIdx};

/// 待决发生：输入 token 已离开网，输出尚未生产。由 `fire_resolve` 或 `fire_reject` 之一结束。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingFire {
    pub id: FireId,
    pub transition: TransitionId,
    /// 按输入弧声明顺序，携带原所在库所。
    pub consumed: Vec<Token>,
    #[serde(skip)]
    pub(crate) transition_idx: TransitionIdx,
    #[serde(skip)]
    pub(crate) origins: SmallVec<[PlaceIdx; 4]>,
}

impl PendingFire {
    pub fn colors(&self) -> Vec<Color> {
        self.consumed.iter().map(|token| token.color.clone()).collect()
    }
}
