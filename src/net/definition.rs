//! 网定义：加载格式，同时也是每次发生后导出的快照格式。
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::net::color::Color;
use crate::net::ids::{PlaceId, TokenId, TransitionId};

/// 纯数据形式的着色 Petri 网：拓扑结构加 token 多重集。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetDefinition {
    #[serde(default)]
    pub places: Vec<Place>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub input_arcs: Vec<InputArc>,
    #[serde(default)]
    pub output_arcs: Vec<OutputArc>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
}

/// 输入弧: place -> transition，`expr` 为守卫表达式（空串表示恒真）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputArc {
    #[serde(rename = "from_id")]
    pub from: PlaceId,
    #[serde(rename = "to_id")]
    pub to: TransitionId,
    #[serde(default)]
    pub expr: String,
}

/// 输出弧: transition -> place，`expr` 为颜色生成表达式（空串表示无颜色）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputArc {
    #[serde(rename = "from_id")]
    pub from: TransitionId,
    #[serde(rename = "to_id")]
    pub to: PlaceId,
    #[serde(default)]
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub place_id: PlaceId,
    #[serde(default)]
    pub color: Color,
}

impl InputArc {
    pub fn new(from: impl Into<PlaceId>, to: impl Into<TransitionId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            expr: String::new(),
        }
    }

    pub fn guarded(
        from: impl Into<PlaceId>,
        to: impl Into<TransitionId>,
        expr: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            expr: expr.into(),
        }
    }

    /// 弧的排序键 `"from->to"`。
    pub fn key(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }
}

impl OutputArc {
    pub fn new(from: impl Into<TransitionId>, to: impl Into<PlaceId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            expr: String::new(),
        }
    }

    pub fn producing(
        from: impl Into<TransitionId>,
        to: impl Into<PlaceId>,
        expr: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            expr: expr.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }
}

impl fmt::Display for InputArc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

impl fmt::Display for OutputArc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

impl Token {
    pub fn new(id: impl Into<TokenId>, place: impl Into<PlaceId>, color: impl Into<Color>) -> Self {
        Self {
            id: id.into(),
            place_id: place.into(),
            color: color.into(),
        }
    }
}

impl NetDefinition {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn place(mut self, id: impl Into<PlaceId>) -> Self {
        self.places.push(Place { id: id.into() });
        self
    }

    pub fn transition(mut self, id: impl Into<TransitionId>) -> Self {
        self.transitions.push(Transition { id: id.into() });
        self
    }

    pub fn input_arc(mut self, from: impl Into<PlaceId>, to: impl Into<TransitionId>) -> Self {
        self.input_arcs.push(InputArc::new(from, to));
        self
    }

    pub fn guarded_arc(
        mut self,
        from: impl Into<PlaceId>,
        to: impl Into<TransitionId>,
        expr: impl Into<String>,
    ) -> Self {
        self.input_arcs.push(InputArc::guarded(from, to, expr));
        self
    }

    pub fn output_arc(mut self, from: impl Into<TransitionId>, to: impl Into<PlaceId>) -> Self {
        self.output_arcs.push(OutputArc::new(from, to));
        self
    }

    pub fn producing_arc(
        mut self,
        from: impl Into<TransitionId>,
        to: impl Into<PlaceId>,
        expr: impl Into<String>,
    ) -> Self {
        self.output_arcs.push(OutputArc::producing(from, to, expr));
        self
    }

    pub fn token(
        mut self,
        id: impl Into<TokenId>,
        place: impl Into<PlaceId>,
        color: impl Into<Color>,
    ) -> Self {
        self.tokens.push(Token::new(id, place, color));
        self
    }

    /// 快照顺序：库所/迁移/token 按 ID 升序，弧按 `"from->to"` 升序（稳定排序）。
    pub fn canonical(&self) -> Self {
        Self {
            places: self
                .places
                .iter()
                .cloned()
                .sorted_by(|a, b| a.id.cmp(&b.id))
                .collect(),
            transitions: self
                .transitions
                .iter()
                .cloned()
                .sorted_by(|a, b| a.id.cmp(&b.id))
                .collect(),
            input_arcs: self
                .input_arcs
                .iter()
                .cloned()
                .sorted_by_cached_key(InputArc::key)
                .collect(),
            output_arcs: self
                .output_arcs
                .iter()
                .cloned()
                .sorted_by_cached_key(OutputArc::key)
                .collect(),
            tokens: self
                .tokens
                .iter()
                .cloned()
                .sorted_by(|a, b| a.id.cmp(&b.id))
                .collect(),
        }
    }

    /// 五库所示例网：`t1` 分叉到 `p2`/`p3`，`t2`/`t3` 汇合到 `p4`，`t4` 流向 `p5`。
    pub fn example() -> Self {
        Self::empty()
            .place("p1")
            .place("p2")
            .place("p3")
            .place("p4")
            .place("p5")
            .transition("t1")
            .transition("t2")
            .transition("t3")
            .transition("t4")
            .input_arc("p1", "t1")
            .input_arc("p2", "t2")
            .input_arc("p3", "t3")
            .input_arc("p4", "t4")
            .output_arc("t1", "p2")
            .output_arc("t1", "p3")
            .output_arc("t2", "p4")
            .output_arc("t3", "p4")
            .output_arc("t4", "p5")
            .token("t1", "p1", "foobar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_the_wire_layout() {
        let json = r#"{
            "places": [{"id": "p1"}, {"id": "p2"}],
            "transitions": [{"id": "t1"}],
            "input_arcs": [{"from_id": "p1", "to_id": "t1", "expr": "color == 1"}],
            "output_arcs": [{"from_id": "t1", "to_id": "p2"}],
            "tokens": [{"id": "a", "place_id": "p1", "color": 1}, {"id": "b", "place_id": "p1"}]
        }"#;
        let net: NetDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(net.input_arcs[0].expr, "color == 1");
        assert_eq!(net.output_arcs[0].expr, "");
        assert_eq!(net.tokens[1].color, Color::Null);
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let net: NetDefinition = serde_json::from_str("{}").unwrap();
        assert_eq!(net, NetDefinition::empty());
    }

    #[test]
    fn canonical_sorts_ids_and_arc_keys() {
        let net = NetDefinition::empty()
            .place("p2")
            .place("p1")
            .transition("t1")
            .input_arc("p2", "t1")
            .input_arc("p1", "t1")
            .output_arc("t1", "p2")
            .output_arc("t1", "p1")
            .token("z", "p1", Color::Null)
            .token("a", "p2", Color::Null)
            .canonical();
        assert_eq!(net.places[0].id.as_str(), "p1");
        assert_eq!(net.input_arcs[0].key(), "p1->t1");
        assert_eq!(net.output_arcs[0].key(), "t1->p1");
        assert_eq!(net.tokens[0].id.as_str(), "a");
    }
}
