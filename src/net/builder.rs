//! 运行时图的构造：由网定义建立以稠密索引互相引用的库所/迁移/弧/token，
//! 并做完整的引用完整性检查。构造完成后拓扑不再变化，只有 token 归属会变。
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use smallvec::SmallVec;
use thiserror::Error;

use crate::expr::{CompileError, ExprCache, Program, Scope};
use crate::net::color::Color;
use crate::net::definition::{InputArc, NetDefinition, OutputArc};
use crate::net::ids::{InputArcIdx, OutputArcIdx, PlaceId, PlaceIdx, TokenId, TransitionId, TransitionIdx};
use crate::net::index_vec::{Idx, IndexVec};

type ArcList<T> = SmallVec<[T; 4]>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{referrer} references unknown place {place:?}")]
    UnknownPlace { referrer: String, place: PlaceId },
    #[error("{referrer} references unknown transition {transition:?}")]
    UnknownTransition {
        referrer: String,
        transition: TransitionId,
    },
    #[error("place {0:?} is declared more than once")]
    DuplicatePlace(PlaceId),
    #[error("transition {0:?} is declared more than once")]
    DuplicateTransition(TransitionId),
    #[error("token {0:?} is declared more than once")]
    DuplicateToken(TokenId),
    #[error("transition {0:?} has no input arcs")]
    NoInputArcs(TransitionId),
    #[error("invalid expression on arc {arc}: {source}")]
    Expression { arc: String, source: CompileError },
}

#[derive(Debug, Clone)]
pub(crate) struct PlaceNode {
    pub id: PlaceId,
    /// 驻留 token，按 ID 有序，扫描顺序因此是确定的。
    pub tokens: BTreeSet<TokenId>,
}

#[derive(Debug, Clone)]
pub(crate) struct TransitionNode {
    pub id: TransitionId,
    pub inputs: ArcList<InputArcIdx>,
    pub outputs: ArcList<OutputArcIdx>,
}

#[derive(Debug, Clone)]
pub(crate) struct InputArcNode {
    pub arc: InputArc,
    pub from: PlaceIdx,
    pub guard: Option<Arc<Program>>,
}

#[derive(Debug, Clone)]
pub(crate) struct OutputArcNode {
    pub arc: OutputArc,
    pub to: PlaceIdx,
    pub production: Option<Arc<Program>>,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenEntry {
    pub place: PlaceIdx,
    pub color: Color,
}

/// 运行时网。库所、迁移与弧在 [`Graph::build`] 后固定；token 只经由
/// [`Graph::insert_token`] 与 [`Graph::remove_token`] 移动，二者同步维护全局索引和各库所的驻留集合。
#[derive(Debug, Clone)]
pub(crate) struct Graph {
    pub places: IndexVec<PlaceIdx, PlaceNode>,
    pub transitions: IndexVec<TransitionIdx, TransitionNode>,
    pub input_arcs: IndexVec<InputArcIdx, InputArcNode>,
    pub output_arcs: IndexVec<OutputArcIdx, OutputArcNode>,
    place_index: HashMap<PlaceId, PlaceIdx>,
    transition_index: HashMap<TransitionId, TransitionIdx>,
    tokens: HashMap<TokenId, TokenEntry>,
}

impl Graph {
    pub fn build(net: &NetDefinition) -> Result<Self, BuildError> {
        let mut graph = Graph {
            places: IndexVec::with_capacity(net.places.len()),
            transitions: IndexVec::with_capacity(net.transitions.len()),
            input_arcs: IndexVec::with_capacity(net.input_arcs.len()),
            output_arcs: IndexVec::with_capacity(net.output_arcs.len()),
            place_index: HashMap::with_capacity(net.places.len()),
            transition_index: HashMap::with_capacity(net.transitions.len()),
            tokens: HashMap::with_capacity(net.tokens.len()),
        };

        for place in &net.places {
            if graph.place_index.contains_key(&place.id) {
                return Err(BuildError::DuplicatePlace(place.id.clone()));
            }
            let idx = graph.places.push(PlaceNode {
                id: place.id.clone(),
                tokens: BTreeSet::new(),
            });
            graph.place_index.insert(place.id.clone(), idx);
        }

        for transition in &net.transitions {
            if graph.transition_index.contains_key(&transition.id) {
                return Err(BuildError::DuplicateTransition(transition.id.clone()));
            }
            let idx = graph.transitions.push(TransitionNode {
                id: transition.id.clone(),
                inputs: ArcList::new(),
                outputs: ArcList::new(),
            });
            graph.transition_index.insert(transition.id.clone(), idx);
        }

        // token 归属
        for token in &net.tokens {
            let place = graph
                .place_idx(&token.place_id)
                .ok_or_else(|| BuildError::UnknownPlace {
                    referrer: format!("token {:?}", token.id.as_str()),
                    place: token.place_id.clone(),
                })?;
            if graph.tokens.contains_key(&token.id) {
                return Err(BuildError::DuplicateToken(token.id.clone()));
            }
            graph.insert_token(token.id.clone(), place, token.color.clone());
        }

        let mut cache = ExprCache::new();

        // 输入弧: place -> transition
        for arc in &net.input_arcs {
            let referrer = format!("input arc {}", arc);
            let from = graph
                .place_idx(&arc.from)
                .ok_or_else(|| BuildError::UnknownPlace {
                    referrer: referrer.clone(),
                    place: arc.from.clone(),
                })?;
            let to = graph
                .transition_idx(&arc.to)
                .ok_or_else(|| BuildError::UnknownTransition {
                    referrer,
                    transition: arc.to.clone(),
                })?;
            let guard = compile_arc(&mut cache, &arc.expr, Scope::Guard, || arc.to_string())?;
            let idx = graph.input_arcs.push(InputArcNode {
                arc: arc.clone(),
                from,
                guard,
            });
            graph.transitions[to].inputs.push(idx);
        }

        // 输出弧: transition -> place
        for arc in &net.output_arcs {
            let referrer = format!("output arc {}", arc);
            let from = graph
                .transition_idx(&arc.from)
                .ok_or_else(|| BuildError::UnknownTransition {
                    referrer: referrer.clone(),
                    transition: arc.from.clone(),
                })?;
            let to = graph
                .place_idx(&arc.to)
                .ok_or_else(|| BuildError::UnknownPlace {
                    referrer,
                    place: arc.to.clone(),
                })?;
            let production =
                compile_arc(&mut cache, &arc.expr, Scope::Production, || arc.to_string())?;
            let idx = graph.output_arcs.push(OutputArcNode {
                arc: arc.clone(),
                to,
                production,
            });
            graph.transitions[from].outputs.push(idx);
        }

        if let Some(transition) = graph.transitions.iter().find(|t| t.inputs.is_empty()) {
            return Err(BuildError::NoInputArcs(transition.id.clone()));
        }

        log::info!(
            "built net: {} places, {} transitions, {} input arcs, {} output arcs, {} tokens, {} distinct expressions",
            graph.places.len(),
            graph.transitions.len(),
            graph.input_arcs.len(),
            graph.output_arcs.len(),
            graph.tokens.len(),
            cache.len()
        );
        Ok(graph)
    }

    pub fn place_idx(&self, id: &PlaceId) -> Option<PlaceIdx> {
        self.place_index.get(id).copied()
    }

    pub fn transition_idx(&self, id: &TransitionId) -> Option<TransitionIdx> {
        self.transition_index.get(id).copied()
    }

    pub fn token(&self, id: &TokenId) -> Option<&TokenEntry> {
        self.tokens.get(id)
    }

    pub fn contains_token(&self, id: &TokenId) -> bool {
        self.tokens.contains_key(id)
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&TokenId, &TokenEntry)> {
        self.tokens.iter()
    }

    pub fn insert_token(&mut self, id: TokenId, place: PlaceIdx, color: Color) {
        self.places[place].tokens.insert(id.clone());
        self.tokens.insert(id, TokenEntry { place, color });
    }

    pub fn remove_token(&mut self, id: &TokenId) -> Option<TokenEntry> {
        let entry = self.tokens.remove(id)?;
        self.places[entry.place].tokens.remove(id);
        Some(entry)
    }

    /// 连通性诊断：检测孤立库所、无法获得 token 的库所以及无输出弧的迁移。
    pub fn diagnose(&self) -> DiagnosticReport {
        let mut consumed = vec![false; self.places.len()];
        let mut produced = vec![false; self.places.len()];
        for arc in self.input_arcs.iter() {
            consumed[arc.from.index()] = true;
        }
        for arc in self.output_arcs.iter() {
            produced[arc.to.index()] = true;
        }

        let mut report = DiagnosticReport {
            total_places: self.places.len(),
            total_transitions: self.transitions.len(),
            total_tokens: self.tokens.len(),
            ..DiagnosticReport::default()
        };

        for (idx, place) in self.places.iter_enumerated() {
            let (has_input, has_output) = (produced[idx.index()], consumed[idx.index()]);
            if !has_input && !has_output {
                report.isolated_places.push(place.id.clone());
            } else if !has_input && place.tokens.is_empty() {
                report.warnings.push(format!(
                    "place {:?} has no producing arc and no initial tokens, it can never be marked",
                    place.id.as_str()
                ));
            }
        }

        for transition in self.transitions.iter() {
            if transition.outputs.is_empty() {
                report.sink_transitions.push(transition.id.clone());
            }
        }

        report
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph ColoredPetriNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for (idx, place) in self.places.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    place_{} [label=\"{}\\n{}\", shape=circle, style=filled, fillcolor=\"#e3f2fd\"];",
                idx.index(),
                escape_label(place.id.as_str()),
                place.tokens.len()
            );
        }

        for (idx, transition) in self.transitions.iter_enumerated() {
            let _ = writeln!(
                &mut dot,
                "    trans_{} [label=\"{}\", shape=box, style=filled, fillcolor=\"#ffe0b2\"];",
                idx.index(),
                escape_label(transition.id.as_str())
            );
        }

        for (idx, transition) in self.transitions.iter_enumerated() {
            for arc_idx in &transition.inputs {
                let arc = &self.input_arcs[*arc_idx];
                write_edge(
                    &mut dot,
                    &format!("place_{}", arc.from.index()),
                    &format!("trans_{}", idx.index()),
                    &arc.arc.expr,
                );
            }
            for arc_idx in &transition.outputs {
                let arc = &self.output_arcs[*arc_idx];
                write_edge(
                    &mut dot,
                    &format!("trans_{}", idx.index()),
                    &format!("place_{}", arc.to.index()),
                    &arc.arc.expr,
                );
            }
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }
}

fn compile_arc(
    cache: &mut ExprCache,
    expr: &str,
    scope: Scope,
    arc: impl FnOnce() -> String,
) -> Result<Option<Arc<Program>>, BuildError> {
    if expr.trim().is_empty() {
        return Ok(None);
    }
    cache
        .compile(expr, scope)
        .map(Some)
        .map_err(|source| BuildError::Expression { arc: arc(), source })
}

fn write_edge(dot: &mut String, from: &str, to: &str, expr: &str) {
    if expr.is_empty() {
        let _ = writeln!(dot, "    {} -> {};", from, to);
    } else {
        let _ = writeln!(
            dot,
            "    {} -> {} [label=\"{}\"];",
            from,
            to,
            escape_label(expr)
        );
    }
}

fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// 连通性诊断报告
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    /// 孤立库所（无任何连接的弧）
    pub isolated_places: Vec<PlaceId>,
    /// 无输出弧的迁移（发生后只消耗 token）
    pub sink_transitions: Vec<TransitionId>,
    pub warnings: Vec<String>,
    pub total_places: usize,
    pub total_transitions: usize,
    pub total_tokens: usize,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.sink_transitions.is_empty()
            || !self.warnings.is_empty()
    }

    /// 打印诊断报告到日志
    pub fn log(&self) {
        if !self.has_issues() {
            log::info!("net connectivity check passed, no isolated nodes");
            return;
        }
        log::warn!(
            "net diagnostics: {} places, {} transitions, {} tokens",
            self.total_places,
            self.total_transitions,
            self.total_tokens
        );
        for place in &self.isolated_places {
            log::warn!("  - isolated place {:?}", place.as_str());
        }
        for transition in &self.sink_transitions {
            log::warn!("  - transition {:?} has no output arcs", transition.as_str());
        }
        for warning in &self.warnings {
            log::warn!("  - {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_example_net() {
        let graph = Graph::build(&NetDefinition::example()).unwrap();
        assert_eq!(graph.places.len(), 5);
        assert_eq!(graph.transitions.len(), 4);
        let t1 = graph.transition_idx(&"t1".into()).unwrap();
        assert_eq!(graph.transitions[t1].inputs.len(), 1);
        assert_eq!(graph.transitions[t1].outputs.len(), 2);
        let p1 = graph.place_idx(&"p1".into()).unwrap();
        assert!(graph.places[p1].tokens.contains("t1"));
        assert_eq!(graph.token(&"t1".into()).unwrap().place, p1);
    }

    #[test]
    fn empty_net_builds() {
        let graph = Graph::build(&NetDefinition::empty()).unwrap();
        assert_eq!(graph.tokens().count(), 0);
    }

    #[test]
    fn rejects_token_on_unknown_place() {
        let net = NetDefinition::empty().place("p1").token("a", "nowhere", Color::Null);
        let err = Graph::build(&net).unwrap_err();
        assert!(matches!(err, BuildError::UnknownPlace { ref place, .. } if place.as_str() == "nowhere"));
    }

    #[test]
    fn rejects_dangling_arcs() {
        let net = NetDefinition::empty().place("p1").transition("t1").input_arc("p1", "t9");
        assert!(matches!(
            Graph::build(&net).unwrap_err(),
            BuildError::UnknownTransition { ref transition, .. } if transition.as_str() == "t9"
        ));
        let net = NetDefinition::empty()
            .place("p1")
            .transition("t1")
            .input_arc("p1", "t1")
            .output_arc("t1", "p9");
        assert!(matches!(
            Graph::build(&net).unwrap_err(),
            BuildError::UnknownPlace { ref place, .. } if place.as_str() == "p9"
        ));
    }

    #[test]
    fn rejects_transition_without_inputs() {
        let net = NetDefinition::empty().place("p1").transition("t1").output_arc("t1", "p1");
        assert!(matches!(Graph::build(&net).unwrap_err(), BuildError::NoInputArcs(_)));
    }

    #[test]
    fn rejects_duplicates() {
        let net = NetDefinition::empty().place("p1").place("p1");
        assert!(matches!(Graph::build(&net).unwrap_err(), BuildError::DuplicatePlace(_)));
        let net = NetDefinition::empty()
            .place("p1")
            .token("a", "p1", Color::Null)
            .token("a", "p1", Color::Null);
        assert!(matches!(Graph::build(&net).unwrap_err(), BuildError::DuplicateToken(_)));
    }

    #[test]
    fn bad_expression_names_the_arc() {
        let net = NetDefinition::empty()
            .place("p1")
            .transition("t1")
            .guarded_arc("p1", "t1", "color ==");
        let err = Graph::build(&net).unwrap_err();
        assert!(matches!(err, BuildError::Expression { ref arc, .. } if arc == "p1->t1"));
    }

    #[test]
    fn cycles_are_allowed() {
        let net = NetDefinition::empty()
            .place("a")
            .place("b")
            .transition("ab")
            .transition("ba")
            .input_arc("a", "ab")
            .output_arc("ab", "b")
            .input_arc("b", "ba")
            .output_arc("ba", "a");
        assert!(Graph::build(&net).is_ok());
    }

    #[test]
    fn token_membership_stays_consistent() {
        let mut graph = Graph::build(&NetDefinition::example()).unwrap();
        let entry = graph.remove_token(&"t1".into()).unwrap();
        assert!(graph.places[entry.place].tokens.is_empty());
        assert!(graph.remove_token(&"t1".into()).is_none());
        graph.insert_token("t1".into(), entry.place, entry.color);
        assert!(graph.places[entry.place].tokens.contains("t1"));
    }

    #[test]
    fn diagnose_reports_unreachable_places() {
        let net = NetDefinition::example().place("lonely").place("starved").transition("t5")
            .input_arc("starved", "t5");
        let report = Graph::build(&net).unwrap().diagnose();
        assert_eq!(report.isolated_places, vec![PlaceId::from("lonely")]);
        assert_eq!(report.sink_transitions, vec![TransitionId::from("t5")]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.has_issues());
    }

    #[test]
    fn dot_lists_every_node_and_labels_expressions() {
        let net = NetDefinition::empty()
            .place("p1")
            .place("p2")
            .transition("t1")
            .guarded_arc("p1", "t1", r#"color == "x""#)
            .output_arc("t1", "p2");
        let dot = Graph::build(&net).unwrap().to_dot();
        assert!(dot.contains("place_0 -> trans_0 [label=\"color == \\\"x\\\"\"];"));
        assert!(dot.contains("trans_0 -> place_1;"));
    }
}
