//! # 运行器（Runner）
//!
//! 独占持有运行时图，对外提供检查（快照、可激发集）与发生（同步/异步）两类操作。
//!
//! 发生分两阶段进行：先求出绑定并对全部输出弧求值，之后才修改图。因此任何错误
//! 返回时图都保持原样。
//!
//! ```rust
//! use rustcpn::net::NetDefinition;
//! use rustcpn::runner::Runner;
//!
//! let mut runner = Runner::with_seed(&NetDefinition::example(), 7).unwrap();
//! assert_eq!(runner.enabled().len(), 1);
//! let result = runner.fire_any().unwrap();
//! assert_eq!(result.transition.as_str(), "t1");
//! assert_eq!(runner.tokens().len(), 2);
//! ```
mod binding;
pub mod error;
pub mod pending;

use std::sync::{Mutex, PoisonError};

use indexmap::IndexMap;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use smallvec::SmallVec;

pub use error::FireError;
pub use pending::PendingFire;

use crate::config::EngineConfig;
use crate::expr::{Bindings, RandomSource};
use crate::net::builder::{BuildError, DiagnosticReport, Graph, TokenEntry};
use crate::net::color::Color;
use crate::net::definition::{InputArc, NetDefinition, OutputArc, Place, Token, Transition};
use crate::net::ids::{FireId, PlaceId, PlaceIdx, TokenId, TransitionId, TransitionIdx};
use crate::runner::binding::{Binding, find_binding};

/// 当前可激发的迁移及其将消耗的 token。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnabledTransition {
    pub id: TransitionId,
    pub tokens: Vec<TokenId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireResult {
    pub fire_id: FireId,
    pub transition: TransitionId,
    /// 按输入弧声明顺序，`place_id` 为 token 原所在库所。
    pub consumed: Vec<Token>,
    /// 按输出弧声明顺序。
    pub produced: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Any,
    Transition(TransitionId),
}

struct Plan {
    transition: TransitionIdx,
    binding: Binding,
}

pub struct Runner {
    graph: Graph,
    /// 迁移按 ID 升序
    order: Vec<TransitionIdx>,
    pending: IndexMap<FireId, PendingFire>,
    rng: Mutex<StdRng>,
    fires: u64,
}

impl Runner {
    /// 使用操作系统熵源构造运行器。
    pub fn new(net: &NetDefinition) -> Result<Self, BuildError> {
        Self::from_rng(net, StdRng::from_os_rng())
    }

    pub fn with_seed(net: &NetDefinition, seed: u64) -> Result<Self, BuildError> {
        Self::from_rng(net, StdRng::seed_from_u64(seed))
    }

    pub fn with_config(net: &NetDefinition, config: &EngineConfig) -> Result<Self, BuildError> {
        let runner = match config.seed {
            Some(seed) => Self::with_seed(net, seed)?,
            None => Self::new(net)?,
        };
        if config.diagnostics {
            runner.diagnose().log();
        }
        Ok(runner)
    }

    fn from_rng(net: &NetDefinition, rng: StdRng) -> Result<Self, BuildError> {
        let graph = Graph::build(net)?;
        let order = graph
            .transitions
            .iter_enumerated()
            .sorted_by(|(_, a), (_, b)| a.id.cmp(&b.id))
            .map(|(idx, _)| idx)
            .collect();
        Ok(Self {
            graph,
            order,
            pending: IndexMap::new(),
            rng: Mutex::new(rng),
            fires: 0,
        })
    }

    pub fn places(&self) -> Vec<Place> {
        self.graph
            .places
            .iter()
            .map(|place| Place {
                id: place.id.clone(),
            })
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .collect()
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.order
            .iter()
            .map(|idx| Transition {
                id: self.graph.transitions[*idx].id.clone(),
            })
            .collect()
    }

    pub fn input_arcs(&self) -> Vec<InputArc> {
        self.graph
            .input_arcs
            .iter()
            .map(|arc| arc.arc.clone())
            .sorted_by_cached_key(InputArc::key)
            .collect()
    }

    pub fn output_arcs(&self) -> Vec<OutputArc> {
        self.graph
            .output_arcs
            .iter()
            .map(|arc| arc.arc.clone())
            .sorted_by_cached_key(OutputArc::key)
            .collect()
    }

    /// 按 ID 排序的现存 token，不含待决发生持有的 token。
    pub fn tokens(&self) -> Vec<Token> {
        self.graph
            .tokens()
            .map(|(id, entry)| self.token_view(id, entry))
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .collect()
    }

    pub fn token(&self, id: &TokenId) -> Option<Token> {
        self.graph.token(id).map(|entry| self.token_view(id, entry))
    }

    /// `place` 上按 ID 排序的 token；未知库所返回 `None`。
    pub fn place_tokens(&self, place: &PlaceId) -> Option<Vec<Token>> {
        let idx = self.graph.place_idx(place)?;
        Some(
            self.graph.places[idx]
                .tokens
                .iter()
                .filter_map(|id| self.token(id))
                .collect(),
        )
    }

    /// 当前快照，顺序与 [`NetDefinition::canonical`] 一致。
    pub fn net(&self) -> NetDefinition {
        NetDefinition {
            places: self.places(),
            transitions: self.transitions(),
            input_arcs: self.input_arcs(),
            output_arcs: self.output_arcs(),
            tokens: self.tokens(),
        }
    }

    /// 按 ID 升序列出可激发迁移。守卫使用运行器的随机源求值；守卫求值出错的迁移
    /// 记一条 warn 日志后跳过，具体错误由 [`Runner::is_enabled`] 或 [`Runner::fire`] 返回。
    pub fn enabled(&self) -> Vec<EnabledTransition> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        scan(&self.graph, &self.order, &mut *rng, false)
            .into_iter()
            .map(|(idx, tokens)| EnabledTransition {
                id: self.graph.transitions[idx].id.clone(),
                tokens,
            })
            .collect()
    }

    pub fn is_enabled(&self, id: &TransitionId) -> Result<bool, FireError> {
        let transition = self
            .graph
            .transition_idx(id)
            .ok_or_else(|| FireError::UnknownTransition(id.clone()))?;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(find_binding(&self.graph, transition, &mut *rng)?.is_some())
    }

    /// 待决发生，最早的在前。
    pub fn pending(&self) -> impl Iterator<Item = &PendingFire> + '_ {
        self.pending.values()
    }

    pub fn pending_fire(&self, id: &FireId) -> Option<&PendingFire> {
        self.pending.get(id)
    }

    pub fn diagnose(&self) -> DiagnosticReport {
        self.graph.diagnose()
    }

    pub fn to_dot(&self) -> String {
        self.graph.to_dot()
    }

    pub fn fire(&mut self, id: &TransitionId) -> Result<FireResult, FireError> {
        let plan = self.plan(id)?;
        self.commit(plan)
    }

    /// 按 ID 升序激发第一个可激发的迁移。
    pub fn fire_any(&mut self) -> Result<FireResult, FireError> {
        let first = {
            let rng = self.rng.get_mut().unwrap_or_else(PoisonError::into_inner);
            scan(&self.graph, &self.order, &mut *rng, true)
        };
        let Some((transition, _)) = first.into_iter().next() else {
            return Err(FireError::NoneEnabled);
        };
        let plan = self.consume(transition)?;
        self.commit(plan)
    }

    fn commit(&mut self, plan: Plan) -> Result<FireResult, FireError> {
        let id = self.graph.transitions[plan.transition].id.clone();
        let consumed = plan
            .binding
            .iter()
            .filter_map(|token| self.token(token))
            .collect::<Vec<_>>();
        let colors = consumed.iter().map(|token| token.color.clone()).collect::<Vec<_>>();
        let outputs = self.produce(plan.transition, &colors)?;
        let ids = self.fresh_token_ids(outputs.len());

        for token in &plan.binding {
            self.graph.remove_token(token);
        }
        let produced = self.place_outputs(outputs, ids);
        let fire_id = self.next_fire_id();
        log::debug!(
            "fire {} committed {}: consumed [{}], produced [{}]",
            fire_id,
            id,
            consumed.iter().map(|t| t.id.as_str()).join(", "),
            produced.iter().map(|t| t.id.as_str()).join(", ")
        );
        Ok(FireResult {
            fire_id,
            transition: id,
            consumed,
            produced,
        })
    }

    /// 消耗输入 token 但推迟生产，返回待决发生。
    pub fn fire_async(&mut self, id: &TransitionId) -> Result<PendingFire, FireError> {
        let plan = self.plan(id)?;
        let mut consumed = Vec::with_capacity(plan.binding.len());
        let mut origins = SmallVec::new();
        for token in &plan.binding {
            if let Some(entry) = self.graph.remove_token(token) {
                origins.push(entry.place);
                consumed.push(Token {
                    id: token.clone(),
                    place_id: self.graph.places[entry.place].id.clone(),
                    color: entry.color,
                });
            }
        }
        let fire_id = self.next_fire_id();
        let pending = PendingFire {
            id: fire_id.clone(),
            transition: id.clone(),
            consumed,
            transition_idx: plan.transition,
            origins,
        };
        log::debug!(
            "fire {} pending on {}: consumed [{}]",
            fire_id,
            id,
            pending.consumed.iter().map(|t| t.id.as_str()).join(", ")
        );
        self.pending.insert(fire_id, pending.clone());
        Ok(pending)
    }

    /// 生产待决发生的输出；生产出错时该发生保持待决。
    pub fn fire_resolve(&mut self, id: &FireId) -> Result<FireResult, FireError> {
        let (transition, colors) = match self.pending.get(id) {
            Some(pending) => (pending.transition_idx, pending.colors()),
            None => return Err(FireError::UnknownFire(id.clone())),
        };
        let outputs = self.produce(transition, &colors)?;
        let ids = self.fresh_token_ids(outputs.len());
        let Some(pending) = self.pending.shift_remove(id) else {
            return Err(FireError::UnknownFire(id.clone()));
        };
        let produced = self.place_outputs(outputs, ids);
        log::debug!(
            "fire {} resolved {}: produced [{}]",
            id,
            pending.transition,
            produced.iter().map(|t| t.id.as_str()).join(", ")
        );
        Ok(FireResult {
            fire_id: pending.id,
            transition: pending.transition,
            consumed: pending.consumed,
            produced,
        })
    }

    /// 撤销待决发生：原样放回被消耗的 token（相同 ID、颜色与库所）。
    pub fn fire_reject(&mut self, id: &FireId) -> Result<PendingFire, FireError> {
        let pending = self
            .pending
            .shift_remove(id)
            .ok_or_else(|| FireError::UnknownFire(id.clone()))?;
        for (token, place) in pending.consumed.iter().zip(&pending.origins) {
            self.graph
                .insert_token(token.id.clone(), *place, token.color.clone());
        }
        log::debug!("fire {} rejected, {} token(s) restored", id, pending.consumed.len());
        Ok(pending)
    }

    pub fn step(&mut self, step: &Step) -> Result<NetDefinition, FireError> {
        match step {
            Step::Any => self.fire_any()?,
            Step::Transition(id) => self.fire(id)?,
        };
        Ok(self.net())
    }

    fn plan(&mut self, id: &TransitionId) -> Result<Plan, FireError> {
        let transition = self
            .graph
            .transition_idx(id)
            .ok_or_else(|| FireError::UnknownTransition(id.clone()))?;
        let rng = self.rng.get_mut().unwrap_or_else(PoisonError::into_inner);
        if find_binding(&self.graph, transition, &mut *rng)?.is_none() {
            return Err(FireError::NotEnabled(id.clone()));
        }
        self.consume(transition)
    }

    /// 第二次绑定搜索，决定实际消耗的 token。
    fn consume(&mut self, transition: TransitionIdx) -> Result<Plan, FireError> {
        let rng = self.rng.get_mut().unwrap_or_else(PoisonError::into_inner);
        match find_binding(&self.graph, transition, &mut *rng)? {
            Some(binding) => Ok(Plan {
                transition,
                binding,
            }),
            None => {
                let id = &self.graph.transitions[transition].id;
                log::error!(
                    "transition {} was reported enabled but no binding could be consumed; the net is unchanged",
                    id
                );
                Err(FireError::ConsumeFailed(id.clone()))
            }
        }
    }

    /// 对全部输出弧求值；每条弧看到同一组按输入弧顺序排列的颜色。
    fn produce(
        &mut self,
        transition: TransitionIdx,
        colors: &[Color],
    ) -> Result<Vec<(PlaceIdx, Color)>, FireError> {
        let rng = self.rng.get_mut().unwrap_or_else(PoisonError::into_inner);
        let bindings = Bindings::Production { colors };
        let outputs = &self.graph.transitions[transition].outputs;
        let mut produced = Vec::with_capacity(outputs.len());
        for idx in outputs {
            let arc = &self.graph.output_arcs[*idx];
            let color = match &arc.production {
                None => Color::Null,
                Some(program) => {
                    program
                        .run(&bindings, &mut *rng)
                        .map_err(|source| FireError::Production {
                            arc: arc.arc.to_string(),
                            expr: program.source().to_owned(),
                            source,
                        })?
                }
            };
            produced.push((arc.to, color));
        }
        Ok(produced)
    }

    /// 128 位随机 ID，与现存 token、待决发生持有的 token 均不冲突。
    fn fresh_token_ids(&mut self, count: usize) -> Vec<TokenId> {
        let rng = self.rng.get_mut().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<TokenId> = Vec::with_capacity(count);
        while ids.len() < count {
            let mut bytes = [0u8; 16];
            rng.fill_bytes(&mut bytes);
            let id = TokenId::new(hex::encode(bytes));
            let taken = self.graph.contains_token(&id)
                || ids.contains(&id)
                || self
                    .pending
                    .values()
                    .any(|pending| pending.consumed.iter().any(|token| token.id == id));
            if !taken {
                ids.push(id);
            }
        }
        ids
    }

    fn place_outputs(&mut self, outputs: Vec<(PlaceIdx, Color)>, ids: Vec<TokenId>) -> Vec<Token> {
        outputs
            .into_iter()
            .zip(ids)
            .map(|((place, color), id)| {
                self.graph.insert_token(id.clone(), place, color.clone());
                Token {
                    id,
                    place_id: self.graph.places[place].id.clone(),
                    color,
                }
            })
            .collect()
    }

    fn next_fire_id(&mut self) -> FireId {
        self.fires += 1;
        FireId::new(format!("f{}", self.fires))
    }

    fn token_view(&self, id: &TokenId, entry: &TokenEntry) -> Token {
        Token {
            id: id.clone(),
            place_id: self.graph.places[entry.place].id.clone(),
            color: entry.color.clone(),
        }
    }
}

fn scan(
    graph: &Graph,
    order: &[TransitionIdx],
    rng: &mut dyn RandomSource,
    first_only: bool,
) -> Vec<(TransitionIdx, Binding)> {
    let mut enabled = Vec::new();
    for idx in order {
        match find_binding(graph, *idx, &mut *rng) {
            Ok(Some(binding)) => {
                enabled.push((*idx, binding));
                if first_only {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => log::warn!("skipping transition {}: {}", graph.transitions[*idx].id, err),
        }
    }
    enabled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guarded_net() -> NetDefinition {
        NetDefinition::empty()
            .place("p1")
            .place("p2")
            .place("p3")
            .transition("t1")
            .transition("t2")
            .guarded_arc("p1", "t1", r#"color == "foobar""#)
            .producing_arc("t1", "p2", "42")
            .input_arc("p2", "t2")
            .producing_arc("t2", "p3", "colors[0] + 42")
            .token("a", "p1", "foobar")
            .token("b", "p1", "buzz")
    }

    fn ids(enabled: &[EnabledTransition]) -> Vec<&str> {
        enabled.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn runner_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Runner>();
    }

    #[test]
    fn guard_selects_the_matching_token() {
        let mut runner = Runner::with_seed(&guarded_net(), 1).unwrap();
        assert_eq!(ids(&runner.enabled()), vec!["t1"]);

        let result = runner.fire(&"t1".into()).unwrap();
        assert_eq!(result.consumed.len(), 1);
        assert_eq!(result.consumed[0].id.as_str(), "a");
        assert_eq!(result.produced[0].color, Color::Int(42));
        let left = runner.place_tokens(&"p1".into()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].color, Color::from("buzz"));

        let result = runner.fire(&"t2".into()).unwrap();
        assert_eq!(result.produced[0].place_id.as_str(), "p3");
        assert_eq!(result.produced[0].color, Color::Int(84));
        assert!(runner.enabled().is_empty());
    }

    #[test]
    fn firing_reports_validation_errors() {
        let mut runner = Runner::with_seed(&guarded_net(), 1).unwrap();
        assert_eq!(
            runner.fire(&"t9".into()),
            Err(FireError::UnknownTransition("t9".into()))
        );
        assert_eq!(runner.fire(&"t2".into()), Err(FireError::NotEnabled("t2".into())));
        runner.fire_any().unwrap();
        runner.fire_any().unwrap();
        assert_eq!(runner.fire_any(), Err(FireError::NoneEnabled));
        assert!(matches!(runner.is_enabled(&"nope".into()), Err(FireError::UnknownTransition(_))));
    }

    #[test]
    fn production_error_leaves_the_net_untouched() {
        let net = NetDefinition::empty()
            .place("p1")
            .place("p2")
            .place("p3")
            .transition("t1")
            .input_arc("p1", "t1")
            .producing_arc("t1", "p2", "1")
            .producing_arc("t1", "p3", "colors[0] - 'x'")
            .token("a", "p1", 5);
        let mut runner = Runner::with_seed(&net, 3).unwrap();
        let before = runner.net();
        let err = runner.fire(&"t1".into()).unwrap_err();
        assert!(matches!(err, FireError::Production { ref arc, .. } if arc == "t1->p3"));
        assert_eq!(runner.net(), before);
    }

    #[test]
    fn guard_error_names_the_arc() {
        let net = NetDefinition::empty()
            .place("p1")
            .transition("t1")
            .guarded_arc("p1", "t1", "color > 1")
            .token("a", "p1", "text");
        let mut runner = Runner::with_seed(&net, 3).unwrap();
        assert!(runner.enabled().is_empty());
        assert!(matches!(
            runner.is_enabled(&"t1".into()),
            Err(FireError::Guard { ref arc, ref expr, .. }) if arc == "p1->t1" && expr == "color > 1"
        ));
        assert!(matches!(runner.fire(&"t1".into()), Err(FireError::Guard { .. })));
        assert_eq!(runner.fire_any(), Err(FireError::NoneEnabled));
    }

    #[test]
    fn broken_guard_does_not_hide_other_transitions() {
        let net = NetDefinition::empty()
            .place("p1")
            .place("q")
            .place("p2")
            .transition("a_bad")
            .transition("t1")
            .guarded_arc("q", "a_bad", "color > 1")
            .input_arc("p1", "t1")
            .output_arc("t1", "p2")
            .token("s", "q", "text")
            .token("a", "p1", 1);
        let mut runner = Runner::with_seed(&net, 3).unwrap();
        assert_eq!(ids(&runner.enabled()), vec!["t1"]);
        assert!(matches!(
            runner.fire(&"a_bad".into()),
            Err(FireError::Guard { ref arc, .. }) if arc == "q->a_bad"
        ));

        let result = runner.fire_any().unwrap();
        assert_eq!(result.transition.as_str(), "t1");
        assert_eq!(result.consumed[0].id.as_str(), "a");
        assert_eq!(runner.fire_any(), Err(FireError::NoneEnabled));
    }

    #[test]
    fn fire_any_never_reports_its_own_pick_as_not_enabled() {
        let net = NetDefinition::empty()
            .place("p1")
            .place("p2")
            .transition("t1")
            .guarded_arc("p1", "t1", "rand() < 0.5")
            .output_arc("t1", "p2")
            .token("a", "p1", 1);
        for seed in 0..64 {
            let mut runner = Runner::with_seed(&net, seed).unwrap();
            let before = runner.net();
            match runner.fire_any() {
                Ok(result) => assert_eq!(result.transition.as_str(), "t1"),
                Err(FireError::ConsumeFailed(id)) => {
                    assert_eq!(id.as_str(), "t1");
                    assert_eq!(runner.net(), before);
                }
                Err(FireError::NoneEnabled) => assert_eq!(runner.net(), before),
                Err(other) => panic!("seed {seed}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn pending_tokens_leave_the_snapshot() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 5).unwrap();
        let pending = runner.fire_async(&"t1".into()).unwrap();
        assert_eq!(pending.id.as_str(), "f1");
        assert_eq!(pending.colors(), vec![Color::from("foobar")]);
        assert!(runner.tokens().is_empty());
        assert!(runner.enabled().is_empty());
        assert_eq!(runner.pending().count(), 1);
    }

    #[test]
    fn each_pending_fire_finishes_once() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 5).unwrap();
        let pending = runner.fire_async(&"t1".into()).unwrap();
        let restored = runner.fire_reject(&pending.id).unwrap();
        assert_eq!(restored.consumed[0].place_id.as_str(), "p1");
        assert_eq!(runner.fire_reject(&pending.id), Err(FireError::UnknownFire(pending.id.clone())));
        assert!(matches!(runner.fire_resolve(&pending.id), Err(FireError::UnknownFire(_))));

        let pending = runner.fire_async(&"t1".into()).unwrap();
        assert_eq!(pending.id.as_str(), "f2");
        let result = runner.fire_resolve(&pending.id).unwrap();
        assert_eq!(result.fire_id, pending.id);
        assert_eq!(result.produced.len(), 2);
        assert!(matches!(runner.fire_resolve(&pending.id), Err(FireError::UnknownFire(_))));
        assert!(runner.pending_fire(&pending.id).is_none());
    }

    #[test]
    fn failed_resolve_keeps_the_fire_pending() {
        let net = NetDefinition::empty()
            .place("p1")
            .place("p2")
            .transition("t1")
            .input_arc("p1", "t1")
            .producing_arc("t1", "p2", "colors[0] / 0")
            .token("a", "p1", 1);
        let mut runner = Runner::with_seed(&net, 3).unwrap();
        let pending = runner.fire_async(&"t1".into()).unwrap();
        assert!(matches!(runner.fire_resolve(&pending.id), Err(FireError::Production { .. })));
        assert!(runner.pending_fire(&pending.id).is_some());
        runner.fire_reject(&pending.id).unwrap();
        assert_eq!(runner.tokens()[0].id.as_str(), "a");
    }

    #[test]
    fn produced_ids_are_unique_hex() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 11).unwrap();
        let result = runner.fire_any().unwrap();
        let [a, b] = [&result.produced[0].id, &result.produced[1].id];
        assert_ne!(a, b);
        for id in [a, b] {
            assert_eq!(id.as_str().len(), 32);
            assert!(hex::decode(id.as_str()).is_ok());
        }
    }

    #[test]
    fn step_returns_the_snapshot() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 2).unwrap();
        let snapshot = runner.step(&Step::Transition("t1".into())).unwrap();
        assert_eq!(snapshot.tokens.len(), 2);
        assert_eq!(snapshot, snapshot.canonical());
        let snapshot = runner.step(&Step::Any).unwrap();
        let places = snapshot.tokens.iter().map(|t| t.place_id.as_str()).sorted().collect::<Vec<_>>();
        assert_eq!(places, vec!["p3", "p4"]);
    }
}
