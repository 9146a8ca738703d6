//! 绑定搜索：为迁移的每条输入弧挑选一个互不相同、且满足该弧守卫的 token。
//!
//! 不同库所之间互不影响，因此输入弧先按来源库所分组，只在组内回溯；任一组无解
//! 即判定不可激发。组按首次出现的声明顺序处理，组内 token 按 ID 顺序扫描。同一组
//! 搜索内每个 (弧, token) 的守卫至多求值一次。
use std::collections::HashMap;

use smallvec::{SmallVec, smallvec};

use crate::expr::{Bindings, RandomSource};
use crate::net::builder::{Graph, InputArcNode};
use crate::net::color::Color;
use crate::net::ids::{InputArcIdx, PlaceIdx, TokenId, TransitionIdx};
use crate::runner::error::FireError;

/// 与迁移输入弧一一对应的 token，按弧声明顺序排列。
pub(crate) type Binding = Vec<TokenId>;

/// 同一来源库所的输入弧在声明列表中的位置。
type Group = (PlaceIdx, SmallVec<[usize; 4]>);

pub(crate) fn find_binding(
    graph: &Graph,
    transition: TransitionIdx,
    rng: &mut dyn RandomSource,
) -> Result<Option<Binding>, FireError> {
    let arcs = graph.transitions[transition].inputs.as_slice();
    let mut groups: Vec<Group> = Vec::new();
    for (pos, idx) in arcs.iter().enumerate() {
        let place = graph.input_arcs[*idx].from;
        match groups.iter_mut().find(|(p, _)| *p == place) {
            Some((_, members)) => members.push(pos),
            None => groups.push((place, smallvec![pos])),
        }
    }

    let mut binding: Vec<Option<TokenId>> = vec![None; arcs.len()];
    for (place, members) in &groups {
        if graph.places[*place].tokens.len() < members.len() {
            return Ok(None);
        }
        let mut search = Search {
            graph,
            arcs: members.iter().map(|pos| arcs[*pos]).collect(),
            rng: &mut *rng,
            verdicts: HashMap::new(),
            chosen: Vec::with_capacity(members.len()),
        };
        if !search.viable()? || !search.extend()? {
            return Ok(None);
        }
        for (pos, token) in members.iter().zip(search.chosen) {
            binding[*pos] = Some(token.clone());
        }
    }
    Ok(binding.into_iter().collect())
}

/// 单个库所上的回溯搜索。
struct Search<'g, 'r> {
    graph: &'g Graph,
    arcs: SmallVec<[InputArcIdx; 4]>,
    rng: &'r mut dyn RandomSource,
    verdicts: HashMap<(InputArcIdx, &'g TokenId), bool>,
    chosen: Vec<&'g TokenId>,
}

impl<'g> Search<'g, '_> {
    /// 每条弧至少有一个可接受的 token，否则无需回溯。
    fn viable(&mut self) -> Result<bool, FireError> {
        let graph = self.graph;
        for i in 0..self.arcs.len() {
            let arc_idx = self.arcs[i];
            let arc = &graph.input_arcs[arc_idx];
            let mut any = false;
            for token in &graph.places[arc.from].tokens {
                if self.accepts(arc_idx, arc, token)? {
                    any = true;
                    break;
                }
            }
            if !any {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn extend(&mut self) -> Result<bool, FireError> {
        let depth = self.chosen.len();
        let Some(&arc_idx) = self.arcs.get(depth) else {
            return Ok(true);
        };
        let graph = self.graph;
        let arc = &graph.input_arcs[arc_idx];
        for token in &graph.places[arc.from].tokens {
            if self.chosen.contains(&token) || !self.accepts(arc_idx, arc, token)? {
                continue;
            }
            self.chosen.push(token);
            if self.extend()? {
                return Ok(true);
            }
            self.chosen.pop();
        }
        Ok(false)
    }

    fn accepts(
        &mut self,
        arc_idx: InputArcIdx,
        arc: &'g InputArcNode,
        token: &'g TokenId,
    ) -> Result<bool, FireError> {
        if arc.guard.is_none() {
            return Ok(true);
        }
        if let Some(verdict) = self.verdicts.get(&(arc_idx, token)) {
            return Ok(*verdict);
        }
        let graph = self.graph;
        let Some(entry) = graph.token(token) else {
            return Ok(false);
        };
        let verdict = guard_matches(arc, &entry.color, self.rng)?;
        log::trace!("guard on {} for token {}: {}", arc.arc, token, verdict);
        self.verdicts.insert((arc_idx, token), verdict);
        Ok(verdict)
    }
}

/// 空守卫恒真；守卫结果必须为 bool。
pub(crate) fn guard_matches(
    arc: &InputArcNode,
    color: &Color,
    rng: &mut dyn RandomSource,
) -> Result<bool, FireError> {
    let Some(program) = &arc.guard else {
        return Ok(true);
    };
    match program.run(&Bindings::Guard { color }, rng) {
        Ok(Color::Bool(verdict)) => Ok(verdict),
        Ok(other) => Err(FireError::NonBooleanGuard {
            arc: arc.arc.to_string(),
            expr: program.source().to_owned(),
            found: other.type_name(),
        }),
        Err(source) => Err(FireError::Guard {
            arc: arc.arc.to_string(),
            expr: program.source().to_owned(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::NetDefinition;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn search(net: &NetDefinition, transition: &str) -> Result<Option<Binding>, FireError> {
        let graph = Graph::build(net).unwrap();
        let idx = graph.transition_idx(&transition.into()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        find_binding(&graph, idx, &mut rng)
    }

    #[test]
    fn picks_first_matching_token_in_id_order() {
        let net = NetDefinition::empty()
            .place("p1")
            .transition("t1")
            .guarded_arc("p1", "t1", "color > 1")
            .token("c", "p1", 5)
            .token("a", "p1", 1)
            .token("b", "p1", 3);
        let binding = search(&net, "t1").unwrap().unwrap();
        assert_eq!(binding, vec![TokenId::from("b")]);
    }

    #[test]
    fn duplicate_arcs_need_distinct_tokens() {
        let net = NetDefinition::empty()
            .place("p1")
            .transition("t1")
            .input_arc("p1", "t1")
            .input_arc("p1", "t1")
            .token("a", "p1", Color::Null);
        assert_eq!(search(&net, "t1").unwrap(), None);

        let net = net.token("b", "p1", Color::Null);
        let binding = search(&net, "t1").unwrap().unwrap();
        assert_eq!(binding, vec![TokenId::from("a"), TokenId::from("b")]);
    }

    #[test]
    fn backtracks_when_an_early_choice_blocks_a_later_arc() {
        // 第一条弧若贪心选 a，第二条弧就无 token 可用
        let net = NetDefinition::empty()
            .place("p1")
            .transition("t1")
            .input_arc("p1", "t1")
            .guarded_arc("p1", "t1", "color == 1")
            .token("a", "p1", 1)
            .token("b", "p1", 2);
        let binding = search(&net, "t1").unwrap().unwrap();
        assert_eq!(binding, vec![TokenId::from("b"), TokenId::from("a")]);
    }

    fn wide_net(places: usize, tokens: usize) -> NetDefinition {
        let mut net = NetDefinition::empty().transition("t1");
        for p in 0..places {
            let place = format!("p{p}");
            net = net.place(place.as_str()).input_arc(place.as_str(), "t1");
            for k in 0..tokens {
                net = net.token(format!("{place}-{k:02}").as_str(), place.as_str(), k as i64);
            }
        }
        net
    }

    #[test]
    fn empty_last_place_fails_without_exhausting_earlier_places() {
        let net = wide_net(8, 30).place("last").input_arc("last", "t1");
        assert_eq!(search(&net, "t1").unwrap(), None);

        let net = net.token("z", "last", Color::Null);
        let binding = search(&net, "t1").unwrap().unwrap();
        assert_eq!(binding.len(), 9);
        assert_eq!(binding[0], TokenId::from("p0-00"));
        assert_eq!(binding[8], TokenId::from("z"));
    }

    #[test]
    fn guard_rejecting_every_token_fails_fast() {
        let net = wide_net(8, 30)
            .place("last")
            .guarded_arc("last", "t1", "color > 100")
            .token("z", "last", 1);
        assert_eq!(search(&net, "t1").unwrap(), None);
    }

    #[test]
    fn interleaved_places_keep_declaration_order() {
        let net = NetDefinition::empty()
            .place("p1")
            .place("p2")
            .transition("t1")
            .input_arc("p1", "t1")
            .input_arc("p2", "t1")
            .guarded_arc("p1", "t1", "color == 1")
            .token("a", "p1", 1)
            .token("b", "p1", 2)
            .token("c", "p2", 3);
        let binding = search(&net, "t1").unwrap().unwrap();
        assert_eq!(
            binding,
            vec![TokenId::from("b"), TokenId::from("c"), TokenId::from("a")]
        );
    }

    #[test]
    fn non_boolean_guard_is_an_error() {
        let net = NetDefinition::empty()
            .place("p1")
            .transition("t1")
            .guarded_arc("p1", "t1", "color")
            .token("a", "p1", 7);
        assert!(matches!(
            search(&net, "t1"),
            Err(FireError::NonBooleanGuard { found: "int", .. })
        ));
    }
}
