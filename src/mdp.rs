//! 策略/MDP 适配：状态、动作空间、执行、待决与推进。
use thiserror::Error;

use crate::net::definition::NetDefinition;
use crate::net::ids::TransitionId;
use crate::runner::{FireError, FireResult, PendingFire, Runner};

/// 网上的决策过程。
pub trait Mdp {
    type State;
    type Action;
    type Outcome;
    type Pending;
    type Error;

    fn state(&self) -> Self::State;
    fn action_space(&self) -> Result<Vec<Self::Action>, Self::Error>;
    fn execute(&mut self, action: &Self::Action) -> Result<Self::Outcome, Self::Error>;
    fn pending(&self) -> Vec<Self::Pending>;
    /// 推进最早的待决发生；没有待决发生时返回 `Ok(None)`。
    fn next(&mut self) -> Result<Option<Self::Outcome>, Self::Error>;
}

impl Mdp for Runner {
    type State = NetDefinition;
    type Action = TransitionId;
    type Outcome = FireResult;
    type Pending = PendingFire;
    type Error = FireError;

    fn state(&self) -> NetDefinition {
        self.net()
    }

    fn action_space(&self) -> Result<Vec<TransitionId>, FireError> {
        Ok(self.enabled().into_iter().map(|enabled| enabled.id).collect())
    }

    fn execute(&mut self, action: &TransitionId) -> Result<FireResult, FireError> {
        self.fire(action)
    }

    fn pending(&self) -> Vec<PendingFire> {
        Runner::pending(self).cloned().collect()
    }

    fn next(&mut self) -> Result<Option<FireResult>, FireError> {
        let Some(oldest) = Runner::pending(self).next().map(|pending| pending.id.clone()) else {
            return Ok(None);
        };
        self.fire_resolve(&oldest).map(Some)
    }
}

/// 策略：给定状态与动作空间，返回所选动作下标，`None` 表示不采取动作。
pub trait Policy<M: Mdp> {
    fn choose(&mut self, state: &M::State, actions: &[M::Action]) -> Option<usize>;
}

impl<M, F> Policy<M> for F
where
    M: Mdp,
    F: FnMut(&M::State, &[M::Action]) -> Option<usize>,
{
    fn choose(&mut self, state: &M::State, actions: &[M::Action]) -> Option<usize> {
        self(state, actions)
    }
}

#[derive(Debug, Error)]
pub enum PolicyError<E> {
    #[error("policy chose action {index} but only {len} are available")]
    OutOfRange { index: usize, len: usize },
    #[error("{0}")]
    Mdp(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    PolicyDeclined,
    NoActions,
    StepLimit,
}

#[derive(Debug)]
pub struct Episode<O> {
    pub outcomes: Vec<O>,
    pub stop: StopReason,
}

/// 循环执行策略选择与动作，直到策略放弃、无可用动作或达到 `max_steps`。
pub fn drive<M, P>(
    mdp: &mut M,
    policy: &mut P,
    max_steps: usize,
) -> Result<Episode<M::Outcome>, PolicyError<M::Error>>
where
    M: Mdp,
    P: Policy<M> + ?Sized,
{
    let mut outcomes = Vec::new();
    loop {
        if outcomes.len() >= max_steps {
            return Ok(Episode {
                outcomes,
                stop: StopReason::StepLimit,
            });
        }
        let actions = mdp.action_space().map_err(PolicyError::Mdp)?;
        if actions.is_empty() {
            return Ok(Episode {
                outcomes,
                stop: StopReason::NoActions,
            });
        }
        let state = mdp.state();
        let Some(index) = policy.choose(&state, &actions) else {
            return Ok(Episode {
                outcomes,
                stop: StopReason::PolicyDeclined,
            });
        };
        let action = actions.get(index).ok_or(PolicyError::OutOfRange {
            index,
            len: actions.len(),
        })?;
        log::debug!("policy chose action {} of {}", index, actions.len());
        outcomes.push(mdp.execute(action).map_err(PolicyError::Mdp)?);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(_: &NetDefinition, _: &[TransitionId]) -> Option<usize> {
        Some(0)
    }

    #[test]
    fn drives_the_example_net_to_completion() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 9).unwrap();
        let episode = drive(&mut runner, &mut first, 100).unwrap();
        let fired = episode
            .outcomes
            .iter()
            .map(|o| o.transition.as_str())
            .collect::<Vec<_>>();
        assert_eq!(fired, vec!["t1", "t2", "t3", "t4", "t4"]);
        assert_eq!(episode.stop, StopReason::NoActions);
        assert_eq!(runner.state().tokens.len(), 2);
    }

    #[test]
    fn step_limit_and_declining_policies_stop_early() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 9).unwrap();
        let episode = drive(&mut runner, &mut first, 1).unwrap();
        assert_eq!(episode.stop, StopReason::StepLimit);
        assert_eq!(episode.outcomes.len(), 1);

        let mut decline = |_: &NetDefinition, _: &[TransitionId]| -> Option<usize> { None };
        let episode = drive(&mut runner, &mut decline, 10).unwrap();
        assert_eq!(episode.stop, StopReason::PolicyDeclined);
        assert!(episode.outcomes.is_empty());
    }

    #[test]
    fn out_of_range_choice_is_an_error() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 9).unwrap();
        let mut wild = |_: &NetDefinition, actions: &[TransitionId]| Some(actions.len());
        assert!(matches!(
            drive(&mut runner, &mut wild, 10),
            Err(PolicyError::OutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn next_resolves_the_oldest_pending_fire() {
        let mut runner = Runner::with_seed(&NetDefinition::example(), 9).unwrap();
        assert!(runner.next().unwrap().is_none());
        runner.fire(&"t1".into()).unwrap();
        let first = runner.fire_async(&"t2".into()).unwrap();
        let second = runner.fire_async(&"t3".into()).unwrap();
        assert_eq!(Mdp::pending(&runner).len(), 2);

        let outcome = runner.next().unwrap().unwrap();
        assert_eq!(outcome.fire_id, first.id);
        let outcome = runner.next().unwrap().unwrap();
        assert_eq!(outcome.fire_id, second.id);
        assert!(Mdp::pending(&runner).is_empty());
        assert_eq!(runner.action_space().unwrap(), vec![TransitionId::from("t4")]);
    }
}
