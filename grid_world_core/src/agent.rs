use std::collections::VecDeque;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    action::{ActionMode, HighLevelAction, LowLevelAction},
    environment::{Environment, EnvironmentError, StepResult},
};

/// Trait defining something that drives the environment.
/// Agents pick an action code for the environment's current action mode.
pub trait Agent {
    /// Determines the action code to play next. `None` means the agent has
    /// nothing more to do.
    fn next_action(&mut self, environment: &Environment) -> Option<usize>;
}

/// An agent that picks uniformly random action codes.
#[derive(Debug)]
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomAgent {
    fn next_action(&mut self, environment: &Environment) -> Option<usize> {
        let count = match environment.action_mode() {
            ActionMode::LowLevel => LowLevelAction::COUNT,
            ActionMode::HighLevel => HighLevelAction::COUNT,
        };
        Some(self.rng.random_range(0..count))
    }
}

/// An agent that replays a fixed list of action codes.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    script: VecDeque<usize>,
}

impl ScriptedAgent {
    pub fn new(script: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Agent for ScriptedAgent {
    fn next_action(&mut self, _environment: &Environment) -> Option<usize> {
        self.script.pop_front()
    }
}

/// Steps `environment` with `agent` until the episode finishes or the agent
/// stops. Returns the last step, if any was taken.
pub fn run_episode(
    environment: &mut Environment,
    agent: &mut dyn Agent,
) -> Result<Option<StepResult>, EnvironmentError> {
    let mut last = None;
    while !environment.is_finished() {
        let Some(code) = agent.next_action(environment) else {
            break;
        };
        last = Some(environment.step(code)?);
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, outcome::Outcome};

    #[test]
    fn run_episode_stops_at_the_goal() {
        let mut env = Environment::new(
            "S.G".parse().unwrap(),
            EngineConfig {
                action_mode: ActionMode::LowLevel,
                ..EngineConfig::training()
            },
            0,
        )
        .unwrap();
        let mut agent = ScriptedAgent::new([3, 3, 3, 3]);
        let last = run_episode(&mut env, &mut agent).unwrap().unwrap();
        assert_eq!(last.outcome, Some(Outcome::Success));
        assert_eq!(agent.remaining(), 2);
    }

    #[test]
    fn random_agent_stays_in_the_action_range() {
        let env = Environment::new("S.G".parse().unwrap(), EngineConfig::interactive(), 0).unwrap();
        let mut agent = RandomAgent::new(3);
        for _ in 0..100 {
            let code = agent.next_action(&env).unwrap();
            assert!(code < LowLevelAction::COUNT);
        }
    }

    #[test]
    fn scripted_agent_runs_out() {
        let env = Environment::new("S.G".parse().unwrap(), EngineConfig::training(), 0).unwrap();
        let mut agent = ScriptedAgent::new([3, 3]);
        assert_eq!(agent.next_action(&env), Some(3));
        assert_eq!(agent.remaining(), 1);
        assert_eq!(agent.next_action(&env), Some(3));
        assert_eq!(agent.next_action(&env), None);
    }
}
