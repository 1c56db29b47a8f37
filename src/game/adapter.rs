//! 把规则引擎接到搜索上的适配器。

use log::warn;

use super::eval::evaluate;
use super::rules::{DuelMove, RuleEngine, RuleError};
use super::state::{DuelState, GameEvent, PlayerId};
use crate::ai::{Difficulty, GameAdapter, Simulation};

#[derive(Debug, Clone)]
pub struct DuelAdapter {
    state: DuelState,
    engine: RuleEngine,
    difficulty: Difficulty,
}

impl DuelAdapter {
    pub fn new(state: DuelState, difficulty: Difficulty) -> Self {
        Self {
            state,
            engine: RuleEngine::new(),
            difficulty,
        }
    }

    pub fn current(&self) -> &DuelState {
        &self.state
    }

    pub fn into_state(self) -> DuelState {
        self.state
    }

    /// 提交动作并返回事件。
    pub fn commit(&mut self, player: PlayerId, mv: &DuelMove) -> Result<Vec<GameEvent>, RuleError> {
        let mut next = self.state.clone();
        let events = self.engine.apply(&mut next, player, mv)?;
        self.state = next;
        Ok(events)
    }
}

impl GameAdapter for DuelAdapter {
    type State = DuelState;
    type Move = DuelMove;

    fn state(&self) -> DuelState {
        self.state.clone()
    }

    fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    fn enumerate_moves(&self, state: &DuelState, player: PlayerId) -> Vec<DuelMove> {
        if state.current_player != player {
            return Vec::new();
        }
        self.engine.legal_moves(state)
    }

    fn simulate_move(
        &self,
        state: &DuelState,
        player: PlayerId,
        mv: &DuelMove,
    ) -> Simulation<DuelState> {
        let mut next = state.clone();
        match self.engine.apply(&mut next, player, mv) {
            Ok(_) => Simulation::accepted(next),
            Err(_) => Simulation::rejected(state.clone()),
        }
    }

    fn evaluate_state(&self, state: &DuelState, player: PlayerId) -> f64 {
        evaluate(state, player)
    }

    fn apply_move(&mut self, player: PlayerId, mv: &DuelMove) -> bool {
        match self.commit(player, mv) {
            Ok(_) => true,
            Err(error) => {
                warn!("player {player} could not apply {mv:?}: {error}");
                false
            }
        }
    }
}
