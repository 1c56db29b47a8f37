//! 回合控制：每次只决策并提交一个动作，直到回合结束或预算耗尽。

use log::{info, warn};
use serde::Serialize;

use super::adapter::{GameAdapter, PlayerId, SearchMove, SearchState};
use super::clock::SearchInstant;
use super::search::{MctsAgent, SearchDecision};

/// 结束回合失败后紧急搜索使用的思考时间比例。
pub const EMERGENCY_THINK_SCALE: f64 = 0.35;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// 提交了结束回合。
    Ended,
    GameOver,
    /// 连结束回合都不可用。
    NoMoves,
    /// 结束回合提交失败，紧急搜索找到并提交了另一个动作。
    EmergencyAction,
    /// 没有任何动作可以提交，放弃本回合。
    Forfeited,
    NotOurTurn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnStep<M> {
    /// 提交了一个非结束动作，回合继续。
    Continue { action: M },
    Done {
        outcome: TurnOutcome,
        action: Option<M>,
    },
}

impl<M> TurnStep<M> {
    pub fn is_done(&self) -> bool {
        matches!(self, TurnStep::Done { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReport<M> {
    pub outcome: TurnOutcome,
    pub actions: Vec<M>,
    pub decisions: u32,
    pub iterations: u64,
    pub elapsed_ms: u64,
}

pub struct TurnController<A: GameAdapter> {
    agent: MctsAgent<A>,
    player: PlayerId,
    started: Option<SearchInstant>,
    chained: usize,
    decisions: u32,
    iterations: u64,
    last_decision: Option<SearchDecision<A::Move>>,
}

impl<A: GameAdapter> TurnController<A> {
    pub fn new(agent: MctsAgent<A>, player: PlayerId) -> Self {
        Self {
            agent,
            player,
            started: None,
            chained: 0,
            decisions: 0,
            iterations: 0,
            last_decision: None,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn agent(&self) -> &MctsAgent<A> {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut MctsAgent<A> {
        &mut self.agent
    }

    pub fn last_decision(&self) -> Option<&SearchDecision<A::Move>> {
        self.last_decision.as_ref()
    }

    /// 已经提交的非结束动作数。
    pub fn chained_moves(&self) -> usize {
        self.chained
    }

    /// 本回合累计的决策次数与迭代次数。
    pub fn totals(&self) -> (u32, u64) {
        (self.decisions, self.iterations)
    }

    pub fn begin_turn(&mut self) {
        self.started = Some(SearchInstant::now());
        self.chained = 0;
        self.decisions = 0;
        self.iterations = 0;
    }

    fn turn_budget_exhausted(&self) -> bool {
        let profile = &self.agent.config().profile;
        if self.chained >= profile.max_chained_moves {
            return true;
        }
        self.started
            .map(|start| start.elapsed() >= profile.turn_time())
            .unwrap_or(false)
    }

    fn record(&mut self, decision: SearchDecision<A::Move>) -> Option<A::Move> {
        self.decisions += 1;
        self.iterations += u64::from(decision.iterations);
        let action = decision.action.clone();
        self.last_decision = Some(decision);
        action
    }

    fn finish(&mut self, outcome: TurnOutcome, action: Option<A::Move>) -> TurnStep<A::Move> {
        self.started = None;
        TurnStep::Done { outcome, action }
    }

    /// 决策并提交一个动作。
    pub fn step(&mut self, adapter: &mut A) -> TurnStep<A::Move> {
        if self.started.is_none() {
            self.begin_turn();
        }
        let state = adapter.state();
        if state.is_terminal() {
            return self.finish(TurnOutcome::GameOver, None);
        }
        if state.current_player() != self.player {
            return self.finish(TurnOutcome::NotOurTurn, None);
        }
        if self.turn_budget_exhausted() {
            info!(
                "player {} closes the turn after {} actions",
                self.player, self.chained
            );
            return self.close_turn(adapter);
        }

        let decision = self.agent.decide(adapter, self.player);
        match self.record(decision) {
            None => self.finish(TurnOutcome::NoMoves, None),
            Some(action) if action.is_end_turn() => self.close_turn(adapter),
            Some(action) => {
                if adapter.apply_move(self.player, &action) {
                    self.chained += 1;
                    TurnStep::Continue { action }
                } else {
                    warn!(
                        "player {} could not commit {:?}, ending the turn",
                        self.player, action
                    );
                    self.close_turn(adapter)
                }
            }
        }
    }

    fn close_turn(&mut self, adapter: &mut A) -> TurnStep<A::Move> {
        let end_turn = A::Move::end_turn();
        if adapter.apply_move(self.player, &end_turn) {
            return self.finish(TurnOutcome::Ended, Some(end_turn));
        }

        warn!(
            "player {} failed to end the turn, running emergency search",
            self.player
        );
        let decision = self
            .agent
            .decide_emergency(adapter, self.player, EMERGENCY_THINK_SCALE);
        match self.record(decision) {
            Some(action) if !action.is_end_turn() && adapter.apply_move(self.player, &action) => {
                self.chained += 1;
                self.finish(TurnOutcome::EmergencyAction, Some(action))
            }
            _ => {
                warn!("player {} has nothing to commit, passing", self.player);
                self.finish(TurnOutcome::Forfeited, None)
            }
        }
    }

    /// 连续调用 `step` 直到回合结束。
    pub fn play_turn(&mut self, adapter: &mut A) -> TurnReport<A::Move> {
        self.begin_turn();
        let start = SearchInstant::now();
        let mut actions = Vec::new();
        let outcome = loop {
            match self.step(adapter) {
                TurnStep::Continue { action } => actions.push(action),
                TurnStep::Done { outcome, action } => {
                    actions.extend(action);
                    break outcome;
                }
            }
        };
        TurnReport {
            outcome,
            actions,
            decisions: self.decisions,
            iterations: self.iterations,
            elapsed_ms: start.elapsed_ms(),
        }
    }
}
