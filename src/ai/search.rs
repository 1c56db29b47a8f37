//! 自适应 PUCT 搜索与对外的 `MctsAgent`。

use log::{debug, trace};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::adapter::{GameAdapter, PlayerId, SearchMove, SearchState};
use super::cache::{CachedAdapter, SearchCache};
use super::clock::{Deadline, SearchInstant};
use super::criticality::{self, CriticalityReport};
use super::profile::{AgentConfig, Difficulty, SearchBudget, SearchMode};
use super::rollout::RolloutPolicy;
use super::scorer::{rank_candidates, rank_matching, selection_bonus};
use super::transposition::TranspositionTable;
use super::tree::{Node, NodeId, SearchTree};

const Q_SCALE: f64 = 400.0;
const LOW_VISIT_THRESHOLD: u32 = 4;
const LOW_VISIT_BOOST: f64 = 1.3;
const BLEND_MIN: f64 = 0.12;
const BLEND_MAX: f64 = 0.7;
const EARLY_STOP_TIME_FRACTION: f64 = 0.45;
const EARLY_STOP_SHARE: f64 = 0.68;
const EARLY_STOP_MARGIN: f64 = 45.0;
const VISIT_WEIGHT: f64 = 0.85;
const VALUE_WEIGHT: f64 = 1.25;

#[derive(Debug, Clone, Serialize)]
pub struct SearchDecision<M> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<M>,
    pub evaluation: f64,
    pub iterations: u32,
    pub root_visits: u32,
    pub root_children: usize,
    pub tree_size: usize,
    pub legal_moves: usize,
    pub criticality: f64,
    pub think_time_ms: u64,
    pub duration_ms: u64,
    pub simulations: u64,
    pub early_stopped: bool,
    pub timed_out: bool,
    pub noise_applied: bool,
    pub difficulty: Difficulty,
    pub mode: SearchMode,
}

impl<M> SearchDecision<M> {
    fn immediate(
        action: Option<M>,
        evaluation: f64,
        legal_moves: usize,
        config: &AgentConfig,
        start: SearchInstant,
    ) -> Self {
        Self {
            action,
            evaluation,
            iterations: 0,
            root_visits: 0,
            root_children: 0,
            tree_size: 0,
            legal_moves,
            criticality: 0.0,
            think_time_ms: 0,
            duration_ms: start.elapsed_ms(),
            simulations: 0,
            early_stopped: false,
            timed_out: false,
            noise_applied: false,
            difficulty: config.difficulty,
            mode: config.mode,
        }
    }
}

/// 搜索智能体。缓存与置换表在多次决策之间复用内存，但每次决策开始时清空。
pub struct MctsAgent<A: GameAdapter> {
    config: AgentConfig,
    rng: SmallRng,
    cache: SearchCache<A::State, A::Move>,
    transpositions: TranspositionTable,
}

impl<A: GameAdapter> MctsAgent<A> {
    pub fn new(config: AgentConfig) -> Self {
        Self::with_rng(config, SmallRng::from_entropy())
    }

    pub fn with_seed(config: AgentConfig, seed: u64) -> Self {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: AgentConfig, rng: SmallRng) -> Self {
        Self {
            config,
            rng,
            cache: SearchCache::new(),
            transpositions: TranspositionTable::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn decide(&mut self, adapter: &A, player: PlayerId) -> SearchDecision<A::Move> {
        self.decide_scaled(adapter, player, 1.0)
    }

    /// `think_scale` 按比例缩减思考时间。
    pub fn decide_scaled(
        &mut self,
        adapter: &A,
        player: PlayerId,
        think_scale: f64,
    ) -> SearchDecision<A::Move> {
        self.decide_with(adapter, player, think_scale, true)
    }

    /// 结束回合无法提交时的紧急搜索：只在其余走法中选择，没有时返回空动作。
    pub fn decide_emergency(
        &mut self,
        adapter: &A,
        player: PlayerId,
        think_scale: f64,
    ) -> SearchDecision<A::Move> {
        self.decide_with(adapter, player, think_scale, false)
    }

    fn decide_with(
        &mut self,
        adapter: &A,
        player: PlayerId,
        think_scale: f64,
        allow_end_turn: bool,
    ) -> SearchDecision<A::Move> {
        let start = SearchInstant::now();
        self.cache.clear();
        self.transpositions.clear();

        let config = self.config;
        let state = adapter.state();
        let key = state.state_key();
        let mut oracle = CachedAdapter::new(adapter, &mut self.cache);

        if state.is_terminal() {
            let evaluation = oracle.evaluate_keyed(&key, &state, player);
            return SearchDecision::immediate(None, evaluation, 0, &config, start);
        }

        let mut legal = oracle.legal_moves_keyed(&key, &state, player);
        if !allow_end_turn {
            legal.retain(|mv| !mv.is_end_turn());
        }
        match legal.as_slice() {
            [] => {
                let evaluation = oracle.evaluate_keyed(&key, &state, player);
                return SearchDecision::immediate(None, evaluation, 0, &config, start);
            }
            [only] => {
                let evaluation = oracle.evaluate_keyed(&key, &state, player);
                return SearchDecision::immediate(Some(only.clone()), evaluation, 1, &config, start);
            }
            _ => {}
        }

        let report = if config.mode.adapts_budget() {
            criticality::estimate(&mut oracle, &key, &state, player)
        } else {
            CriticalityReport::quiet(legal.len())
        };
        let budget = if config.mode.adapts_budget() {
            SearchBudget::resolve(&config.profile, &report)
        } else {
            SearchBudget::fixed(&config.profile, &report)
        }
        .scaled(think_scale);

        if budget.think_time.is_zero() {
            let best = rank_matching(&mut oracle, &key, &state, player, 1, |mv| {
                allow_end_turn || !mv.is_end_turn()
            })
            .into_iter()
            .next();
            let (action, evaluation) = match best {
                Some(candidate) => (candidate.mv, candidate.score),
                None => (legal[0].clone(), oracle.evaluate_keyed(&key, &state, player)),
            };
            let mut decision =
                SearchDecision::immediate(Some(action), evaluation, legal.len(), &config, start);
            decision.criticality = report.criticality;
            return decision;
        }

        let transpositions = if config.mode.uses_transpositions() {
            Some(&mut self.transpositions)
        } else {
            None
        };
        let mut search = MctsSearch::new(
            oracle,
            state,
            player,
            budget,
            config.mode,
            Deadline::new(start, budget.think_time),
            transpositions,
            &mut self.rng,
        );
        search.allow_end_turn = allow_end_turn;
        let outcome = search.run();

        let action = outcome
            .chosen
            .and_then(|id| search.tree.get(id).mv.clone())
            .or_else(|| legal.first().cloned());
        let evaluation = outcome
            .chosen
            .map(|id| search.tree.get(id).mean_value())
            .unwrap_or(0.0);

        let decision = SearchDecision {
            action,
            evaluation,
            iterations: outcome.iterations,
            root_visits: search.tree.root().visits,
            root_children: search.tree.root().children.len(),
            tree_size: search.tree.len(),
            legal_moves: legal.len(),
            criticality: report.criticality,
            think_time_ms: budget.think_time.as_millis() as u64,
            duration_ms: start.elapsed_ms(),
            simulations: search.oracle.simulations(),
            early_stopped: outcome.early_stopped,
            timed_out: outcome.timed_out,
            noise_applied: outcome.noise_applied,
            difficulty: config.difficulty,
            mode: config.mode,
        };
        debug!(
            "mcts {}/{:?}: {} iterations, {} root children, criticality {:.2}, {} ms of {} ms{}",
            config.difficulty,
            config.mode,
            decision.iterations,
            decision.root_children,
            decision.criticality,
            decision.duration_ms,
            decision.think_time_ms,
            if decision.early_stopped { " (early stop)" } else { "" }
        );
        decision
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SearchOutcome {
    chosen: Option<NodeId>,
    iterations: u32,
    early_stopped: bool,
    timed_out: bool,
    noise_applied: bool,
}

struct MctsSearch<'a, A: GameAdapter, R: Rng> {
    oracle: CachedAdapter<'a, A>,
    tree: SearchTree<A::State, A::Move>,
    transpositions: Option<&'a mut TranspositionTable>,
    rng: &'a mut R,
    budget: SearchBudget,
    rollout: RolloutPolicy,
    mode: SearchMode,
    root_player: PlayerId,
    deadline: Deadline,
    /// 为假时根节点不展开结束回合。
    allow_end_turn: bool,
}

impl<'a, A: GameAdapter, R: Rng> MctsSearch<'a, A, R> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        oracle: CachedAdapter<'a, A>,
        root_state: A::State,
        root_player: PlayerId,
        budget: SearchBudget,
        mode: SearchMode,
        deadline: Deadline,
        transpositions: Option<&'a mut TranspositionTable>,
        rng: &'a mut R,
    ) -> Self {
        Self {
            oracle,
            tree: SearchTree::new(root_player, root_state),
            transpositions,
            rng,
            rollout: RolloutPolicy::for_budget(&budget, mode),
            budget,
            mode,
            root_player,
            deadline,
            allow_end_turn: true,
        }
    }

    fn run(&mut self) -> SearchOutcome {
        self.expand(NodeId::ROOT);
        self.widen_root();
        if self.tree.root().children.is_empty() {
            return SearchOutcome::default();
        }

        let cap = self.budget.profile.max_simulations.max(1);
        let mut outcome = SearchOutcome::default();
        loop {
            self.iterate();
            outcome.iterations += 1;
            if outcome.iterations >= cap {
                break;
            }
            if self.deadline.expired() {
                outcome.timed_out = true;
                break;
            }
            if self.mode.uses_early_stop() && self.should_stop_early() {
                trace!("early stop after {} iterations", outcome.iterations);
                outcome.early_stopped = true;
                break;
            }
        }

        let (chosen, noise_applied) = self.choose_final();
        outcome.chosen = chosen;
        outcome.noise_applied = noise_applied;
        outcome
    }

    /// 渐进展开：根节点已实体化的子节点数随访问次数增长。
    fn widen_root(&mut self) -> usize {
        let visits = self.tree.root().visits;
        let step = self.budget.profile.widening_step.max(1);
        let allowed = (2 + visits / step).max(2) as usize;
        self.tree.materialize_up_to(NodeId::ROOT, allowed)
    }

    fn iterate(&mut self) {
        let before = self.tree.root().children.len();
        let after = self.widen_root();
        if after > before {
            trace!("root widened to {after} children");
        }

        let leaf = self.select();
        let value = self.evaluate_leaf(leaf);
        let table = self.transpositions.as_deref_mut();
        self.tree.backpropagate(leaf, value, self.root_player, table);
    }

    fn select(&self) -> NodeId {
        let mut current = NodeId::ROOT;
        loop {
            let node = self.tree.get(current);
            if node.terminal || !node.expanded || node.children.is_empty() {
                return current;
            }
            current = self.best_child(node);
        }
    }

    fn best_child(&self, parent: &Node<A::State, A::Move>) -> NodeId {
        let parent_visits = f64::from(parent.visits);
        let mut best = parent.children[0];
        let mut best_score = f64::NEG_INFINITY;
        for &id in &parent.children {
            let score = self.puct_score(parent_visits, self.tree.get(id));
            if score > best_score {
                best_score = score;
                best = id;
            }
        }
        best
    }

    fn puct_score(&self, parent_visits: f64, child: &Node<A::State, A::Move>) -> f64 {
        let q = (self.blended_value(child) / Q_SCALE).tanh();
        let mut exploration = self.budget.profile.exploration;
        if child.visits < LOW_VISIT_THRESHOLD {
            exploration *= LOW_VISIT_BOOST;
        }
        let u = exploration * child.prior * (parent_visits + 1.0).sqrt()
            / (1.0 + f64::from(child.visits));
        q + u
    }

    /// 节点自身均值与置换表均值的混合，结果为该节点行动方视角。
    fn blended_value(&self, node: &Node<A::State, A::Move>) -> f64 {
        let own = node.mean_value();
        let Some(entry) = self
            .transpositions
            .as_deref()
            .and_then(|table| table.get(&node.key))
            .filter(|entry| entry.visits > 0)
        else {
            return own;
        };
        // 表项也累计了本节点自己的访问，只有其他路径的访问才算额外信息。
        let others = entry.visits.saturating_sub(node.visits);
        if others == 0 {
            return own;
        }
        let shared = if node.player == self.root_player {
            entry.mean()
        } else {
            -entry.mean()
        };
        if node.visits == 0 {
            return shared;
        }
        let weight = (f64::from(others) / f64::from(others + node.visits))
            .clamp(BLEND_MIN, BLEND_MAX);
        (1.0 - weight) * own + weight * shared
    }

    fn expand(&mut self, id: NodeId) {
        let node = self.tree.get(id);
        let state = node.state.clone();
        let key = node.key.clone();
        let width = self.budget.profile.top_move_width;
        let ranked = if id == NodeId::ROOT {
            let allow_end_turn = self.allow_end_turn;
            rank_matching(&mut self.oracle, &key, &state, self.root_player, width, |mv| {
                allow_end_turn || !mv.is_end_turn()
            })
        } else {
            rank_candidates(&mut self.oracle, &key, &state, state.current_player(), width)
        };
        self.tree.set_candidates(id, ranked);
        if id != NodeId::ROOT {
            self.tree.materialize_up_to(id, usize::MAX);
        }
    }

    fn evaluate_leaf(&mut self, leaf: NodeId) -> f64 {
        let node = self.tree.get(leaf);
        let state = node.state.clone();
        let key = node.key.clone();
        if node.terminal {
            return self.oracle.evaluate_keyed(&key, &state, self.root_player);
        }
        if !node.expanded {
            self.expand(leaf);
        }
        self.rollout
            .run(&mut self.oracle, &state, &key, self.root_player, &mut *self.rng)
            .value
    }

    fn top_two_by_visits(&self) -> Option<(&Node<A::State, A::Move>, &Node<A::State, A::Move>)> {
        let mut children: Vec<&Node<A::State, A::Move>> = self
            .tree
            .root()
            .children
            .iter()
            .map(|id| self.tree.get(*id))
            .collect();
        children.sort_by(|a, b| b.visits.cmp(&a.visits));
        match children.as_slice() {
            [best, runner_up, ..] => Some((*best, *runner_up)),
            _ => None,
        }
    }

    fn should_stop_early(&self) -> bool {
        let root = self.tree.root();
        if root.visits < self.budget.profile.early_stop_min_visits
            || self.deadline.fraction_used() < EARLY_STOP_TIME_FRACTION
        {
            return false;
        }
        let Some((best, runner_up)) = self.top_two_by_visits() else {
            return false;
        };
        let total = f64::from(best.visits + runner_up.visits);
        if total == 0.0 {
            return false;
        }
        let share = f64::from(best.visits) / total;
        share >= EARLY_STOP_SHARE && best.mean_value() - runner_up.mean_value() > EARLY_STOP_MARGIN
    }

    /// 根子节点按综合分排序，从高到低。
    fn final_ranking(&self) -> Vec<NodeId> {
        let mut scored: Vec<(NodeId, f64)> = self
            .tree
            .root()
            .children
            .iter()
            .map(|&id| {
                let node = self.tree.get(id);
                let bonus = node
                    .mv
                    .as_ref()
                    .map(|mv| selection_bonus(mv.category()))
                    .unwrap_or(0.0);
                let score =
                    VISIT_WEIGHT * f64::from(node.visits) + VALUE_WEIGHT * node.mean_value() + bonus;
                (id, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.into_iter().map(|(id, _)| id).collect()
    }

    fn wins_outright(&self, id: NodeId) -> bool {
        let node = self.tree.get(id);
        node.terminal && node.state.winner() == Some(self.root_player)
    }

    fn choose_final(&mut self) -> (Option<NodeId>, bool) {
        let ranking = self.final_ranking();
        let Some(&top) = ranking.first() else {
            return (None, false);
        };
        let noise = self.budget.profile.noise.clamp(0.0, 1.0);
        if noise <= 0.0 || self.wins_outright(top) || !self.rng.gen_bool(noise) {
            return (Some(top), false);
        }
        let alternative = ranking.iter().skip(1).copied().find(|id| {
            self.tree
                .get(*id)
                .mv
                .as_ref()
                .map(|mv| !mv.is_end_turn())
                .unwrap_or(false)
        });
        match alternative {
            Some(id) => (Some(id), true),
            None => (Some(top), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::profile::Profile;
    use crate::ai::testing::{ScriptedAdapter, ScriptedMove};
    use crate::ai::MoveCategory;
    use std::time::Duration;

    fn config(difficulty: Difficulty) -> AgentConfig {
        AgentConfig::from_difficulty(difficulty)
    }

    fn capped(difficulty: Difficulty, think_time_ms: u64, max_simulations: u32) -> AgentConfig {
        let mut config = config(difficulty);
        config.profile = Profile {
            think_time_ms,
            max_simulations,
            ..config.profile
        };
        config
    }

    #[test]
    fn single_end_turn_is_returned_without_search() {
        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 2, 0.0)
            .edge(0, ScriptedMove::end_turn(), 1)
            .build();
        let mut agent = MctsAgent::with_seed(config(Difficulty::Expert), 1);
        let decision = agent.decide(&adapter, 1);
        assert_eq!(decision.action, Some(ScriptedMove::end_turn()));
        assert_eq!(decision.iterations, 0);
        assert_eq!(decision.tree_size, 0);
        assert_eq!(adapter.simulate_calls(), 0, "no expansion should happen");
    }

    #[test]
    fn no_legal_moves_yields_no_action() {
        let adapter = ScriptedAdapter::builder().node(0, 1, 12.0).build();
        let mut agent = MctsAgent::with_seed(config(Difficulty::Balanced), 1);
        let decision = agent.decide(&adapter, 1);
        assert!(decision.action.is_none());
        assert_eq!(decision.evaluation, 12.0);
    }

    #[test]
    fn lethal_attack_is_always_selected() {
        for difficulty in Difficulty::ALL {
            for think_time_ms in [1, 30, 200] {
                for seed in 0..4 {
                    let adapter = ScriptedAdapter::lethal_position();
                    let mut agent =
                        MctsAgent::with_seed(capped(difficulty, think_time_ms, 10_000), seed);
                    let decision = agent.decide(&adapter, 1);
                    assert_eq!(
                        decision.action.map(|mv| mv.category),
                        Some(MoveCategory::DirectAttack),
                        "{difficulty} with {think_time_ms} ms must take the lethal line"
                    );
                    assert!(!decision.noise_applied);
                }
            }
        }
    }

    #[test]
    fn near_tie_prefers_acting_over_ending_the_turn() {
        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 1, 50.0)
            .node(2, 2, 51.0)
            .edge(0, ScriptedMove::end_turn(), 2)
            .edge(0, ScriptedMove::new(1, MoveCategory::Placement), 1)
            .build();
        let mut agent = MctsAgent::with_seed(capped(Difficulty::Expert, 200, 200), 9);
        let decision = agent.decide(&adapter, 1);
        assert_eq!(
            decision.action,
            Some(ScriptedMove::new(1, MoveCategory::Placement))
        );
    }

    #[test]
    fn expert_search_is_deterministic_with_a_seed() {
        let run = || {
            let adapter = ScriptedAdapter::wide_position(14);
            let mut agent = MctsAgent::with_seed(capped(Difficulty::Expert, 60_000, 300), 42);
            agent.decide(&adapter, 1)
        };
        let first = run();
        let second = run();
        assert_eq!(first.action, second.action);
        assert_eq!(first.iterations, 300);
        assert_eq!(first.iterations, second.iterations);
        assert!(!first.early_stopped);
    }

    #[test]
    fn root_widening_is_monotonic_and_bounded() {
        let adapter = ScriptedAdapter::wide_position(14);
        let mut cache = SearchCache::new();
        let oracle = CachedAdapter::new(&adapter, &mut cache);
        let profile = Profile {
            top_move_width: 10,
            widening_step: 3,
            ..Profile::for_difficulty(Difficulty::Expert)
        };
        let budget = SearchBudget::fixed(&profile, &CriticalityReport::quiet(14));
        let mut rng = SmallRng::seed_from_u64(3);
        let mut table = TranspositionTable::new();
        let mut search = MctsSearch::new(
            oracle,
            adapter.root_state(),
            1,
            budget,
            SearchMode::Adaptive,
            Deadline::new(SearchInstant::now(), Duration::from_secs(60)),
            Some(&mut table),
            &mut rng,
        );
        search.expand(NodeId::ROOT);
        let candidates = search.tree.root().candidates.len();
        assert_eq!(candidates, 10);

        let mut previous = search.widen_root();
        assert_eq!(previous, 2);
        for _ in 0..120 {
            search.iterate();
            let current = search.tree.root().children.len();
            assert!(current >= previous, "root frontier must never shrink");
            assert!((2..=candidates).contains(&current));
            previous = current;
        }
        assert_eq!(previous, candidates, "enough visits eventually open every candidate");
    }

    #[test]
    fn decisions_respect_the_resolved_budget() {
        for difficulty in Difficulty::ALL {
            let adapter = ScriptedAdapter::wide_position(20);
            let mut cfg = config(difficulty);
            cfg.profile.max_simulations = u32::MAX;
            cfg.profile.think_time_ms = 60;
            let mut agent = MctsAgent::with_seed(cfg, 5);
            let decision = agent.decide(&adapter, 1);
            assert!(decision.action.is_some());
            assert!(decision.think_time_ms >= 60);
            assert!(
                decision.duration_ms <= decision.think_time_ms + 250,
                "{difficulty}: {} ms against {} ms",
                decision.duration_ms,
                decision.think_time_ms
            );
        }
    }

    #[test]
    fn zero_budget_falls_back_to_heuristic_best() {
        let adapter = ScriptedAdapter::lethal_position();
        let mut agent = MctsAgent::with_seed(capped(Difficulty::Rookie, 0, 100), 2);
        let decision = agent.decide(&adapter, 1);
        assert_eq!(decision.iterations, 0);
        assert_eq!(
            decision.action.map(|mv| mv.category),
            Some(MoveCategory::DirectAttack)
        );
    }

    #[test]
    fn transpositions_are_shared_between_paths() {
        // Two different moves reach the same state 5.
        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(5, 1, 80.0)
            .node(6, 2, 10.0)
            .edge(0, ScriptedMove::new(1, MoveCategory::Summon), 5)
            .edge(0, ScriptedMove::new(2, MoveCategory::Spell), 5)
            .edge(0, ScriptedMove::end_turn(), 6)
            .build();
        let mut agent = MctsAgent::with_seed(capped(Difficulty::Expert, 60_000, 50), 4);
        let decision = agent.decide(&adapter, 1);
        assert!(decision.action.map(|mv| !mv.is_end_turn()).unwrap_or(false));

        let shared = agent
            .transpositions
            .get(&adapter.state_by_id(5).state_key())
            .copied()
            .unwrap_or_default();
        assert!(shared.visits > 0);
        assert!(shared.visits <= decision.root_visits);

        // A new decision starts from an empty table.
        agent.decide(&ScriptedAdapter::lethal_position(), 1);
        assert!(agent
            .transpositions
            .get(&adapter.state_by_id(5).state_key())
            .is_none());
    }

    #[test]
    fn classic_mode_skips_transpositions_and_inflation() {
        let adapter = ScriptedAdapter::wide_position(30);
        let cfg = capped(Difficulty::Strong, 40, 60).with_mode(SearchMode::Classic);
        let mut agent = MctsAgent::with_seed(cfg, 8);
        let decision = agent.decide(&adapter, 1);
        assert_eq!(decision.think_time_ms, 40);
        assert_eq!(decision.criticality, 0.0);
        assert!(!decision.early_stopped);
        assert!(agent.transpositions.is_empty());
    }

    #[test]
    fn noise_picks_a_non_ending_runner_up() {
        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 1, 200.0)
            .node(2, 1, 20.0)
            .node(3, 2, 0.0)
            .edge(0, ScriptedMove::new(1, MoveCategory::Summon), 1)
            .edge(0, ScriptedMove::new(2, MoveCategory::Placement), 2)
            .edge(0, ScriptedMove::end_turn(), 3)
            .build();
        let mut cfg = capped(Difficulty::Rookie, 60_000, 80);
        cfg.profile.noise = 1.0;
        let mut agent = MctsAgent::with_seed(cfg, 6);
        let decision = agent.decide(&adapter, 1);
        assert!(decision.noise_applied);
        assert_eq!(
            decision.action,
            Some(ScriptedMove::new(2, MoveCategory::Placement))
        );
    }

    /// 0 --end_turn--> 1 (opponent, clearly best), plus two weaker actions.
    fn end_turn_is_best() -> ScriptedAdapter {
        ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 2, 500.0)
            .node(2, 1, -300.0)
            .node(3, 1, -350.0)
            .edge(0, ScriptedMove::end_turn(), 1)
            .edge(0, ScriptedMove::new(2, MoveCategory::Placement), 2)
            .edge(0, ScriptedMove::new(3, MoveCategory::Summon), 3)
            .build()
    }

    #[test]
    fn emergency_search_never_returns_end_turn() {
        for seed in 0..4 {
            let adapter = end_turn_is_best();
            let mut agent = MctsAgent::with_seed(capped(Difficulty::Expert, 60_000, 80), seed);
            let decision = agent.decide_emergency(&adapter, 1, 0.35);
            assert!(decision.iterations > 0, "two actions remain, so a search runs");
            assert!(decision.action.map(|mv| !mv.is_end_turn()).unwrap_or(false));
        }

        let adapter = end_turn_is_best();
        let mut agent = MctsAgent::with_seed(capped(Difficulty::Rookie, 0, 80), 1);
        let decision = agent.decide_emergency(&adapter, 1, 0.35);
        assert_eq!(
            decision.action,
            Some(ScriptedMove::new(2, MoveCategory::Placement)),
            "zero budget falls back to the best non-ending move"
        );
    }

    #[test]
    fn emergency_search_with_only_end_turn_has_no_action() {
        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 2, 0.0)
            .node(2, 1, 10.0)
            .edge(0, ScriptedMove::end_turn(), 1)
            .build();
        let mut agent = MctsAgent::with_seed(config(Difficulty::Strong), 2);
        assert!(agent.decide_emergency(&adapter, 1, 0.35).action.is_none());

        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 2, 0.0)
            .node(2, 1, 10.0)
            .edge(0, ScriptedMove::end_turn(), 1)
            .edge(0, ScriptedMove::new(2, MoveCategory::Placement), 2)
            .build();
        let decision = agent.decide_emergency(&adapter, 1, 0.35);
        assert_eq!(
            decision.action,
            Some(ScriptedMove::new(2, MoveCategory::Placement))
        );
        assert_eq!(decision.iterations, 0);
    }

    #[test]
    fn blending_weights_only_visits_from_other_paths() {
        let adapter = ScriptedAdapter::lethal_position();
        let mut cache = SearchCache::new();
        let oracle = CachedAdapter::new(&adapter, &mut cache);
        let profile = Profile::for_difficulty(Difficulty::Expert);
        let budget = SearchBudget::fixed(&profile, &CriticalityReport::quiet(4));
        let mut rng = SmallRng::seed_from_u64(1);
        let mut table = TranspositionTable::new();
        let mut search = MctsSearch::new(
            oracle,
            adapter.root_state(),
            1,
            budget,
            SearchMode::Adaptive,
            Deadline::new(SearchInstant::now(), Duration::from_secs(60)),
            Some(&mut table),
            &mut rng,
        );
        search.expand(NodeId::ROOT);
        search.tree.materialize_up_to(NodeId::ROOT, 4);
        let child = search.tree.root().children[1];
        for _ in 0..3 {
            search
                .tree
                .backpropagate(child, 300.0, 1, search.transpositions.as_deref_mut());
        }

        // Every table visit came through this node: nothing to blend in.
        let node = search.tree.get(child);
        assert_eq!(node.visits, 3);
        assert_eq!(search.blended_value(node), node.mean_value());

        // One visit from another path: weight 1 / (1 + 3), shared mean (900 - 500) / 4.
        let key = node.key.clone();
        if let Some(shared) = search.transpositions.as_deref_mut() {
            shared.accumulate(&key, -500.0);
        }
        let node = search.tree.get(child);
        let expected = 0.75 * 300.0 + 0.25 * 100.0;
        assert!((search.blended_value(node) - expected).abs() < 1e-9);
    }
}
