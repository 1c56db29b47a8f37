//! 单次决策内的有界缓存。
//!
//! 走法枚举、模拟结果、局面评估和关键度诊断各占一张 LRU 表，容量固定。
//! 每次顶层决策开始时全部清空。

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::Serialize;

use super::adapter::{GameAdapter, PlayerId, SearchMove, SearchState, Simulation, StateKey};
use super::criticality::CriticalityReport;

pub const MOVE_CACHE_CAPACITY: usize = 4_096;
pub const TRANSITION_CACHE_CAPACITY: usize = 16_384;
pub const EVALUATION_CACHE_CAPACITY: usize = 16_384;
pub const CRITICALITY_CACHE_CAPACITY: usize = 512;

fn bounded<K: Hash + Eq, V>(capacity: usize) -> LruCache<K, V> {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

/// 一步模拟的缓存结果，附带走后局面的键，调用方无需再次编码。
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S> {
    pub success: bool,
    pub state: S,
    pub key: StateKey,
}

impl<S> From<Transition<S>> for Simulation<S> {
    fn from(transition: Transition<S>) -> Self {
        Simulation {
            success: transition.success,
            state: transition.state,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type PlayerKey = (StateKey, PlayerId);

pub struct SearchCache<S, M> {
    moves: LruCache<PlayerKey, Vec<M>>,
    transitions: LruCache<(StateKey, PlayerId, M), Transition<S>>,
    evaluations: LruCache<PlayerKey, f64>,
    criticality: LruCache<PlayerKey, CriticalityReport>,
    stats: CacheStats,
}

impl<S: Clone, M: SearchMove> SearchCache<S, M> {
    pub fn new() -> Self {
        Self::with_capacities(
            MOVE_CACHE_CAPACITY,
            TRANSITION_CACHE_CAPACITY,
            EVALUATION_CACHE_CAPACITY,
            CRITICALITY_CACHE_CAPACITY,
        )
    }

    pub fn with_capacities(
        moves: usize,
        transitions: usize,
        evaluations: usize,
        criticality: usize,
    ) -> Self {
        Self {
            moves: bounded(moves),
            transitions: bounded(transitions),
            evaluations: bounded(evaluations),
            criticality: bounded(criticality),
            stats: CacheStats::default(),
        }
    }

    pub fn clear(&mut self) {
        self.moves.clear();
        self.transitions.clear();
        self.evaluations.clear();
        self.criticality.clear();
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.moves.len() + self.transitions.len() + self.evaluations.len() + self.criticality.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&mut self, hit: bool) {
        if hit {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
    }
}

impl<S: Clone, M: SearchMove> Default for SearchCache<S, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// 带缓存的适配器视图，搜索内部只通过它访问规则引擎。
pub struct CachedAdapter<'a, A: GameAdapter> {
    adapter: &'a A,
    cache: &'a mut SearchCache<A::State, A::Move>,
    simulations: u64,
}

impl<'a, A: GameAdapter> CachedAdapter<'a, A> {
    pub fn new(adapter: &'a A, cache: &'a mut SearchCache<A::State, A::Move>) -> Self {
        Self {
            adapter,
            cache,
            simulations: 0,
        }
    }

    pub fn adapter(&self) -> &A {
        self.adapter
    }

    /// 实际转发给适配器的模拟次数（不含缓存命中）。
    pub fn simulations(&self) -> u64 {
        self.simulations
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn legal_moves(&mut self, state: &A::State, player: PlayerId) -> Vec<A::Move> {
        self.legal_moves_keyed(&state.state_key(), state, player)
    }

    /// `key` 必须是 `state.state_key()`，搜索内部沿用节点上已算好的键。
    pub fn legal_moves_keyed(
        &mut self,
        key: &StateKey,
        state: &A::State,
        player: PlayerId,
    ) -> Vec<A::Move> {
        let slot = (key.clone(), player);
        if let Some(moves) = self.cache.moves.get(&slot) {
            let moves = moves.clone();
            self.cache.record(true);
            return moves;
        }
        self.cache.record(false);
        let moves = self.adapter.enumerate_moves(state, player);
        self.cache.moves.put(slot, moves.clone());
        moves
    }

    /// 合法走法加上合成的结束回合；没有任何合法走法时保持为空。
    pub fn candidate_moves(&mut self, state: &A::State, player: PlayerId) -> Vec<A::Move> {
        self.candidate_moves_keyed(&state.state_key(), state, player)
    }

    pub fn candidate_moves_keyed(
        &mut self,
        key: &StateKey,
        state: &A::State,
        player: PlayerId,
    ) -> Vec<A::Move> {
        let mut moves = self.legal_moves_keyed(key, state, player);
        if !moves.is_empty() && !moves.iter().any(SearchMove::is_end_turn) {
            moves.push(A::Move::end_turn());
        }
        moves
    }

    pub fn simulate(
        &mut self,
        state: &A::State,
        player: PlayerId,
        mv: &A::Move,
    ) -> Simulation<A::State> {
        self.simulate_keyed(&state.state_key(), state, player, mv)
            .into()
    }

    pub fn simulate_keyed(
        &mut self,
        key: &StateKey,
        state: &A::State,
        player: PlayerId,
        mv: &A::Move,
    ) -> Transition<A::State> {
        let slot = (key.clone(), player, mv.clone());
        if let Some(result) = self.cache.transitions.get(&slot) {
            let result = result.clone();
            self.cache.record(true);
            return result;
        }
        self.cache.record(false);
        self.simulations += 1;
        let Simulation { success, state: next } = self.adapter.simulate_move(state, player, mv);
        // 失败的模拟不会进入搜索，不必为它编码。
        let next_key = if success {
            next.state_key()
        } else {
            key.clone()
        };
        let result = Transition {
            success,
            state: next,
            key: next_key,
        };
        self.cache.transitions.put(slot, result.clone());
        result
    }

    /// 非有限的评估值按 0 处理，避免污染后续计算。
    pub fn evaluate(&mut self, state: &A::State, player: PlayerId) -> f64 {
        self.evaluate_keyed(&state.state_key(), state, player)
    }

    pub fn evaluate_keyed(&mut self, key: &StateKey, state: &A::State, player: PlayerId) -> f64 {
        let slot = (key.clone(), player);
        if let Some(value) = self.cache.evaluations.get(&slot) {
            let value = *value;
            self.cache.record(true);
            return value;
        }
        self.cache.record(false);
        let raw = self.adapter.evaluate_state(state, player);
        let value = if raw.is_finite() { raw } else { 0.0 };
        self.cache.evaluations.put(slot, value);
        value
    }

    pub(crate) fn cached_criticality(
        &mut self,
        key: &StateKey,
        player: PlayerId,
    ) -> Option<CriticalityReport> {
        let found = self.cache.criticality.get(&(key.clone(), player)).copied();
        self.cache.record(found.is_some());
        found
    }

    pub(crate) fn store_criticality(
        &mut self,
        key: &StateKey,
        player: PlayerId,
        report: CriticalityReport,
    ) {
        self.cache.criticality.put((key.clone(), player), report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{ScriptedAdapter, ScriptedMove};
    use crate::ai::MoveCategory;

    #[test]
    fn full_tables_drop_the_least_recently_used_entry() {
        let adapter = ScriptedAdapter::lethal_position();
        let mut cache = SearchCache::with_capacities(2, 2, 2, 2);
        let mut view = CachedAdapter::new(&adapter, &mut cache);
        let [a, b, c] = [0, 2, 3].map(|id| adapter.state_by_id(id));

        view.evaluate(&a, 1);
        view.evaluate(&b, 1);
        view.evaluate(&a, 1);
        view.evaluate(&c, 1);
        assert_eq!(view.cache_stats(), CacheStats { hits: 1, misses: 3 });

        // `a` was touched after `b`, so `b` is the one that got dropped.
        view.evaluate(&a, 1);
        view.evaluate(&b, 1);
        assert_eq!(view.cache_stats(), CacheStats { hits: 2, misses: 4 });
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn keyed_lookups_share_entries_with_plain_ones() {
        let adapter = ScriptedAdapter::lethal_position();
        let mut cache = SearchCache::new();
        let mut view = CachedAdapter::new(&adapter, &mut cache);
        let root = adapter.root_state();
        let key = root.state_key();

        let moves = view.legal_moves(&root, 1);
        assert_eq!(view.legal_moves_keyed(&key, &root, 1), moves);
        for mv in &moves {
            let transition = view.simulate_keyed(&key, &root, 1, mv);
            assert_eq!(transition.key, transition.state.state_key());
            assert_eq!(view.simulate(&root, 1, mv), Simulation::from(transition.clone()));
            assert_eq!(
                view.evaluate_keyed(&transition.key, &transition.state, 1),
                adapter.evaluate_state(&transition.state, 1)
            );
        }
        assert_eq!(view.simulations(), moves.len() as u64);
        assert_eq!(view.cache_stats().misses, 1 + 2 * moves.len() as u64);
    }

    #[test]
    fn clear_empties_all_tables() {
        let adapter = ScriptedAdapter::lethal_position();
        let mut cache = SearchCache::new();
        {
            let mut view = CachedAdapter::new(&adapter, &mut cache);
            let root = adapter.root_state();
            let moves = view.legal_moves(&root, 1);
            for mv in &moves {
                view.simulate(&root, 1, mv);
            }
            view.evaluate(&root, 1);
        }
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn cached_results_match_direct_adapter_calls() {
        let adapter = ScriptedAdapter::lethal_position();
        let mut cache = SearchCache::new();
        let mut view = CachedAdapter::new(&adapter, &mut cache);
        let root = adapter.root_state();

        for _ in 0..3 {
            assert_eq!(view.legal_moves(&root, 1), adapter.enumerate_moves(&root, 1));
            for mv in adapter.enumerate_moves(&root, 1) {
                assert_eq!(view.simulate(&root, 1, &mv), adapter.simulate_move(&root, 1, &mv));
                let next = adapter.simulate_move(&root, 1, &mv).state;
                assert_eq!(view.evaluate(&next, 1), adapter.evaluate_state(&next, 1));
            }
        }
        let misses = view.cache_stats().misses;
        assert!(view.cache_stats().hits > misses, "repeat calls should be served from cache");
        assert_eq!(view.simulations(), adapter.enumerate_moves(&root, 1).len() as u64);
    }

    #[test]
    fn candidate_moves_append_synthetic_end_turn() {
        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 1, 5.0)
            .edge(0, ScriptedMove::new(1, MoveCategory::Summon), 1)
            .build();
        let mut cache = SearchCache::new();
        let mut view = CachedAdapter::new(&adapter, &mut cache);
        let root = adapter.root_state();
        let moves = view.candidate_moves(&root, 1);
        assert_eq!(moves.len(), 2);
        assert!(moves.last().map(SearchMove::is_end_turn).unwrap_or(false));

        let leaf = adapter.state_by_id(1);
        assert!(view.candidate_moves(&leaf, 1).is_empty());
    }
}
