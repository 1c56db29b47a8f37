use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::adapter::{GameAdapter, PlayerId, SearchState, StateKey};
use super::cache::CachedAdapter;
use super::profile::{SearchBudget, SearchMode};
use super::scorer::scored_moves;

pub const MIN_TEMPERATURE: f64 = 0.05;
pub const MAX_TEMPERATURE: f64 = 5.0;
/// 温度为 1 时，每 120 分的差距对应 e 倍的采样权重。
const SCORE_SCALE: f64 = 120.0;
const SWING_THRESHOLD: f64 = 60.0;

fn branching_depth_bonus(legal_moves: usize) -> u32 {
    match legal_moves {
        n if n <= 10 => 3,
        n if n <= 20 => 2,
        _ => 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutPolicy {
    pub depth_limit: u32,
    /// 到达深度上限时局面仍在剧烈摆动，可以额外延长的步数（只延长一次）。
    pub extension: u32,
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutResult {
    pub value: f64,
    pub depth: u32,
    pub extended: bool,
}

impl RolloutPolicy {
    pub fn new(depth_limit: u32, extension: u32, temperature: f64) -> Self {
        Self {
            depth_limit,
            extension,
            temperature: clamp_temperature(temperature),
        }
    }

    pub fn for_budget(budget: &SearchBudget, mode: SearchMode) -> Self {
        let profile = &budget.profile;
        if !mode.adapts_budget() {
            return Self::new(profile.rollout_depth, 0, profile.rollout_temperature);
        }
        let criticality = budget.criticality.criticality.clamp(0.0, 1.0);
        let tactical = (f64::from(profile.tactical_depth_bonus) * criticality).round() as u32;
        let depth = profile.rollout_depth
            + branching_depth_bonus(budget.criticality.legal_moves)
            + tactical;
        Self::new(depth, profile.tactical_depth_bonus, profile.rollout_temperature)
    }

    /// 从 `start` 出发按启发式 softmax 采样推演，返回根玩家视角的评估。
    /// `start_key` 是 `start` 的键。
    pub fn run<A: GameAdapter, R: Rng>(
        &self,
        oracle: &mut CachedAdapter<'_, A>,
        start: &A::State,
        start_key: &StateKey,
        root_player: PlayerId,
        rng: &mut R,
    ) -> RolloutResult {
        let mut current = start.clone();
        let mut current_key = start_key.clone();
        let mut previous: Option<(A::State, StateKey)> = None;
        let mut limit = self.depth_limit;
        let mut extended = false;
        let mut depth = 0;

        loop {
            if current.is_terminal() {
                break;
            }
            if depth >= limit {
                if extended || self.extension == 0 {
                    break;
                }
                let Some((prev, prev_key)) = previous.as_ref() else {
                    break;
                };
                let swing = oracle.evaluate_keyed(&current_key, &current, root_player)
                    - oracle.evaluate_keyed(prev_key, prev, root_player);
                if swing.abs() <= SWING_THRESHOLD {
                    break;
                }
                limit += self.extension;
                extended = true;
            }

            let mover = current.current_player();
            let mut options = scored_moves(oracle, &current_key, &current, mover);
            if options.is_empty() {
                break;
            }
            let scores: Vec<f64> = options.iter().map(|c| c.score).collect();
            let pick = sample_index(&scores, self.temperature, rng).unwrap_or(0);
            let chosen = options.swap_remove(pick);
            let state = std::mem::replace(&mut current, chosen.state);
            let key = std::mem::replace(&mut current_key, chosen.key);
            previous = Some((state, key));
            depth += 1;
        }

        RolloutResult {
            value: oracle.evaluate_keyed(&current_key, &current, root_player),
            depth,
            extended,
        }
    }
}

pub fn clamp_temperature(temperature: f64) -> f64 {
    if temperature.is_finite() {
        temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
    } else {
        1.0
    }
}

/// 对分数做温度 softmax 后采样；权重全部退化时退回最高分。
pub fn sample_index<R: Rng>(scores: &[f64], temperature: f64, rng: &mut R) -> Option<usize> {
    let top = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .reduce(f64::max)?;
    let scale = clamp_temperature(temperature) * SCORE_SCALE;
    let weights: Vec<f64> = scores
        .iter()
        .map(|s| if s.is_finite() { ((s - top) / scale).exp() } else { 0.0 })
        .collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => Some(dist.sample(rng)),
        Err(_) => scores.iter().position(|s| *s == top),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::cache::SearchCache;
    use crate::ai::criticality::CriticalityReport;
    use crate::ai::profile::{Difficulty, Profile};
    use crate::ai::testing::{ScriptedAdapter, ScriptedMove};
    use crate::ai::MoveCategory;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn low_temperature_prefers_best_score() {
        let mut rng = SmallRng::seed_from_u64(7);
        let scores = [10.0, 400.0, 20.0];
        let picks: Vec<usize> = (0..50)
            .filter_map(|_| sample_index(&scores, 0.05, &mut rng))
            .collect();
        assert!(picks.iter().all(|&i| i == 1));
    }

    #[test]
    fn high_temperature_keeps_diversity() {
        let mut rng = SmallRng::seed_from_u64(11);
        let scores = [0.0, 30.0, 10.0];
        let mut seen = [false; 3];
        for _ in 0..200 {
            if let Some(i) = sample_index(&scores, 5.0, &mut rng) {
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn degenerate_scores_fall_back() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(sample_index(&[], 1.0, &mut rng), None);
        assert_eq!(sample_index(&[f64::NAN, f64::NAN], 1.0, &mut rng), None);
        assert_eq!(sample_index(&[f64::NAN, 5.0], 1.0, &mut rng), Some(1));
        assert_eq!(clamp_temperature(f64::INFINITY), 1.0);
        assert_eq!(clamp_temperature(0.0), MIN_TEMPERATURE);
    }

    #[test]
    fn depth_limit_follows_branching_and_criticality() {
        let profile = Profile::for_difficulty(Difficulty::Strong);
        let report = CriticalityReport {
            legal_moves: 15,
            criticality: 1.0,
            ..CriticalityReport::default()
        };
        let budget = SearchBudget::resolve(&profile, &report);
        let adaptive = RolloutPolicy::for_budget(&budget, SearchMode::Adaptive);
        assert_eq!(adaptive.depth_limit, profile.rollout_depth + 2 + profile.tactical_depth_bonus);
        let classic = RolloutPolicy::for_budget(&budget, SearchMode::Classic);
        assert_eq!(classic.depth_limit, profile.rollout_depth);
        assert_eq!(classic.extension, 0);
    }

    #[test]
    fn rollout_stops_at_terminal_and_reports_root_perspective() {
        let adapter = ScriptedAdapter::lethal_position();
        let mut cache = SearchCache::new();
        let mut oracle = CachedAdapter::new(&adapter, &mut cache);
        let mut rng = SmallRng::seed_from_u64(1);
        let policy = RolloutPolicy::new(5, 0, 0.05);
        let root = adapter.root_state();
        let result = policy.run(&mut oracle, &root, &root.state_key(), 1, &mut rng);
        assert_eq!(result.depth, 1);
        assert_eq!(result.value, 4000.0);

        let terminal = adapter.state_by_id(1);
        let from_terminal = policy.run(&mut oracle, &terminal, &terminal.state_key(), 2, &mut rng);
        assert_eq!(from_terminal.depth, 0);
        assert_eq!(from_terminal.value, -4000.0);
    }

    #[test]
    fn swinging_position_extends_depth_once() {
        // 0 -> 1 (quiet) -> 2 (big swing) -> 3 -> 4
        let adapter = ScriptedAdapter::builder()
            .node(0, 1, 0.0)
            .node(1, 1, 10.0)
            .node(2, 1, 300.0)
            .node(3, 1, 310.0)
            .node(4, 1, 320.0)
            .edge(0, ScriptedMove::new(1, MoveCategory::Summon), 1)
            .edge(1, ScriptedMove::new(2, MoveCategory::Spell), 2)
            .edge(2, ScriptedMove::new(3, MoveCategory::Placement), 3)
            .edge(3, ScriptedMove::new(4, MoveCategory::Placement), 4)
            .build();
        let mut cache = SearchCache::new();
        let mut oracle = CachedAdapter::new(&adapter, &mut cache);
        let mut rng = SmallRng::seed_from_u64(5);

        let root = adapter.root_state();
        let key = root.state_key();
        let result = RolloutPolicy::new(2, 1, 1.0).run(&mut oracle, &root, &key, 1, &mut rng);
        assert!(result.extended);
        assert_eq!(result.depth, 3);
        assert_eq!(result.value, 310.0);

        let flat = RolloutPolicy::new(2, 0, 1.0).run(&mut oracle, &root, &key, 1, &mut rng);
        assert!(!flat.extended);
        assert_eq!(flat.depth, 2);
    }
}
