use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::adapter::GameAdapter;
use super::criticality::CriticalityReport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Rookie,
    Balanced,
    Strong,
    Expert,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Rookie,
        Difficulty::Balanced,
        Difficulty::Strong,
        Difficulty::Expert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Rookie => "rookie",
            Difficulty::Balanced => "balanced",
            Difficulty::Strong => "strong",
            Difficulty::Expert => "expert",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown difficulty `{0}`")]
pub struct ParseDifficultyError(pub String);

impl FromStr for Difficulty {
    type Err = ParseDifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rookie" | "easy" => Ok(Difficulty::Rookie),
            "balanced" | "normal" | "medium" => Ok(Difficulty::Balanced),
            "strong" | "hard" => Ok(Difficulty::Strong),
            "expert" | "extreme" => Ok(Difficulty::Expert),
            _ => Err(ParseDifficultyError(s.to_string())),
        }
    }
}

/// 每个难度档位的全部可调参数。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub think_time_ms: u64,
    pub rollout_depth: u32,
    pub exploration: f64,
    pub top_move_width: usize,
    /// 最终选择时改选次优走法的概率。
    pub noise: f64,
    pub widening_step: u32,
    pub tactical_depth_bonus: u32,
    pub rollout_temperature: f64,
    /// 思考时间相对基础预算的上限倍数。
    pub think_cap_multiple: f64,
    pub max_simulations: u32,
    pub early_stop_min_visits: u32,
    pub turn_time_ms: u64,
    pub max_chained_moves: usize,
}

const PROFILES: [(Difficulty, Profile); 4] = [
    (
        Difficulty::Rookie,
        Profile {
            think_time_ms: 220,
            rollout_depth: 4,
            exploration: 1.55,
            top_move_width: 6,
            noise: 0.22,
            widening_step: 10,
            tactical_depth_bonus: 1,
            rollout_temperature: 1.6,
            think_cap_multiple: 1.35,
            max_simulations: 700,
            early_stop_min_visits: 24,
            turn_time_ms: 2_500,
            max_chained_moves: 24,
        },
    ),
    (
        Difficulty::Balanced,
        Profile {
            think_time_ms: 520,
            rollout_depth: 6,
            exploration: 1.35,
            top_move_width: 9,
            noise: 0.1,
            widening_step: 8,
            tactical_depth_bonus: 2,
            rollout_temperature: 1.0,
            think_cap_multiple: 1.6,
            max_simulations: 1_800,
            early_stop_min_visits: 40,
            turn_time_ms: 5_000,
            max_chained_moves: 32,
        },
    ),
    (
        Difficulty::Strong,
        Profile {
            think_time_ms: 950,
            rollout_depth: 8,
            exploration: 1.2,
            top_move_width: 12,
            noise: 0.04,
            widening_step: 6,
            tactical_depth_bonus: 3,
            rollout_temperature: 0.65,
            think_cap_multiple: 2.0,
            max_simulations: 3_600,
            early_stop_min_visits: 60,
            turn_time_ms: 9_000,
            max_chained_moves: 40,
        },
    ),
    (
        Difficulty::Expert,
        Profile {
            think_time_ms: 1_600,
            rollout_depth: 10,
            exploration: 1.1,
            top_move_width: 16,
            noise: 0.0,
            widening_step: 5,
            tactical_depth_bonus: 4,
            rollout_temperature: 0.4,
            think_cap_multiple: 2.4,
            max_simulations: 7_000,
            early_stop_min_visits: 80,
            turn_time_ms: 15_000,
            max_chained_moves: 48,
        },
    ),
];

impl Profile {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        PROFILES
            .iter()
            .find(|(tier, _)| *tier == difficulty)
            .map(|(_, profile)| *profile)
            .unwrap_or(PROFILES[1].1)
    }

    pub fn think_time(&self) -> Duration {
        Duration::from_millis(self.think_time_ms)
    }

    pub fn turn_time(&self) -> Duration {
        Duration::from_millis(self.turn_time_ms)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::for_difficulty(Difficulty::Balanced)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// 置换表、提前终止、关键度加时全部开启。
    #[default]
    Adaptive,
    /// 早期的简单版 MCTS：只保留 PUCT、渐进展开和启发式模拟。
    Classic,
}

impl SearchMode {
    pub fn uses_transpositions(self) -> bool {
        self == SearchMode::Adaptive
    }

    pub fn uses_early_stop(self) -> bool {
        self == SearchMode::Adaptive
    }

    pub fn adapts_budget(self) -> bool {
        self == SearchMode::Adaptive
    }
}

impl FromStr for SearchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adaptive" | "advanced" => Ok(SearchMode::Adaptive),
            "classic" | "simple" => Ok(SearchMode::Classic),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub difficulty: Difficulty,
    pub profile: Profile,
    pub mode: SearchMode,
}

impl AgentConfig {
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            profile: Profile::for_difficulty(difficulty),
            mode: SearchMode::Adaptive,
        }
    }

    /// 难度取自适配器。
    pub fn for_adapter<A: GameAdapter>(adapter: &A) -> Self {
        Self::from_difficulty(adapter.difficulty())
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig::from_difficulty(Difficulty::Balanced)
    }
}

const CRITICALITY_TIME_GAIN: f64 = 0.9;

fn branching_bonus_ms(legal_moves: usize) -> u64 {
    match legal_moves {
        n if n > 24 => 1_400,
        n if n > 16 => 700,
        n if n > 10 => 300,
        _ => 0,
    }
}

/// 一次决策实际使用的预算。
#[derive(Debug, Clone, Copy)]
pub struct SearchBudget {
    pub profile: Profile,
    pub think_time: Duration,
    pub criticality: CriticalityReport,
}

impl SearchBudget {
    pub fn resolve(profile: &Profile, report: &CriticalityReport) -> Self {
        let base = profile.think_time_ms as f64;
        let criticality = report.criticality.clamp(0.0, 1.0);
        let inflated = base
            + branching_bonus_ms(report.legal_moves) as f64
            + base * criticality * CRITICALITY_TIME_GAIN;
        let cap = base * profile.think_cap_multiple.max(1.0);
        let think_ms = inflated.min(cap).max(0.0);

        Self {
            profile: *profile,
            think_time: Duration::from_millis(think_ms.round() as u64),
            criticality: *report,
        }
    }

    /// 不做任何加时，直接使用档位的基础预算。
    pub fn fixed(profile: &Profile, report: &CriticalityReport) -> Self {
        Self {
            profile: *profile,
            think_time: profile.think_time(),
            criticality: *report,
        }
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        self.think_time = self.think_time.mul_f64(factor);
        self
    }
}
