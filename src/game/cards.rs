//! 卡牌目录：构念、法术、效度表与怪兽数值公式。

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const MAX_HAND_SIZE: usize = 12;
pub const STARTING_HAND_SIZE: usize = 12;
pub const EXPERIENCE_MISS_THRESHOLD: u32 = 4;
pub const EXPERIENCE_DRAW_COUNT: usize = 3;
pub const MAX_STACK_DEPTH: u8 = 3;
pub const SLOT_COUNT: usize = 3;
pub const STARTING_LIFE_POINTS: i32 = 8_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConstructKind {
    Predictor,
    Outcome,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConstructId {
    CogAbility,
    Conscient,
    StructInt,
    WorkSample,
    JobPerf,
    Turnover,
    JobSat,
    Ocb,
}

impl ConstructId {
    pub const ALL: [ConstructId; 8] = [
        ConstructId::CogAbility,
        ConstructId::Conscient,
        ConstructId::StructInt,
        ConstructId::WorkSample,
        ConstructId::JobPerf,
        ConstructId::Turnover,
        ConstructId::JobSat,
        ConstructId::Ocb,
    ];

    pub fn kind(self) -> ConstructKind {
        match self {
            ConstructId::CogAbility
            | ConstructId::Conscient
            | ConstructId::StructInt
            | ConstructId::WorkSample => ConstructKind::Predictor,
            ConstructId::JobPerf | ConstructId::Turnover | ConstructId::JobSat | ConstructId::Ocb => {
                ConstructKind::Outcome
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConstructId::CogAbility => "Cognitive Ability",
            ConstructId::Conscient => "Conscientiousness",
            ConstructId::StructInt => "Struct. Interview",
            ConstructId::WorkSample => "Work Sample",
            ConstructId::JobPerf => "Job Performance",
            ConstructId::Turnover => "Turnover",
            ConstructId::JobSat => "Job Satisfaction",
            ConstructId::Ocb => "OCB",
        }
    }

    pub fn short(self) -> &'static str {
        match self {
            ConstructId::CogAbility => "COG",
            ConstructId::Conscient => "CON",
            ConstructId::StructInt => "INT",
            ConstructId::WorkSample => "WST",
            ConstructId::JobPerf => "PERF",
            ConstructId::Turnover => "TURN",
            ConstructId::JobSat => "SAT",
            ConstructId::Ocb => "OCB",
        }
    }

    /// 单张卡片的平均题目间相关。
    pub fn avg_r(self) -> f64 {
        match self {
            ConstructId::CogAbility => 0.65,
            ConstructId::Conscient => 0.45,
            ConstructId::StructInt => 0.55,
            ConstructId::WorkSample => 0.50,
            ConstructId::JobPerf => 0.52,
            ConstructId::Turnover => 0.40,
            ConstructId::JobSat => 0.48,
            ConstructId::Ocb => 0.44,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpellId {
    SampleSize,
    JobRelevance,
    Imputation,
    MissingData,
    RangeRestrict,
    ItemLeakage,
    Correction,
    PHacking,
    PracticeEffect,
    Bootstrapping,
    ItemAnalysis,
    ConstructDrift,
    CriterionContam,
}

impl SpellId {
    pub const ALL: [SpellId; 13] = [
        SpellId::SampleSize,
        SpellId::JobRelevance,
        SpellId::Imputation,
        SpellId::MissingData,
        SpellId::RangeRestrict,
        SpellId::ItemLeakage,
        SpellId::Correction,
        SpellId::PHacking,
        SpellId::PracticeEffect,
        SpellId::Bootstrapping,
        SpellId::ItemAnalysis,
        SpellId::ConstructDrift,
        SpellId::CriterionContam,
    ];

    pub fn targets_monster(self) -> bool {
        !matches!(
            self,
            SpellId::MissingData | SpellId::ConstructDrift | SpellId::ItemAnalysis
        )
    }

    /// 只能以构念为目标的法术。
    pub fn targets_construct(self) -> bool {
        matches!(
            self,
            SpellId::MissingData | SpellId::ConstructDrift | SpellId::ItemAnalysis
        )
    }

    fn copies(self) -> usize {
        match self {
            SpellId::SampleSize => 3,
            SpellId::JobRelevance => 4,
            SpellId::RangeRestrict
            | SpellId::ItemLeakage
            | SpellId::Correction
            | SpellId::PracticeEffect
            | SpellId::Bootstrapping
            | SpellId::ItemAnalysis => 2,
            SpellId::Imputation
            | SpellId::MissingData
            | SpellId::PHacking
            | SpellId::ConstructDrift
            | SpellId::CriterionContam => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Card {
    Item { construct: ConstructId },
    Spell { spell: SpellId },
}

impl Card {
    pub fn is_item(&self) -> bool {
        matches!(self, Card::Item { .. })
    }
}

const CONSTRUCT_COPIES: usize = 4;

/// 未洗牌的起始牌库，抽牌从末尾取。
pub static STARTING_DECK: Lazy<Vec<Card>> = Lazy::new(|| {
    let items = ConstructId::ALL.iter().flat_map(|&construct| {
        std::iter::repeat(Card::Item { construct }).take(CONSTRUCT_COPIES)
    });
    let spells = SpellId::ALL
        .iter()
        .flat_map(|&spell| std::iter::repeat(Card::Spell { spell }).take(spell.copies()));
    items.chain(spells).collect()
});

pub fn true_validity(pred: ConstructId, out: ConstructId) -> f64 {
    use ConstructId::*;
    match (pred, out) {
        (CogAbility, JobPerf) => 0.51,
        (CogAbility, Turnover) => 0.20,
        (CogAbility, JobSat) => 0.15,
        (CogAbility, Ocb) => 0.12,
        (Conscient, JobPerf) => 0.31,
        (Conscient, Turnover) => 0.26,
        (Conscient, JobSat) => 0.25,
        (Conscient, Ocb) => 0.30,
        (StructInt, JobPerf) => 0.51,
        (StructInt, Turnover) => 0.22,
        (StructInt, JobSat) => 0.18,
        (StructInt, Ocb) => 0.15,
        (WorkSample, JobPerf) => 0.54,
        (WorkSample, Turnover) => 0.15,
        (WorkSample, JobSat) => 0.12,
        (WorkSample, Ocb) => 0.10,
        _ => 0.1,
    }
}

/// 黑白差异的标准化效应量（Bobko–Roth 表）。
pub fn adverse_impact_bwd(pred: ConstructId, out: ConstructId) -> f64 {
    use ConstructId::*;
    match (pred, out) {
        (CogAbility, JobPerf) => 0.95,
        (CogAbility, Turnover) => 0.60,
        (CogAbility, JobSat) => 0.58,
        (CogAbility, Ocb) => 0.55,
        (Conscient, JobPerf) => 0.20,
        (Conscient, _) if out.kind() == ConstructKind::Outcome => 0.05,
        (StructInt, JobPerf) => 0.35,
        (StructInt, _) if out.kind() == ConstructKind::Outcome => 0.22,
        (WorkSample, JobPerf) => 0.55,
        (WorkSample, _) if out.kind() == ConstructKind::Outcome => 0.40,
        _ => 0.3,
    }
}

pub fn adverse_stars(bwd: f64) -> u8 {
    let d = if bwd.is_finite() { bwd.abs() } else { 0.0 };
    if d <= 0.10 {
        5
    } else if d <= 0.25 {
        4
    } else if d <= 0.45 {
        3
    } else if d <= 0.65 {
        2
    } else {
        1
    }
}

pub fn stars_text(stars: u8) -> String {
    let filled = usize::from(stars.min(5));
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

pub fn spearman_brown(k: u8, avg_r: f64) -> f64 {
    let k = f64::from(k);
    (k * avg_r) / (1.0 + (k - 1.0) * avg_r)
}

/// 统计功效的单调近似。
pub fn approx_power(r_obs: f64, n: u32) -> f64 {
    let r = r_obs.abs().clamp(0.0, 0.999_999);
    let n = f64::from(n.max(4));
    (0.05 + 0.94 * r * ((n - 3.0) / n)).clamp(0.05, 0.99)
}
