//! 关键度估计：根据分支数与一步展望后的评估分布，判断当前决策有多“尖锐”。

use serde::Serialize;

use super::adapter::{GameAdapter, PlayerId, StateKey};
use super::cache::CachedAdapter;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct CriticalityReport {
    /// 适配器报告的合法走法数，不含合成的结束回合。
    pub legal_moves: usize,
    pub close_contest: f64,
    pub tactical_volatility: f64,
    pub branch_factor: f64,
    pub criticality: f64,
    pub best_eval: f64,
    pub runner_up_eval: f64,
    pub worst_eval: f64,
}

impl CriticalityReport {
    pub fn quiet(legal_moves: usize) -> Self {
        Self {
            legal_moves,
            ..Self::default()
        }
    }
}

fn close_contest(gap: f64) -> f64 {
    if gap < 25.0 {
        1.0
    } else if gap < 60.0 {
        0.6
    } else {
        0.25
    }
}

fn tactical_volatility(spread: f64) -> f64 {
    if spread > 160.0 {
        1.0
    } else {
        0.4
    }
}

/// 只看适配器给出的合法走法数，合成的结束回合不计入。
fn branch_factor(legal_moves: usize) -> f64 {
    if legal_moves > 20 {
        1.0
    } else if legal_moves > 12 {
        0.65
    } else {
        0.35
    }
}

pub fn estimate<A: GameAdapter>(
    oracle: &mut CachedAdapter<'_, A>,
    key: &StateKey,
    state: &A::State,
    player: PlayerId,
) -> CriticalityReport {
    if let Some(report) = oracle.cached_criticality(key, player) {
        return report;
    }

    let legal = oracle.legal_moves_keyed(key, state, player).len();
    let report = if legal <= 1 {
        CriticalityReport::quiet(legal)
    } else {
        let candidates = oracle.candidate_moves_keyed(key, state, player);
        let mut evals: Vec<f64> = Vec::with_capacity(candidates.len());
        for mv in &candidates {
            let next = oracle.simulate_keyed(key, state, player, mv);
            if next.success {
                evals.push(oracle.evaluate_keyed(&next.key, &next.state, player));
            }
        }
        evals.sort_by(|a, b| b.total_cmp(a));

        let best = evals.first().copied().unwrap_or(0.0);
        let worst = evals.last().copied().unwrap_or(0.0);
        let (close, volatility, runner_up) = match evals.get(1) {
            Some(&runner_up) => (
                close_contest(best - runner_up),
                tactical_volatility(best - worst),
                runner_up,
            ),
            None => (0.25, 0.4, best),
        };
        let branch = branch_factor(legal);
        let criticality = (0.45 * close + 0.35 * volatility + 0.2 * branch).min(1.0);

        CriticalityReport {
            legal_moves: legal,
            close_contest: close,
            tactical_volatility: volatility,
            branch_factor: branch,
            criticality,
            best_eval: best,
            runner_up_eval: runner_up,
            worst_eval: worst,
        }
    };

    oracle.store_criticality(key, player, report);
    report
}
