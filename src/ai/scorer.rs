//! 走法启发式：在局面评估之上叠加按类别的战术修正。
//!
//! 只用作先验（展开顺序与模拟采样），不作为真实的胜负信号。

use super::adapter::{GameAdapter, MoveCategory, PlayerId, SearchMove, SearchState, StateKey};
use super::cache::CachedAdapter;

pub const END_TURN_PENALTY_PER_ACTION: f64 = 18.0;
pub const BOARD_REMOVAL_WEIGHT: f64 = 45.0;
pub const LIFE_DAMAGE_WEIGHT: f64 = 0.04;
pub const DECISIVE_BONUS: f64 = 2_500.0;
pub const TEMPO_BONUS: f64 = 8.0;
const PRIOR_SCALE: f64 = 150.0;
const INVALID_SCORE: f64 = -1.0e6;

pub fn category_weight(category: MoveCategory) -> f64 {
    match category {
        MoveCategory::DirectAttack => 60.0,
        MoveCategory::MonsterAttack => 25.0,
        MoveCategory::Combo => 40.0,
        MoveCategory::Summon => 30.0,
        MoveCategory::Spell => 15.0,
        MoveCategory::Placement => 10.0,
        MoveCategory::Draw => 12.0,
        MoveCategory::Discard | MoveCategory::EndTurn => 0.0,
    }
}

/// 最终选点时的类别加成，直接攻击最高，结束回合重罚。
pub fn selection_bonus(category: MoveCategory) -> f64 {
    match category {
        MoveCategory::DirectAttack => 140.0,
        MoveCategory::MonsterAttack => 90.0,
        MoveCategory::Combo => 70.0,
        MoveCategory::Spell => 40.0,
        MoveCategory::Summon => 30.0,
        MoveCategory::Placement => 15.0,
        MoveCategory::Draw => 10.0,
        MoveCategory::Discard => 0.0,
        MoveCategory::EndTurn => -400.0,
    }
}

/// `evaluation` 是走后局面在 `mover` 视角下的评估值。
pub fn score_move<S: SearchState, M: SearchMove>(
    before: &S,
    mover: PlayerId,
    mv: &M,
    after: &S,
    evaluation: f64,
    non_ending_actions: usize,
) -> f64 {
    if !evaluation.is_finite() {
        return INVALID_SCORE;
    }
    let category = mv.category();
    let opponent = before.opponent_of(mover);
    let mut score = evaluation + category_weight(category);

    if category.is_end_turn() {
        score -= END_TURN_PENALTY_PER_ACTION * non_ending_actions as f64;
    }

    let removed = before.board_presence(opponent) as f64 - after.board_presence(opponent) as f64;
    if removed > 0.0 {
        score += removed * BOARD_REMOVAL_WEIGHT;
    }
    let damage = before.life_points(opponent) - after.life_points(opponent);
    if damage.is_finite() && damage > 0.0 {
        score += damage * LIFE_DAMAGE_WEIGHT;
    }

    if after.is_terminal() {
        match after.winner() {
            Some(winner) if winner == mover => score += DECISIVE_BONUS,
            Some(_) => score -= DECISIVE_BONUS,
            None => {}
        }
    } else if after.current_player() == mover {
        score += TEMPO_BONUS;
    } else {
        score -= TEMPO_BONUS;
    }

    score
}

/// 模拟成功的候选走法。`key` 是走后局面的键。
#[derive(Debug, Clone)]
pub struct Candidate<S, M> {
    pub mv: M,
    pub state: S,
    pub key: StateKey,
    pub score: f64,
    pub prior: f64,
}

/// 对所有候选走法做一步模拟并打分，模拟失败的走法直接丢弃。
pub fn scored_moves<A: GameAdapter>(
    oracle: &mut CachedAdapter<'_, A>,
    key: &StateKey,
    state: &A::State,
    player: PlayerId,
) -> Vec<Candidate<A::State, A::Move>> {
    let moves = oracle.candidate_moves_keyed(key, state, player);
    let non_ending = moves.iter().filter(|mv| !mv.is_end_turn()).count();
    let mut scored = Vec::with_capacity(moves.len());
    for mv in moves {
        let next = oracle.simulate_keyed(key, state, player, &mv);
        if !next.success {
            continue;
        }
        let evaluation = oracle.evaluate_keyed(&next.key, &next.state, player);
        let score = score_move(state, player, &mv, &next.state, evaluation, non_ending);
        scored.push(Candidate {
            mv,
            state: next.state,
            key: next.key,
            score,
            prior: 0.0,
        });
    }
    scored
}

/// 按分数降序取前 `width` 个，并把分数 softmax 成先验。
pub fn rank_candidates<A: GameAdapter>(
    oracle: &mut CachedAdapter<'_, A>,
    key: &StateKey,
    state: &A::State,
    player: PlayerId,
    width: usize,
) -> Vec<Candidate<A::State, A::Move>> {
    rank_matching(oracle, key, state, player, width, |_| true)
}

/// 同 [`rank_candidates`]，但先剔除 `keep` 不接受的走法，先验只在剩余走法间分配。
pub fn rank_matching<A: GameAdapter>(
    oracle: &mut CachedAdapter<'_, A>,
    key: &StateKey,
    state: &A::State,
    player: PlayerId,
    width: usize,
    keep: impl Fn(&A::Move) -> bool,
) -> Vec<Candidate<A::State, A::Move>> {
    let mut ranked = scored_moves(oracle, key, state, player);
    ranked.retain(|candidate| keep(&candidate.mv));
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(width.max(1));
    assign_priors(&mut ranked);
    ranked
}

fn assign_priors<S, M>(candidates: &mut [Candidate<S, M>]) {
    let Some(top) = candidates.iter().map(|c| c.score).reduce(f64::max) else {
        return;
    };
    let weights: Vec<f64> = candidates
        .iter()
        .map(|c| ((c.score - top) / PRIOR_SCALE).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    let uniform = 1.0 / candidates.len() as f64;
    for (candidate, weight) in candidates.iter_mut().zip(weights) {
        candidate.prior = if total > 0.0 && total.is_finite() {
            weight / total
        } else {
            uniform
        };
    }
}
