//! 局面评估，数值始终从 `perspective` 一方看。

use super::state::{DuelState, Player, PlayerId};

pub const DECIDED_SCORE: f64 = 4_000.0;

const LIFE_WEIGHT: f64 = 0.25;
const ATTACK_WEIGHT: f64 = 0.12;
const MONSTER_WEIGHT: f64 = 60.0;
const READY_WEIGHT: f64 = 25.0;
const DEPTH_WEIGHT: f64 = 12.0;
const HAND_WEIGHT: f64 = 4.0;
const DISCARD_PENALTY: f64 = 15.0;

fn side_strength(player: &Player) -> f64 {
    let monsters = player.monsters.iter().flatten();
    let attack: i32 = monsters.clone().map(|m| m.atk.max(0)).sum();
    let ready = monsters.filter(|m| m.can_attack()).count();
    let depth: u32 = player
        .constructs
        .iter()
        .flatten()
        .map(|stack| u32::from(stack.depth))
        .sum();

    f64::from(player.lp) * LIFE_WEIGHT
        + f64::from(attack) * ATTACK_WEIGHT
        + player.monster_count() as f64 * MONSTER_WEIGHT
        + ready as f64 * READY_WEIGHT
        + f64::from(depth) * DEPTH_WEIGHT
        + player.hand.len() as f64 * HAND_WEIGHT
        - player.pending_discard as f64 * DISCARD_PENALTY
}

pub fn evaluate(state: &DuelState, perspective: PlayerId) -> f64 {
    if state.is_finished() {
        return match state.winner {
            Some(winner) if winner == perspective => DECIDED_SCORE,
            Some(_) => -DECIDED_SCORE,
            None => 0.0,
        };
    }
    let (Some(me), Some(opp)) = (
        state.player(perspective),
        state.player(DuelState::opponent(perspective)),
    ) else {
        return 0.0;
    };
    let score = side_strength(me) - side_strength(opp);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
