use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::cards::{
    adverse_impact_bwd, adverse_stars, approx_power, spearman_brown, stars_text, true_validity,
    Card, ConstructId, ConstructKind, SpellId, MAX_HAND_SIZE, SLOT_COUNT, STARTING_DECK,
    STARTING_HAND_SIZE, STARTING_LIFE_POINTS,
};
use crate::ai::{GameStatus, SearchState, StateKey};

pub use crate::ai::PlayerId;

const BASE_SAMPLE_SIZE: u32 = 50;

/// 同一构念叠放在一个槽位里的卡片。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConstructStack {
    pub construct: ConstructId,
    pub depth: u8,
}

impl ConstructStack {
    pub fn new(construct: ConstructId) -> Self {
        Self {
            construct,
            depth: 1,
        }
    }

    pub fn kind(&self) -> ConstructKind {
        self.construct.kind()
    }

    /// Spearman–Brown 信度。
    pub fn alpha(&self) -> f64 {
        if self.depth == 0 {
            0.0
        } else {
            spearman_brown(self.depth, self.construct.avg_r())
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Lineage {
    Pair {
        predictor: ConstructId,
        outcome: ConstructId,
    },
    Meta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Monster {
    pub name: String,
    pub lineage: Lineage,
    pub pred_alpha: f64,
    pub out_alpha: f64,
    pub r_true: f64,
    pub adverse_impact: f64,
    pub adverse_stars: u8,
    pub requires_job_relevance: bool,
    pub r_obs: f64,
    pub base_atk: i32,
    pub atk: i32,
    pub base_n: u32,
    pub n: u32,
    pub power: f64,
    pub attacks_made: u8,
    pub max_attacks: u8,
    pub summoning_sick: bool,
    #[serde(default)]
    pub has_job_relevance: bool,
    #[serde(default)]
    pub has_imputation: bool,
    #[serde(default)]
    pub has_p_hacking: bool,
    #[serde(default)]
    pub has_practice_effect: bool,
    #[serde(default)]
    pub item_leakage_applied: bool,
    #[serde(default)]
    pub correction_applied: bool,
    #[serde(default)]
    pub range_restriction_stacks: u8,
    pub validity_multiplier: f64,
}

fn round_half_even(value: f64) -> i32 {
    value.round_ties_even() as i32
}

impl Monster {
    pub fn from_stacks(pred: &ConstructStack, out: &ConstructStack) -> Self {
        let bwd = adverse_impact_bwd(pred.construct, out.construct);
        let stars = adverse_stars(bwd);
        let mut monster = Self {
            name: format!("{}×{}", pred.construct.short(), out.construct.short()),
            lineage: Lineage::Pair {
                predictor: pred.construct,
                outcome: out.construct,
            },
            pred_alpha: pred.alpha(),
            out_alpha: out.alpha(),
            r_true: true_validity(pred.construct, out.construct),
            adverse_impact: bwd,
            adverse_stars: stars,
            requires_job_relevance: stars <= 3,
            r_obs: 0.0,
            base_atk: 0,
            atk: 0,
            base_n: BASE_SAMPLE_SIZE,
            n: BASE_SAMPLE_SIZE,
            power: 0.1,
            attacks_made: 0,
            max_attacks: 1,
            summoning_sick: true,
            has_job_relevance: false,
            has_imputation: false,
            has_p_hacking: false,
            has_practice_effect: false,
            item_leakage_applied: false,
            correction_applied: false,
            range_restriction_stacks: 0,
            validity_multiplier: 1.0,
        };
        monster.refresh();
        monster
    }

    /// 三只怪兽融合成元分析泰坦。
    pub fn meta(materials: &[Monster]) -> Self {
        let count = materials.len().max(1) as f64;
        let mean_r = materials.iter().map(|m| m.r_obs.abs()).sum::<f64>() / count;
        let r_true = (mean_r * 1.35).clamp(0.35, 0.95);
        let n: u32 = materials.iter().map(|m| m.base_n).sum();
        let atk = round_half_even(r_true.abs() * 10_000.0);
        Self {
            name: "Meta-Analytic Titan".to_string(),
            lineage: Lineage::Meta,
            pred_alpha: 0.99,
            out_alpha: 0.99,
            r_true,
            adverse_impact: 0.0,
            adverse_stars: 5,
            requires_job_relevance: false,
            r_obs: r_true,
            base_atk: atk,
            atk,
            base_n: n,
            n,
            power: (0.9 + f64::from(n) / 1_000.0).clamp(0.9, 0.99),
            attacks_made: 0,
            max_attacks: 1,
            summoning_sick: false,
            has_job_relevance: false,
            has_imputation: false,
            has_p_hacking: false,
            has_practice_effect: false,
            item_leakage_applied: false,
            correction_applied: false,
            range_restriction_stacks: 0,
            validity_multiplier: 1.0,
        }
    }

    pub fn is_meta(&self) -> bool {
        self.lineage == Lineage::Meta
    }

    pub fn predictor(&self) -> Option<ConstructId> {
        match self.lineage {
            Lineage::Pair { predictor, .. } => Some(predictor),
            Lineage::Meta => None,
        }
    }

    pub fn outcome(&self) -> Option<ConstructId> {
        match self.lineage {
            Lineage::Pair { outcome, .. } => Some(outcome),
            Lineage::Meta => None,
        }
    }

    pub fn stars_text(&self) -> String {
        stars_text(self.adverse_stars)
    }

    /// 按当前修饰重新计算观测效度、攻击力与功效。元分析泰坦只钳制功效。
    pub fn refresh(&mut self) {
        if self.is_meta() {
            self.power = self.power.clamp(0.7, 0.99);
            return;
        }
        let multiplier = self.validity_multiplier.max(0.0);
        let effective = if self.item_leakage_applied {
            0.0
        } else {
            multiplier
        };
        let attenuation = (self.pred_alpha.max(0.05) * self.out_alpha.max(0.05)).sqrt();
        self.r_obs = self.r_true * attenuation * effective;
        self.base_atk = round_half_even(self.r_obs.abs() * 10_000.0);

        let mut atk = if self.correction_applied {
            round_half_even(self.r_true.abs() * effective * 10_000.0)
        } else {
            self.base_atk
        };
        for _ in 0..self.range_restriction_stacks {
            atk = round_half_even(f64::from(atk) / 2.0);
        }
        self.atk = atk;
        self.power = approx_power(f64::from(self.atk.abs()) / 10_000.0, self.n);
    }

    pub fn can_attack(&self) -> bool {
        if self.summoning_sick || self.attacks_made >= self.max_attacks {
            return false;
        }
        !(self.requires_job_relevance && !self.has_job_relevance)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub lp: i32,
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub hand: Vec<Card>,
    #[serde(default)]
    pub constructs: [Option<ConstructStack>; SLOT_COUNT],
    #[serde(default)]
    pub monsters: [Option<Monster>; SLOT_COUNT],
    #[serde(default)]
    pub summoned: bool,
    #[serde(default)]
    pub experience_tokens: u32,
    #[serde(default)]
    pub pending_discard: usize,
}

impl Player {
    pub fn new(id: PlayerId, deck: Vec<Card>) -> Self {
        Self {
            id,
            lp: STARTING_LIFE_POINTS,
            deck,
            hand: Vec::new(),
            constructs: [None; SLOT_COUNT],
            monsters: [None, None, None],
            summoned: false,
            experience_tokens: 0,
            pending_discard: 0,
        }
    }

    /// 从牌库末尾抽牌。不允许溢出时手牌满即停止。
    pub fn draw(&mut self, count: usize, allow_overflow: bool) -> usize {
        let mut drawn = 0;
        for _ in 0..count {
            if !allow_overflow && self.hand.len() >= MAX_HAND_SIZE {
                break;
            }
            match self.deck.pop() {
                Some(card) => {
                    self.hand.push(card);
                    drawn += 1;
                }
                None => break,
            }
        }
        drawn
    }

    pub fn enforce_hand_limit(&mut self) {
        self.pending_discard = self.hand.len().saturating_sub(MAX_HAND_SIZE);
    }

    pub fn first_empty_monster_slot(&self) -> Option<usize> {
        self.monsters.iter().position(Option::is_none)
    }

    pub fn monster_count(&self) -> usize {
        self.monsters.iter().flatten().count()
    }

    pub fn has_monsters(&self) -> bool {
        self.monsters.iter().any(Option::is_some)
    }

    /// 三个槽位都有非泰坦怪兽，且共享预测变量或结果变量。
    pub fn can_meta(&self) -> bool {
        let [Some(a), Some(b), Some(c)] = &self.monsters else {
            return false;
        };
        let row = [a, b, c];
        let shared = |key: fn(&Monster) -> Option<ConstructId>| {
            key(a).is_some() && row.iter().all(|m| key(m) == key(a))
        };
        shared(Monster::predictor) || shared(Monster::outcome)
    }

    pub fn ready_monsters(&mut self) {
        for monster in self.monsters.iter_mut().flatten() {
            monster.summoning_sick = false;
            monster.attacks_made = 0;
            monster.max_attacks = 1;
            monster.refresh();
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuelStatus {
    #[default]
    Active,
    Finished,
}

/// 对局事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    CardPlaced {
        player_id: PlayerId,
        construct: ConstructId,
        slot: usize,
        depth: u8,
    },
    CardDiscarded {
        player_id: PlayerId,
        card: Card,
    },
    CardsDrawn {
        player_id: PlayerId,
        count: usize,
    },
    MonsterSummoned {
        player_id: PlayerId,
        slot: usize,
        name: String,
        atk: i32,
    },
    SpellCast {
        player_id: PlayerId,
        spell: SpellId,
        target_player: PlayerId,
        target_slot: usize,
        resolved: bool,
    },
    MetaFused {
        player_id: PlayerId,
        atk: i32,
    },
    AttackResolved {
        player_id: PlayerId,
        attacker_slot: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_slot: Option<usize>,
        damage: i32,
    },
    MonsterDestroyed {
        player_id: PlayerId,
        slot: usize,
    },
    TurnEnded {
        player_id: PlayerId,
    },
    GameWon {
        winner: PlayerId,
    },
}

/// 对局整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuelState {
    #[serde(default)]
    pub status: DuelStatus,
    pub current_player: PlayerId,
    #[serde(default)]
    pub winner: Option<PlayerId>,
    #[serde(default = "first_turn")]
    pub turn: u32,
    pub players: [Player; 2],
}

fn first_turn() -> u32 {
    1
}

impl DuelState {
    /// 未洗牌的开局：双方牌库相同，各抽起手牌。
    pub fn initial() -> Self {
        Self::from_decks(STARTING_DECK.clone(), STARTING_DECK.clone())
    }

    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut first = STARTING_DECK.clone();
        let mut second = STARTING_DECK.clone();
        first.shuffle(rng);
        second.shuffle(rng);
        Self::from_decks(first, second)
    }

    pub fn from_decks(first: Vec<Card>, second: Vec<Card>) -> Self {
        let mut players = [Player::new(1, first), Player::new(2, second)];
        for player in &mut players {
            player.draw(STARTING_HAND_SIZE, false);
        }
        Self {
            status: DuelStatus::Active,
            current_player: 1,
            winner: None,
            turn: 1,
            players,
        }
    }

    fn seat(id: PlayerId) -> Option<usize> {
        match id {
            1 => Some(0),
            2 => Some(1),
            _ => None,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        Self::seat(id).map(|idx| &self.players[idx])
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        Self::seat(id).map(move |idx| &mut self.players[idx])
    }

    /// 同时借出行动方与对手。
    pub fn sides_mut(&mut self, id: PlayerId) -> Option<(&mut Player, &mut Player)> {
        let [first, second] = &mut self.players;
        match Self::seat(id)? {
            0 => Some((first, second)),
            _ => Some((second, first)),
        }
    }

    pub fn opponent(id: PlayerId) -> PlayerId {
        if id == 1 {
            2
        } else {
            1
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == DuelStatus::Finished
    }

    /// 任一方生命值归零即结束，返回新产生的胜者。
    pub fn mark_game_over(&mut self) -> Option<PlayerId> {
        if self.is_finished() {
            return None;
        }
        let [first, second] = &self.players;
        if first.lp > 0 && second.lp > 0 {
            return None;
        }
        let winner = if first.lp > 0 { first.id } else { second.id };
        self.status = DuelStatus::Finished;
        self.winner = Some(winner);
        Some(winner)
    }
}

impl SearchState for DuelState {
    fn status(&self) -> GameStatus {
        match self.status {
            DuelStatus::Active => GameStatus::Active,
            DuelStatus::Finished => GameStatus::Terminal,
        }
    }

    fn current_player(&self) -> PlayerId {
        self.current_player
    }

    fn opponent_of(&self, player: PlayerId) -> PlayerId {
        DuelState::opponent(player)
    }

    fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    fn state_key(&self) -> StateKey {
        StateKey::encode(self)
    }

    fn life_points(&self, player: PlayerId) -> f64 {
        self.player(player).map(|p| f64::from(p.lp)).unwrap_or(0.0)
    }

    fn board_presence(&self, player: PlayerId) -> usize {
        self.player(player).map(Player::monster_count).unwrap_or(0)
    }
}
