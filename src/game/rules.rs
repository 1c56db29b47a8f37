use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cards::{
    Card, ConstructKind, EXPERIENCE_DRAW_COUNT, EXPERIENCE_MISS_THRESHOLD, MAX_STACK_DEPTH,
    SLOT_COUNT,
};
use super::effects::{SpellContext, SpellOutcome, SpellResolver, TargetKind, TargetOwner};
use super::state::{ConstructStack, DuelState, GameEvent, Monster, Player, PlayerId};
use crate::ai::{MoveCategory, SearchMove};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttackTarget {
    Lp,
    Monster,
}

/// 对局中可以提交的全部动作。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DuelMove {
    PlaceCard {
        hand_index: usize,
        slot: usize,
    },
    DiscardCard {
        hand_index: usize,
    },
    ExperienceDraw,
    Summon {
        pred_slot: usize,
        out_slot: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replace_monster_slot: Option<usize>,
    },
    PlaySpell {
        hand_index: usize,
        target_owner: TargetOwner,
        target_type: TargetKind,
        target_slot: usize,
    },
    Meta,
    Attack {
        attacker_slot: usize,
        target_type: AttackTarget,
        #[serde(default)]
        target_slot: Option<usize>,
    },
    EndTurn,
}

impl SearchMove for DuelMove {
    fn category(&self) -> MoveCategory {
        match self {
            DuelMove::PlaceCard { .. } => MoveCategory::Placement,
            DuelMove::DiscardCard { .. } => MoveCategory::Discard,
            DuelMove::ExperienceDraw => MoveCategory::Draw,
            DuelMove::Summon { .. } => MoveCategory::Summon,
            DuelMove::PlaySpell { .. } => MoveCategory::Spell,
            DuelMove::Meta => MoveCategory::Combo,
            DuelMove::Attack {
                target_type: AttackTarget::Lp,
                ..
            } => MoveCategory::DirectAttack,
            DuelMove::Attack { .. } => MoveCategory::MonsterAttack,
            DuelMove::EndTurn => MoveCategory::EndTurn,
        }
    }

    fn end_turn() -> Self {
        DuelMove::EndTurn
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("the duel is already finished")]
    GameFinished,
    #[error("it is not player {player_id}'s turn")]
    NotPlayerTurn { player_id: PlayerId },
    #[error("player {player_id} does not exist")]
    PlayerNotFound { player_id: PlayerId },
    #[error("{count} card(s) must be discarded first")]
    PendingDiscard { count: usize },
    #[error("no discard is pending")]
    NoPendingDiscard,
    #[error("hand index {index} is out of range")]
    InvalidHandIndex { index: usize },
    #[error("slot {slot} is out of range")]
    InvalidSlot { slot: usize },
    #[error("card type does not fit this action")]
    CardTypeMismatch,
    #[error("slot {slot} holds a different construct")]
    SlotOccupied { slot: usize },
    #[error("slot {slot} is already at full depth")]
    StackFull { slot: usize },
    #[error("{tokens} experience token(s) is not enough")]
    NotEnoughExperience { tokens: u32 },
    #[error("the deck is empty")]
    DeckEmpty,
    #[error("a monster was already summoned this turn")]
    AlreadySummoned,
    #[error("summon needs a predictor stack and an outcome stack")]
    InvalidSummon,
    #[error("the monster row is full, choose a monster to replace")]
    ReplacementRequired,
    #[error("spell target is not valid")]
    InvalidTarget,
    #[error("meta-analysis needs three monsters sharing a construct")]
    MetaUnavailable,
    #[error("monster in slot {slot} cannot attack")]
    AttackerNotReady { slot: usize },
    #[error("attack target is not valid")]
    InvalidAttackTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: DuelState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

impl RuleResolution {
    pub fn new(state: DuelState, mut events: Vec<GameEvent>) -> Self {
        let winner = state.winner;
        if let Some(winner) = winner {
            let has_event = events
                .iter()
                .any(|event| matches!(event, GameEvent::GameWon { .. }));
            if !has_event {
                events.push(GameEvent::GameWon { winner });
            }
        }
        Self {
            state,
            events,
            winner,
        }
    }
}

fn check_slot(slot: usize) -> Result<(), RuleError> {
    if slot < SLOT_COUNT {
        Ok(())
    } else {
        Err(RuleError::InvalidSlot { slot })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEngine {
    spells: SpellResolver,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_turn_owner(state: &DuelState, player_id: PlayerId) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if state.player(player_id).is_none() {
            return Err(RuleError::PlayerNotFound { player_id });
        }
        if state.current_player != player_id {
            return Err(RuleError::NotPlayerTurn { player_id });
        }
        Ok(())
    }

    /// 当前行动方的全部合法动作。有待弃牌时只能弃牌。
    pub fn legal_moves(&self, state: &DuelState) -> Vec<DuelMove> {
        let pid = state.current_player;
        let (Some(me), Some(opp)) = (state.player(pid), state.player(DuelState::opponent(pid)))
        else {
            return Vec::new();
        };
        if state.is_finished() {
            return Vec::new();
        }

        if me.pending_discard > 0 {
            return (0..me.hand.len())
                .map(|hand_index| DuelMove::DiscardCard { hand_index })
                .collect();
        }

        let mut moves = Vec::new();
        for (hand_index, card) in me.hand.iter().enumerate() {
            match card {
                Card::Item { construct } => {
                    for (slot, stack) in me.constructs.iter().enumerate() {
                        let fits = match stack {
                            Some(stack) => {
                                stack.construct == *construct && stack.depth < MAX_STACK_DEPTH
                            }
                            None => true,
                        };
                        if fits {
                            moves.push(DuelMove::PlaceCard { hand_index, slot });
                        }
                    }
                }
                Card::Spell { spell } => {
                    for (owner, player) in [(TargetOwner::Me, me), (TargetOwner::Opp, opp)] {
                        if spell.targets_monster() {
                            for (target_slot, _) in player
                                .monsters
                                .iter()
                                .enumerate()
                                .filter(|(_, m)| m.is_some())
                            {
                                moves.push(DuelMove::PlaySpell {
                                    hand_index,
                                    target_owner: owner,
                                    target_type: TargetKind::Monster,
                                    target_slot,
                                });
                            }
                        }
                        if spell.targets_construct() {
                            for (target_slot, _) in player
                                .constructs
                                .iter()
                                .enumerate()
                                .filter(|(_, c)| c.is_some())
                            {
                                moves.push(DuelMove::PlaySpell {
                                    hand_index,
                                    target_owner: owner,
                                    target_type: TargetKind::Construct,
                                    target_slot,
                                });
                            }
                        }
                    }
                }
            }
        }

        if me.experience_tokens >= EXPERIENCE_MISS_THRESHOLD && !me.deck.is_empty() {
            moves.push(DuelMove::ExperienceDraw);
        }

        if !me.summoned {
            let row_full = me.first_empty_monster_slot().is_none();
            for pred_slot in 0..SLOT_COUNT {
                for out_slot in 0..SLOT_COUNT {
                    let pair = Self::summon_stacks(
                        me.constructs[pred_slot],
                        me.constructs[out_slot],
                        pred_slot,
                        out_slot,
                    );
                    if pair.is_err() {
                        continue;
                    }
                    if row_full {
                        for replace in 0..SLOT_COUNT {
                            moves.push(DuelMove::Summon {
                                pred_slot,
                                out_slot,
                                replace_monster_slot: Some(replace),
                            });
                        }
                    } else {
                        moves.push(DuelMove::Summon {
                            pred_slot,
                            out_slot,
                            replace_monster_slot: None,
                        });
                    }
                }
            }
        }

        if me.can_meta() {
            moves.push(DuelMove::Meta);
        }

        let opponent_has_monsters = opp.has_monsters();
        for (attacker_slot, monster) in me.monsters.iter().enumerate() {
            if !monster.as_ref().map(Monster::can_attack).unwrap_or(false) {
                continue;
            }
            if !opponent_has_monsters {
                moves.push(DuelMove::Attack {
                    attacker_slot,
                    target_type: AttackTarget::Lp,
                    target_slot: None,
                });
            }
            for (target_slot, _) in opp.monsters.iter().enumerate().filter(|(_, m)| m.is_some()) {
                moves.push(DuelMove::Attack {
                    attacker_slot,
                    target_type: AttackTarget::Monster,
                    target_slot: Some(target_slot),
                });
            }
        }

        moves.push(DuelMove::EndTurn);
        moves
    }

    fn summon_stacks(
        pred: Option<ConstructStack>,
        out: Option<ConstructStack>,
        pred_slot: usize,
        out_slot: usize,
    ) -> Result<(ConstructStack, ConstructStack), RuleError> {
        match (pred, out) {
            (Some(pred), Some(out))
                if pred_slot != out_slot
                    && pred.kind() == ConstructKind::Predictor
                    && out.kind() == ConstructKind::Outcome =>
            {
                Ok((pred, out))
            }
            _ => Err(RuleError::InvalidSummon),
        }
    }

    /// 不修改输入，返回结算后的新状态。
    pub fn resolve(
        &self,
        state: &DuelState,
        player_id: PlayerId,
        action: &DuelMove,
    ) -> Result<RuleResolution, RuleError> {
        let mut next = state.clone();
        let events = self.apply(&mut next, player_id, action)?;
        Ok(RuleResolution::new(next, events))
    }

    /// 校验并执行动作。出错时状态保持不变。
    pub fn apply(
        &self,
        state: &mut DuelState,
        player_id: PlayerId,
        action: &DuelMove,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_turn_owner(state, player_id)?;
        let pending = state
            .player(player_id)
            .map(|p| p.pending_discard)
            .unwrap_or(0);
        if pending > 0 && !matches!(action, DuelMove::DiscardCard { .. }) {
            return Err(RuleError::PendingDiscard { count: pending });
        }

        let mut events = match *action {
            DuelMove::PlaceCard { hand_index, slot } => {
                Self::place_card(state, player_id, hand_index, slot)?
            }
            DuelMove::DiscardCard { hand_index } => {
                Self::discard_card(state, player_id, hand_index)?
            }
            DuelMove::ExperienceDraw => Self::experience_draw(state, player_id)?,
            DuelMove::Summon {
                pred_slot,
                out_slot,
                replace_monster_slot,
            } => Self::summon(state, player_id, pred_slot, out_slot, replace_monster_slot)?,
            DuelMove::PlaySpell {
                hand_index,
                target_owner,
                target_type,
                target_slot,
            } => {
                let ctx = SpellContext {
                    caster: player_id,
                    owner: target_owner,
                    kind: target_type,
                    slot: target_slot,
                };
                self.play_spell(state, hand_index, ctx)?
            }
            DuelMove::Meta => Self::meta(state, player_id)?,
            DuelMove::Attack {
                attacker_slot,
                target_type,
                target_slot,
            } => Self::attack(state, player_id, attacker_slot, target_type, target_slot)?,
            DuelMove::EndTurn => Self::end_turn(state, player_id)?,
        };

        if let Some(winner) = state.mark_game_over() {
            events.push(GameEvent::GameWon { winner });
        }
        Ok(events)
    }

    fn me(state: &mut DuelState, player_id: PlayerId) -> Result<&mut Player, RuleError> {
        state
            .player_mut(player_id)
            .ok_or(RuleError::PlayerNotFound { player_id })
    }

    fn place_card(
        state: &mut DuelState,
        player_id: PlayerId,
        hand_index: usize,
        slot: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        check_slot(slot)?;
        let me = Self::me(state, player_id)?;
        let card = *me
            .hand
            .get(hand_index)
            .ok_or(RuleError::InvalidHandIndex { index: hand_index })?;
        let Card::Item { construct } = card else {
            return Err(RuleError::CardTypeMismatch);
        };
        let depth = match me.constructs[slot] {
            Some(stack) if stack.construct != construct => {
                return Err(RuleError::SlotOccupied { slot })
            }
            Some(stack) if stack.depth >= MAX_STACK_DEPTH => {
                return Err(RuleError::StackFull { slot })
            }
            Some(stack) => stack.depth + 1,
            None => 1,
        };

        me.hand.remove(hand_index);
        me.constructs[slot] = Some(ConstructStack { construct, depth });
        Ok(vec![GameEvent::CardPlaced {
            player_id,
            construct,
            slot,
            depth,
        }])
    }

    fn discard_card(
        state: &mut DuelState,
        player_id: PlayerId,
        hand_index: usize,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let me = Self::me(state, player_id)?;
        if me.pending_discard == 0 {
            return Err(RuleError::NoPendingDiscard);
        }
        if hand_index >= me.hand.len() {
            return Err(RuleError::InvalidHandIndex { index: hand_index });
        }
        let card = me.hand.remove(hand_index);
        me.pending_discard -= 1;
        Ok(vec![GameEvent::CardDiscarded { player_id, card }])
    }

    fn experience_draw(
        state: &mut DuelState,
        player_id: PlayerId,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let me = Self::me(state, player_id)?;
        if me.experience_tokens < EXPERIENCE_MISS_THRESHOLD {
            return Err(RuleError::NotEnoughExperience {
                tokens: me.experience_tokens,
            });
        }
        if me.deck.is_empty() {
            return Err(RuleError::DeckEmpty);
        }
        me.experience_tokens -= EXPERIENCE_MISS_THRESHOLD;
        let count = me.draw(EXPERIENCE_DRAW_COUNT, true);
        me.enforce_hand_limit();
        Ok(vec![GameEvent::CardsDrawn { player_id, count }])
    }

    fn summon(
        state: &mut DuelState,
        player_id: PlayerId,
        pred_slot: usize,
        out_slot: usize,
        replace: Option<usize>,
    ) -> Result<Vec<GameEvent>, RuleError> {
        check_slot(pred_slot)?;
        check_slot(out_slot)?;
        let me = Self::me(state, player_id)?;
        if me.summoned {
            return Err(RuleError::AlreadySummoned);
        }
        let (pred, out) = Self::summon_stacks(
            me.constructs[pred_slot],
            me.constructs[out_slot],
            pred_slot,
            out_slot,
        )?;
        let slot = match (me.first_empty_monster_slot(), replace) {
            (Some(open), _) => open,
            (None, Some(replace)) => {
                check_slot(replace)?;
                replace
            }
            (None, None) => return Err(RuleError::ReplacementRequired),
        };

        let monster = Monster::from_stacks(&pred, &out);
        let event = GameEvent::MonsterSummoned {
            player_id,
            slot,
            name: monster.name.clone(),
            atk: monster.atk,
        };
        me.constructs[pred_slot] = None;
        me.constructs[out_slot] = None;
        me.monsters[slot] = Some(monster);
        me.summoned = true;
        Ok(vec![event])
    }

    fn play_spell(
        &self,
        state: &mut DuelState,
        hand_index: usize,
        ctx: SpellContext,
    ) -> Result<Vec<GameEvent>, RuleError> {
        check_slot(ctx.slot)?;
        let target_player = ctx.target_player();
        let target_present = state
            .player(target_player)
            .map(|p| match ctx.kind {
                TargetKind::Monster => p.monsters[ctx.slot].is_some(),
                TargetKind::Construct => p.constructs[ctx.slot].is_some(),
            })
            .unwrap_or(false);

        let me = Self::me(state, ctx.caster)?;
        let card = *me
            .hand
            .get(hand_index)
            .ok_or(RuleError::InvalidHandIndex { index: hand_index })?;
        let Card::Spell { spell } = card else {
            return Err(RuleError::CardTypeMismatch);
        };
        let kind_fits = match ctx.kind {
            TargetKind::Monster => spell.targets_monster(),
            TargetKind::Construct => spell.targets_construct(),
        };
        if !kind_fits || !target_present {
            return Err(RuleError::InvalidTarget);
        }

        me.hand.remove(hand_index);
        let outcome = self.spells.resolve(spell, ctx, state);
        let mut events = vec![GameEvent::SpellCast {
            player_id: ctx.caster,
            spell,
            target_player,
            target_slot: ctx.slot,
            resolved: outcome.resolved(),
        }];
        if ctx.kind == TargetKind::Monster && outcome == SpellOutcome::Removed {
            events.push(GameEvent::MonsterDestroyed {
                player_id: target_player,
                slot: ctx.slot,
            });
        }
        Ok(events)
    }

    fn meta(state: &mut DuelState, player_id: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        let me = Self::me(state, player_id)?;
        if !me.can_meta() {
            return Err(RuleError::MetaUnavailable);
        }
        let materials: Vec<Monster> = me.monsters.iter_mut().filter_map(Option::take).collect();
        let titan = Monster::meta(&materials);
        let atk = titan.atk;
        me.monsters[0] = Some(titan);
        Ok(vec![GameEvent::MetaFused { player_id, atk }])
    }

    fn attack(
        state: &mut DuelState,
        player_id: PlayerId,
        attacker_slot: usize,
        target: AttackTarget,
        target_slot: Option<usize>,
    ) -> Result<Vec<GameEvent>, RuleError> {
        check_slot(attacker_slot)?;
        let opponent_id = DuelState::opponent(player_id);
        let (me, opp) = state
            .sides_mut(player_id)
            .ok_or(RuleError::PlayerNotFound { player_id })?;
        let attacker_atk = match me.monsters[attacker_slot].as_ref() {
            Some(monster) if monster.can_attack() => monster.atk,
            _ => return Err(RuleError::AttackerNotReady { slot: attacker_slot }),
        };

        let mut events = Vec::new();
        let damage = match (target, target_slot) {
            (AttackTarget::Lp, _) => {
                if opp.has_monsters() {
                    return Err(RuleError::InvalidAttackTarget);
                }
                opp.lp = (opp.lp - attacker_atk).max(0);
                attacker_atk
            }
            (AttackTarget::Monster, Some(slot)) => {
                check_slot(slot)?;
                let Some(defender_atk) = opp.monsters[slot].as_ref().map(|m| m.atk) else {
                    return Err(RuleError::InvalidAttackTarget);
                };
                if attacker_atk > defender_atk {
                    let damage = attacker_atk - defender_atk;
                    opp.lp = (opp.lp - damage).max(0);
                    opp.monsters[slot] = None;
                    events.push(GameEvent::MonsterDestroyed {
                        player_id: opponent_id,
                        slot,
                    });
                    damage
                } else if attacker_atk < defender_atk {
                    me.lp = (me.lp - (defender_atk - attacker_atk)).max(0);
                    me.monsters[attacker_slot] = None;
                    events.push(GameEvent::MonsterDestroyed {
                        player_id,
                        slot: attacker_slot,
                    });
                    0
                } else {
                    me.monsters[attacker_slot] = None;
                    opp.monsters[slot] = None;
                    events.push(GameEvent::MonsterDestroyed {
                        player_id,
                        slot: attacker_slot,
                    });
                    events.push(GameEvent::MonsterDestroyed {
                        player_id: opponent_id,
                        slot,
                    });
                    0
                }
            }
            (AttackTarget::Monster, None) => return Err(RuleError::InvalidAttackTarget),
        };

        if let Some(attacker) = me.monsters[attacker_slot].as_mut() {
            attacker.attacks_made += 1;
            if attacker.has_p_hacking {
                me.monsters[attacker_slot] = None;
                events.push(GameEvent::MonsterDestroyed {
                    player_id,
                    slot: attacker_slot,
                });
            }
        }

        events.insert(
            0,
            GameEvent::AttackResolved {
                player_id,
                attacker_slot,
                target_slot,
                damage,
            },
        );
        Ok(events)
    }

    fn end_turn(state: &mut DuelState, player_id: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        let next_id = DuelState::opponent(player_id);
        let (me, next) = state
            .sides_mut(player_id)
            .ok_or(RuleError::PlayerNotFound { player_id })?;
        for monster in me.monsters.iter_mut().flatten() {
            monster.correction_applied = false;
            monster.item_leakage_applied = false;
            monster.refresh();
        }

        next.summoned = false;
        let count = next.draw(1, true);
        next.enforce_hand_limit();
        next.ready_monsters();

        state.current_player = next_id;
        state.turn += 1;
        let mut events = vec![GameEvent::TurnEnded { player_id }];
        if count > 0 {
            events.push(GameEvent::CardsDrawn {
                player_id: next_id,
                count,
            });
        }
        Ok(events)
    }
}
