//! 法术结算。目标合法性在规则引擎里检查，这里只负责修改状态。

use serde::{Deserialize, Serialize};

use super::cards::{SpellId, MAX_STACK_DEPTH};
use super::state::{DuelState, PlayerId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetOwner {
    Me,
    Opp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Monster,
    Construct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellContext {
    pub caster: PlayerId,
    pub owner: TargetOwner,
    pub kind: TargetKind,
    pub slot: usize,
}

impl SpellContext {
    pub fn target_player(&self) -> PlayerId {
        match self.owner {
            TargetOwner::Me => self.caster,
            TargetOwner::Opp => DuelState::opponent(self.caster),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellOutcome {
    /// 目标被修改。
    Applied,
    /// 目标被移出场地。
    Removed,
    /// 卡牌被消耗但对该目标无效。
    Fizzled,
}

impl SpellOutcome {
    pub fn resolved(self) -> bool {
        self != SpellOutcome::Fizzled
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SpellResolver;

impl SpellResolver {
    pub fn resolve(&self, spell: SpellId, ctx: SpellContext, state: &mut DuelState) -> SpellOutcome {
        let friendly = ctx.owner == TargetOwner::Me;
        let Some(owner) = state.player_mut(ctx.target_player()) else {
            return SpellOutcome::Fizzled;
        };

        match ctx.kind {
            TargetKind::Monster => {
                let Some(slot) = owner.monsters.get_mut(ctx.slot) else {
                    return SpellOutcome::Fizzled;
                };
                let Some(target) = slot.as_mut() else {
                    return SpellOutcome::Fizzled;
                };
                match spell {
                    SpellId::SampleSize => {
                        target.n = (target.n + 150).clamp(50, 420);
                        target.refresh();
                    }
                    SpellId::JobRelevance if friendly => target.has_job_relevance = true,
                    SpellId::Imputation if friendly => target.has_imputation = true,
                    SpellId::PHacking if friendly => target.has_p_hacking = true,
                    SpellId::PracticeEffect => target.has_practice_effect = true,
                    SpellId::MissingData => {
                        if target.has_imputation {
                            target.has_imputation = false;
                        } else {
                            *slot = None;
                            return SpellOutcome::Removed;
                        }
                    }
                    SpellId::RangeRestrict if !friendly => {
                        target.range_restriction_stacks =
                            target.range_restriction_stacks.saturating_add(1);
                        target.refresh();
                    }
                    SpellId::ItemLeakage if !friendly => {
                        target.item_leakage_applied = true;
                        target.refresh();
                    }
                    SpellId::Correction if friendly => {
                        target.correction_applied = true;
                        target.range_restriction_stacks = 0;
                        target.refresh();
                    }
                    SpellId::Bootstrapping if friendly => {
                        target.base_n += 50;
                        target.n += 50;
                        target.refresh();
                    }
                    SpellId::CriterionContam if !friendly => {
                        target.n = (target.n / 2).max(1);
                        target.base_n = (target.base_n / 2).max(1);
                        target.refresh();
                    }
                    _ => return SpellOutcome::Fizzled,
                }
                SpellOutcome::Applied
            }
            TargetKind::Construct => {
                let Some(slot) = owner.constructs.get_mut(ctx.slot) else {
                    return SpellOutcome::Fizzled;
                };
                let Some(target) = slot.as_mut() else {
                    return SpellOutcome::Fizzled;
                };
                match spell {
                    SpellId::MissingData => {
                        *slot = None;
                        SpellOutcome::Removed
                    }
                    SpellId::ItemAnalysis if friendly && target.depth < MAX_STACK_DEPTH => {
                        target.depth += 1;
                        SpellOutcome::Applied
                    }
                    SpellId::ConstructDrift if !friendly => {
                        if target.depth > 1 {
                            target.depth -= 1;
                            SpellOutcome::Applied
                        } else {
                            *slot = None;
                            SpellOutcome::Removed
                        }
                    }
                    _ => SpellOutcome::Fizzled,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::ConstructId;
    use crate::game::state::{ConstructStack, Monster};

    fn armed_state() -> DuelState {
        let mut state = DuelState::from_decks(Vec::new(), Vec::new());
        let pred = ConstructStack::new(ConstructId::WorkSample);
        let out = ConstructStack::new(ConstructId::JobPerf);
        for player in &mut state.players {
            player.monsters[0] = Some(Monster::from_stacks(&pred, &out));
            player.constructs[1] = Some(ConstructStack {
                construct: ConstructId::Ocb,
                depth: 2,
            });
        }
        state
    }

    fn ctx(owner: TargetOwner, kind: TargetKind, slot: usize) -> SpellContext {
        SpellContext {
            caster: 1,
            owner,
            kind,
            slot,
        }
    }

    #[test]
    fn range_restriction_only_hits_opponents() {
        let mut state = armed_state();
        let before = state.players[1].monsters[0].as_ref().map(|m| m.atk).unwrap_or_default();
        let resolver = SpellResolver;

        let own = resolver.resolve(
            SpellId::RangeRestrict,
            ctx(TargetOwner::Me, TargetKind::Monster, 0),
            &mut state,
        );
        assert_eq!(own, SpellOutcome::Fizzled);

        let theirs = resolver.resolve(
            SpellId::RangeRestrict,
            ctx(TargetOwner::Opp, TargetKind::Monster, 0),
            &mut state,
        );
        assert_eq!(theirs, SpellOutcome::Applied);
        let after = state.players[1].monsters[0].as_ref().map(|m| m.atk).unwrap_or_default();
        assert!(after < before);
    }

    #[test]
    fn missing_data_respects_imputation() {
        let mut state = armed_state();
        let resolver = SpellResolver;
        let target = ctx(TargetOwner::Opp, TargetKind::Monster, 0);
        if let Some(monster) = state.players[1].monsters[0].as_mut() {
            monster.has_imputation = true;
        }
        assert_eq!(resolver.resolve(SpellId::MissingData, target, &mut state), SpellOutcome::Applied);
        assert!(state.players[1].monsters[0].is_some());
        assert_eq!(resolver.resolve(SpellId::MissingData, target, &mut state), SpellOutcome::Removed);
        assert!(state.players[1].monsters[0].is_none());
    }

    #[test]
    fn construct_spells_change_depth() {
        let mut state = armed_state();
        let resolver = SpellResolver;
        let own = ctx(TargetOwner::Me, TargetKind::Construct, 1);
        assert_eq!(resolver.resolve(SpellId::ItemAnalysis, own, &mut state), SpellOutcome::Applied);
        assert_eq!(state.players[0].constructs[1].map(|s| s.depth), Some(3));
        assert_eq!(resolver.resolve(SpellId::ItemAnalysis, own, &mut state), SpellOutcome::Fizzled);

        let theirs = ctx(TargetOwner::Opp, TargetKind::Construct, 1);
        assert_eq!(resolver.resolve(SpellId::ConstructDrift, theirs, &mut state), SpellOutcome::Applied);
        assert_eq!(resolver.resolve(SpellId::ConstructDrift, theirs, &mut state), SpellOutcome::Removed);
        assert!(state.players[1].constructs[1].is_none());
    }

    #[test]
    fn empty_target_fizzles() {
        let mut state = armed_state();
        let outcome = SpellResolver.resolve(
            SpellId::SampleSize,
            ctx(TargetOwner::Me, TargetKind::Monster, 2),
            &mut state,
        );
        assert_eq!(outcome, SpellOutcome::Fizzled);
    }
}
