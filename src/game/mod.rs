//! 心理测量对决的规则实现（卡牌、状态机、法术、评估）。

pub mod adapter;
pub mod cards;
pub mod effects;
pub mod eval;
pub mod rules;
pub mod state;

pub use adapter::DuelAdapter;
pub use cards::{Card, ConstructId, ConstructKind, SpellId, STARTING_DECK};
pub use effects::{SpellContext, SpellOutcome, SpellResolver, TargetKind, TargetOwner};
pub use eval::evaluate;
pub use rules::{AttackTarget, DuelMove, RuleEngine, RuleError, RuleResolution};
pub use state::{
    ConstructStack, DuelState, DuelStatus, GameEvent, Lineage, Monster, Player, PlayerId,
};
