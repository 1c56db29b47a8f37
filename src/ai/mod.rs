//! AI 算法模块：与规则无关的自适应 MCTS 搜索。
//!
//! 搜索只通过 [`GameAdapter`] 访问对局，`crate::game` 提供其中一种实现。

pub mod adapter;
pub mod cache;
pub mod clock;
pub mod controller;
pub mod criticality;
pub mod profile;
pub mod rollout;
pub mod scorer;
pub mod search;
pub mod transposition;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{
    GameAdapter, GameStatus, MoveCategory, PlayerId, SearchMove, SearchState, Simulation, StateKey,
};
pub use controller::{TurnController, TurnOutcome, TurnReport, TurnStep};
pub use criticality::CriticalityReport;
pub use profile::{AgentConfig, Difficulty, Profile, SearchBudget, SearchMode};
pub use search::{MctsAgent, SearchDecision};
