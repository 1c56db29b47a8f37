//! 搜索引擎与规则引擎之间的适配边界。
//!
//! 搜索核心只依赖这里定义的 trait，换一套规则实现不需要改动搜索内部。

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::profile::Difficulty;

/// 玩家标识。
pub type PlayerId = u8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Terminal,
}

/// 状态的规范化结构标识。
///
/// 保存完整的结构化编码而不是摘要，相等比较即结构相等，不存在哈希碰撞。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StateKey(Rc<str>);

impl StateKey {
    pub fn new(encoded: impl Into<Rc<str>>) -> Self {
        Self(encoded.into())
    }

    /// 用 serde_json 编码。结构体字段按声明顺序输出，状态里不能含有无序容器。
    pub fn encode<T: Serialize + fmt::Debug>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => Self::new(json),
            Err(_) => Self::new(format!("{value:?}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 48;
        let text = self.as_str();
        match text.char_indices().nth(PREVIEW) {
            Some((idx, _)) => write!(f, "StateKey({}…)", &text[..idx]),
            None => write!(f, "StateKey({text})"),
        }
    }
}

/// 启发式评分唯一会查看的走法信息。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MoveCategory {
    DirectAttack,
    MonsterAttack,
    Combo,
    Spell,
    Summon,
    Placement,
    Draw,
    Discard,
    EndTurn,
}

impl MoveCategory {
    pub fn is_end_turn(self) -> bool {
        self == MoveCategory::EndTurn
    }
}

pub trait SearchState: Clone {
    fn status(&self) -> GameStatus;
    fn current_player(&self) -> PlayerId;
    fn opponent_of(&self, player: PlayerId) -> PlayerId;
    fn winner(&self) -> Option<PlayerId>;
    fn state_key(&self) -> StateKey;
    fn life_points(&self, player: PlayerId) -> f64;
    fn board_presence(&self, player: PlayerId) -> usize;

    fn is_terminal(&self) -> bool {
        self.status() == GameStatus::Terminal
    }
}

pub trait SearchMove: Clone + Eq + Hash + fmt::Debug {
    fn category(&self) -> MoveCategory;

    /// 合成的“结束回合”走法。
    fn end_turn() -> Self;

    fn is_end_turn(&self) -> bool {
        self.category().is_end_turn()
    }
}

/// 纯模拟的结果。失败时 `state` 是未改动的输入状态。
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation<S> {
    pub success: bool,
    pub state: S,
}

impl<S> Simulation<S> {
    pub fn accepted(state: S) -> Self {
        Self {
            success: true,
            state,
        }
    }

    pub fn rejected(state: S) -> Self {
        Self {
            success: false,
            state,
        }
    }
}

/// 规则引擎需要提供的能力集合。
///
/// 除 `apply_move` 外所有方法都不能有副作用；非法走法通过返回值表达，不能 panic。
pub trait GameAdapter {
    type State: SearchState;
    type Move: SearchMove;

    fn state(&self) -> Self::State;
    fn difficulty(&self) -> Difficulty;
    fn enumerate_moves(&self, state: &Self::State, player: PlayerId) -> Vec<Self::Move>;
    fn simulate_move(
        &self,
        state: &Self::State,
        player: PlayerId,
        mv: &Self::Move,
    ) -> Simulation<Self::State>;
    fn evaluate_state(&self, state: &Self::State, player: PlayerId) -> f64;

    /// 唯一真正修改对局的操作，返回是否提交成功。
    fn apply_move(&mut self, player: PlayerId, mv: &Self::Move) -> bool;
}
