//! 测试用的脚本化适配器：局面图、评估值全部手工给定。

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::adapter::{
    GameAdapter, GameStatus, MoveCategory, PlayerId, SearchMove, SearchState, Simulation, StateKey,
};
use super::profile::Difficulty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptedMove {
    pub id: u32,
    pub category: MoveCategory,
}

impl ScriptedMove {
    pub fn new(id: u32, category: MoveCategory) -> Self {
        Self { id, category }
    }
}

impl SearchMove for ScriptedMove {
    fn category(&self) -> MoveCategory {
        self.category
    }

    fn end_turn() -> Self {
        Self::new(0, MoveCategory::EndTurn)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedState {
    pub id: u32,
    pub player: PlayerId,
    pub terminal: bool,
    pub winner: Option<PlayerId>,
    pub lp: [f64; 2],
    pub board: [usize; 2],
}

impl SearchState for ScriptedState {
    fn status(&self) -> GameStatus {
        if self.terminal {
            GameStatus::Terminal
        } else {
            GameStatus::Active
        }
    }

    fn current_player(&self) -> PlayerId {
        self.player
    }

    fn opponent_of(&self, player: PlayerId) -> PlayerId {
        if player == 1 {
            2
        } else {
            1
        }
    }

    fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    fn state_key(&self) -> StateKey {
        StateKey::new(format!("s{}", self.id))
    }

    fn life_points(&self, player: PlayerId) -> f64 {
        self.lp[usize::from(player.saturating_sub(1)).min(1)]
    }

    fn board_presence(&self, player: PlayerId) -> usize {
        self.board[usize::from(player.saturating_sub(1)).min(1)]
    }
}

#[derive(Debug, Clone)]
struct ScriptedNode {
    state: ScriptedState,
    /// 以 1 号玩家视角给出的评估值。
    eval: f64,
}

pub struct ScriptedAdapter {
    nodes: HashMap<u32, ScriptedNode>,
    edges: HashMap<u32, Vec<(ScriptedMove, u32)>>,
    current: u32,
    difficulty: Difficulty,
    failing_commits: HashSet<ScriptedMove>,
    pub committed: Vec<ScriptedMove>,
    simulate_calls: RefCell<u64>,
}

impl ScriptedAdapter {
    pub fn builder() -> ScriptedBuilder {
        ScriptedBuilder {
            adapter: ScriptedAdapter {
                nodes: HashMap::new(),
                edges: HashMap::new(),
                current: 0,
                difficulty: Difficulty::Expert,
                failing_commits: HashSet::new(),
                committed: Vec::new(),
                simulate_calls: RefCell::new(0),
            },
        }
    }

    pub fn root_state(&self) -> ScriptedState {
        self.state_by_id(self.current)
    }

    pub fn state_by_id(&self, id: u32) -> ScriptedState {
        self.nodes
            .get(&id)
            .map(|node| node.state.clone())
            .unwrap_or_else(|| panic!("scripted node {id} is not defined"))
    }

    pub fn current_id(&self) -> u32 {
        self.current
    }

    pub fn simulate_calls(&self) -> u64 {
        *self.simulate_calls.borrow()
    }

    /// 攻击可以直接斩杀对手的局面。
    pub fn lethal_position() -> Self {
        Self::builder()
            .node(0, 1, 0.0)
            .lp(0, [8000.0, 300.0])
            .board(0, [1, 0])
            .node(1, 1, 4000.0)
            .lp(1, [8000.0, 0.0])
            .board(1, [1, 0])
            .terminal(1, Some(1))
            .node(2, 1, 60.0)
            .lp(2, [8000.0, 300.0])
            .board(2, [2, 0])
            .node(3, 1, 45.0)
            .lp(3, [8000.0, 300.0])
            .board(3, [1, 0])
            .node(4, 2, 20.0)
            .lp(4, [8000.0, 300.0])
            .board(4, [1, 0])
            .edge(0, ScriptedMove::new(3, MoveCategory::Placement), 3)
            .edge(0, ScriptedMove::new(2, MoveCategory::Summon), 2)
            .edge(0, ScriptedMove::new(1, MoveCategory::DirectAttack), 1)
            .edge(0, ScriptedMove::end_turn(), 4)
            .build()
    }

    /// 根节点有 `width` 个召唤走法，每个子局面再有两步，用来观察渐进展开。
    pub fn wide_position(width: u32) -> Self {
        let mut builder = Self::builder().node(0, 1, 0.0).lp(0, [8000.0, 8000.0]);
        for i in 1..=width {
            let child = i * 10;
            builder = builder
                .node(child, 1, 10.0 + f64::from(i % 7) * 3.0)
                .lp(child, [8000.0, 8000.0])
                .node(child + 1, 2, 5.0 + f64::from(i % 5))
                .lp(child + 1, [8000.0, 8000.0])
                .node(child + 2, 1, 12.0 + f64::from(i % 3))
                .lp(child + 2, [8000.0, 8000.0])
                .edge(0, ScriptedMove::new(i, MoveCategory::Summon), child)
                .edge(child, ScriptedMove::end_turn(), child + 1)
                .edge(child, ScriptedMove::new(1000 + i, MoveCategory::Placement), child + 2);
        }
        builder.build()
    }
}

impl GameAdapter for ScriptedAdapter {
    type State = ScriptedState;
    type Move = ScriptedMove;

    fn state(&self) -> ScriptedState {
        self.root_state()
    }

    fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    fn enumerate_moves(&self, state: &ScriptedState, player: PlayerId) -> Vec<ScriptedMove> {
        if state.terminal || state.player != player {
            return Vec::new();
        }
        self.edges
            .get(&state.id)
            .map(|edges| edges.iter().map(|(mv, _)| *mv).collect())
            .unwrap_or_default()
    }

    fn simulate_move(
        &self,
        state: &ScriptedState,
        player: PlayerId,
        mv: &ScriptedMove,
    ) -> Simulation<ScriptedState> {
        *self.simulate_calls.borrow_mut() += 1;
        if state.player != player {
            return Simulation::rejected(state.clone());
        }
        self.edges
            .get(&state.id)
            .and_then(|edges| edges.iter().find(|(edge, _)| edge == mv))
            .map(|(_, to)| Simulation::accepted(self.state_by_id(*to)))
            .unwrap_or_else(|| Simulation::rejected(state.clone()))
    }

    fn evaluate_state(&self, state: &ScriptedState, player: PlayerId) -> f64 {
        let eval = self.nodes.get(&state.id).map(|node| node.eval).unwrap_or(0.0);
        if player == 1 {
            eval
        } else {
            -eval
        }
    }

    fn apply_move(&mut self, player: PlayerId, mv: &ScriptedMove) -> bool {
        if self.failing_commits.contains(mv) {
            return false;
        }
        let state = self.root_state();
        let sim = self.simulate_move(&state, player, mv);
        if !sim.success {
            return false;
        }
        self.current = sim.state.id;
        self.committed.push(*mv);
        true
    }
}

pub struct ScriptedBuilder {
    adapter: ScriptedAdapter,
}

impl ScriptedBuilder {
    pub fn node(mut self, id: u32, player: PlayerId, eval: f64) -> Self {
        self.adapter.nodes.insert(
            id,
            ScriptedNode {
                state: ScriptedState {
                    id,
                    player,
                    terminal: false,
                    winner: None,
                    lp: [8000.0, 8000.0],
                    board: [0, 0],
                },
                eval,
            },
        );
        self
    }

    fn node_mut(&mut self, id: u32) -> &mut ScriptedNode {
        self.adapter
            .nodes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("declare node {id} before configuring it"))
    }

    pub fn terminal(mut self, id: u32, winner: Option<PlayerId>) -> Self {
        let node = self.node_mut(id);
        node.state.terminal = true;
        node.state.winner = winner;
        self
    }

    pub fn lp(mut self, id: u32, lp: [f64; 2]) -> Self {
        self.node_mut(id).state.lp = lp;
        self
    }

    pub fn board(mut self, id: u32, board: [usize; 2]) -> Self {
        self.node_mut(id).state.board = board;
        self
    }

    pub fn edge(mut self, from: u32, mv: ScriptedMove, to: u32) -> Self {
        self.adapter.edges.entry(from).or_default().push((mv, to));
        self
    }

    pub fn root(mut self, id: u32) -> Self {
        self.adapter.current = id;
        self
    }

    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.adapter.difficulty = difficulty;
        self
    }

    pub fn failing_commit(mut self, mv: ScriptedMove) -> Self {
        self.adapter.failing_commits.insert(mv);
        self
    }

    pub fn build(self) -> ScriptedAdapter {
        self.adapter
    }
}
