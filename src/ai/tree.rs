//! 竞技场式存储的搜索树：节点放在一个 Vec 里，父子之间用下标引用。

use super::adapter::{PlayerId, SearchState, StateKey};
use super::scorer::Candidate;
use super::transposition::TranspositionTable;

/// 回传值的绝对上限，防止个别离群评估淹没统计。
pub const VALUE_CLAMP: f64 = 5_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Node<S, M> {
    /// 走进这个节点的玩家；根节点记为搜索方。
    pub player: PlayerId,
    pub state: S,
    pub key: StateKey,
    pub mv: Option<M>,
    pub prior: f64,
    pub visits: u32,
    pub value_sum: f64,
    pub expanded: bool,
    pub terminal: bool,
    pub candidates: Vec<Candidate<S, M>>,
    /// 下一个尚未实体化的候选下标。
    pub next_candidate: usize,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl<S: SearchState, M> Node<S, M> {
    fn new(
        player: PlayerId,
        state: S,
        key: StateKey,
        mv: Option<M>,
        prior: f64,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            player,
            key,
            terminal: state.is_terminal(),
            state,
            mv,
            prior,
            visits: 0,
            value_sum: 0.0,
            expanded: false,
            candidates: Vec::new(),
            next_candidate: 0,
            children: Vec::new(),
            parent,
        }
    }

    pub fn mean_value(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / f64::from(self.visits)
        }
    }

    pub fn has_pending_candidates(&self) -> bool {
        self.next_candidate < self.candidates.len()
    }
}

#[derive(Debug)]
pub struct SearchTree<S, M> {
    nodes: Vec<Node<S, M>>,
}

impl<S: SearchState, M: Clone> SearchTree<S, M> {
    pub fn new(root_player: PlayerId, root_state: S) -> Self {
        let key = root_state.state_key();
        Self {
            nodes: vec![Node::new(root_player, root_state, key, None, 1.0, None)],
        }
    }

    pub fn root(&self) -> &Node<S, M> {
        &self.nodes[0]
    }

    pub fn get(&self, id: NodeId) -> &Node<S, M> {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node<S, M> {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 记录候选列表并标记为已展开，子节点稍后按需实体化。
    pub fn set_candidates(&mut self, id: NodeId, candidates: Vec<Candidate<S, M>>) {
        let node = self.get_mut(id);
        node.candidates = candidates;
        node.next_candidate = 0;
        node.expanded = true;
    }

    /// 把候选列表中的下一个走法变成子节点。
    pub fn materialize_next(&mut self, id: NodeId) -> Option<NodeId> {
        let child_id = NodeId(self.nodes.len() as u32);
        let parent = self.get_mut(id);
        let candidate = parent.candidates.get(parent.next_candidate)?;
        let mover = parent.state.current_player();
        let child = Node::new(
            mover,
            candidate.state.clone(),
            candidate.key.clone(),
            Some(candidate.mv.clone()),
            candidate.prior,
            Some(id),
        );
        parent.next_candidate += 1;
        parent.children.push(child_id);
        self.nodes.push(child);
        Some(child_id)
    }

    /// 持续实体化直到子节点数达到 `limit` 或候选耗尽。
    pub fn materialize_up_to(&mut self, id: NodeId, limit: usize) -> usize {
        while self.get(id).children.len() < limit {
            if self.materialize_next(id).is_none() {
                break;
            }
        }
        self.get(id).children.len()
    }

    /// 从叶子回传到根。`root_value` 是根玩家视角的值，按节点的行动方翻转符号。
    pub fn backpropagate(
        &mut self,
        leaf: NodeId,
        root_value: f64,
        root_player: PlayerId,
        mut transpositions: Option<&mut TranspositionTable>,
    ) {
        let value = if root_value.is_finite() {
            root_value.clamp(-VALUE_CLAMP, VALUE_CLAMP)
        } else {
            0.0
        };
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = self.get_mut(id);
            node.visits = node.visits.saturating_add(1);
            node.value_sum += if node.player == root_player {
                value
            } else {
                -value
            };
            if let Some(table) = transpositions.as_deref_mut() {
                table.accumulate(&node.key, value);
            }
            current = node.parent;
        }
    }

    pub fn depth_of(&self, mut id: NodeId) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.get(id).parent {
            depth += 1;
            id = parent;
        }
        depth
    }
}
