use std::collections::HashMap;

use super::adapter::StateKey;

/// 跨路径共享的局面统计，数值一律记为根玩家视角。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TranspositionEntry {
    pub visits: u32,
    pub value_sum: f64,
}

impl TranspositionEntry {
    pub fn mean(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.value_sum / f64::from(self.visits)
        }
    }
}

#[derive(Debug, Default)]
pub struct TranspositionTable {
    entries: HashMap<StateKey, TranspositionEntry>,
}

impl TranspositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StateKey) -> Option<&TranspositionEntry> {
        self.entries.get(key)
    }

    pub fn accumulate(&mut self, key: &StateKey, root_value: f64) {
        let entry = self.entries.entry(key.clone()).or_default();
        entry.visits = entry.visits.saturating_add(1);
        entry.value_sum += root_value;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_paths() {
        let mut table = TranspositionTable::new();
        let key = StateKey::new("shared");
        table.accumulate(&key, 100.0);
        table.accumulate(&StateKey::new("shared"), 50.0);
        let entry = table.get(&key).copied().unwrap_or_default();
        assert_eq!(entry.visits, 2);
        assert!((entry.mean() - 75.0).abs() < 1e-9);

        table.clear();
        assert!(table.is_empty());
    }
}
