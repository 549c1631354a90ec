// Hierarchical Rhythm - Binary-tree decomposition of the rhythm grid
// Each tree level halves the periodicity: a drum sits at the coarsest level
// whose residue class of slots strikes it everywhere

use serde::Serialize;
use std::fmt;

use super::grid::{fmt_drum_set, Drum, DrumSet, RhythmStructure};

/// Perfectly balanced binary tree of drum sets
///
/// Stored level by level: `levels[l]` holds the `2^l` nodes of level `l`,
/// level 0 being the root. Node `(l, s)` covers every slot `i` with
/// `i % 2^l == s`. Navigation uses heap order: the children of `(l, s)` are
/// `(l + 1, 2s)` and `(l + 1, 2s + 1)`.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchicalRhythm {
    /// Slot duration of the grid this tree was induced from
    pub interval: f64,

    depth: usize,
    levels: Vec<Vec<DrumSet>>,
}

impl HierarchicalRhythm {
    /// Empty tree with `depth + 1` levels
    pub fn new(depth: usize, interval: f64) -> Self {
        let levels = (0..=depth).map(|l| vec![DrumSet::new(); 1 << l]).collect();

        HierarchicalRhythm {
            interval,
            depth,
            levels,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Nodes of one level in shift order
    pub fn level(&self, level: usize) -> Option<&[DrumSet]> {
        self.levels.get(level).map(|l| l.as_slice())
    }

    pub fn levels(&self) -> &[Vec<DrumSet>] {
        &self.levels
    }

    /// Record `drum` at node `(level, shift)`; false when the node does not exist
    pub fn add_drum(&mut self, level: usize, shift: usize, drum: Drum) -> bool {
        match self.levels.get_mut(level).and_then(|l| l.get_mut(shift)) {
            Some(node) => {
                node.insert(drum);
                true
            }
            None => false,
        }
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            level: 0,
            shift: 0,
        }
    }

    pub fn node(&self, level: usize, shift: usize) -> Option<NodeRef<'_>> {
        if level <= self.depth && shift < (1 << level) {
            Some(NodeRef {
                tree: self,
                level,
                shift,
            })
        } else {
            None
        }
    }

    /// Re-expand the tree into a flat grid of `len` slots
    ///
    /// Slot `i` receives every drum on the path of nodes `(l, i % 2^l)`.
    /// For `len == 2^depth` this reproduces the induced grid exactly.
    pub fn flatten(&self, len: usize) -> RhythmStructure {
        let slots = (0..len)
            .map(|i| {
                self.levels
                    .iter()
                    .enumerate()
                    .flat_map(|(l, nodes)| nodes[i % (1 << l)].iter().copied())
                    .collect()
            })
            .collect();

        RhythmStructure::with_slots(self.interval, slots)
    }
}

impl PartialEq for HierarchicalRhythm {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && self.levels == other.levels
    }
}

impl fmt::Display for HierarchicalRhythm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (l, nodes) in self.levels.iter().enumerate() {
            if l > 0 {
                writeln!(f)?;
            }
            for (s, drums) in nodes.iter().enumerate() {
                if s > 0 {
                    f.write_str(" ")?;
                }
                fmt_drum_set(f, drums)?;
            }
        }
        Ok(())
    }
}

/// Borrowed view of one tree node
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t HierarchicalRhythm,
    level: usize,
    shift: usize,
}

impl<'t> NodeRef<'t> {
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn shift(&self) -> usize {
        self.shift
    }

    pub fn drums(&self) -> &'t DrumSet {
        &self.tree.levels[self.level][self.shift]
    }

    pub fn is_leaf(&self) -> bool {
        self.level == self.tree.depth
    }

    pub fn left(&self) -> Option<NodeRef<'t>> {
        self.tree.node(self.level + 1, 2 * self.shift)
    }

    pub fn right(&self) -> Option<NodeRef<'t>> {
        self.tree.node(self.level + 1, 2 * self.shift + 1)
    }
}

/// Length of the shortest prefix that tiles the grid
///
/// Candidates are multiples of 4 slots. A candidate is accepted when every
/// later block equals it and a trailing partial block equals its prefix.
/// Falls back to the whole grid length.
pub fn repeating_unit_length(grid: &RhythmStructure) -> usize {
    let n = grid.len();
    let mut candidate = 4;

    while candidate <= n {
        let unit = grid.copy_sub(0, candidate);
        if (candidate..n)
            .step_by(candidate)
            .all(|offset| grid.matches_at(offset, &unit))
        {
            return candidate;
        }
        candidate += 4;
    }

    n
}

/// The shortest repeating prefix of the grid
pub fn find_repeating_unit(grid: &RhythmStructure) -> RhythmStructure {
    grid.copy_sub(0, repeating_unit_length(grid))
}

/// Greedily lift each drum to the coarsest level that explains it
///
/// For every drum (enumeration order), level (root first) and shift, a drum
/// present in all slots of the shift's residue class is recorded at that node
/// and removed from those slots of a working copy. Tree depth is
/// `floor(log2(len))`; slots past `2^depth` share residue classes with
/// earlier slots. The input grid is left untouched.
pub fn induce_hierarchy(grid: &RhythmStructure) -> HierarchicalRhythm {
    let n = grid.len();
    if n == 0 {
        return HierarchicalRhythm::new(0, grid.beat_interval);
    }

    let depth = n.ilog2() as usize;
    let mut tree = HierarchicalRhythm::new(depth, grid.beat_interval);
    let mut working = grid.slots.clone();

    for drum in Drum::ALL {
        for level in 0..=depth {
            let stride = 1 << level;
            for shift in 0..stride {
                let struck_everywhere = working[shift..]
                    .iter()
                    .step_by(stride)
                    .all(|slot| slot.contains(&drum));

                if struck_everywhere {
                    tree.add_drum(level, shift, drum);
                    for slot in working[shift..].iter_mut().step_by(stride) {
                        slot.remove(&drum);
                    }
                }
            }
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid(slots: &[&[Drum]]) -> RhythmStructure {
        RhythmStructure::with_slots(125.0, slots.iter().map(|s| s.iter().copied().collect()).collect())
    }

    fn set_from_mask(mask: u16) -> DrumSet {
        Drum::ALL
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, d)| *d)
            .collect()
    }

    const K: &[Drum] = &[Drum::Kick];
    const S: &[Drum] = &[Drum::Snare];
    const H: &[Drum] = &[Drum::HatClosed];
    const KH: &[Drum] = &[Drum::Kick, Drum::HatClosed];
    const SH: &[Drum] = &[Drum::Snare, Drum::HatClosed];
    const E: &[Drum] = &[];

    #[test]
    fn test_four_on_the_floor() {
        let rhythm = grid(&[K, E, E, E, K, E, E, E, K, E, E, E, K, E, E, E]);

        let tree = induce_hierarchy(&rhythm);

        assert_eq!(tree.depth(), 4);
        assert!(tree.level(0).unwrap()[0].is_empty());
        assert!(tree.level(2).unwrap()[0].contains(&Drum::Kick));
        let hits: usize = tree.levels().iter().flatten().map(|s| s.len()).sum();
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_backbeat_with_hats() {
        let rhythm = grid(&[KH, H, SH, H, KH, H, SH, H]);

        let tree = induce_hierarchy(&rhythm);

        assert_eq!(tree.depth(), 3);
        assert!(tree.root().drums().contains(&Drum::HatClosed));
        // kick on slots 0 and 4, snare on 2 and 6
        assert!(tree.level(2).unwrap()[0].contains(&Drum::Kick));
        assert!(tree.level(2).unwrap()[2].contains(&Drum::Snare));
        assert_eq!(tree.flatten(8), rhythm);
    }

    #[test]
    fn test_input_grid_is_untouched() {
        let rhythm = grid(&[K, K, K, K]);
        let before = rhythm.clone();

        let tree = induce_hierarchy(&rhythm);

        assert_eq!(rhythm, before);
        assert!(tree.root().drums().contains(&Drum::Kick));
        assert!(tree.level(1).unwrap().iter().all(|s| s.is_empty()));
    }

    #[test]
    fn test_empty_grid() {
        let tree = induce_hierarchy(&RhythmStructure::new(125.0));

        assert_eq!(tree.depth(), 0);
        assert!(tree.root().drums().is_empty());
        assert!(tree.root().is_leaf());
    }

    #[test]
    fn test_non_power_of_two_length() {
        let rhythm = grid(&[K, E, K, E, K, E]);

        let tree = induce_hierarchy(&rhythm);

        assert_eq!(tree.depth(), 2);
        assert!(tree.level(1).unwrap()[0].contains(&Drum::Kick));
    }

    #[test]
    fn test_node_navigation() {
        let mut tree = HierarchicalRhythm::new(2, 125.0);
        assert!(tree.add_drum(2, 3, Drum::Snare));
        assert!(!tree.add_drum(3, 0, Drum::Snare));
        assert!(!tree.add_drum(1, 2, Drum::Snare));

        let node = tree.root().right().unwrap().right().unwrap();
        assert_eq!((node.level(), node.shift()), (2, 3));
        assert!(node.drums().contains(&Drum::Snare));
        assert!(node.is_leaf());
        assert!(node.left().is_none());
    }

    #[test]
    fn test_equality_ignores_interval() {
        let mut a = HierarchicalRhythm::new(1, 100.0);
        let mut b = HierarchicalRhythm::new(1, 250.0);
        a.add_drum(1, 1, Drum::Kick);
        b.add_drum(1, 1, Drum::Kick);

        assert_eq!(a, b);
        assert_ne!(a, HierarchicalRhythm::new(1, 100.0));
        assert_ne!(HierarchicalRhythm::new(1, 100.0), HierarchicalRhythm::new(2, 100.0));
    }

    #[test]
    fn test_display_levels() {
        let mut tree = HierarchicalRhythm::new(1, 125.0);
        tree.add_drum(0, 0, Drum::HatClosed);
        tree.add_drum(1, 0, Drum::Kick);

        assert_eq!(tree.to_string(), "{hat_closed}\n{kick} {}");
    }

    #[test]
    fn test_repeating_unit_of_four() {
        let rhythm = grid(&[K, E, S, E, K, E, S, E, K, E, S, E]);

        assert_eq!(repeating_unit_length(&rhythm), 4);
        assert_eq!(find_repeating_unit(&rhythm), rhythm.copy_sub(0, 4));
    }

    #[test]
    fn test_repeating_unit_of_eight() {
        let rhythm = grid(&[K, E, S, E, K, K, S, E, K, E, S, E, K, K, S, E]);

        assert_eq!(repeating_unit_length(&rhythm), 8);
    }

    #[test]
    fn test_trailing_partial_block() {
        let rhythm = grid(&[K, E, S, E, K, E, S, E, K, E]);
        assert_eq!(repeating_unit_length(&rhythm), 4);

        let broken = grid(&[K, E, S, E, K, E, S, E, K, S]);
        assert_eq!(repeating_unit_length(&broken), 10);
    }

    #[test]
    fn test_no_repetition_returns_whole_grid() {
        let rhythm = grid(&[K, E, S, E, K, S, E]);
        assert_eq!(repeating_unit_length(&rhythm), 7);

        assert_eq!(repeating_unit_length(&grid(&[K, S])), 2);
        assert_eq!(repeating_unit_length(&RhythmStructure::new(125.0)), 0);
    }

    proptest! {
        #[test]
        fn test_flatten_reproduces_power_of_two_grid(
            depth in 0usize..6,
            masks in prop::collection::vec(any::<u16>(), 32),
        ) {
            let len = 1 << depth;
            let rhythm = RhythmStructure::with_slots(
                125.0,
                masks[..len].iter().map(|&m| set_from_mask(m)).collect(),
            );

            let tree = induce_hierarchy(&rhythm);

            prop_assert_eq!(tree.depth(), depth);
            prop_assert_eq!(tree.flatten(len), rhythm);
        }

        #[test]
        fn test_periodic_grid_repeats_within_unit(
            quarters in 1usize..4,
            repeats in 1usize..5,
            masks in prop::collection::vec(any::<u16>(), 12),
        ) {
            let unit_len = 4 * quarters;
            let unit: Vec<DrumSet> = masks[..unit_len].iter().map(|&m| set_from_mask(m)).collect();
            let slots: Vec<DrumSet> = unit.iter().cycle().take(unit_len * repeats).cloned().collect();
            let rhythm = RhythmStructure::with_slots(125.0, slots);

            let found = repeating_unit_length(&rhythm);

            prop_assert!(found <= unit_len);
            prop_assert_eq!(found % 4, 0);
            let found_unit = rhythm.copy_sub(0, found);
            for offset in (0..rhythm.len()).step_by(found) {
                prop_assert!(rhythm.matches_at(offset, &found_unit));
            }
        }
    }
}
