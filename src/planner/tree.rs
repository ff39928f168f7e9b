use crate::state::{Path, State};

/// A tree node: a state and a back-reference to the motion it grew from.
pub(crate) struct Motion {
    pub(crate) state: State,
    pub(crate) parent: Option<usize>,
}

/// Arena owning all motions of a tree. Ids are stable and a motion's parent id
/// is always smaller than its own, so parent walks terminate.
#[derive(Default)]
pub(crate) struct MotionArena {
    motions: Vec<Motion>,
}

impl MotionArena {
    pub(crate) fn new() -> Self {
        MotionArena {
            motions: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, state: State, parent: Option<usize>) -> usize {
        debug_assert!(parent.map_or(true, |p| p < self.motions.len()));
        self.motions.push(Motion { state, parent });
        self.motions.len() - 1
    }

    pub(crate) fn len(&self) -> usize {
        self.motions.len()
    }

    pub(crate) fn state(&self, id: usize) -> &State {
        &self.motions[id].state
    }

    pub(crate) fn clear(&mut self) {
        self.motions.clear();
    }

    /// Path from the root to the given motion, as independently owned states.
    pub(crate) fn path_from_root(&self, id: usize) -> Path {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(m) = current {
            chain.push(m);
            current = self.motions[m].parent;
        }
        chain.reverse();
        chain.into_iter().map(|m| self.motions[m].state.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_walk_reaches_root() {
        let mut arena = MotionArena::new();
        let root = arena.insert(State::from_values(vec![0.0]), None);
        let a = arena.insert(State::from_values(vec![1.0]), Some(root));
        let b = arena.insert(State::from_values(vec![2.0]), Some(a));

        let path = arena.path_from_root(b);
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].values[0], 0.0);
        assert_eq!(path[2].values[0], 2.0);
        assert_eq!(arena.path_from_root(root).len(), 1);
        assert_eq!(arena.len(), 3);
    }
}
