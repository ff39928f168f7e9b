use std::collections::BTreeMap;

use crate::projection::Coord;

/// Sparse mapping from projection coordinates to cell payloads. Iteration is
/// coordinate-ordered, so scans over the grid are deterministic.
pub struct Grid<T> {
    cells: BTreeMap<Coord, T>,
}

impl<T> Grid<T> {
    pub fn new() -> Self {
        Grid {
            cells: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, coord: &Coord) -> Option<&T> {
        self.cells.get(coord)
    }

    pub fn get_mut(&mut self, coord: &Coord) -> Option<&mut T> {
        self.cells.get_mut(coord)
    }

    pub fn insert(&mut self, coord: Coord, data: T) {
        self.cells.insert(coord, data);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coord, &T)> {
        self.cells.iter()
    }

    pub fn content<'a>(&'a self, out: &mut Vec<&'a T>) {
        out.clear();
        out.extend(self.cells.values());
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

impl<T> Default for Grid<T> {
    fn default() -> Self {
        Grid::new()
    }
}
