use std::collections::{BTreeMap, BTreeSet};

use ordered_float::OrderedFloat;

use crate::projection::Coord;

/// Per-cell bookkeeping for score-driven exploration.
pub struct CellData {
    /// Motion ids (into the planner's arena) contained in this cell.
    pub motions: Vec<usize>,
    pub coverage: f64,
    pub selections: usize,
    pub score: f64,
    /// Tree iteration at which the cell was created.
    pub iteration: usize,
}

struct CellB {
    data: CellData,
    /// Occupied von-Neumann neighbor coordinates.
    neighbors: usize,
    external: bool,
    /// Importance key the cell is currently seated under.
    importance: f64,
}

type OrderKey = (OrderedFloat<f64>, usize);

/// A grid whose cells are kept in two importance orderings, one over internal
/// cells (full von-Neumann neighborhood occupied) and one over external cells.
/// Cells are add-only; the planners never remove them during a solve.
pub struct GridB {
    cells: Vec<CellB>,
    lookup: BTreeMap<Coord, usize>,
    internal: BTreeSet<OrderKey>,
    external: BTreeSet<OrderKey>,
}

impl GridB {
    pub fn new() -> Self {
        GridB {
            cells: Vec::new(),
            lookup: BTreeMap::new(),
            internal: BTreeSet::new(),
            external: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn count_internal(&self) -> usize {
        self.internal.len()
    }

    pub fn count_external(&self) -> usize {
        self.external.len()
    }

    pub fn frac_external(&self) -> f64 {
        if self.cells.is_empty() {
            0.0
        } else {
            self.external.len() as f64 / self.cells.len() as f64
        }
    }

    pub fn get_id(&self, coord: &Coord) -> Option<usize> {
        self.lookup.get(coord).copied()
    }

    pub fn cell(&self, id: usize) -> &CellData {
        &self.cells[id].data
    }

    pub fn cell_mut(&mut self, id: usize) -> &mut CellData {
        &mut self.cells[id].data
    }

    pub fn is_external(&self, id: usize) -> bool {
        self.cells[id].external
    }

    /// Insert a new cell. Neighbor counts are recomputed for the cell and its
    /// von-Neumann neighbors; a neighbor whose neighborhood fills up moves to
    /// the internal ordering. Returns the new cell's id.
    pub fn create_cell(&mut self, coord: Coord, data: CellData, tree_iteration: usize) -> usize {
        let id = self.cells.len();
        let dim = coord.len();
        let full = 2 * dim;

        let mut occupied = 0;
        let mut neighbor = coord.clone();
        for i in 0..dim {
            for delta in [-1i64, 1] {
                neighbor[i] = coord[i] + delta;
                if let Some(&nid) = self.lookup.get(&neighbor) {
                    occupied += 1;
                    self.cells[nid].neighbors += 1;
                    if self.cells[nid].external && self.cells[nid].neighbors >= full {
                        let key = (OrderedFloat(self.cells[nid].importance), nid);
                        self.external.remove(&key);
                        self.internal.insert(key);
                        self.cells[nid].external = false;
                    }
                }
            }
            neighbor[i] = coord[i];
        }

        let external = occupied < full;
        let importance = importance(&data, tree_iteration);
        let key = (OrderedFloat(importance), id);
        if external {
            self.external.insert(key);
        } else {
            self.internal.insert(key);
        }
        self.cells.push(CellB {
            data,
            neighbors: occupied,
            external,
            importance,
        });
        self.lookup.insert(coord, id);
        id
    }

    /// Recompute a cell's importance after its data changed and re-seat it in
    /// its ordering.
    pub fn update(&mut self, id: usize, tree_iteration: usize) {
        let cell = &self.cells[id];
        let old_key = (OrderedFloat(cell.importance), id);
        let new_importance = importance(&cell.data, tree_iteration);
        let new_key = (OrderedFloat(new_importance), id);
        let set = if cell.external {
            &mut self.external
        } else {
            &mut self.internal
        };
        set.remove(&old_key);
        set.insert(new_key);
        self.cells[id].importance = new_importance;
    }

    /// Most important external cell, if any.
    pub fn top_external(&self) -> Option<usize> {
        self.external.iter().next_back().map(|&(_, id)| id)
    }

    /// Most important internal cell, if any.
    pub fn top_internal(&self) -> Option<usize> {
        self.internal.iter().next_back().map(|&(_, id)| id)
    }

    /// Collect cell payloads in coordinate order.
    pub fn content<'a>(&'a self, out: &mut Vec<&'a CellData>) {
        out.clear();
        out.extend(self.lookup.values().map(|&id| &self.cells[id].data));
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.lookup.clear();
        self.internal.clear();
        self.external.clear();
    }
}

impl Default for GridB {
    fn default() -> Self {
        GridB::new()
    }
}

fn importance(data: &CellData, tree_iteration: usize) -> f64 {
    let age = 1 + tree_iteration.saturating_sub(data.iteration);
    data.score * data.coverage / (data.selections as f64 * age as f64)
}
