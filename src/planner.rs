mod est;
mod ik;
mod kpiece;
mod tree;

pub use est::EST;
pub use ik::{IKPlanner, GAIK, HCIK};
pub use kpiece::KPIECE1;

use crate::goal::Goal;
use crate::space::SpaceInformation;
use crate::state::State;

/// A motion planner. `solve` runs on the calling thread until it finds a
/// solution or the time budget runs out; the solution path is written into the
/// goal object. The exploration tree survives across calls until `clear`.
pub trait Planner {
    /// Validate the space and clamp planner knobs. Returns false when the
    /// problem cannot be planned on.
    fn setup(&mut self, si: &SpaceInformation) -> bool;

    /// Try to solve the problem within `solve_time` seconds. Returns whether
    /// the goal holds a solution afterwards (possibly an approximate one).
    fn solve(&mut self, si: &SpaceInformation, goal: &mut Goal, solve_time: f64) -> bool;

    /// Drop all internal exploration data.
    fn clear(&mut self);

    /// States in the current exploration tree, as independent copies.
    fn states(&self) -> Vec<State>;
}

/// A problem is trivial when some valid start state already satisfies the
/// goal: no motion planning is needed. Returns the start index and its goal
/// distance.
pub fn is_trivial(si: &SpaceInformation, goal: &Goal) -> Option<(usize, f64)> {
    for (i, start) in si.start_states().iter().enumerate() {
        if si.satisfies_bounds(start) && si.is_valid(start) {
            let (satisfied, dist) = goal.is_satisfied(si, start);
            if satisfied {
                return Some((i, dist));
            }
        }
    }
    None
}
