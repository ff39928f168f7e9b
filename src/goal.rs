use crate::rng::RandGen;
use crate::space::SpaceInformation;
use crate::state::{Path, State};

/// Distance-to-goal for an implicit goal region.
pub trait RegionDistance {
    fn distance_goal(&self, state: &State) -> f64;
}

/// A goal region that can also produce samples near itself.
pub trait RegionSampler: RegionDistance {
    fn sample_near_goal(&self, rng: &mut RandGen, out: &mut State);
}

/// The recognized goal shapes.
pub enum GoalKind {
    State(State),
    Region(Box<dyn RegionDistance>),
    SamplableRegion(Box<dyn RegionSampler>),
}

/// A goal specification plus the solution found for it, if any. Planners write
/// the solution path and the achieved goal distance back into this object.
pub struct Goal {
    pub kind: GoalKind,
    /// Maximum distance at which a state still satisfies the goal.
    pub threshold: f64,
    solution: Option<Path>,
    approximate: bool,
    difference: f64,
}

impl Goal {
    pub fn state_goal(state: State, threshold: f64) -> Self {
        Goal::new(GoalKind::State(state), threshold)
    }

    pub fn region_goal(region: Box<dyn RegionDistance>, threshold: f64) -> Self {
        Goal::new(GoalKind::Region(region), threshold)
    }

    pub fn samplable_region_goal(region: Box<dyn RegionSampler>, threshold: f64) -> Self {
        Goal::new(GoalKind::SamplableRegion(region), threshold)
    }

    fn new(kind: GoalKind, threshold: f64) -> Self {
        Goal {
            kind,
            threshold,
            solution: None,
            approximate: false,
            difference: -1.0,
        }
    }

    /// Distance from a state to the goal. State goals measure through the
    /// space's distance evaluator.
    pub fn distance_goal(&self, si: &SpaceInformation, state: &State) -> f64 {
        match &self.kind {
            GoalKind::State(goal_state) => si.distance(goal_state, state),
            GoalKind::Region(region) => region.distance_goal(state),
            GoalKind::SamplableRegion(region) => region.distance_goal(state),
        }
    }

    /// Whether the state satisfies the goal, along with its goal distance.
    pub fn is_satisfied(&self, si: &SpaceInformation, state: &State) -> (bool, f64) {
        let dist = self.distance_goal(si, state);
        (dist <= self.threshold, dist)
    }

    /// True when the goal can be sampled toward directly: a concrete state or
    /// a samplable region.
    pub fn has_sampling_interface(&self) -> bool {
        !matches!(self.kind, GoalKind::Region(_))
    }

    /// Produce a state at or near the goal, if the goal supports it.
    pub fn sample_near_goal(&self, rng: &mut RandGen, out: &mut State) -> bool {
        match &self.kind {
            GoalKind::State(goal_state) => {
                out.values.copy_from_slice(&goal_state.values);
                true
            }
            GoalKind::SamplableRegion(region) => {
                region.sample_near_goal(rng, out);
                true
            }
            GoalKind::Region(_) => false,
        }
    }

    pub fn set_solution(&mut self, path: Path, approximate: bool) {
        self.solution = Some(path);
        self.approximate = approximate;
    }

    pub fn set_difference(&mut self, difference: f64) {
        self.difference = difference;
    }

    pub fn solution(&self) -> Option<&Path> {
        self.solution.as_ref()
    }

    pub fn take_solution(&mut self) -> Option<Path> {
        self.solution.take()
    }

    pub fn is_achieved(&self) -> bool {
        self.solution.is_some()
    }

    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    pub fn difference(&self) -> f64 {
        self.difference
    }

    pub fn clear_solution(&mut self) {
        self.solution = None;
        self.approximate = false;
        self.difference = -1.0;
    }
}

/// A disc-shaped goal region around a center state, measured with plain
/// Euclidean distance. Samples are drawn uniformly inside the disc's bounding
/// box, which is enough bias for the planners' goal sampling.
pub struct DiscRegion {
    pub center: Vec<f64>,
    pub radius: f64,
}

impl RegionDistance for DiscRegion {
    fn distance_goal(&self, state: &State) -> f64 {
        let mut sum = 0.0;
        for (i, c) in self.center.iter().enumerate() {
            let d = state.values[i] - c;
            sum += d * d;
        }
        sum.sqrt()
    }
}

impl RegionSampler for DiscRegion {
    fn sample_near_goal(&self, rng: &mut RandGen, out: &mut State) {
        for (i, c) in self.center.iter().enumerate() {
            out.values[i] = rng.uniform(c - self.radius, c + self.radius);
        }
    }
}
