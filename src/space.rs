use std::collections::VecDeque;

use tracing::{debug, error, warn};

use crate::goal::{Goal, GoalKind};
use crate::rng::RandGen;
use crate::state::{shortest_angular_distance, ComponentKind, Path, State, StateComponent};

/// Epsilon for deciding whether a state sits on the boundary of the space.
const STATE_EPSILON: f64 = 1e-12;

/// Attempts per component when rejecting near-samples back into bounds.
const SAMPLE_NEAR_ATTEMPTS: usize = 10;

/// Decides whether a single configuration is collision free. May be expensive;
/// must be deterministic.
pub trait StateValidityChecker {
    fn is_valid(&self, state: &State) -> bool;
}

impl<F> StateValidityChecker for F
where
    F: Fn(&State) -> bool,
{
    fn is_valid(&self, state: &State) -> bool {
        self(state)
    }
}

/// Distance between two configurations; also the default goal distance proxy.
pub trait StateDistanceEvaluator {
    fn distance(&self, s1: &State, s2: &State) -> f64;
}

/// Componentwise L2 distance, wrap-aware for angle components.
pub struct L2DistanceEvaluator {
    components: Vec<StateComponent>,
}

impl L2DistanceEvaluator {
    pub fn new(components: Vec<StateComponent>) -> Self {
        L2DistanceEvaluator { components }
    }
}

impl StateDistanceEvaluator for L2DistanceEvaluator {
    fn distance(&self, s1: &State, s2: &State) -> f64 {
        let mut sum = 0.0;
        for (i, comp) in self.components.iter().enumerate() {
            let d = match comp.kind {
                ComponentKind::WrappingAngle => {
                    shortest_angular_distance(s1.values[i], s2.values[i])
                }
                ComponentKind::Linear => s2.values[i] - s1.values[i],
            };
            sum += d * d;
        }
        sum.sqrt()
    }
}

/// Result of the incremental motion check. When the sweep fails, `last_valid`
/// holds the last interior sample that passed and `last_valid_time` its
/// position along the segment as a fraction in [0, 1).
pub struct IncrementalCheck {
    pub valid: bool,
    pub last_valid: Option<State>,
    pub last_valid_time: f64,
}

/// Everything the planners need to know about the space planning is done in:
/// component metadata, the validity and distance predicates, and the start
/// states. `setup()` should be called once before use.
pub struct SpaceInformation {
    components: Vec<StateComponent>,
    start_states: Vec<State>,
    validity_checker: Box<dyn StateValidityChecker>,
    distance_evaluator: Box<dyn StateDistanceEvaluator>,
}

impl SpaceInformation {
    pub fn new(components: Vec<StateComponent>, validity_checker: Box<dyn StateValidityChecker>) -> Self {
        let distance_evaluator = Box::new(L2DistanceEvaluator::new(components.clone()));
        SpaceInformation {
            components,
            start_states: Vec::new(),
            validity_checker,
            distance_evaluator,
        }
    }

    pub fn set_distance_evaluator(&mut self, evaluator: Box<dyn StateDistanceEvaluator>) {
        self.distance_evaluator = evaluator;
    }

    pub fn dimension(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, index: usize) -> &StateComponent {
        &self.components[index]
    }

    pub fn components(&self) -> &[StateComponent] {
        &self.components
    }

    pub fn add_start_state(&mut self, state: State) {
        self.start_states.push(state);
    }

    pub fn clear_start_states(&mut self) {
        self.start_states.clear();
    }

    pub fn start_states(&self) -> &[State] {
        &self.start_states
    }

    /// Sanity-check the configuration. Returns false (and logs) when the space
    /// cannot be planned in.
    pub fn setup(&self) -> bool {
        if self.components.is_empty() {
            error!("space has zero dimensions");
            return false;
        }
        for (i, comp) in self.components.iter().enumerate() {
            if comp.resolution <= 0.0 {
                error!("component {} has non-positive resolution", i);
                return false;
            }
            if comp.max_value < comp.min_value {
                error!("component {} has inverted bounds", i);
                return false;
            }
        }
        true
    }

    pub fn is_valid(&self, state: &State) -> bool {
        self.validity_checker.is_valid(state)
    }

    pub fn distance(&self, s1: &State, s2: &State) -> f64 {
        self.distance_evaluator.distance(s1, s2)
    }

    pub fn satisfies_bounds(&self, state: &State) -> bool {
        for (i, comp) in self.components.iter().enumerate() {
            if state.values[i] - STATE_EPSILON > comp.max_value
                || state.values[i] + STATE_EPSILON < comp.min_value
            {
                return false;
            }
        }
        true
    }

    pub fn enforce_bounds(&self, state: &mut State) {
        for (i, comp) in self.components.iter().enumerate() {
            if state.values[i] > comp.max_value {
                state.values[i] = comp.max_value;
            } else if state.values[i] < comp.min_value {
                state.values[i] = comp.min_value;
            }
        }
    }

    /// Per-component difference from `s1` to `s2` (shortest angular distance
    /// for wrapping components), the number of subdivisions `nd` needed at the
    /// factor-scaled resolution, and the per-step increment `diff / nd`.
    pub fn find_difference_step(&self, s1: &State, s2: &State, factor: f64) -> (usize, Vec<f64>) {
        let dim = self.dimension();
        let mut diff = vec![0.0; dim];
        for i in 0..dim {
            diff[i] = match self.components[i].kind {
                ComponentKind::WrappingAngle => {
                    shortest_angular_distance(s1.values[i], s2.values[i])
                }
                ComponentKind::Linear => s2.values[i] - s1.values[i],
            };
        }

        let mut nd = 1usize;
        for i in 0..dim {
            let d = 1 + (diff[i].abs() / (factor * self.components[i].resolution)) as usize;
            if nd < d {
                nd = d;
            }
        }

        let step = diff.iter().map(|d| d / nd as f64).collect();
        (nd, step)
    }

    /// Check a straight-line motion by repeated bisection of the interior
    /// sample positions. Assumes `s1` is valid. Catches collisions near the
    /// middle of the segment early, but reports no prefix information.
    pub fn check_motion_subdivision(&self, s1: &State, s2: &State) -> bool {
        if !self.is_valid(s2) {
            return false;
        }

        let dim = self.dimension();
        let (nd, step) = self.find_difference_step(s1, s2, 1.0);

        let mut pos = VecDeque::new();
        if nd >= 2 {
            pos.push_back((1usize, nd - 1));
        }

        let mut test = State::new(dim);
        while let Some((lo, hi)) = pos.pop_front() {
            let mid = (lo + hi) / 2;
            for j in 0..dim {
                test.values[j] = s1.values[j] + mid as f64 * step[j];
            }
            if !self.is_valid(&test) {
                return false;
            }
            if lo < mid {
                pos.push_back((lo, mid - 1));
            }
            if hi > mid {
                pos.push_back((mid + 1, hi));
            }
        }

        true
    }

    /// Sweep the interior samples of a straight-line motion in order,
    /// reporting the last valid sample on failure. Assumes `s1` is valid.
    pub fn check_motion_incremental(&self, s1: &State, s2: &State) -> IncrementalCheck {
        if !self.is_valid(s2) {
            return IncrementalCheck {
                valid: false,
                last_valid: None,
                last_valid_time: 0.0,
            };
        }

        let dim = self.dimension();
        let (nd, step) = self.find_difference_step(s1, s2, 1.0);

        let mut test = State::new(dim);
        for j in 1..nd {
            for k in 0..dim {
                test.values[k] = s1.values[k] + j as f64 * step[k];
            }
            if !self.is_valid(&test) {
                let factor = (j - 1) as f64;
                let mut last_valid = State::new(dim);
                for k in 0..dim {
                    last_valid.values[k] = s1.values[k] + factor * step[k];
                }
                return IncrementalCheck {
                    valid: false,
                    last_valid: Some(last_valid),
                    last_valid_time: factor / nd as f64,
                };
            }
        }

        IncrementalCheck {
            valid: true,
            last_valid: None,
            last_valid_time: 1.0,
        }
    }

    /// Validity of the first state plus a subdivision check on every
    /// consecutive pair.
    pub fn check_path(&self, path: &Path) -> bool {
        if path.is_empty() {
            return true;
        }
        if !self.is_valid(&path[0]) {
            return false;
        }
        for window in path.windows(2) {
            if !self.check_motion_subdivision(&window[0], &window[1]) {
                return false;
            }
        }
        true
    }

    /// Insert factor-refined intermediate states between each consecutive pair.
    pub fn interpolate_path(&self, path: &mut Path, factor: f64) {
        if path.len() < 2 {
            return;
        }
        let dim = self.dimension();
        let mut states = Vec::new();
        for i in 0..path.len() - 1 {
            let (nd, step) = self.find_difference_step(&path[i], &path[i + 1], factor);
            states.push(path[i].clone());
            for j in 1..nd {
                let mut state = State::new(dim);
                for k in 0..dim {
                    state.values[k] = path[i].values[k] + j as f64 * step[k];
                }
                states.push(state);
            }
        }
        states.push(path[path.len() - 1].clone());
        *path = states;
    }

    /// Materialize the full discretized sweep from `s1` to `s2`, endpoints
    /// included.
    pub fn get_motion_states(&self, s1: &State, s2: &State) -> Vec<State> {
        let dim = self.dimension();
        let (nd, step) = self.find_difference_step(s1, s2, 1.0);
        let mut states = Vec::with_capacity(nd + 1);
        states.push(s1.clone());
        for j in 1..nd {
            let mut state = State::new(dim);
            for k in 0..dim {
                state.values[k] = s1.values[k] + j as f64 * step[k];
            }
            states.push(state);
        }
        states.push(s2.clone());
        states
    }

    /// Sample a state uniformly within the bounds.
    pub fn sample(&self, rng: &mut RandGen, state: &mut State) {
        for (i, comp) in self.components.iter().enumerate() {
            state.values[i] = rng.uniform(comp.min_value, comp.max_value);
        }
    }

    /// Sample a state near another: per component, a Gaussian centered at
    /// `near` with half-width `range`, rejected back into bounds and clamped
    /// as a last resort.
    pub fn sample_near(&self, rng: &mut RandGen, state: &mut State, near: &State, range: &[f64]) {
        for (i, comp) in self.components.iter().enumerate() {
            let mut v = rng.gaussian(near.values[i], range[i]);
            for _ in 0..SAMPLE_NEAR_ATTEMPTS {
                if v >= comp.min_value && v <= comp.max_value {
                    break;
                }
                v = rng.gaussian(near.values[i], range[i]);
            }
            state.values[i] = v.clamp(comp.min_value, comp.max_value);
        }
    }

    /// Find a valid state near `near`. Returns `near` itself (bounds-enforced)
    /// if already valid, otherwise samples around it up to `attempts` times.
    pub fn search_valid_nearby(
        &self,
        rng: &mut RandGen,
        near: &State,
        range: &[f64],
        attempts: usize,
    ) -> Option<State> {
        let mut state = near.clone();
        if !self.satisfies_bounds(&state) {
            self.enforce_bounds(&mut state);
        }
        if self.is_valid(&state) {
            return Some(state);
        }

        let center = state.clone();
        for _ in 0..attempts {
            self.sample_near(rng, &mut state, &center, range);
            if self.is_valid(&state) {
                return Some(state);
            }
        }
        None
    }

    /// Start and goal states often barely touch an obstacle. Repair such
    /// states in place by searching nearby within the given per-component
    /// margins. Returns true when every input state is valid afterwards.
    pub fn fix_invalid_input_states(
        &mut self,
        rng: &mut RandGen,
        goal: Option<&mut Goal>,
        rho_start: &[f64],
        rho_goal: &[f64],
        attempts: usize,
    ) -> bool {
        let mut result = true;

        for i in 0..self.start_states.len() {
            let st = self.start_states[i].clone();
            if self.satisfies_bounds(&st) && self.is_valid(&st) {
                continue;
            }
            debug!("attempting to fix start state {}", i);
            match self.search_valid_nearby(rng, &st, rho_start, attempts) {
                Some(fixed) => self.start_states[i] = fixed,
                None => {
                    warn!("unable to fix start state {}", i);
                    result = false;
                }
            }
        }

        if let Some(goal) = goal {
            if let GoalKind::State(gs) = &goal.kind {
                let st = gs.clone();
                if !self.satisfies_bounds(&st) || !self.is_valid(&st) {
                    debug!("attempting to fix goal state");
                    match self.search_valid_nearby(rng, &st, rho_goal, attempts) {
                        Some(fixed) => goal.kind = GoalKind::State(fixed),
                        None => {
                            warn!("unable to fix goal state");
                            result = false;
                        }
                    }
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_space_2d() -> SpaceInformation {
        let components = vec![
            StateComponent::linear(0.0, 10.0, 0.1),
            StateComponent::linear(0.0, 10.0, 0.1),
        ];
        SpaceInformation::new(components, Box::new(|_: &State| true))
    }

    /// Wall at x in [4.9, 5.1] with a gap at y in [4.9, 5.1].
    fn narrow_passage_2d() -> SpaceInformation {
        let components = vec![
            StateComponent::linear(0.0, 10.0, 0.1),
            StateComponent::linear(0.0, 10.0, 0.1),
        ];
        SpaceInformation::new(
            components,
            Box::new(|s: &State| {
                let (x, y) = (s.values[0], s.values[1]);
                !(x >= 4.9 && x <= 5.1 && !(y >= 4.9 && y <= 5.1))
            }),
        )
    }

    #[test]
    fn test_find_difference_step_wrapping_short_way() {
        let si = SpaceInformation::new(
            vec![StateComponent::wrapping_angle(0.05)],
            Box::new(|_: &State| true),
        );
        let s1 = State::from_values(vec![-3.0]);
        let s2 = State::from_values(vec![3.0]);
        let (nd, step) = si.find_difference_step(&s1, &s2, 1.0);
        let total: f64 = step[0] * nd as f64;
        // Short way crosses pi: about -0.283 radians, not +6.0.
        assert!(total < 0.0);
        assert!((total.abs() - 0.2832).abs() < 1e-3);
        assert_eq!(nd, 6);
    }

    #[test]
    fn test_subdivision_rejects_blocked_segment() {
        let si = narrow_passage_2d();
        let s1 = State::from_values(vec![1.0, 2.0]);
        let s2 = State::from_values(vec![9.0, 2.0]);
        assert!(!si.check_motion_subdivision(&s1, &s2));
    }

    #[test]
    fn test_subdivision_accepts_segment_through_gap() {
        let si = narrow_passage_2d();
        let s1 = State::from_values(vec![4.0, 5.0]);
        let s2 = State::from_values(vec![6.0, 5.0]);
        assert!(si.check_motion_subdivision(&s1, &s2));
    }

    #[test]
    fn test_subdivision_soundness_on_accepted_segment() {
        let si = narrow_passage_2d();
        let s1 = State::from_values(vec![4.0, 5.0]);
        let s2 = State::from_values(vec![6.0, 5.0]);
        assert!(si.check_motion_subdivision(&s1, &s2));
        // Every discretized sample along the accepted segment must be valid.
        for state in si.get_motion_states(&s1, &s2) {
            assert!(si.is_valid(&state));
        }
    }

    #[test]
    fn test_incremental_agrees_with_subdivision() {
        let si = narrow_passage_2d();
        let blocked = (
            State::from_values(vec![1.0, 2.0]),
            State::from_values(vec![9.0, 2.0]),
        );
        let clear = (
            State::from_values(vec![1.0, 1.0]),
            State::from_values(vec![4.0, 4.0]),
        );

        assert!(!si.check_motion_subdivision(&blocked.0, &blocked.1));
        let check = si.check_motion_incremental(&blocked.0, &blocked.1);
        assert!(!check.valid);
        assert!(check.last_valid_time >= 0.0 && check.last_valid_time < 1.0);
        let last = check.last_valid.unwrap();
        // The sweep runs left to right, so the prefix ends before the wall.
        assert!(last.values[0] < 4.9);
        assert!(si.is_valid(&last));

        assert!(si.check_motion_subdivision(&clear.0, &clear.1));
        assert!(si.check_motion_incremental(&clear.0, &clear.1).valid);
    }

    #[test]
    fn test_incremental_invalid_target_reports_no_prefix() {
        let si = narrow_passage_2d();
        let s1 = State::from_values(vec![1.0, 2.0]);
        let s2 = State::from_values(vec![5.0, 2.0]);
        let check = si.check_motion_incremental(&s1, &s2);
        assert!(!check.valid);
        assert!(check.last_valid.is_none());
        assert_eq!(check.last_valid_time, 0.0);
    }

    #[test]
    fn test_check_path_and_interpolation() {
        let si = free_space_2d();
        let mut path = vec![
            State::from_values(vec![1.0, 1.0]),
            State::from_values(vec![5.0, 5.0]),
            State::from_values(vec![9.0, 9.0]),
        ];
        assert!(si.check_path(&path));

        si.interpolate_path(&mut path, 1.0);
        assert!(path.len() > 3);
        assert!(si.check_path(&path));
        // Consecutive interpolated states stay within one resolution step.
        for window in path.windows(2) {
            assert!((window[1].values[0] - window[0].values[0]).abs() <= 0.1 + 1e-9);
            assert!((window[1].values[1] - window[0].values[1]).abs() <= 0.1 + 1e-9);
        }
    }

    #[test]
    fn test_sample_near_respects_bounds() {
        let si = free_space_2d();
        let mut rng = RandGen::seeded(5);
        let near = State::from_values(vec![0.1, 9.9]);
        let mut state = State::new(2);
        for _ in 0..500 {
            si.sample_near(&mut rng, &mut state, &near, &[1.0, 1.0]);
            assert!(si.satisfies_bounds(&state));
        }
    }

    #[test]
    fn test_search_valid_nearby_repairs_state() {
        let si = narrow_passage_2d();
        let mut rng = RandGen::seeded(11);
        let inside_wall = State::from_values(vec![5.0, 2.0]);
        let fixed = si
            .search_valid_nearby(&mut rng, &inside_wall, &[0.5, 0.5], 100)
            .unwrap();
        assert!(si.is_valid(&fixed));
    }
}
