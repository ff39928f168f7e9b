use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use tracing::{error, info, warn};

use super::Planner;
use crate::goal::{Goal, GoalKind};
use crate::rng::RandGen;
use crate::space::SpaceInformation;
use crate::state::State;

/// Hill-climbing inverse kinematics: coordinate descent over the state
/// components, accepting strictly better valid states.
pub struct HCIK {
    /// Sweeps over all components before giving up.
    pub max_improve_steps: usize,
}

impl Default for HCIK {
    fn default() -> Self {
        HCIK {
            max_improve_steps: 10,
        }
    }
}

impl HCIK {
    /// Try to move `state` closer to the goal. `add` is the perturbation size
    /// as a fraction of each component's extent. Returns true when the state
    /// was improved or already satisfies the goal.
    pub fn try_to_improve(
        &self,
        si: &SpaceInformation,
        goal: &Goal,
        state: &mut State,
        add: f64,
    ) -> bool {
        let dim = si.dimension();
        let (satisfied, mut best_dist) = goal.is_satisfied(si, state);
        if satisfied {
            return true;
        }

        let mut improved_any = false;
        for _ in 0..self.max_improve_steps {
            let mut improved = false;
            for i in 0..dim {
                let comp = si.component(i);
                let delta = add * (comp.max_value - comp.min_value);
                let original = state.values[i];
                let mut best_value = original;
                for candidate in [
                    (original + delta).clamp(comp.min_value, comp.max_value),
                    (original - delta).clamp(comp.min_value, comp.max_value),
                ] {
                    state.values[i] = candidate;
                    let dist = goal.distance_goal(si, state);
                    if dist < best_dist && si.is_valid(state) {
                        best_dist = dist;
                        best_value = candidate;
                        improved = true;
                        improved_any = true;
                    }
                }
                state.values[i] = best_value;
            }
            if best_dist <= goal.threshold {
                return true;
            }
            if !improved {
                break;
            }
        }
        improved_any
    }
}

struct Individual {
    state: State,
    distance: f64,
    valid: bool,
}

/// Genetic inverse kinematics: evolves a population of configurations toward
/// the goal region, keeping the valid low-distance elites and refilling the
/// pool with mutations sampled near them. Deterministic given the seed.
pub struct GAIK {
    /// Elites kept across generations.
    pub pool_size: usize,
    /// Mutated candidates regenerated each generation.
    pub pool_expansion: usize,
    /// Mutation neighborhood as a fraction of each component's extent.
    pub rho: f64,
    /// Generations without improvement before declaring convergence.
    pub max_convergence_generations: usize,
    hcik: HCIK,
    rng: RandGen,
}

impl GAIK {
    pub fn new() -> Self {
        GAIK::with_rng(RandGen::new())
    }

    pub fn seeded(seed: u64) -> Self {
        GAIK::with_rng(RandGen::seeded(seed))
    }

    fn with_rng(rng: RandGen) -> Self {
        GAIK {
            pool_size: 40,
            pool_expansion: 60,
            rho: 0.1,
            max_convergence_generations: 30,
            hcik: HCIK::default(),
            rng,
        }
    }

    fn evaluate(&self, si: &SpaceInformation, goal: &Goal, ind: &mut Individual) {
        ind.valid = si.satisfies_bounds(&ind.state) && si.is_valid(&ind.state);
        ind.distance = goal.distance_goal(si, &ind.state);
    }

    /// Search for a valid state satisfying the goal region, writing it into
    /// `result`. Exits on satisfaction, deadline, or population convergence.
    pub fn solve(
        &mut self,
        si: &SpaceInformation,
        goal: &Goal,
        solve_time: f64,
        result: &mut State,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs_f64(solve_time);
        let dim = si.dimension();
        let pool_total = self.pool_size + self.pool_expansion;

        let mut range = vec![0.0; dim];
        for i in 0..dim {
            let comp = si.component(i);
            range[i] = self.rho * (comp.max_value - comp.min_value);
        }

        let mut pool = Vec::with_capacity(pool_total);
        for _ in 0..pool_total {
            let mut ind = Individual {
                state: State::new(dim),
                distance: f64::INFINITY,
                valid: false,
            };
            si.sample(&mut self.rng, &mut ind.state);
            self.evaluate(si, goal, &mut ind);
            if ind.valid && ind.distance <= goal.threshold {
                result.values.copy_from_slice(&ind.state.values);
                return true;
            }
            pool.push(ind);
        }
        pool.sort_by_key(|ind| (!ind.valid, OrderedFloat(ind.distance)));

        let mut best_distance = f64::INFINITY;
        let mut stale_generations = 0;

        while Instant::now() < deadline {
            for i in self.pool_size..pool_total {
                // Mutate an elite, biased toward the fittest.
                let parent = self.pool_size - 1 - self.rng.half_normal_int(0, self.pool_size - 1);
                let near = pool[parent].state.clone();
                si.sample_near(&mut self.rng, &mut pool[i].state, &near, &range);
                self.evaluate(si, goal, &mut pool[i]);
                if pool[i].valid && pool[i].distance <= goal.threshold {
                    result.values.copy_from_slice(&pool[i].state.values);
                    return true;
                }
            }
            pool.sort_by_key(|ind| (!ind.valid, OrderedFloat(ind.distance)));

            if pool[0].valid && pool[0].distance < best_distance - 1e-12 {
                best_distance = pool[0].distance;
                stale_generations = 0;
            } else {
                stale_generations += 1;
                if stale_generations >= self.max_convergence_generations {
                    break;
                }
            }
        }

        // Last chance: polish the best valid candidates with the hill climb.
        for ind in pool.iter_mut().take(5) {
            if !ind.valid {
                continue;
            }
            let mut state = ind.state.clone();
            self.hcik.try_to_improve(si, goal, &mut state, 0.01);
            let (satisfied, _) = goal.is_satisfied(si, &state);
            if satisfied && si.is_valid(&state) {
                result.values.copy_from_slice(&state.values);
                return true;
            }
        }

        false
    }
}

impl Default for GAIK {
    fn default() -> Self {
        GAIK::new()
    }
}

/// Meta-planner for implicit goal regions: synthesizes a concrete goal state
/// with GAIK, then runs the wrapped tree planner toward it. The synthesized
/// goal is passed to the inner planner as its own goal object, so the shared
/// space is never mutated.
pub struct IKPlanner<P: Planner> {
    pub inner: P,
    pub gaik: GAIK,
}

impl<P: Planner> IKPlanner<P> {
    pub fn new(inner: P, gaik: GAIK) -> Self {
        IKPlanner { inner, gaik }
    }
}

impl<P: Planner> Planner for IKPlanner<P> {
    fn setup(&mut self, si: &SpaceInformation) -> bool {
        self.inner.setup(si)
    }

    fn solve(&mut self, si: &SpaceInformation, goal: &mut Goal, solve_time: f64) -> bool {
        if let GoalKind::State(_) = goal.kind {
            return self.inner.solve(si, goal, solve_time);
        }

        let mut found_start = false;
        for start in si.start_states() {
            if si.satisfies_bounds(start) && si.is_valid(start) {
                found_start = true;
            } else {
                error!("IKPlanner: initial state is invalid");
            }
        }
        if !found_start {
            error!("IKPlanner: motion planning trees could not be initialized");
            return false;
        }

        let deadline = Instant::now() + Duration::from_secs_f64(solve_time);
        let mut goal_state = State::new(si.dimension());
        let mut solved = false;
        let mut step = 0;

        while !solved {
            step += 1;
            let time_left = deadline.saturating_duration_since(Instant::now()).as_secs_f64();
            if time_left <= 0.0 {
                break;
            }
            if !self.gaik.solve(si, goal, time_left * 0.5, &mut goal_state) {
                continue;
            }

            let mut state_goal = Goal::state_goal(goal_state.clone(), goal.threshold);
            self.inner.clear();
            let time_left = deadline.saturating_duration_since(Instant::now()).as_secs_f64();
            info!(
                "IKPlanner: planning to synthesized goal state (step {}, {:.3}s remaining)",
                step, time_left
            );
            solved = self.inner.solve(si, &mut state_goal, time_left);

            if solved {
                let (satisfied, dist) = goal.is_satisfied(si, &goal_state);
                let approximate = !satisfied;
                if approximate {
                    warn!("IKPlanner: found approximate solution");
                }
                if let Some(path) = state_goal.take_solution() {
                    goal.set_solution(path, approximate);
                    goal.set_difference(dist);
                }
            }
        }

        solved
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn states(&self) -> Vec<State> {
        self.inner.states()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::RegionDistance;
    use crate::planner::EST;
    use crate::projection::LinearProjection;
    use crate::state::StateComponent;

    struct Disc {
        center: Vec<f64>,
    }

    impl RegionDistance for Disc {
        fn distance_goal(&self, state: &State) -> f64 {
            let mut sum = 0.0;
            for (i, c) in self.center.iter().enumerate() {
                let d = state.values[i] - c;
                sum += d * d;
            }
            sum.sqrt()
        }
    }

    fn space_2d(validity: Box<dyn crate::space::StateValidityChecker>) -> SpaceInformation {
        let mut si = SpaceInformation::new(
            vec![
                StateComponent::linear(0.0, 10.0, 0.1),
                StateComponent::linear(0.0, 10.0, 0.1),
            ],
            validity,
        );
        si.add_start_state(State::from_values(vec![1.0, 1.0]));
        si
    }

    #[test]
    fn test_hcik_walks_downhill() {
        let si = space_2d(Box::new(|_: &State| true));
        let goal = Goal::region_goal(
            Box::new(Disc {
                center: vec![5.0, 5.0],
            }),
            0.3,
        );
        let hcik = HCIK {
            max_improve_steps: 100,
        };
        let mut state = State::from_values(vec![4.0, 4.0]);
        assert!(hcik.try_to_improve(&si, &goal, &mut state, 0.01));
        let (satisfied, _) = goal.is_satisfied(&si, &state);
        assert!(satisfied);
    }

    #[test]
    fn test_hcik_stops_when_blocked() {
        // Everything closer to the goal than the start is invalid.
        let si = space_2d(Box::new(|s: &State| s.values[0] <= 4.0));
        let goal = Goal::region_goal(
            Box::new(Disc {
                center: vec![9.0, 4.0],
            }),
            0.3,
        );
        let hcik = HCIK::default();
        let mut state = State::from_values(vec![4.0, 4.0]);
        hcik.try_to_improve(&si, &goal, &mut state, 0.01);
        assert!(si.is_valid(&state));
    }

    #[test]
    fn test_gaik_finds_goal_region_state() {
        let si = space_2d(Box::new(|_: &State| true));
        let goal = Goal::region_goal(
            Box::new(Disc {
                center: vec![9.0, 5.0],
            }),
            0.2,
        );
        let mut gaik = GAIK::seeded(42);
        let mut result = State::new(2);
        assert!(gaik.solve(&si, &goal, 2.0, &mut result));
        let (satisfied, _) = goal.is_satisfied(&si, &result);
        assert!(satisfied);
        assert!(si.is_valid(&result));
    }

    #[test]
    fn test_gaik_respects_validity() {
        // Valid goal-region states exist only inside the y band.
        let si = space_2d(Box::new(|s: &State| s.values[1] >= 4.0 && s.values[1] <= 6.0));
        let goal = Goal::region_goal(
            Box::new(Disc {
                center: vec![9.0, 5.0],
            }),
            0.5,
        );
        let mut gaik = GAIK::seeded(7);
        let mut result = State::new(2);
        assert!(gaik.solve(&si, &goal, 2.0, &mut result));
        assert!(si.is_valid(&result));
    }

    #[test]
    fn test_ik_planner_solves_implicit_region() {
        let si = space_2d(Box::new(|_: &State| true));
        let mut goal = Goal::region_goal(
            Box::new(Disc {
                center: vec![9.0, 5.0],
            }),
            0.2,
        );
        let inner = EST::seeded(
            Box::new(LinearProjection::orthogonal(2, &[0, 1], vec![0.5, 0.5])),
            11,
        );
        let mut planner = IKPlanner::new(inner, GAIK::seeded(11));
        assert!(planner.setup(&si));
        assert!(planner.solve(&si, &mut goal, 5.0));
        assert!(goal.is_achieved());
        // The synthesized goal state satisfied the region, so the attached
        // solution is exact and its recorded difference is in threshold.
        assert!(!goal.is_approximate());
        assert!(goal.difference() <= goal.threshold);

        let path = goal.solution().unwrap();
        assert_eq!(path[0].values, vec![1.0, 1.0]);
        // The path ends within the inner planner's threshold of the
        // synthesized state, which itself lies inside the region.
        let last = path.last().unwrap();
        assert!(goal.distance_goal(&si, last) <= 2.0 * goal.threshold);
    }

    #[test]
    fn test_ik_planner_delegates_state_goals() {
        let si = space_2d(Box::new(|_: &State| true));
        let mut goal = Goal::state_goal(State::from_values(vec![9.0, 9.0]), 0.1);
        let inner = EST::seeded(
            Box::new(LinearProjection::orthogonal(2, &[0, 1], vec![0.5, 0.5])),
            3,
        );
        let mut planner = IKPlanner::new(inner, GAIK::seeded(3));
        assert!(planner.solve(&si, &mut goal, 2.0));
        assert!(!goal.is_approximate());
    }
}
