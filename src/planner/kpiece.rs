use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::ik::HCIK;
use super::tree::MotionArena;
use super::Planner;
use crate::goal::Goal;
use crate::grid_b::{CellData, GridB};
use crate::projection::{Coord, ProjectionEvaluator};
use crate::rng::RandGen;
use crate::space::SpaceInformation;
use crate::state::State;
use crate::stat::Stats;

/// Kinematic planning by interior-exterior cell exploration. The projection
/// grid partitions its cells into an interior and a boundary class; expansion
/// prefers important boundary cells, and a cell's score is rewarded or
/// penalized depending on whether expanding from it worked out.
pub struct KPIECE1 {
    /// Neighborhood size for sampling near an existing motion, as a fraction
    /// of each component's extent.
    pub rho: f64,
    /// Probability of sampling toward the goal instead of the neighborhood.
    pub goal_bias: f64,
    /// A failed motion whose valid prefix covers more than this fraction of
    /// the segment is kept anyway, truncated to the prefix.
    pub min_valid_path_percentage: f64,
    /// Lower bound on the probability of expanding from a boundary cell.
    pub select_border_percentage: f64,
    /// Score multiplier for a cell whose expansion succeeded. Above one, so
    /// productive cells gain importance.
    pub good_score_factor: f64,
    /// Score multiplier for a cell whose expansion was rejected. Below one.
    pub bad_score_factor: f64,
    projection: Box<dyn ProjectionEvaluator>,
    hcik: HCIK,
    rng: RandGen,
    arena: MotionArena,
    grid: GridB,
    iteration: usize,
    stats: Stats,
}

impl KPIECE1 {
    pub fn new(projection: Box<dyn ProjectionEvaluator>) -> Self {
        KPIECE1::with_rng(projection, RandGen::new())
    }

    pub fn seeded(projection: Box<dyn ProjectionEvaluator>, seed: u64) -> Self {
        KPIECE1::with_rng(projection, RandGen::seeded(seed))
    }

    fn with_rng(projection: Box<dyn ProjectionEvaluator>, rng: RandGen) -> Self {
        KPIECE1 {
            rho: 0.5,
            goal_bias: 0.05,
            min_valid_path_percentage: 0.2,
            select_border_percentage: 0.9,
            good_score_factor: 1.1,
            bad_score_factor: 0.45,
            projection,
            hcik: HCIK::default(),
            rng,
            arena: MotionArena::new(),
            grid: GridB::new(),
            iteration: 1,
            stats: Stats::default(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn add_motion(&mut self, state: State, parent: Option<usize>, dist: f64) -> usize {
        let id = self.arena.insert(state, parent);
        let mut coord = Coord::new();
        self.projection.project(self.arena.state(id), &mut coord);
        match self.grid.get_id(&coord) {
            Some(cell) => {
                let data = self.grid.cell_mut(cell);
                data.motions.push(id);
                data.coverage += 1.0;
                self.grid.update(cell, self.iteration);
            }
            None => {
                self.grid.create_cell(
                    coord,
                    CellData {
                        motions: vec![id],
                        coverage: 1.0,
                        selections: 1,
                        score: 1.0 / (1e-3 + dist),
                        iteration: self.iteration,
                    },
                    self.iteration,
                );
            }
        }
        id
    }

    /// Pick a cell from the boundary ordering with probability
    /// max(select_border_percentage, fraction of boundary cells), otherwise
    /// from the interior ordering; then a half-normal motion index inside it,
    /// biased toward recently added motions.
    fn select_motion(&mut self) -> Option<(usize, usize)> {
        let border = self
            .select_border_percentage
            .max(self.grid.frac_external());
        let cell = if self.rng.uniform01() < border {
            self.grid.top_external().or_else(|| self.grid.top_internal())
        } else {
            self.grid.top_internal().or_else(|| self.grid.top_external())
        }?;

        let data = self.grid.cell_mut(cell);
        if data.motions.is_empty() {
            return None;
        }
        data.selections += 1;
        let index = self.rng.half_normal_int(0, data.motions.len() - 1);
        Some((data.motions[index], cell))
    }
}

impl Planner for KPIECE1 {
    fn setup(&mut self, si: &SpaceInformation) -> bool {
        if !si.setup() {
            return false;
        }
        if self.rho <= 0.0 {
            warn!("KPIECE1: rho must be positive, resetting to 0.5");
            self.rho = 0.5;
        }
        if !(0.0..=1.0).contains(&self.goal_bias) {
            warn!("KPIECE1: goal bias must be in [0, 1], clamping");
            self.goal_bias = self.goal_bias.clamp(0.0, 1.0);
        }
        if !(0.0..=1.0).contains(&self.min_valid_path_percentage) {
            warn!("KPIECE1: minimum valid path fraction must be in [0, 1], clamping");
            self.min_valid_path_percentage = self.min_valid_path_percentage.clamp(0.0, 1.0);
        }
        if !(0.0..=1.0).contains(&self.select_border_percentage) {
            warn!("KPIECE1: border selection fraction must be in [0, 1], clamping");
            self.select_border_percentage = self.select_border_percentage.clamp(0.0, 1.0);
        }
        if self.good_score_factor <= 1.0 {
            warn!("KPIECE1: good score factor must exceed 1, resetting to 1.1");
            self.good_score_factor = 1.1;
        }
        if self.bad_score_factor <= 0.0 || self.bad_score_factor >= 1.0 {
            warn!("KPIECE1: bad score factor must be in (0, 1), resetting to 0.45");
            self.bad_score_factor = 0.45;
        }
        true
    }

    fn solve(&mut self, si: &SpaceInformation, goal: &mut Goal, solve_time: f64) -> bool {
        let start_time = Instant::now();
        let deadline = start_time + Duration::from_secs_f64(solve_time);
        let dim = si.dimension();

        if self.grid.is_empty() {
            for start in si.start_states() {
                if si.satisfies_bounds(start) && si.is_valid(start) {
                    self.add_motion(start.clone(), None, 1.0);
                } else {
                    error!("KPIECE1: initial state is invalid");
                }
            }
        }

        if self.grid.is_empty() {
            error!("KPIECE1: there are no valid initial states");
            return false;
        }

        let mut range = vec![0.0; dim];
        for i in 0..dim {
            let comp = si.component(i);
            range[i] = self.rho * (comp.max_value - comp.min_value);
        }

        let mut solution: Option<usize> = None;
        let mut approxsol: Option<usize> = None;
        let mut approxdif = f64::INFINITY;
        let mut xstate = State::new(dim);
        let mut improve_value = 0.01;

        while Instant::now() < deadline {
            self.iteration += 1;
            self.stats.iterations += 1;

            let (existing, ecell) = match self.select_motion() {
                Some(sel) => sel,
                None => {
                    debug_assert!(false, "selection failed on a non-empty tree");
                    break;
                }
            };

            if self.rng.uniform01() < self.goal_bias {
                if goal.has_sampling_interface() {
                    goal.sample_near_goal(&mut self.rng, &mut xstate);
                } else if let Some(approx) = approxsol {
                    // Plain region goal: try to push the best approximate
                    // state closer with a hill climb.
                    xstate.values.copy_from_slice(&self.arena.state(approx).values);
                    debug!("KPIECE1: running HCIK with improve value {}", improve_value);
                    if !self.hcik.try_to_improve(si, goal, &mut xstate, improve_value) {
                        si.sample_near(
                            &mut self.rng,
                            &mut xstate,
                            self.arena.state(existing),
                            &range,
                        );
                        improve_value /= 2.0;
                    }
                } else {
                    si.sample_near(&mut self.rng, &mut xstate, self.arena.state(existing), &range);
                }
            } else {
                si.sample_near(&mut self.rng, &mut xstate, self.arena.state(existing), &range);
            }

            let check = si.check_motion_incremental(self.arena.state(existing), &xstate);
            let mut keep = check.valid;
            if !keep && check.last_valid_time > self.min_valid_path_percentage {
                // Keep the validated prefix: its endpoint becomes the motion.
                if let Some(last_valid) = check.last_valid {
                    xstate = last_valid;
                    keep = true;
                }
            }

            if keep {
                let (solved, dist) = goal.is_satisfied(si, &xstate);
                let motion = self.add_motion(xstate.clone(), Some(existing), dist);
                if solved {
                    approxdif = dist;
                    solution = Some(motion);
                    break;
                }
                if dist < approxdif {
                    approxdif = dist;
                    approxsol = Some(motion);
                }
                self.grid.cell_mut(ecell).score *= self.good_score_factor;
            } else {
                self.grid.cell_mut(ecell).score *= self.bad_score_factor;
            }
            self.grid.update(ecell, self.iteration);
        }

        let mut approximate = false;
        if solution.is_none() {
            solution = approxsol;
            approximate = true;
        }

        if let Some(motion) = solution {
            goal.set_difference(approxdif);
            goal.set_solution(self.arena.path_from_root(motion), approximate);
            if approximate {
                warn!("KPIECE1: found approximate solution");
            }
        }

        self.stats.states_created = self.arena.len();
        self.stats.cells_created = self.grid.len();
        self.stats.time_us = start_time.elapsed().as_micros();
        self.stats.print("KPIECE1");
        info!(
            "KPIECE1: {} cells ({} internal + {} external)",
            self.grid.len(),
            self.grid.count_internal(),
            self.grid.count_external()
        );

        goal.is_achieved()
    }

    fn clear(&mut self) {
        self.arena.clear();
        self.grid.clear();
        self.iteration = 1;
        self.stats = Stats::default();
    }

    fn states(&self) -> Vec<State> {
        let mut cells = Vec::new();
        self.grid.content(&mut cells);
        let mut states = Vec::with_capacity(self.arena.len());
        for cell in cells {
            for &id in &cell.motions {
                states.push(self.arena.state(id).clone());
            }
        }
        states
    }
}
