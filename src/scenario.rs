use std::fs::File;
use std::io::BufReader;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::goal::{DiscRegion, Goal};
use crate::planner::{is_trivial, IKPlanner, Planner, EST, GAIK, KPIECE1};
use crate::projection::LinearProjection;
use crate::space::{SpaceInformation, StateValidityChecker};
use crate::state::{ComponentKind, Path, State, StateComponent};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PlannerChoice {
    Est,
    Kpiece1,
    IkEst,
    IkKpiece1,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoundSpec {
    pub min: f64,
    pub max: f64,
    pub resolution: f64,
    #[serde(default = "linear_kind")]
    pub kind: ComponentKind,
}

fn linear_kind() -> ComponentKind {
    ComponentKind::Linear
}

/// Axis-aligned box obstacle; states inside any box are invalid.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BoxObstacle {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl BoxObstacle {
    fn contains(&self, state: &State) -> bool {
        self.min
            .iter()
            .zip(self.max.iter())
            .zip(state.values.iter())
            .all(|((lo, hi), v)| v >= lo && v <= hi)
    }
}

/// Goal as written in the scenario file: either a concrete state or a disc
/// region around a center.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GoalSpec {
    #[serde(default)]
    pub state: Option<Vec<f64>>,
    #[serde(default)]
    pub center: Option<Vec<f64>>,
    #[serde(default)]
    pub radius: f64,
    pub threshold: f64,
}

/// A declarative planning problem: a box-bounded space with box obstacles,
/// start states, a goal, and the planner to run on it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Scenario {
    pub planner: PlannerChoice,
    pub bounds: Vec<BoundSpec>,
    pub starts: Vec<Vec<f64>>,
    pub goal: GoalSpec,
    #[serde(default)]
    pub obstacles: Vec<BoxObstacle>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_time_budget")]
    pub time_budget: f64,
    #[serde(default = "default_projection_cell_size")]
    pub projection_cell_size: f64,
    #[serde(default)]
    pub rho: Option<f64>,
    #[serde(default)]
    pub goal_bias: Option<f64>,
    #[serde(default)]
    pub select_border_percentage: Option<f64>,
    #[serde(default)]
    pub min_valid_path_percentage: Option<f64>,
    #[serde(default)]
    pub interpolate: bool,
}

fn default_seed() -> u64 {
    1
}

fn default_time_budget() -> f64 {
    5.0
}

fn default_projection_cell_size() -> f64 {
    0.5
}

impl Scenario {
    pub fn from_yaml(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path))?;
        let scenario: Scenario = serde_yaml::from_reader(BufReader::new(file))?;
        scenario.validate()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(text)?;
        scenario.validate()
    }

    pub fn validate(self) -> Result<Self> {
        let dim = self.bounds.len();
        if dim == 0 {
            bail!("scenario has no bounds");
        }
        if self.starts.is_empty() {
            bail!("scenario has no start states");
        }
        for start in &self.starts {
            if start.len() != dim {
                bail!("start state dimension does not match bounds");
            }
        }
        match (&self.goal.state, &self.goal.center) {
            (Some(s), None) if s.len() == dim => {}
            (None, Some(c)) if c.len() == dim => {
                if self.goal.radius <= 0.0 {
                    bail!("goal region needs a positive radius");
                }
            }
            (Some(_), Some(_)) => bail!("goal must be either a state or a region, not both"),
            (None, None) => bail!("goal needs a state or a region center"),
            _ => bail!("goal dimension does not match bounds"),
        }
        for obstacle in &self.obstacles {
            if obstacle.min.len() != dim || obstacle.max.len() != dim {
                bail!("obstacle dimension does not match bounds");
            }
        }
        if self.time_budget <= 0.0 {
            bail!("time budget must be positive");
        }
        Ok(self)
    }

    pub fn build_space(&self) -> SpaceInformation {
        let components = self
            .bounds
            .iter()
            .map(|b| StateComponent {
                kind: b.kind,
                min_value: b.min,
                max_value: b.max,
                resolution: b.resolution,
            })
            .collect();

        let obstacles = self.obstacles.clone();
        let validity: Box<dyn StateValidityChecker> =
            Box::new(move |s: &State| !obstacles.iter().any(|o| o.contains(s)));

        let mut si = SpaceInformation::new(components, validity);
        for start in &self.starts {
            si.add_start_state(State::from_values(start.clone()));
        }
        si
    }

    pub fn build_goal(&self) -> Goal {
        match (&self.goal.state, &self.goal.center) {
            (Some(state), _) => {
                Goal::state_goal(State::from_values(state.clone()), self.goal.threshold)
            }
            (_, Some(center)) => Goal::samplable_region_goal(
                Box::new(DiscRegion {
                    center: center.clone(),
                    radius: self.goal.radius,
                }),
                self.goal.threshold,
            ),
            _ => unreachable!("validated scenario always has a goal"),
        }
    }

    fn build_planner(&self) -> Box<dyn Planner> {
        let dim = self.bounds.len();
        let components: Vec<usize> = (0..dim).collect();
        let projection = || {
            Box::new(LinearProjection::orthogonal(
                dim,
                &components,
                vec![self.projection_cell_size; dim],
            ))
        };

        match self.planner {
            PlannerChoice::Est | PlannerChoice::IkEst => {
                let mut est = EST::seeded(projection(), self.seed);
                if let Some(rho) = self.rho {
                    est.rho = rho;
                }
                if let Some(bias) = self.goal_bias {
                    est.goal_bias = bias;
                }
                if self.planner == PlannerChoice::IkEst {
                    Box::new(IKPlanner::new(est, GAIK::seeded(self.seed)))
                } else {
                    Box::new(est)
                }
            }
            PlannerChoice::Kpiece1 | PlannerChoice::IkKpiece1 => {
                let mut kpiece = KPIECE1::seeded(projection(), self.seed);
                if let Some(rho) = self.rho {
                    kpiece.rho = rho;
                }
                if let Some(bias) = self.goal_bias {
                    kpiece.goal_bias = bias;
                }
                if let Some(border) = self.select_border_percentage {
                    kpiece.select_border_percentage = border;
                }
                if let Some(fraction) = self.min_valid_path_percentage {
                    kpiece.min_valid_path_percentage = fraction;
                }
                if self.planner == PlannerChoice::IkKpiece1 {
                    Box::new(IKPlanner::new(kpiece, GAIK::seeded(self.seed)))
                } else {
                    Box::new(kpiece)
                }
            }
        }
    }

    /// Build the problem, run the selected planner, and return the solution
    /// path if one was found.
    pub fn run(&self) -> Result<Option<Path>> {
        let si = self.build_space();
        let mut goal = self.build_goal();

        if let Some((index, dist)) = is_trivial(&si, &goal) {
            info!(
                "start state {} already satisfies the goal (distance {:.4})",
                index, dist
            );
            return Ok(Some(vec![si.start_states()[index].clone()]));
        }

        let mut planner = self.build_planner();
        if !planner.setup(&si) {
            bail!("planner setup failed");
        }

        let solved = planner.solve(&si, &mut goal, self.time_budget);
        if !solved {
            warn!("no solution found within {:.2}s", self.time_budget);
            return Ok(None);
        }

        if goal.is_approximate() {
            warn!(
                "approximate solution, {:.4} away from the goal",
                goal.difference()
            );
        }
        let mut path = goal.take_solution().unwrap_or_default();
        if self.interpolate {
            si.interpolate_path(&mut path, 1.0);
        }
        info!("solution path has {} states", path.len());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NARROW_PASSAGE: &str = r#"
planner: kpiece1
seed: 42
time_budget: 5.0
projection_cell_size: 0.5
rho: 0.05
goal_bias: 0.05
select_border_percentage: 0.9
interpolate: true
bounds:
  - { min: 0.0, max: 10.0, resolution: 0.1 }
  - { min: 0.0, max: 10.0, resolution: 0.1 }
starts:
  - [1.0, 5.0]
goal:
  center: [9.0, 5.0]
  radius: 0.2
  threshold: 0.2
obstacles:
  - { min: [4.9, 0.0], max: [5.1, 4.9] }
  - { min: [4.9, 5.1], max: [5.1, 10.0] }
"#;

    #[test]
    fn test_parse_and_run_narrow_passage() {
        let scenario = Scenario::from_yaml_str(NARROW_PASSAGE).unwrap();
        assert_eq!(scenario.planner, PlannerChoice::Kpiece1);
        assert_eq!(scenario.seed, 42);

        let si = scenario.build_space();
        assert!(!si.is_valid(&State::from_values(vec![5.0, 2.0])));
        assert!(si.is_valid(&State::from_values(vec![5.0, 5.0])));

        let path = scenario.run().unwrap().expect("should find a path");
        assert!(si.check_path(&path));
        assert_eq!(path[0].values, vec![1.0, 5.0]);
    }

    #[test]
    fn test_trivial_problem_short_circuits() {
        let text = r#"
planner: est
bounds:
  - { min: 0.0, max: 10.0, resolution: 0.1 }
starts:
  - [9.0]
goal:
  state: [9.05]
  threshold: 0.1
"#;
        let scenario = Scenario::from_yaml_str(text).unwrap();
        let path = scenario.run().unwrap().unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].values, vec![9.0]);
    }

    #[test]
    fn test_validation_rejects_bad_goal() {
        let text = r#"
planner: est
bounds:
  - { min: 0.0, max: 10.0, resolution: 0.1 }
starts:
  - [1.0]
goal:
  threshold: 0.1
"#;
        assert!(Scenario::from_yaml_str(text).is_err());
    }

    #[test]
    fn test_validation_rejects_dimension_mismatch() {
        let text = r#"
planner: kpiece1
bounds:
  - { min: 0.0, max: 10.0, resolution: 0.1 }
  - { min: 0.0, max: 10.0, resolution: 0.1 }
starts:
  - [1.0]
goal:
  state: [9.0, 9.0]
  threshold: 0.1
"#;
        assert!(Scenario::from_yaml_str(text).is_err());
    }
}
