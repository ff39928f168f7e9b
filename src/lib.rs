pub mod config;
pub mod goal;
pub mod grid;
pub mod grid_b;
pub mod planner;
pub mod projection;
pub mod rng;
pub mod scenario;
pub mod space;
pub mod stat;
pub mod state;

pub use goal::{Goal, GoalKind, RegionDistance, RegionSampler};
pub use planner::{is_trivial, IKPlanner, Planner, EST, GAIK, HCIK, KPIECE1};
pub use projection::{Coord, LinearProjection, ProjectionEvaluator};
pub use rng::RandGen;
pub use space::{SpaceInformation, StateDistanceEvaluator, StateValidityChecker};
pub use state::{ComponentKind, Path, State, StateComponent};
