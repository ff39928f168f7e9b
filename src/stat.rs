use tracing::info;

/// Counters for one solve call.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub iterations: usize,
    pub states_created: usize,
    pub cells_created: usize,
    pub time_us: u128,
}

impl Stats {
    pub fn print(&self, planner: &str) {
        info!(
            "{}: {} iterations, {} states in {} cells, {} microseconds",
            planner, self.iterations, self.states_created, self.cells_created, self.time_us
        );
    }
}
