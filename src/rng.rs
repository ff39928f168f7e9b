use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Random source shared by the planners. Every draw goes through one seedable
/// generator so a planner run is reproducible from its seed alone.
pub struct RandGen {
    rng: StdRng,
}

impl RandGen {
    pub fn new() -> Self {
        RandGen {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        RandGen {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn uniform01(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn uniform(&mut self, lower_bound: f64, upper_bound: f64) -> f64 {
        (upper_bound - lower_bound) * self.uniform01() + lower_bound
    }

    /// Uniform integer in [lower_bound, upper_bound], both inclusive.
    pub fn uniform_int(&mut self, lower_bound: usize, upper_bound: usize) -> usize {
        let v = self.uniform(lower_bound as f64, (upper_bound + 1) as f64) as usize;
        v.min(upper_bound)
    }

    pub fn uniform_bool(&mut self) -> bool {
        self.uniform01() <= 0.5
    }

    pub fn gaussian(&mut self, mean: f64, stddev: f64) -> f64 {
        let n: f64 = self.rng.sample(StandardNormal);
        mean + n * stddev
    }

    pub fn bounded_gaussian(&mut self, mean: f64, stddev: f64, max_stddev: f64) -> f64 {
        let max_s = max_stddev * stddev;
        loop {
            let sample = self.gaussian(mean, stddev);
            if (sample - mean).abs() <= max_s {
                return sample;
            }
        }
    }

    /// Half-normal draw over [r_min, r_max], biased toward r_max. Larger focus
    /// concentrates the mass closer to r_max.
    pub fn half_normal(&mut self, r_min: f64, r_max: f64, focus: f64) -> f64 {
        let mean = r_max - r_min;
        let mut v = self.gaussian(mean, mean / focus);
        if v > mean {
            v = 2.0 * mean - v;
        }
        let r = if v >= 0.0 { v + r_min } else { r_min };
        r.min(r_max)
    }

    pub fn half_normal_int(&mut self, r_min: usize, r_max: usize) -> usize {
        let r = self.half_normal(r_min as f64, r_max as f64 + (1.0 - 1e-9), 3.0) as usize;
        r.min(r_max)
    }
}

impl Default for RandGen {
    fn default() -> Self {
        RandGen::new()
    }
}
