//! Optimizer contract consumed by the pipeline, plus a seeded reference optimizer.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Previously found solution an optimizer may resume from.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WarmStart {
    /// Best parameter vector found so far.
    pub params: Vec<f64>,
    /// Cost of `params`.
    pub cost: f64,
}

/// Black-box minimizer over a bounded box.
pub trait Optimizer {
    /// Minimize `objective` inside `[lower, upper]` and return the best point with its cost.
    ///
    /// `lower` and `upper` have the same length, which is the dimension of the search space.
    fn run(
        &mut self,
        objective: &mut dyn FnMut(&[f64]) -> f64,
        lower: &[f64],
        upper: &[f64],
    ) -> (Vec<f64>, f64);

    /// Offer a seed for the next [`Optimizer::run`]. Returns `false` when the optimizer ignores
    /// warm starts.
    fn warm_start(&mut self, _seed: &WarmStart) -> bool {
        false
    }
}

/// Options for [`RandomSearch`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RandomSearchOpts {
    /// Number of generations.
    pub iterations: usize,
    /// Candidates evaluated per generation.
    pub population: usize,
    /// RNG seed.
    pub seed: u64,
    /// Initial mutation step as a fraction of each slot's range.
    pub initial_step: f64,
    /// Final mutation step as a fraction of each slot's range.
    pub final_step: f64,
}

impl Default for RandomSearchOpts {
    fn default() -> Self {
        Self {
            iterations: 100,
            population: 16,
            seed: 1,
            initial_step: 0.25,
            final_step: 0.01,
        }
    }
}

impl RandomSearchOpts {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Population-based local search with a linearly shrinking mutation step.
///
/// Every generation mutates the incumbent `population` times and keeps the best improvement.
/// Runs are fully determined by the seed. A warm start becomes the incumbent of the next run
/// when its length matches the search space.
#[derive(Debug)]
pub struct RandomSearch {
    opts: RandomSearchOpts,
    rng: Pcg32,
    seed: Option<WarmStart>,
    evaluations: u64,
}

impl RandomSearch {
    pub fn new(opts: RandomSearchOpts) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(opts.seed),
            opts,
            seed: None,
            evaluations: 0,
        }
    }

    pub fn opts(&self) -> &RandomSearchOpts {
        &self.opts
    }

    /// Objective evaluations performed across all runs.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.rng.random::<f64>()
    }

    fn step_at(&self, generation: usize) -> f64 {
        let n = self.opts.iterations.max(1) as f64;
        let t = generation as f64 / n;
        self.opts.initial_step + (self.opts.final_step - self.opts.initial_step) * t
    }

    fn mutate(&mut self, base: &[f64], out: &mut [f64], lower: &[f64], upper: &[f64], step: f64) {
        let dim = base.len();
        out.copy_from_slice(base);
        let rate = (2.0 / dim as f64).min(1.0);
        let forced = self.rng.random_range(0..dim);
        for i in 0..dim {
            if i != forced && !self.rng.random_bool(rate) {
                continue;
            }
            let span = (upper[i] - lower[i]) * step;
            let v = out[i] + self.uniform(-span, span);
            out[i] = v.clamp(lower[i], upper[i]);
        }
    }
}

impl Optimizer for RandomSearch {
    fn run(
        &mut self,
        objective: &mut dyn FnMut(&[f64]) -> f64,
        lower: &[f64],
        upper: &[f64],
    ) -> (Vec<f64>, f64) {
        assert_eq!(
            lower.len(),
            upper.len(),
            "optimizer bounds must have equal length"
        );
        let dim = lower.len();
        let mut evals = 0u64;
        let mut eval = |x: &[f64]| {
            evals += 1;
            objective(x)
        };

        let seed = match self.seed.take() {
            Some(ws) if ws.params.len() != dim => {
                tracing::debug!(
                    seed_len = ws.params.len(),
                    dim,
                    "warm start dropped, dimension mismatch"
                );
                None
            }
            other => other,
        };
        let mut best: Vec<f64> = match seed {
            Some(ws) => ws
                .params
                .iter()
                .zip(lower.iter().zip(upper))
                .map(|(&v, (&lo, &hi))| if v.is_nan() { lo } else { v.clamp(lo, hi) })
                .collect(),
            None => (0..dim)
                .map(|i| self.uniform(lower[i], upper[i]))
                .collect(),
        };
        let mut best_cost = eval(&best);
        if dim == 0 {
            self.evaluations += evals;
            return (best, best_cost);
        }

        let mut candidate = vec![0.0; dim];
        let mut gen_best = vec![0.0; dim];
        for generation in 0..self.opts.iterations {
            let step = self.step_at(generation);
            let mut gen_cost = f64::INFINITY;
            for _ in 0..self.opts.population.max(1) {
                self.mutate(&best, &mut candidate, lower, upper, step);
                let c = eval(&candidate);
                if c < gen_cost {
                    gen_cost = c;
                    gen_best.copy_from_slice(&candidate);
                }
            }
            if gen_cost < best_cost {
                best_cost = gen_cost;
                best.copy_from_slice(&gen_best);
            }
        }

        self.evaluations += evals;
        tracing::debug!(dim, evaluations = evals, best_cost, "random search finished");
        (best, best_cost)
    }

    fn warm_start(&mut self, seed: &WarmStart) -> bool {
        self.seed = Some(seed.clone());
        true
    }
}

#[cfg(test)]
#[path = "../tests/unit/opt.rs"]
mod tests;
