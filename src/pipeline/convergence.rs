/// Early-stopping parameters for sequential and batch optimization.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// When `false` the tracker never reports convergence.
    pub enabled: bool,
    /// Consecutive insufficient improvements tolerated before stopping.
    pub patience: u32,
    /// Minimum relative improvement `(last - cost) / last` that counts as progress.
    pub threshold: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patience: 3,
            threshold: 0.001,
        }
    }
}

impl ConvergenceConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_patience(mut self, patience: u32) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Detects when successive costs stop improving.
///
/// The first update only seeds the reference cost. Every later update compares against the last
/// cost that was a significant improvement, and convergence is reported on the `patience`-th
/// consecutive update that falls short of the threshold.
#[derive(Clone, Debug)]
pub struct ConvergenceTracker {
    config: ConvergenceConfig,
    history: Vec<f64>,
    best_cost: f64,
    last_significant: f64,
    stale_count: u32,
}

impl ConvergenceTracker {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
            best_cost: f64::INFINITY,
            last_significant: f64::INFINITY,
            stale_count: 0,
        }
    }

    /// Record `cost`; returns `true` exactly when convergence is detected.
    pub fn update(&mut self, cost: f64) -> bool {
        self.history.push(cost);
        if cost < self.best_cost {
            self.best_cost = cost;
        }
        if !self.config.enabled {
            return false;
        }

        if self.history.len() == 1 {
            self.last_significant = cost;
            return false;
        }

        let rel = (self.last_significant - cost) / self.last_significant;
        if rel >= self.config.threshold {
            self.last_significant = cost;
            self.stale_count = 0;
            tracing::debug!(cost, rel, "significant improvement");
            return false;
        }

        self.stale_count += 1;
        tracing::debug!(
            cost,
            rel,
            last_significant = self.last_significant,
            stale_count = self.stale_count,
            patience = self.config.patience,
            "no significant improvement"
        );
        self.stale_count >= self.config.patience
    }

    /// Minimum cost ever passed to [`ConvergenceTracker::update`], `+inf` before the first one.
    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn stale_count(&self) -> u32 {
        self.stale_count
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.best_cost = f64::INFINITY;
        self.last_significant = f64::INFINITY;
        self.stale_count = 0;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/convergence.rs"]
mod tests;
