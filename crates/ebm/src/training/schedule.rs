//! Learning-rate annealing.

/// Multiplicative decay with a floor: `lr ← max(lr_min, lr · decay)`.
#[derive(Debug, Clone, Copy)]
pub struct LrAnneal {
    lr: f64,
    lr_min: f64,
    decay: f64,
}

impl LrAnneal {
    pub fn new(lr_init: f64, lr_min: f64, decay: f64) -> Self {
        Self {
            lr: lr_init,
            lr_min,
            decay,
        }
    }

    /// Current learning rate.
    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Apply one annealing step and return the new rate.
    pub fn step(&mut self) -> f64 {
        self.lr = self.lr_min.max(self.lr * self.decay);
        self.lr
    }
}
