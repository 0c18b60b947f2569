//! Per-iteration training diagnostics.
//!
//! `d_s_t` is the (scaled) energy difference between data and short-run
//! samples; it oscillates around zero once the sampler and the model are in
//! balance. `r_s_t` is the mean input-gradient norm along the Langevin path.

use serde::{Deserialize, Serialize};

/// Diagnostic records preallocated to the run length, one slot per iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsRecord {
    pub d_s_t: Vec<f64>,
    pub r_s_t: Vec<f64>,
    /// Number of iterations recorded so far.
    pub filled: usize,
}

impl DiagnosticsRecord {
    pub fn new(num_train_iters: usize) -> Self {
        Self {
            d_s_t: vec![0.0; num_train_iters],
            r_s_t: vec![0.0; num_train_iters],
            filled: 0,
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.d_s_t.len()
    }

    /// Write the diagnostics of iteration `i`. Each slot is written once, in order.
    ///
    /// # Panics
    /// Panics if `i` is not the next unfilled slot.
    pub fn record(&mut self, i: usize, d_s_t: f64, r_s_t: f64) {
        assert_eq!(i, self.filled, "iteration {i} recorded out of order");
        self.d_s_t[i] = d_s_t;
        self.r_s_t[i] = r_s_t;
        self.filled += 1;
    }

    /// Records for iterations `0..filled`.
    pub fn d_s_t_seen(&self) -> &[f64] {
        &self.d_s_t[..self.filled]
    }

    pub fn r_s_t_seen(&self) -> &[f64] {
        &self.r_s_t[..self.filled]
    }

    /// Filled prefix as a standalone record, for serialization.
    pub fn seen(&self) -> Self {
        Self {
            d_s_t: self.d_s_t_seen().to_vec(),
            r_s_t: self.r_s_t_seen().to_vec(),
            filled: self.filled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preallocated() {
        let record = DiagnosticsRecord::new(5);
        assert_eq!(record.capacity(), 5);
        assert!(record.d_s_t_seen().is_empty());
    }

    #[test]
    fn test_record_in_order() {
        let mut record = DiagnosticsRecord::new(3);
        record.record(0, 1.5, 0.2);
        record.record(1, -0.5, 0.3);
        assert_eq!(record.d_s_t_seen(), &[1.5, -0.5]);
        assert_eq!(record.r_s_t_seen(), &[0.2, 0.3]);
        assert_eq!(record.capacity(), 3);

        let seen = record.seen();
        assert_eq!(seen.d_s_t.len(), 2);
        assert_eq!(seen.filled, 2);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_skipping_a_slot_panics() {
        let mut record = DiagnosticsRecord::new(3);
        record.record(1, 0.0, 0.0);
    }
}
