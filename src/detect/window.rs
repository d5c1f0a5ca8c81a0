use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Upper bound on the up-front allocation; larger windows grow on demand.
const PREALLOC_LIMIT: usize = 4096;

/// Mean and population standard deviation of a window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Stats plus the number of samples they were computed over.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Status {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

/// A bounded, oldest-first buffer of recent samples.
///
/// Never holds more than `capacity` values; pushing onto a full window
/// evicts the oldest one.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity.min(PREALLOC_LIMIT) + 1),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() >= self.capacity
    }

    /// Append `value`, evicting the oldest sample if that overflows the window.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// The value every sample shares, if the window is non-empty and uniform.
    ///
    /// `sum / len` does not round-trip for values like 0.1 or 0.7, so a
    /// uniform window must bypass the arithmetic to report zero spread.
    fn uniform_value(&self) -> Option<f64> {
        let first = *self.values.front()?;
        self.values.iter().all(|&x| x == first).then_some(first)
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        if let Some(value) = self.uniform_value() {
            return value;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance (divides by the count, not count - 1).
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() || self.uniform_value().is_some() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            mean: self.mean(),
            std_dev: self.std_dev(),
        }
    }

    pub fn status(&self) -> Status {
        let Stats { mean, std_dev } = self.stats();
        Status {
            mean,
            std_dev,
            count: self.values.len(),
        }
    }
}
