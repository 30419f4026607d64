use std::collections::VecDeque;

/// Default number of (control, error) pairs retained: 100 s at 1 kHz.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100_000;

// ---------------------------------------------------------------------------
// Bounded control/error log
// ---------------------------------------------------------------------------

/// Ring buffer of parallel control and error samples.
///
/// Insertion order is time order. Once `capacity` pairs are held, each push
/// evicts the oldest pair, so both series always have the same length.
#[derive(Debug, Clone)]
pub struct ControlHistory {
    capacity: usize,
    control: VecDeque<f64>,
    error: VecDeque<f64>,
}

impl ControlHistory {
    /// `capacity` must be non-zero; callers validate it beforehand.
    pub fn new(capacity: usize) -> Self {
        let prealloc = capacity.min(4096);
        Self {
            capacity,
            control: VecDeque::with_capacity(prealloc),
            error: VecDeque::with_capacity(prealloc),
        }
    }

    pub fn push(&mut self, control: f64, error: f64) {
        if self.control.len() == self.capacity {
            self.control.pop_front();
            self.error.pop_front();
        }
        self.control.push_back(control);
        self.error.push_back(error);
    }

    pub fn len(&self) -> usize {
        self.control.len()
    }

    pub fn is_empty(&self) -> bool {
        self.control.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn controls(&self) -> Vec<f64> {
        self.control.iter().copied().collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.error.iter().copied().collect()
    }

    /// The last `n` errors (or all of them if fewer), oldest first.
    pub fn recent_errors(&self, n: usize) -> Vec<f64> {
        let skip = self.error.len().saturating_sub(n);
        self.error.iter().skip(skip).copied().collect()
    }

    pub fn clear(&mut self) {
        self.control.clear();
        self.error.clear();
    }

    /// Hand the buffered samples to the caller and start empty.
    pub fn drain(&mut self) -> (Vec<f64>, Vec<f64>) {
        let control = self.control.drain(..).collect();
        let error = self.error.drain(..).collect();
        (control, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut h = ControlHistory::new(3);
        for i in 0..5 {
            h.push(i as f64, -(i as f64));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.controls(), vec![2.0, 3.0, 4.0]);
        assert_eq!(h.errors(), vec![-2.0, -3.0, -4.0]);
    }

    #[test]
    fn recent_errors_takes_tail() {
        let mut h = ControlHistory::new(10);
        for i in 0..6 {
            h.push(0.0, i as f64);
        }
        assert_eq!(h.recent_errors(2), vec![4.0, 5.0]);
        assert_eq!(h.recent_errors(50).len(), 6);
    }

    #[test]
    fn drain_empties_buffer() {
        let mut h = ControlHistory::new(10);
        h.push(1.0, 0.5);
        h.push(2.0, 0.25);
        let (c, e) = h.drain();
        assert_eq!(c, vec![1.0, 2.0]);
        assert_eq!(e, vec![0.5, 0.25]);
        assert!(h.is_empty());
        assert_eq!(h.capacity(), 10);
    }
}
