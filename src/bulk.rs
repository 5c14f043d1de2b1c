//! Index ranges of bulk job submissions.
//!
//! A bulk submission `(begin, end, step)` yields the indices
//! `begin, begin + step, …, begin + n * step` with
//! `n = (end - begin) / step`. The last index equals `end` only when
//! `end - begin` is a multiple of `step`.

use serde::{Deserialize, Serialize};

use crate::error::{DrmaaError, DrmaaResult};

/// A validated `(begin, end, step)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRange {
    begin: u64,
    end: u64,
    step: u64,
}

impl BulkRange {
    /// Validate the bounds. Requires `begin >= 1`, `begin <= end` and
    /// `step > 0`.
    pub fn new(begin: u64, end: u64, step: u64) -> DrmaaResult<Self> {
        if begin < 1 {
            return Err(DrmaaError::InvalidArgument(format!(
                "begin_index must be at least 1, got {begin}"
            )));
        }
        if begin > end {
            return Err(DrmaaError::InvalidArgument(format!(
                "begin_index {begin} exceeds end_index {end}"
            )));
        }
        if step == 0 {
            return Err(DrmaaError::InvalidArgument("step must be positive".into()));
        }
        Ok(Self { begin, end, step })
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        (self.end - self.begin) / self.step + 1
    }

    /// Always `false`: a valid range has at least one member.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Index of the last member.
    pub fn last(&self) -> u64 {
        self.begin + (self.len() - 1) * self.step
    }

    /// Member indices in increasing order.
    pub fn indices(&self) -> impl Iterator<Item = u64> + use<> {
        let Self { begin, step, .. } = *self;
        (0..self.len()).map(move |n| begin + n * step)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn indices(begin: u64, end: u64, step: u64) -> Vec<u64> {
        BulkRange::new(begin, end, step).unwrap().indices().collect()
    }

    #[test]
    fn test_step_divides_range() {
        assert_eq!(indices(1, 10, 3), vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_step_does_not_divide_range() {
        assert_eq!(indices(1, 10, 4), vec![1, 5, 9]);
        assert_eq!(BulkRange::new(1, 10, 4).unwrap().last(), 9);
    }

    #[test]
    fn test_single_member() {
        assert_eq!(indices(5, 5, 1), vec![5]);
        assert_eq!(indices(2, 3, 10), vec![2]);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(matches!(BulkRange::new(5, 3, 1), Err(DrmaaError::InvalidArgument(_))));
        assert!(matches!(BulkRange::new(0, 3, 1), Err(DrmaaError::InvalidArgument(_))));
        assert!(matches!(BulkRange::new(1, 3, 0), Err(DrmaaError::InvalidArgument(_))));
    }

    proptest! {
        #[test]
        fn prop_indices_follow_formula(
            begin in 1u64..1_000,
            span in 0u64..5_000,
            step in 1u64..300,
        ) {
            let end = begin + span;
            let range = BulkRange::new(begin, end, step).unwrap();
            let got: Vec<u64> = range.indices().collect();
            let n = (end - begin) / step;

            prop_assert_eq!(got.len() as u64, n + 1);
            prop_assert_eq!(got[0], begin);
            prop_assert_eq!(*got.last().unwrap(), begin + n * step);
            prop_assert!(*got.last().unwrap() <= end);
            prop_assert!(got.last().unwrap() + step > end);
            prop_assert!(got.windows(2).all(|w| w[1] == w[0] + step));
        }
    }
}
