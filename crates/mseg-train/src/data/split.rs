//! Seeded train/validation split.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Result, SegmentationError};

/// Sizes `(round(n * ratio), n - round(n * ratio))`.
///
/// Halfway cases round to even, so 5 subjects at 0.9 give 4/1.
/// `ratio` must lie strictly between 0 and 1.
pub fn split_counts(n: usize, ratio: f64) -> Result<(usize, usize)> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(SegmentationError::invalid_configuration(format!(
            "train/validation ratio must lie in (0, 1), got {}",
            ratio
        )));
    }
    let n_train = ((n as f64 * ratio).round_ties_even() as usize).min(n);
    Ok((n_train, n - n_train))
}

/// Shuffle a copy of `items` with `seed` and split it by `ratio`.
pub fn random_split<T: Clone>(items: &[T], ratio: f64, seed: u64) -> Result<(Vec<T>, Vec<T>)> {
    let (n_train, _) = split_counts(items.len(), ratio)?;
    let mut shuffled = items.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    let val = shuffled.split_off(n_train);
    Ok((shuffled, val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_counts() {
        assert_eq!(split_counts(3, 0.8).unwrap(), (2, 1));
        assert_eq!(split_counts(260, 0.8).unwrap(), (208, 52));
        assert_eq!(split_counts(0, 0.8).unwrap(), (0, 0));
    }

    #[test]
    fn test_split_counts_halfway_rounds_to_even() {
        assert_eq!(split_counts(5, 0.9).unwrap(), (4, 1));
        assert_eq!(split_counts(5, 0.5).unwrap(), (2, 3));
        assert_eq!(split_counts(25, 0.9).unwrap(), (22, 3));
        assert_eq!(split_counts(7, 0.5).unwrap(), (4, 3));
    }

    #[test]
    fn test_rejects_ratio_bounds() {
        assert!(split_counts(10, 0.0).is_err());
        assert!(split_counts(10, 1.0).is_err());
        assert!(split_counts(10, f64::NAN).is_err());
    }

    #[test]
    fn test_same_seed_same_split() {
        let items: Vec<u32> = (0..50).collect();
        let a = random_split(&items, 0.8, 42).unwrap();
        let b = random_split(&items, 0.8, 42).unwrap();
        let c = random_split(&items, 0.8, 7).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.0, c.0);
    }

    proptest! {
        #[test]
        fn prop_split_is_disjoint_and_exhaustive(n in 0usize..200, ratio in 0.01f64..0.99, seed in any::<u64>()) {
            let items: Vec<usize> = (0..n).collect();
            let (train, val) = random_split(&items, ratio, seed).unwrap();
            prop_assert_eq!(train.len() + val.len(), n);
            let (expected_train, _) = split_counts(n, ratio).unwrap();
            prop_assert_eq!(train.len(), expected_train);

            let mut all: Vec<usize> = train.iter().chain(val.iter()).copied().collect();
            all.sort_unstable();
            prop_assert_eq!(all, items);
        }
    }
}
