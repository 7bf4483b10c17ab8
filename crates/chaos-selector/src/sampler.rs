// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Applies a [`Mode`] to a resolved candidate list.

use crate::{Result, SelectorError};
use chaos_types::Mode;
use rand::Rng;
use std::collections::HashSet;

/// Picks the injection targets out of `candidates` according to `mode` and
/// its companion `value`.
pub fn sample<T, R: Rng + ?Sized>(
    rng: &mut R,
    candidates: Vec<T>,
    mode: Mode,
    value: &str,
) -> Result<Vec<T>> {
    if candidates.is_empty() {
        return Err(SelectorError::EmptyCandidates);
    }
    let len = candidates.len();

    let count = match mode {
        Mode::One => {
            let index = rng.gen_range(0, len);
            return Ok(pick(candidates, &[index]));
        },
        Mode::All => return Ok(candidates),
        Mode::Fixed => {
            let count = parse_value(value)?.min(len as i64);
            if count <= 0 {
                return Err(below_or_equal_zero());
            }
            count as usize
        },
        Mode::FixedPercent => {
            let percent = parse_value(value)?;
            if percent == 0 {
                return Err(below_or_equal_zero());
            }
            if !(0..=100).contains(&percent) {
                return Err(SelectorError::Usage(format!(
                    "fixed percentage value of {} is invalid, Must be (0,100]",
                    percent
                )));
            }
            percent_of(len, percent as usize)
        },
        Mode::RandomMaxPercent => {
            let max_percent = parse_value(value)?;
            if max_percent == 0 {
                return Err(below_or_equal_zero());
            }
            if !(0..=100).contains(&max_percent) {
                return Err(SelectorError::Usage(format!(
                    "fixed percentage value of {} is invalid, Must be [0-100]",
                    max_percent
                )));
            }
            let percent = rng.gen_range(0, max_percent as usize + 1);
            percent_of(len, percent)
        },
    };

    let indexes = random_fixed_indexes(rng, 0, len, count);
    Ok(pick(candidates, &indexes))
}

/// Returns `count` distinct indexes drawn uniformly from `[start, end)`.
///
/// Draws are accepted only when not already taken. When `count` covers the
/// whole range every index is returned in order, which bounds the number of
/// draws.
pub fn random_fixed_indexes<R: Rng + ?Sized>(
    rng: &mut R,
    start: usize,
    end: usize,
    count: usize,
) -> Vec<usize> {
    if end <= start {
        return vec![];
    }
    if count >= end - start {
        return (start..end).collect();
    }

    let mut taken = HashSet::with_capacity(count);
    let mut indexes = Vec::with_capacity(count);
    while indexes.len() < count {
        let index = rng.gen_range(start, end);
        if taken.insert(index) {
            indexes.push(index);
        }
    }
    indexes
}

fn parse_value(value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|source| SelectorError::InvalidModeValue {
            value: value.to_string(),
            source,
        })
}

fn percent_of(len: usize, percent: usize) -> usize {
    len * percent / 100
}

fn below_or_equal_zero() -> SelectorError {
    SelectorError::Usage("cannot select any target as value below or equal 0".to_string())
}

fn pick<T>(candidates: Vec<T>, indexes: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = candidates.into_iter().map(Some).collect();
    indexes
        .iter()
        .filter_map(|&index| slots.get_mut(index).and_then(Option::take))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_matches, assert_ok};
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn candidates(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    fn distinct(selected: &[usize]) -> bool {
        selected.iter().collect::<HashSet<_>>().len() == selected.len()
    }

    #[test]
    fn test_empty_candidates() {
        for mode in [Mode::One, Mode::All, Mode::Fixed] {
            let err = assert_err!(sample(&mut rng(), Vec::<usize>::new(), mode, "1"));
            assert_eq!(err.to_string(), "cannot generate targets from empty list");
        }
    }

    #[test]
    fn test_fixed_percent_of_ten() {
        let selected = assert_ok!(sample(&mut rng(), candidates(10), Mode::FixedPercent, "30"));
        assert_eq!(selected.len(), 3);
        assert!(distinct(&selected));
    }

    #[test]
    fn test_single_volume_with_mode_one() {
        let selected = assert_ok!(sample(&mut rng(), vec!["pv-0"], Mode::One, ""));
        assert_eq!(selected, vec!["pv-0"]);
    }

    #[test]
    fn test_fixed_rejects_non_positive() {
        let err = assert_err!(sample(&mut rng(), candidates(3), Mode::Fixed, "-1"));
        assert_eq!(err.to_string(), "cannot select any target as value below or equal 0");
        assert_err!(sample(&mut rng(), candidates(3), Mode::Fixed, "0"));
        assert_matches!(
            sample(&mut rng(), candidates(3), Mode::Fixed, "two"),
            Err(SelectorError::InvalidModeValue { .. })
        );
    }

    #[test]
    fn test_fixed_clamps_to_population() {
        let selected = assert_ok!(sample(&mut rng(), candidates(3), Mode::Fixed, "10"));
        assert_eq!(selected, vec![0, 1, 2]);
    }

    #[test]
    fn test_percent_bounds() {
        let err = assert_err!(sample(&mut rng(), candidates(3), Mode::FixedPercent, "101"));
        assert_eq!(
            err.to_string(),
            "fixed percentage value of 101 is invalid, Must be (0,100]"
        );
        assert_err!(sample(&mut rng(), candidates(3), Mode::FixedPercent, "0"));
        assert_err!(sample(&mut rng(), candidates(3), Mode::FixedPercent, "-5"));

        let err = assert_err!(sample(&mut rng(), candidates(3), Mode::RandomMaxPercent, "200"));
        assert_eq!(
            err.to_string(),
            "fixed percentage value of 200 is invalid, Must be [0-100]"
        );
        assert_err!(sample(&mut rng(), candidates(3), Mode::RandomMaxPercent, "0"));
    }

    #[test]
    fn test_small_percent_may_select_nothing() {
        let selected = assert_ok!(sample(&mut rng(), candidates(3), Mode::FixedPercent, "10"));
        assert!(selected.is_empty());
    }

    #[test]
    fn test_random_fixed_indexes_covers_range() {
        assert_eq!(random_fixed_indexes(&mut rng(), 2, 5, 3), vec![2, 3, 4]);
        assert_eq!(random_fixed_indexes(&mut rng(), 2, 5, 7), vec![2, 3, 4]);
        assert!(random_fixed_indexes(&mut rng(), 5, 2, 1).is_empty());

        let indexes = random_fixed_indexes(&mut rng(), 10, 20, 4);
        assert_eq!(indexes.len(), 4);
        assert!(distinct(&indexes));
        assert!(indexes.iter().all(|i| (10..20).contains(i)));
    }

    proptest! {
        #[test]
        fn all_returns_candidates_unchanged(n in 1usize..64, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = sample(&mut rng, candidates(n), Mode::All, "").unwrap();
            prop_assert_eq!(selected, candidates(n));
        }

        #[test]
        fn one_returns_a_single_candidate(n in 1usize..64, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = sample(&mut rng, candidates(n), Mode::One, "").unwrap();
            prop_assert_eq!(selected.len(), 1);
            prop_assert!(selected[0] < n);
        }

        #[test]
        fn fixed_returns_min_of_k_and_n(n in 1usize..64, k in 1i64..100, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = sample(&mut rng, candidates(n), Mode::Fixed, &k.to_string()).unwrap();
            prop_assert_eq!(selected.len(), (k as usize).min(n));
            prop_assert!(distinct(&selected));
        }

        #[test]
        fn fixed_percent_returns_floor(n in 1usize..64, p in 1usize..=100, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected =
                sample(&mut rng, candidates(n), Mode::FixedPercent, &p.to_string()).unwrap();
            prop_assert_eq!(selected.len(), n * p / 100);
            prop_assert!(distinct(&selected));
        }

        #[test]
        fn random_max_percent_is_bounded(n in 1usize..64, max in 1usize..=100, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected =
                sample(&mut rng, candidates(n), Mode::RandomMaxPercent, &max.to_string()).unwrap();
            prop_assert!(selected.len() <= n * max / 100);
            prop_assert!(distinct(&selected));
        }
    }
}
