use crate::domain::Problem;

/// Where a sequential round stands within its ordered problem slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialProgress {
    /// Index into the ordered problems; `None` once every slice has elapsed.
    pub current_index: Option<usize>,
    pub problem_remaining: i64,
    pub total_remaining: i64,
}

/// Per-problem slice lengths in seconds, in display order.
pub fn slice_durations(problems: &[&Problem], default_seconds: i64) -> Vec<i64> {
    problems
        .iter()
        .map(|p| p.time_limit_seconds(default_seconds).max(0))
        .collect()
}

/// Sum of the slices, saturating at `i64::MAX`.
pub fn total_secs(slices: &[i64]) -> i64 {
    slices.iter().fold(0i64, |acc, slice| acc.saturating_add(*slice))
}

/// Walk the slices until `elapsed` falls inside one.
pub fn walk(slices: &[i64], elapsed: i64) -> SequentialProgress {
    let total = total_secs(slices);
    let total_remaining = (total - elapsed).max(0);

    let mut start: i64 = 0;
    for (index, slice) in slices.iter().enumerate() {
        let end = start.saturating_add(*slice);
        if elapsed < end {
            return SequentialProgress {
                current_index: Some(index),
                problem_remaining: end - elapsed,
                total_remaining,
            };
        }
        start = end;
    }

    SequentialProgress {
        current_index: None,
        problem_remaining: 0,
        total_remaining: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLICES: [i64; 3] = [600, 300, 900];

    #[test]
    fn test_walk_through_slices() {
        let p = walk(&SLICES, 100);
        assert_eq!(p.current_index, Some(0));
        assert_eq!(p.problem_remaining, 500);
        assert_eq!(p.total_remaining, 1700);

        let p = walk(&SLICES, 650);
        assert_eq!(p.current_index, Some(1));
        assert_eq!(p.problem_remaining, 250);

        let p = walk(&SLICES, 1900);
        assert_eq!(p.current_index, None);
        assert_eq!(p.total_remaining, 0);
    }

    #[test]
    fn test_slice_boundaries() {
        assert_eq!(walk(&SLICES, 0).current_index, Some(0));
        assert_eq!(walk(&SLICES, 599).current_index, Some(0));
        assert_eq!(walk(&SLICES, 600).current_index, Some(1));
        assert_eq!(walk(&SLICES, 1799).problem_remaining, 1);
        assert_eq!(walk(&SLICES, 1800).current_index, None);
    }

    #[test]
    fn test_empty_round_is_over_immediately() {
        let p = walk(&[], 0);
        assert_eq!(p.current_index, None);
        assert_eq!(p.total_remaining, 0);
    }
}
