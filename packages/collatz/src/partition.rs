//! Splitting `[2, ceiling]` into per-worker queues.

use crate::error::SolveError;
use std::fmt;
use std::str::FromStr;

/// Numbers assigned to one worker, in ascending order.
pub type WorkerQueue = Vec<u64>;

/// How numbers are dealt out to workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Partition {
    /// Number `i` goes to worker `i % workers`.
    #[default]
    RoundRobin,
    /// Each worker gets one contiguous block of roughly equal size.
    Contiguous,
}

impl Partition {
    pub fn split(self, ceiling: u64, workers: usize) -> Vec<WorkerQueue> {
        match self {
            Partition::RoundRobin => round_robin(ceiling, workers),
            Partition::Contiguous => contiguous(ceiling, workers),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Partition::RoundRobin => "round-robin",
            Partition::Contiguous => "contiguous",
        })
    }
}

impl FromStr for Partition {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Partition::RoundRobin),
            "contiguous" => Ok(Partition::Contiguous),
            _ => Err(SolveError::unknown("partition", s)),
        }
    }
}

/// Deal every number in `[2, ceiling]` to worker `i % workers`.
///
/// Each queue is ascending, which workers rely on: a number's chain only ever
/// reads smaller numbers, and the owner of any smaller number reaches it
/// before anything larger in its own queue.
///
/// # Example
///
/// ```
/// use collatz::partition::round_robin;
///
/// let queues = round_robin(10, 3);
/// assert_eq!(queues[0], vec![3, 6, 9]);
/// assert_eq!(queues[1], vec![4, 7, 10]);
/// assert_eq!(queues[2], vec![2, 5, 8]);
/// ```
pub fn round_robin(ceiling: u64, workers: usize) -> Vec<WorkerQueue> {
    if workers == 0 {
        return Vec::new();
    }
    let mut queues: Vec<WorkerQueue> = vec![Vec::new(); workers];
    for i in 2..=ceiling {
        queues[(i % workers as u64) as usize].push(i);
    }
    queues
}

/// Split `[2, ceiling]` into `workers` ascending blocks, the first ones taking
/// one extra number when the range does not divide evenly.
pub fn contiguous(ceiling: u64, workers: usize) -> Vec<WorkerQueue> {
    if workers == 0 {
        return Vec::new();
    }
    let total = ceiling.saturating_sub(1);
    let base = total / workers as u64;
    let extra = total % workers as u64;

    let mut start = 2;
    (0..workers as u64)
        .map(|w| {
            let len = base + u64::from(w < extra);
            let queue = (start..start + len).collect();
            start += len;
            queue
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_complete(queues: &[WorkerQueue], ceiling: u64) {
        let mut all: Vec<u64> = queues.iter().flatten().copied().collect();
        all.sort_unstable();
        let expected: Vec<u64> = (2..=ceiling).collect();
        assert_eq!(all, expected);
        for queue in queues {
            assert!(queue.windows(2).all(|w| w[0] < w[1]), "queue not ascending");
        }
    }

    #[test]
    fn test_round_robin_small() {
        let queues = round_robin(10, 3);
        assert_eq!(queues.len(), 3);
        assert_complete(&queues, 10);
    }

    #[test]
    fn test_round_robin_more_workers_than_numbers() {
        let queues = round_robin(3, 5);
        assert_eq!(queues.len(), 5);
        assert_eq!(queues[2], vec![2]);
        assert_eq!(queues[3], vec![3]);
        assert!(queues[0].is_empty());
        assert!(queues[4].is_empty());
    }

    #[test]
    fn test_ceiling_one_is_empty() {
        assert!(round_robin(1, 4).iter().all(Vec::is_empty));
        assert!(contiguous(1, 4).iter().all(Vec::is_empty));
    }

    #[test]
    fn test_no_workers() {
        assert!(round_robin(10, 0).is_empty());
        assert!(contiguous(10, 0).is_empty());
    }

    #[test]
    fn test_contiguous_small() {
        let queues = contiguous(10, 4);
        assert_eq!(queues, vec![vec![2, 3, 4], vec![5, 6], vec![7, 8], vec![9, 10]]);
    }

    #[test]
    fn test_partition_names() {
        assert_eq!("round-robin".parse::<Partition>().unwrap(), Partition::RoundRobin);
        assert_eq!("contiguous".parse::<Partition>().unwrap(), Partition::Contiguous);
        assert!("striped".parse::<Partition>().is_err());
        assert_eq!(Partition::default().to_string(), "round-robin");
    }

    proptest! {
        #[test]
        fn round_robin_covers_range_exactly(ceiling in 1u64..2_000, workers in 1usize..32) {
            let queues = round_robin(ceiling, workers);
            prop_assert_eq!(queues.len(), workers);
            assert_complete(&queues, ceiling);
            for (w, queue) in queues.iter().enumerate() {
                prop_assert!(queue.iter().all(|&i| i % workers as u64 == w as u64));
            }
        }

        #[test]
        fn contiguous_covers_range_exactly(ceiling in 1u64..2_000, workers in 1usize..32) {
            let queues = contiguous(ceiling, workers);
            prop_assert_eq!(queues.len(), workers);
            assert_complete(&queues, ceiling);
            let longest = queues.iter().map(Vec::len).max().unwrap_or(0);
            let shortest = queues.iter().map(Vec::len).min().unwrap_or(0);
            prop_assert!(longest - shortest <= 1);
        }
    }
}
