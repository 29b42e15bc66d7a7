//! Folding per-worker results into the overall longest chain.

use crate::error::SolveError;
use crate::sequence::ChainDetail;
use std::fmt;
use std::str::FromStr;

/// What each worker reports back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Aggregation {
    /// Only the worker's local winner.
    #[default]
    Longest,
    /// Every number the worker evaluated.
    All,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aggregation::Longest => "longest",
            Aggregation::All => "all",
        })
    }
}

impl FromStr for Aggregation {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "longest" => Ok(Aggregation::Longest),
            "all" => Ok(Aggregation::All),
            _ => Err(SolveError::unknown("aggregation", s)),
        }
    }
}

/// A worker's report, shaped by [`Aggregation`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerResult {
    Longest(Option<ChainDetail>),
    All(Vec<ChainDetail>),
}

impl WorkerResult {
    /// The longest chain in this result, if the worker evaluated anything.
    pub fn longest(&self) -> Option<ChainDetail> {
        match self {
            WorkerResult::Longest(detail) => *detail,
            WorkerResult::All(details) => longest(details.iter().copied()),
        }
    }
}

/// The chain with more terms; on a tie, the one with the lower number.
///
/// The result does not depend on argument order, so any reduction order over
/// the same set of chains picks the same winner.
///
/// # Example
///
/// ```
/// use collatz::aggregate::pick_longest;
/// use collatz::ChainDetail;
///
/// let a = ChainDetail::new(55, 113);
/// let b = ChainDetail::new(54, 113);
/// assert_eq!(pick_longest(a, b), b);
/// assert_eq!(pick_longest(b, a), b);
/// ```
pub fn pick_longest(a: ChainDetail, b: ChainDetail) -> ChainDetail {
    if b.rank(&a).is_gt() { b } else { a }
}

/// Reduce any number of chains with [`pick_longest`].
pub fn longest<I>(details: I) -> Option<ChainDetail>
where
    I: IntoIterator<Item = ChainDetail>,
{
    details.into_iter().reduce(pick_longest)
}

/// Fold worker results into the global winner, starting from the chain of 1.
pub fn fold_results<'a, I>(results: I) -> ChainDetail
where
    I: IntoIterator<Item = &'a WorkerResult>,
{
    results
        .into_iter()
        .filter_map(WorkerResult::longest)
        .fold(ChainDetail::base(), pick_longest)
}
