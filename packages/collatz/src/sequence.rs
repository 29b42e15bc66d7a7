use std::cmp::Ordering;
use std::fmt;

/// A number together with the term count of its Collatz chain.
///
/// The count includes both the starting number and the terminal 1, so the
/// chain of 1 has one term and the chain of 9 has twenty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChainDetail {
    pub number: u64,
    pub terms: u32,
}

impl ChainDetail {
    pub fn new(number: u64, terms: u32) -> Self {
        ChainDetail { number, terms }
    }

    /// The chain of 1, which every table is seeded with.
    pub fn base() -> Self {
        ChainDetail::new(1, 1)
    }

    /// Order by term count, with the lower number ranking higher on a tie.
    pub fn rank(&self, other: &ChainDetail) -> Ordering {
        self.terms
            .cmp(&other.terms)
            .then_with(|| other.number.cmp(&self.number))
    }
}

impl fmt::Display for ChainDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} terms)", self.number, self.terms)
    }
}

/// The next term of a Collatz chain: `n / 2` for even `n`, `3n + 1` otherwise.
///
/// # Example
///
/// ```
/// use collatz::sequence::step;
///
/// assert_eq!(step(10), 5);
/// assert_eq!(step(5), 16);
/// ```
pub fn step(term: u64) -> u64 {
    if term.is_multiple_of(2) {
        term / 2
    } else {
        3 * term + 1
    }
}

/// Like [`step`], but returns `None` when `3n + 1` does not fit in a `u64`.
pub fn checked_step(term: u64) -> Option<u64> {
    if term.is_multiple_of(2) {
        Some(term / 2)
    } else {
        term.checked_mul(3)?.checked_add(1)
    }
}

/// Count the terms of the chain starting at `start` by walking it all the way
/// down to 1, without any memoization.
///
/// Returns `None` for 0 (which never reaches 1) or if a term overflows.
///
/// # Example
///
/// ```
/// use collatz::sequence::chain_length;
///
/// // 9 → 28 → 14 → 7 → 22 → 11 → 34 → 17 → 52 → 26 → 13 → 40 → 20 → 10 → 5 → 16 → 8 → 4 → 2 → 1
/// assert_eq!(chain_length(9), Some(20));
/// assert_eq!(chain_length(1), Some(1));
/// ```
pub fn chain_length(start: u64) -> Option<u32> {
    if start == 0 {
        return None;
    }
    let mut terms = 1;
    let mut current = start;
    while current > 1 {
        current = checked_step(current)?;
        terms += 1;
    }
    Some(terms)
}

/// Count the terms of the chain starting at `start`, using and filling a
/// private table indexed by number (`0` marks an unknown entry).
///
/// The chain is followed until it reaches a number whose length is already in
/// the table. Every number on the walked path that fits in the table is then
/// back-filled, so later calls sharing a suffix stop early. The table must have
/// entry 1 seeded to 1.
///
/// # Example
///
/// ```
/// use collatz::sequence::chain_length_cached;
///
/// let mut cache = vec![0u32; 11];
/// cache[1] = 1;
/// assert_eq!(chain_length_cached(6, &mut cache), Some(9));
/// // 6 → 3 → 10 → 5 → 16 → 8 → 4 → 2 → 1
/// assert_eq!(cache[3], 8);
/// assert_eq!(cache[10], 7);
/// ```
pub fn chain_length_cached(start: u64, cache: &mut [u32]) -> Option<u32> {
    let cached = |cache: &[u32], n: u64| {
        usize::try_from(n)
            .ok()
            .and_then(|idx| cache.get(idx).copied())
            .filter(|&len| len != 0)
    };

    let mut path: Vec<u64> = Vec::new();
    let mut current = start;
    let base = loop {
        if let Some(len) = cached(cache, current) {
            break len;
        }
        if current <= 1 {
            // 0, or an unseeded 1
            return None;
        }
        path.push(current);
        current = checked_step(current)?;
    };

    let total = base + path.len() as u32;
    for (i, &n) in path.iter().enumerate() {
        if let Some(slot) = usize::try_from(n).ok().and_then(|idx| cache.get_mut(idx)) {
            *slot = total - i as u32;
        }
    }
    Some(total)
}
