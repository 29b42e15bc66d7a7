use crate::error::{Result, SolveError};
use crate::memo::MemoTable;
use crate::sequence::{ChainDetail, checked_step};

/// Compute the chain length of `number` from the lengths of smaller numbers.
///
/// Steps are taken until the chain first drops below `number`; the table is
/// read exactly once, for that smaller value, and the total is stored back
/// for `number`. Intermediate terms may exceed the table's ceiling but are
/// never used as an index. Every number below `number` must either be in the
/// table already or, for a shared table, eventually be stored by some worker.
///
/// # Example
///
/// ```
/// use collatz::evaluator::calculate_chain_length;
/// use collatz::memo::LocalMemoTable;
///
/// let mut table = LocalMemoTable::new(10).unwrap();
/// for n in 2..=10 {
///     calculate_chain_length(&mut table, n).unwrap();
/// }
/// assert_eq!(calculate_chain_length(&mut table, 9).unwrap().terms, 20);
/// ```
pub fn calculate_chain_length<M: MemoTable>(table: &mut M, number: u64) -> Result<ChainDetail> {
    if number == 0 {
        return Err(SolveError::InvalidNumber { number });
    }
    if number == 1 {
        let terms = table.read(number)?;
        return Ok(ChainDetail::new(number, terms));
    }

    let mut current = number;
    let mut partial_terms = 0u32;
    loop {
        partial_terms += 1;
        current = checked_step(current).ok_or(SolveError::Overflow { number })?;
        if current < number {
            break;
        }
    }

    let terms = partial_terms + table.read(current)?;
    table.store(number, terms)?;
    Ok(ChainDetail::new(number, terms))
}
