//! Memo tables mapping a number to the term count of its chain.
//!
//! Two flavours implement [`MemoTable`]:
//!
//! - [`LocalMemoTable`], a plain vector owned by one thread.
//! - [`SharedMemoTable`], a fixed array of atomic cells shared by a worker
//!   pool. Reading an unset cell blocks until another worker stores it.
//!
//! Both use `0` as the "unset" sentinel, which is never a valid term count.

use crate::error::{Result, SolveError};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tracing::warn;

/// Sentinel stored in a cell whose chain length is not known yet.
pub const UNSET: u32 = 0;

/// Number of mutex/condvar pairs blocked readers are spread over.
pub const WAIT_STRIPES: usize = 64;

/// A cache from number to chain length.
///
/// `read` returns the term count stored for `number`; `store` records it.
/// Implemented for `&SharedMemoTable` so that many threads can drive the
/// same table through shared references.
pub trait MemoTable {
    fn read(&mut self, number: u64) -> Result<u32>;
    fn store(&mut self, number: u64, terms: u32) -> Result<()>;
}

/// Convert a ceiling to the length of a table indexed by `0..=ceiling`.
pub(crate) fn table_len(ceiling: u64) -> Result<usize> {
    usize::try_from(ceiling)
        .ok()
        .and_then(|c| c.checked_add(1))
        .ok_or(SolveError::TableTooLarge { ceiling })
}

/// Bytes a table for `ceiling` occupies, whichever flavour.
pub fn table_bytes(ceiling: u64) -> usize {
    table_len(ceiling).map_or(0, |len| len * size_of::<u32>())
}

/// Memo table owned by a single thread, filled in ascending order.
#[derive(Clone, Debug)]
pub struct LocalMemoTable {
    cells: Vec<u32>,
}

impl LocalMemoTable {
    /// A table covering `0..=ceiling` with entry 1 seeded.
    pub fn new(ceiling: u64) -> Result<Self> {
        let mut cells = vec![UNSET; table_len(ceiling)?];
        if let Some(one) = cells.get_mut(1) {
            *one = 1;
        }
        Ok(LocalMemoTable { cells })
    }

    pub fn ceiling(&self) -> u64 {
        self.cells.len() as u64 - 1
    }

    /// The stored length of `number`, or `None` if it is unset or out of range.
    pub fn get(&self, number: u64) -> Option<u32> {
        let idx = usize::try_from(number).ok()?;
        self.cells.get(idx).copied().filter(|&terms| terms != UNSET)
    }

    fn index(&self, number: u64) -> Result<usize> {
        usize::try_from(number)
            .ok()
            .filter(|&idx| idx < self.cells.len())
            .ok_or(SolveError::OutOfRange {
                number,
                ceiling: self.ceiling(),
            })
    }
}

impl MemoTable for LocalMemoTable {
    fn read(&mut self, number: u64) -> Result<u32> {
        let idx = self.index(number)?;
        match self.cells[idx] {
            UNSET => Err(SolveError::Unresolved { number }),
            terms => Ok(terms),
        }
    }

    fn store(&mut self, number: u64, terms: u32) -> Result<()> {
        let idx = self.index(number)?;
        self.cells[idx] = terms;
        Ok(())
    }
}

/// One lock/condvar pair; cells map onto stripes by `index % WAIT_STRIPES`.
#[derive(Default)]
struct WaitStripe {
    lock: Mutex<()>,
    ready: Condvar,
    waiters: AtomicUsize,
}

/// Memo table shared by every worker of a pool.
///
/// Each cell is an `AtomicU32`. Reading an unset cell parks the caller on the
/// cell's wait stripe until a writer stores that cell (or the table is
/// poisoned); storing publishes the value with release ordering and wakes the
/// stripe's waiters. No lock is taken on the fast paths: a read of a set cell
/// and a store to a stripe nobody waits on.
pub struct SharedMemoTable {
    cells: Box<[AtomicU32]>,
    stripes: Box<[WaitStripe]>,
    poisoned: AtomicBool,
}

impl SharedMemoTable {
    /// A table covering `0..=ceiling` with entry 1 seeded.
    pub fn new(ceiling: u64) -> Result<Self> {
        let cells: Box<[AtomicU32]> = (0..table_len(ceiling)?)
            .map(|idx| AtomicU32::new(if idx == 1 { 1 } else { UNSET }))
            .collect();
        let stripes = (0..WAIT_STRIPES).map(|_| WaitStripe::default()).collect();
        Ok(SharedMemoTable {
            cells,
            stripes,
            poisoned: AtomicBool::new(false),
        })
    }

    pub fn ceiling(&self) -> u64 {
        self.cells.len() as u64 - 1
    }

    /// Non-blocking lookup: the stored length, or `None` if unset or out of range.
    pub fn get(&self, number: u64) -> Option<u32> {
        let idx = usize::try_from(number).ok()?;
        let terms = self.cells.get(idx)?.load(Ordering::Acquire);
        (terms != UNSET).then_some(terms)
    }

    /// Number of cells in `1..=ceiling` that are still unset.
    pub fn unresolved(&self) -> usize {
        self.cells
            .iter()
            .skip(1)
            .filter(|cell| cell.load(Ordering::Acquire) == UNSET)
            .count()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Mark the table as abandoned and wake every blocked reader.
    ///
    /// Readers that are, or later become, blocked on an unset cell return
    /// [`SolveError::TablePoisoned`] instead of waiting.
    pub fn poison(&self) {
        if self.poisoned.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!("memo table poisoned, waking all blocked readers");
        for stripe in self.stripes.iter() {
            let _guard = stripe.lock.lock();
            stripe.ready.notify_all();
        }
    }

    /// Read the length of `number`, blocking until it is stored.
    pub fn read(&self, number: u64) -> Result<u32> {
        let (idx, cell) = self.cell(number)?;
        match cell.load(Ordering::Acquire) {
            UNSET => self.wait_for(idx, cell),
            terms => Ok(terms),
        }
    }

    /// Store the length of `number` and wake any reader blocked on it.
    pub fn store(&self, number: u64, terms: u32) -> Result<()> {
        let (idx, cell) = self.cell(number)?;
        cell.store(terms, Ordering::SeqCst);

        let stripe = &self.stripes[idx % WAIT_STRIPES];
        // Pairs with the SeqCst increment in `wait_for`: either we see the
        // waiter here, or the waiter sees our store before parking.
        if stripe.waiters.load(Ordering::SeqCst) > 0 {
            let _guard = stripe.lock.lock();
            stripe.ready.notify_all();
        }
        Ok(())
    }

    fn wait_for(&self, idx: usize, cell: &AtomicU32) -> Result<u32> {
        let stripe = &self.stripes[idx % WAIT_STRIPES];
        let mut guard = stripe.lock.lock();
        stripe.waiters.fetch_add(1, Ordering::SeqCst);
        let outcome = loop {
            let terms = cell.load(Ordering::SeqCst);
            if terms != UNSET {
                break Ok(terms);
            }
            if self.is_poisoned() {
                break Err(SolveError::TablePoisoned);
            }
            stripe.ready.wait(&mut guard);
        };
        stripe.waiters.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    fn cell(&self, number: u64) -> Result<(usize, &AtomicU32)> {
        if number == 0 {
            // Never stored, so a blocking read would never return
            return Err(SolveError::InvalidNumber { number });
        }
        usize::try_from(number)
            .ok()
            .and_then(|idx| self.cells.get(idx).map(|cell| (idx, cell)))
            .ok_or(SolveError::OutOfRange {
                number,
                ceiling: self.ceiling(),
            })
    }
}

impl MemoTable for &SharedMemoTable {
    fn read(&mut self, number: u64) -> Result<u32> {
        SharedMemoTable::read(*self, number)
    }

    fn store(&mut self, number: u64, terms: u32) -> Result<()> {
        SharedMemoTable::store(*self, number, terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_local_table_seeded() {
        let mut table = LocalMemoTable::new(10).unwrap();
        assert_eq!(table.read(1).unwrap(), 1);
        assert_eq!(table.get(2), None);
        assert_eq!(table.ceiling(), 10);
    }

    #[test]
    fn test_local_table_store_and_read() {
        let mut table = LocalMemoTable::new(10).unwrap();
        table.store(2, 2).unwrap();
        assert_eq!(table.read(2).unwrap(), 2);
        assert_eq!(table.get(2), Some(2));
    }

    #[test]
    fn test_local_table_unresolved_and_out_of_range() {
        let mut table = LocalMemoTable::new(10).unwrap();
        assert!(matches!(table.read(5), Err(SolveError::Unresolved { number: 5 })));
        assert!(matches!(
            table.read(11),
            Err(SolveError::OutOfRange { number: 11, ceiling: 10 })
        ));
        assert!(table.store(11, 15).is_err());
    }

    #[test]
    fn test_table_bytes() {
        assert_eq!(table_bytes(9), 40);
        assert_eq!(table_bytes(1_000_000), 4_000_004);
    }

    #[test]
    fn test_shared_table_seeded() {
        let table = SharedMemoTable::new(100).unwrap();
        assert_eq!(table.read(1).unwrap(), 1);
        assert_eq!(table.get(0), None);
        assert_eq!(table.unresolved(), 99);
    }

    #[test]
    fn test_shared_table_out_of_range() {
        let table = SharedMemoTable::new(4).unwrap();
        assert!(matches!(table.read(5), Err(SolveError::OutOfRange { .. })));
        assert!(table.store(5, 6).is_err());
    }

    #[test]
    fn test_shared_read_blocks_until_store() {
        let table = SharedMemoTable::new(16).unwrap();
        let (tx, rx) = mpsc::channel();

        thread::scope(|s| {
            s.spawn(|| {
                tx.send(table.read(7)).unwrap();
            });
            // The reader cannot finish before the cell is stored
            assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
            table.store(7, 17).unwrap();
            assert_eq!(rx.recv().unwrap().unwrap(), 17);
        });
    }

    #[test]
    fn test_shared_store_wakes_every_reader() {
        let table = SharedMemoTable::new(200).unwrap();
        thread::scope(|s| {
            let readers: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (table.read(97), table.read(97 + WAIT_STRIPES as u64))))
                .collect();
            table.store(97, 119).unwrap();
            table.store(97 + WAIT_STRIPES as u64, 26).unwrap();
            for reader in readers {
                let (a, b) = reader.join().unwrap();
                assert_eq!(a.unwrap(), 119);
                assert_eq!(b.unwrap(), 26);
            }
        });
    }

    #[test]
    fn test_poison_releases_blocked_reader() {
        let table = SharedMemoTable::new(16).unwrap();
        thread::scope(|s| {
            let reader = s.spawn(|| table.read(9));
            thread::sleep(Duration::from_millis(20));
            table.poison();
            assert!(matches!(reader.join().unwrap(), Err(SolveError::TablePoisoned)));
        });
        assert!(table.is_poisoned());
        // Set cells stay readable after poisoning
        assert_eq!(table.read(1).unwrap(), 1);
    }

    #[test]
    fn test_trait_through_shared_reference() {
        let table = SharedMemoTable::new(8).unwrap();
        let mut view = &table;
        MemoTable::store(&mut view, 2, 2).unwrap();
        assert_eq!(MemoTable::read(&mut view, 2).unwrap(), 2);
    }
}
