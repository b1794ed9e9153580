use std::sync::atomic::{AtomicU32, Ordering};

/// Shared ceiling on successful fetches.
///
/// A slot is reserved before a fetch is dispatched and given back if the
/// fetch fails, so the count never passes `limit`, even while fetches are in
/// flight.
#[derive(Debug)]
pub(crate) struct FetchBudget {
    used: AtomicU32,
    limit: u32,
}

impl FetchBudget {
    pub(crate) fn new(limit: u32) -> Self {
        Self {
            used: AtomicU32::new(0),
            limit,
        }
    }

    pub(crate) fn limit(&self) -> u32 {
        self.limit
    }

    /// Takes a slot; `false` when the budget is spent.
    pub(crate) fn try_reserve(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    /// Returns a slot taken by a fetch that did not succeed.
    pub(crate) fn release(&self) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| used.checked_sub(1));
    }

    /// Reserved slots, i.e. successful fetches plus fetches still in flight.
    pub(crate) fn used(&self) -> u32 {
        self.used.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn reserve_stops_at_limit() {
        let budget = FetchBudget::new(2);
        assert!(budget.try_reserve());
        assert!(budget.try_reserve());
        assert!(!budget.try_reserve());
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn release_frees_a_slot() {
        let budget = FetchBudget::new(1);
        assert!(budget.try_reserve());
        budget.release();
        assert_eq!(budget.used(), 0);
        assert!(budget.try_reserve());
    }

    #[test]
    fn release_never_underflows() {
        let budget = FetchBudget::new(3);
        budget.release();
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn zero_limit_admits_nothing() {
        let budget = FetchBudget::new(0);
        assert!(!budget.try_reserve());
    }

    #[test]
    fn concurrent_reservations_never_exceed_limit() {
        const LIMIT: u32 = 1_000;
        let budget = Arc::new(FetchBudget::new(LIMIT));
        let granted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let budget = budget.clone();
                let granted = granted.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        if budget.try_reserve() {
                            granted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::Relaxed), LIMIT as usize);
        assert_eq!(budget.used(), LIMIT);
    }
}
