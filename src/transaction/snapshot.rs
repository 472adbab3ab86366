use super::TransactionMode;

/// Per-handle transaction context over a cloneable state.
///
/// `begin` takes a copy of the committed state as the working copy; writes go
/// to the working copy, `commit` hands it back to be swapped in and
/// `rollback` discards it. With tables held behind `Arc` the copy is cheap
/// and tables are cloned only when first written.
#[derive(Debug)]
pub struct Transaction<S> {
    mode: Option<TransactionMode>,
    working: Option<S>,
}

impl<S: Clone> Transaction<S> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: None,
            working: None,
        }
    }

    /// Begins a transaction over a copy of `committed`
    pub fn begin(&mut self, mode: TransactionMode, committed: &S) {
        self.mode = Some(mode);
        self.working = Some(committed.clone());
    }

    /// Ends the transaction and returns the working copy to publish
    pub fn commit(&mut self) -> Option<S> {
        self.mode = None;
        self.working.take()
    }

    /// Ends the transaction, dropping every write made in it
    pub fn rollback(&mut self) {
        self.mode = None;
        self.working = None;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.mode.is_some()
    }

    #[must_use]
    pub const fn mode(&self) -> Option<TransactionMode> {
        self.mode
    }

    #[must_use]
    pub const fn working(&self) -> Option<&S> {
        self.working.as_ref()
    }

    pub fn working_mut(&mut self) -> Option<&mut S> {
        self.working.as_mut()
    }
}

impl<S: Clone> Default for Transaction<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_returns_working_copy() {
        let committed = vec![1, 2];
        let mut tx = Transaction::new();
        tx.begin(TransactionMode::Explicit, &committed);
        tx.working_mut().unwrap().push(3);

        assert!(tx.is_active());
        assert_eq!(tx.mode(), Some(TransactionMode::Explicit));
        assert_eq!(tx.commit(), Some(vec![1, 2, 3]));
        assert!(!tx.is_active());
        assert_eq!(committed, vec![1, 2]);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut tx = Transaction::new();
        tx.begin(TransactionMode::Statement, &vec![1]);
        tx.working_mut().unwrap().clear();
        tx.rollback();

        assert!(!tx.is_active());
        assert!(tx.working().is_none());
    }
}
