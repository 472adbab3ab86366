/// Batch state of a handle.
///
/// `Idle` between calls, `InBatch` while statements of one `query` call run,
/// `InTransaction` while an explicit transaction is open and `Failed` once a
/// statement of the current batch has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    InBatch,
    InTransaction,
    Failed,
}

impl ExecutorState {
    /// Start of a `query` call
    #[must_use]
    pub const fn start_batch(self, in_transaction: bool) -> Self {
        if in_transaction {
            Self::InTransaction
        } else {
            Self::InBatch
        }
    }

    /// State after a statement ran successfully, given whether an explicit
    /// transaction is open afterwards
    #[must_use]
    pub const fn after_statement(self, in_transaction: bool) -> Self {
        match self {
            Self::Failed => Self::Failed,
            _ if in_transaction => Self::InTransaction,
            _ => Self::InBatch,
        }
    }

    /// End of a `query` call; a handle left in a transaction stays there
    #[must_use]
    pub const fn end_batch(self, in_transaction: bool) -> Self {
        if in_transaction {
            Self::InTransaction
        } else {
            Self::Idle
        }
    }

    #[must_use]
    pub const fn is_in_transaction(self) -> bool {
        matches!(self, Self::InTransaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_transitions() {
        let state = ExecutorState::Idle.start_batch(false);
        assert_eq!(state, ExecutorState::InBatch);

        let state = state.after_statement(true);
        assert_eq!(state, ExecutorState::InTransaction);

        let state = state.after_statement(false);
        assert_eq!(state, ExecutorState::InBatch);
        assert_eq!(state.end_batch(false), ExecutorState::Idle);
    }

    #[test]
    fn test_failed_is_sticky_within_batch() {
        let state = ExecutorState::Failed.after_statement(true);
        assert_eq!(state, ExecutorState::Failed);
        assert_eq!(state.end_batch(true), ExecutorState::InTransaction);
    }
}
