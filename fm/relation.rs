//! Deduplicated feature groups shared across cases.

/// One auxiliary feature group for a batch of cases.
///
/// Many cases often carry an identical slice of their feature row: every
/// interaction by the same user repeats that user's features, for example.
/// A relation block stores each distinct row once (`matrix`, `B × F`) and
/// maps every case in the batch to the row it reads (`case_to_row`, length
/// `N`). The scoring engine then does `B × F` work per block instead of
/// `N × F`, with results identical to scoring the materialized expansion.
///
/// Caller contract: `case_to_row` has exactly one entry per case of the
/// batch it accompanies, and every entry is a valid row index of `matrix`.
/// The engine checks the mapping length and the total feature width before
/// scoring; it does not check individual entries, so an out-of-range entry
/// panics at lookup time.
#[derive(Debug, Clone)]
pub struct RelationBlock<M> {
    /// The `B × F` matrix of distinct feature rows.
    pub matrix: M,
    /// For each case, the row of `matrix` holding its features.
    pub case_to_row: Vec<usize>,
}

impl<M> RelationBlock<M> {
    pub fn new(matrix: M, case_to_row: Vec<usize>) -> Self {
        Self {
            matrix,
            case_to_row,
        }
    }

    /// Number of cases this block was prepared for.
    pub fn n_cases(&self) -> usize {
        self.case_to_row.len()
    }
}
