//! Defines the reimbursement store trait and its SQLite implementation.

mod sqlite;

pub use sqlite::{SqliteReimbursementStore, create_app_state};

use crate::{
    Error,
    reimbursement::{Reimbursement, Status},
};

/// Handles the creation, retrieval and status updates of reimbursements.
///
/// Reimbursements have no natural key: several records may share the same
/// (name, amount) pair, and [ReimbursementStore::set_status] deliberately
/// updates every match in one call.
pub trait ReimbursementStore: Clone + Send + Sync + 'static {
    /// Create a new reimbursement with the status [Status::Uploaded].
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if the record could not be written.
    fn create(&self, name: &str, amount: f64, receipt: &str) -> Result<Reimbursement, Error>;

    /// Retrieve all reimbursements whose status is in `statuses`, in storage
    /// order.
    ///
    /// An empty `statuses` set or no matching records yields an empty vector.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if there is an SQL error.
    fn get_by_status(&self, statuses: &[Status]) -> Result<Vec<Reimbursement>, Error>;

    /// Set the status of every reimbursement matching `name`, `amount` and a
    /// current status in `from` to `to`, returning the number of records
    /// updated.
    ///
    /// Matching zero records is not an error.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if the update could not be applied.
    fn set_status(
        &self,
        name: &str,
        amount: f64,
        from: &[Status],
        to: Status,
    ) -> Result<usize, Error>;
}
