//! Implements a SQLite backed reimbursement store.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params_from_iter, types::Value};
use time::UtcOffset;

use crate::{
    AppState, Error,
    app_state::MailSettings,
    db::initialize,
    mail::Mailer,
    reimbursement::{Reimbursement, Status, map_row},
    store::ReimbursementStore,
};

/// Stores reimbursements in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteReimbursementStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteReimbursementStore {
    /// Create a new store for the SQLite `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }
}

/// Creates an [AppState] instance that uses SQLite for the backend.
///
/// This function will modify the database by adding the table for the domain
/// model.
pub fn create_app_state<M: Mailer>(
    db_connection: Connection,
    mailer: M,
    mail_settings: MailSettings,
    utc_offset: UtcOffset,
) -> Result<AppState<SqliteReimbursementStore, M>, Error> {
    initialize(&db_connection)?;

    let connection = Arc::new(Mutex::new(db_connection));
    let store = SqliteReimbursementStore::new(connection);

    Ok(AppState {
        store,
        mailer,
        mail_settings,
        utc_offset,
    })
}

/// Build an SQL placeholder list like `?2, ?3, ?4` for a status set.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ReimbursementStore for SqliteReimbursementStore {
    /// Create a new reimbursement in the database with the status
    /// [Status::Uploaded].
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if there is an SQL error.
    fn create(&self, name: &str, amount: f64, receipt: &str) -> Result<Reimbursement, Error> {
        let connection = self.connection.lock().unwrap();

        let reimbursement = connection
            .prepare(
                "INSERT INTO reimbursement (name, status, amount, receipt)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, name, status, amount, receipt",
            )?
            .query_row((name, Status::Uploaded, amount, receipt), map_row)?;

        Ok(reimbursement)
    }

    /// Retrieve all reimbursements whose status is in `statuses`, in rowid
    /// order.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if there is an SQL error.
    fn get_by_status(&self, statuses: &[Status]) -> Result<Vec<Reimbursement>, Error> {
        // "IN ()" is a syntax error in SQLite, so short-circuit the empty set.
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let connection = self.connection.lock().unwrap();

        let query = format!(
            "SELECT id, name, status, amount, receipt FROM reimbursement
             WHERE status IN ({})",
            placeholders(1, statuses.len())
        );

        connection
            .prepare(&query)?
            .query_map(
                params_from_iter(statuses.iter().map(|status| status.as_str())),
                map_row,
            )?
            .map(|maybe_reimbursement| maybe_reimbursement.map_err(Error::from))
            .collect()
    }

    /// Set the status of every reimbursement matching `name`, `amount` and a
    /// current status in `from` to `to`.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if there is an SQL error.
    fn set_status(
        &self,
        name: &str,
        amount: f64,
        from: &[Status],
        to: Status,
    ) -> Result<usize, Error> {
        if from.is_empty() {
            return Ok(0);
        }

        let connection = self.connection.lock().unwrap();

        let query = format!(
            "UPDATE reimbursement SET status = ?1
             WHERE name = ?2 AND amount = ?3 AND status IN ({})",
            placeholders(4, from.len())
        );

        let mut params: Vec<Value> = vec![
            Value::from(to.as_str().to_string()),
            Value::from(name.to_string()),
            Value::from(amount),
        ];
        params.extend(from.iter().map(|status| Value::from(status.as_str().to_string())));

        let count = connection.execute(&query, params_from_iter(params))?;

        Ok(count)
    }
}

#[cfg(test)]
mod sqlite_store_tests {
    use rusqlite::Connection;

    use crate::{
        db::initialize,
        reimbursement::{OPEN_STATUSES, Status},
        store::ReimbursementStore,
    };

    use super::SqliteReimbursementStore;

    use std::sync::{Arc, Mutex};

    fn new_test_store() -> SqliteReimbursementStore {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        initialize(&connection).expect("Could not initialize database");

        SqliteReimbursementStore::new(Arc::new(Mutex::new(connection)))
    }

    #[test]
    fn create_sets_status_to_uploaded() {
        let store = new_test_store();

        let reimbursement = store.create("Taxi", 10.0, "r1").unwrap();

        assert_eq!(reimbursement.name, "Taxi");
        assert_eq!(reimbursement.status, Status::Uploaded);
        assert_eq!(reimbursement.amount, 10.0);
        assert_eq!(reimbursement.receipt, "r1");
    }

    #[test]
    fn get_by_status_filters_and_preserves_insertion_order() {
        let store = new_test_store();
        store.create("Taxi", 10.0, "r1").unwrap();
        store.create("Lunch", 20.0, "r2").unwrap();
        store
            .set_status("Lunch", 20.0, &[Status::Uploaded], Status::Closed)
            .unwrap();
        store.create("Hotel", 125.5, "r3").unwrap();

        let uploaded = store.get_by_status(&[Status::Uploaded]).unwrap();

        let names: Vec<&str> = uploaded
            .iter()
            .map(|reimbursement| reimbursement.name.as_str())
            .collect();
        assert_eq!(names, ["Taxi", "Hotel"]);
    }

    #[test]
    fn get_by_status_with_empty_set_yields_nothing() {
        let store = new_test_store();
        store.create("Taxi", 10.0, "r1").unwrap();

        assert_eq!(store.get_by_status(&[]).unwrap(), vec![]);
    }

    #[test]
    fn set_status_updates_all_matching_records() {
        let store = new_test_store();
        store.create("Taxi", 10.0, "r1").unwrap();
        store.create("Taxi", 10.0, "r2").unwrap();
        store.create("Taxi", 99.0, "r3").unwrap();

        let count = store
            .set_status("Taxi", 10.0, &OPEN_STATUSES, Status::Closed)
            .unwrap();

        assert_eq!(count, 2);
        let closed = store.get_by_status(&[Status::Closed]).unwrap();
        assert_eq!(closed.len(), 2);
        let uploaded = store.get_by_status(&[Status::Uploaded]).unwrap();
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].amount, 99.0);
    }

    #[test]
    fn set_status_ignores_records_outside_from_set() {
        let store = new_test_store();
        store.create("Taxi", 10.0, "r1").unwrap();
        store
            .set_status("Taxi", 10.0, &[Status::Uploaded], Status::Submitted)
            .unwrap();

        // A second promotion run must not touch already-submitted records.
        let count = store
            .set_status("Taxi", 10.0, &[Status::Uploaded], Status::Submitted)
            .unwrap();

        assert_eq!(count, 0);
    }

    #[test]
    fn set_status_matching_zero_records_is_a_no_op() {
        let store = new_test_store();

        let count = store
            .set_status("Nothing", 1.0, &OPEN_STATUSES, Status::Closed)
            .unwrap();

        assert_eq!(count, 0);
    }
}
