//! The data-access collaborator.

use serde_json::{Map, Value};
use thiserror::Error;

/// A row as column name → value.
pub type Row = Map<String, Value>;

/// Errors reported by a data-access implementation.
#[derive(Debug, Error)]
pub enum DataError {
    /// The statement could not be executed.
    #[error("Query failed: {0}")]
    Query(String),

    /// A transaction operation was used out of order.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The store could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Persistence as seen by handlers.
///
/// Statements use positional `?` placeholders bound from `params`.
pub trait DataAccess: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<u64, DataError>;

    /// First row of a query, if any.
    fn fetch(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, DataError>;

    /// All rows of a query.
    fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DataError>;

    /// Insert `row` into `table`, returning the new id.
    fn insert(&self, table: &str, row: &Row) -> Result<i64, DataError>;

    /// Update rows of `table` matching `filter`. Returns whether any row changed.
    fn update(&self, table: &str, row: &Row, filter: &Row) -> Result<bool, DataError>;

    /// Delete rows of `table` matching `filter`. Returns whether any row went away.
    fn delete(&self, table: &str, filter: &Row) -> Result<bool, DataError>;

    fn begin_transaction(&self) -> Result<(), DataError>;

    fn commit(&self) -> Result<(), DataError>;

    fn rollback(&self) -> Result<(), DataError>;
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
///
/// A rollback failure is logged; the error from `f` is the one returned.
pub fn with_transaction<T, E, F>(db: &dyn DataAccess, f: F) -> Result<T, E>
where
    F: FnOnce(&dyn DataAccess) -> Result<T, E>,
    E: From<DataError>,
{
    db.begin_transaction()?;
    match f(db) {
        Ok(value) => {
            db.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = db.rollback() {
                log::error!("Rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Journal {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Journal {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DataAccess for Journal {
        fn query(&self, _: &str, _: &[Value]) -> Result<u64, DataError> {
            self.record("query");
            Ok(1)
        }
        fn fetch(&self, _: &str, _: &[Value]) -> Result<Option<Row>, DataError> {
            Ok(None)
        }
        fn fetch_all(&self, _: &str, _: &[Value]) -> Result<Vec<Row>, DataError> {
            Ok(Vec::new())
        }
        fn insert(&self, _: &str, _: &Row) -> Result<i64, DataError> {
            self.record("insert");
            Ok(7)
        }
        fn update(&self, _: &str, _: &Row, _: &Row) -> Result<bool, DataError> {
            Ok(true)
        }
        fn delete(&self, _: &str, _: &Row) -> Result<bool, DataError> {
            Ok(true)
        }
        fn begin_transaction(&self) -> Result<(), DataError> {
            self.record("begin");
            Ok(())
        }
        fn commit(&self) -> Result<(), DataError> {
            self.record("commit");
            Ok(())
        }
        fn rollback(&self) -> Result<(), DataError> {
            self.record("rollback");
            Ok(())
        }
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let db = Journal::default();
        let id = with_transaction(&db, |db| db.insert("products", &Row::new())).unwrap();
        assert_eq!(id, 7);
        assert_eq!(db.calls(), vec!["begin", "insert", "commit"]);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Journal::default();
        let result: Result<(), DataError> = with_transaction(&db, |db| {
            db.query("UPDATE stock SET qty = qty - 1", &[])?;
            Err(DataError::Query("constraint violated".to_string()))
        });
        assert!(matches!(result, Err(DataError::Query(_))));
        assert_eq!(db.calls(), vec!["begin", "query", "rollback"]);
    }
}
