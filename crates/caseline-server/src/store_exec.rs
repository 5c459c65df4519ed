// SPDX-License-Identifier: Apache-2.0

use crate::config::StoreConfig;
use caseline_store::{configure_connection, open_database, StoreError};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::error;

/// A store call that did not produce a domain result.
#[derive(Debug)]
pub enum ExecError {
    Timeout,
    Canceled,
    Store(StoreError),
}

impl From<StoreError> for ExecError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Owns database access for the server. SQLite permits many readers under
/// WAL but exactly one writer, so writes funnel through a single permit and
/// reads through a bounded pool. Each blocking task opens its own
/// connection; pragmas are re-applied per connection.
pub struct StoreHandle {
    db_path: PathBuf,
    write_permit: Arc<Semaphore>,
    read_permits: Arc<Semaphore>,
    sql_timeout: Duration,
}

impl StoreHandle {
    /// Opens (and migrates) the database, then hands back the executor.
    pub fn open(cfg: &StoreConfig, sql_timeout: Duration) -> Result<Arc<Self>, StoreError> {
        let conn = open_database(&cfg.db_path)?;
        drop(conn);
        Ok(Arc::new(Self {
            db_path: cfg.db_path.clone(),
            write_permit: Arc::new(Semaphore::new(1)),
            read_permits: Arc::new(Semaphore::new(cfg.max_read_connections)),
            sql_timeout,
        }))
    }

    pub async fn read<T, F>(&self, op: F) -> Result<T, ExecError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let permit = Arc::clone(&self.read_permits)
            .acquire_owned()
            .await
            .map_err(|_| ExecError::Canceled)?;
        let path = self.db_path.clone();
        let fut = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let conn = open_connection(&path)?;
            op(&conn)
        });
        match timeout(self.sql_timeout, fut).await {
            Err(_) => Err(ExecError::Timeout),
            Ok(Err(join_err)) => {
                error!("store read task failed: {join_err}");
                Err(ExecError::Canceled)
            }
            Ok(Ok(result)) => result.map_err(|e| ExecError::Store(e.normalize())),
        }
    }

    pub async fn write<T, F>(&self, op: F) -> Result<T, ExecError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let permit = Arc::clone(&self.write_permit)
            .acquire_owned()
            .await
            .map_err(|_| ExecError::Canceled)?;
        let path = self.db_path.clone();
        let fut = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut conn = open_connection(&path)?;
            op(&mut conn)
        });
        // A timed-out write still runs to completion on its blocking thread;
        // the permit is released only when the task drops it, so a slow write
        // cannot overlap with the next one.
        match timeout(self.sql_timeout, fut).await {
            Err(_) => Err(ExecError::Timeout),
            Ok(Err(join_err)) => {
                error!("store write task failed: {join_err}");
                Err(ExecError::Canceled)
            }
            Ok(Ok(result)) => result.map_err(|e| ExecError::Store(e.normalize())),
        }
    }
}

fn open_connection(path: &PathBuf) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    configure_connection(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseline_model::{EmployeeDraft, RequestDraft};
    use chrono::Utc;

    fn handle(dir: &tempfile::TempDir) -> Arc<StoreHandle> {
        let cfg = StoreConfig {
            db_path: dir.path().join("test.sqlite"),
            max_read_connections: 4,
            cursor_secret: vec![1; 32],
        };
        StoreHandle::open(&cfg, Duration::from_secs(5)).expect("open")
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = handle(&dir);
        let created = store
            .write(|conn| {
                let draft = RequestDraft::new(
                    EmployeeDraft::new("T. Rao", None, None).expect("employee"),
                    vec![],
                )
                .expect("draft");
                caseline_store::create_request(conn, &draft, Utc::now())
            })
            .await
            .expect("create");
        let id = created.request.id;
        let fetched = store
            .read(move |conn| caseline_store::get_request(conn, id))
            .await
            .expect("get");
        assert_eq!(fetched.request.case_number, created.request.case_number);
    }

    #[tokio::test]
    async fn store_errors_surface_through_the_executor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = handle(&dir);
        let missing = caseline_model::RequestId::new(999).expect("id");
        let err = store
            .read(move |conn| caseline_store::get_request(conn, missing))
            .await
            .expect_err("missing request");
        assert!(matches!(
            err,
            ExecError::Store(StoreError::NotFound { .. })
        ));
    }
}
