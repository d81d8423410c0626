//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{Error, MlClient, db::initialize};

/// The state of the REST server.
///
/// All request state lives in the database, the server keeps nothing else
/// between requests.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// The client for the external ML service.
    pub ml_client: MlClient,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_connection: Connection, ml_client: MlClient) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            db_connection: Arc::new(Mutex::new(db_connection)),
            ml_client,
        })
    }

    /// Close the database connection.
    ///
    /// Should be called once the server has stopped and no handler holds a
    /// clone of the state. If the connection is still shared, it is left to be
    /// closed when the last clone is dropped.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if SQLite failed to close the connection.
    pub fn close(self) -> Result<(), Error> {
        let mutex = match Arc::try_unwrap(self.db_connection) {
            Ok(mutex) => mutex,
            Err(_) => {
                tracing::warn!("Database connection is still in use, it will close when dropped");
                return Ok(());
            }
        };

        let connection = mutex.into_inner().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        connection.close().map_err(|(_, error)| Error::from(error))?;
        tracing::info!("Closed database connection");

        Ok(())
    }
}

/// The state needed by handlers that combine stored data with calls to the ML service.
#[derive(Debug, Clone)]
pub struct AnalysisState {
    /// The database connection for reading expenses and summaries.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The client for the external ML service.
    pub ml_client: MlClient,
}

impl FromRef<AppState> for AnalysisState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            ml_client: state.ml_client.clone(),
        }
    }
}

/// Acquire the database lock, logging and converting a poisoned lock into
/// [Error::DatabaseLockError].
pub(crate) fn lock_connection(
    connection: &Mutex<Connection>,
) -> Result<MutexGuard<'_, Connection>, Error> {
    connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError
    })
}
