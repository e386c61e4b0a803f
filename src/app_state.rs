//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use rusqlite::Connection;
use sha2::{Digest, Sha512};
use time::Duration;

use crate::{
    Error,
    config::{AppConfig, StorageConfig},
    db::initialize,
    normalize::SynonymTable,
};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,

    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,

    /// The local timezone as a canonical timezone name, e.g. "Asia/Kolkata".
    pub local_timezone: String,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,

    /// Where artifacts and remittance challans are written.
    pub storage: StorageConfig,

    /// The header synonyms used to reconcile uploaded spreadsheets.
    pub column_synonyms: Arc<SynonymTable>,

    /// The request body limit for uploads.
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Create a new [AppState] from a SQLite database connection and the server config.
    ///
    /// The config is validated and the database initialized: the tables are
    /// created and legacy dates repaired.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the database cannot be initialized.
    pub fn new(db_connection: Connection, config: AppConfig) -> Result<Self, Error> {
        config.validate()?;
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));

        Ok(Self {
            cookie_key: create_cookie_key(&config.cookie_secret),
            cookie_duration: config.session_duration,
            local_timezone: config.local_timezone,
            db_connection: connection,
            storage: config.storage,
            column_synonyms: Arc::new(config.column_synonyms),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Create a signing key for cookies from a `secret`s string.
pub fn create_cookie_key(secret: &str) -> Key {
    let hash = Sha512::digest(secret);

    Key::from(&hash)
}

#[cfg(test)]
mod app_state_tests {
    use rusqlite::Connection;

    use crate::{
        AppState, Error,
        config::{AppConfig, StorageConfig},
    };

    #[test]
    fn new_state_takes_config_values() {
        let mut config = AppConfig::new("secret", StorageConfig::new("/srv/payroll").unwrap());
        config.local_timezone = "Asia/Kolkata".to_owned();
        config.max_upload_bytes = 1024;

        let state = AppState::new(Connection::open_in_memory().unwrap(), config).unwrap();

        assert_eq!(state.local_timezone, "Asia/Kolkata");
        assert_eq!(state.max_upload_bytes, 1024);
        assert_eq!(state.storage.root().to_str(), Some("/srv/payroll"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AppConfig::new("", StorageConfig::new("/srv/payroll").unwrap());

        let result = AppState::new(Connection::open_in_memory().unwrap(), config);

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
