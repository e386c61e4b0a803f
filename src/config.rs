//! The explicit configuration the server is built from.

use std::path::{Path, PathBuf};

use time::Duration;

use crate::{
    Error, auth::DEFAULT_COOKIE_DURATION, normalize::SynonymTable, scheme::Scheme,
    timezone::get_local_offset,
};

/// The default request body limit for uploads, 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const CHALLAN_DIR: &str = "remittance_challans";

/// The directory tree the canonical artifacts and remittance challans are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Use `root` as the storage root, resolving it to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidConfig] if the path cannot be made absolute.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = std::path::absolute(root.as_ref()).map_err(|error| {
            Error::InvalidConfig(format!(
                "could not resolve storage root {}: {error}",
                root.as_ref().display()
            ))
        })?;

        Ok(Self { root })
    }

    /// The absolute storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the artifacts of `scheme` are written.
    pub fn processed_dir(&self, scheme: Scheme) -> PathBuf {
        self.root.join(scheme.output_dir())
    }

    /// Where remittance challans are written.
    pub fn challan_dir(&self) -> PathBuf {
        self.root.join(CHALLAN_DIR)
    }
}

/// Everything the server needs to know, built once at start-up.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// The secret the private cookie key is derived from.
    pub cookie_secret: String,
    /// How long a session lasts without activity.
    pub session_duration: Duration,
    /// The canonical timezone name used for "today", e.g. "Asia/Kolkata".
    pub local_timezone: String,
    pub storage: StorageConfig,
    /// The header synonyms used to reconcile uploaded spreadsheets.
    pub column_synonyms: SynonymTable,
    /// The request body limit for uploads.
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// A config with the default session length, timezone, synonyms and upload limit.
    pub fn new(cookie_secret: &str, storage: StorageConfig) -> Self {
        Self {
            cookie_secret: cookie_secret.to_owned(),
            session_duration: DEFAULT_COOKIE_DURATION,
            local_timezone: "Etc/UTC".to_owned(),
            storage,
            column_synonyms: SynonymTable::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Check the config before the server starts.
    ///
    /// # Errors
    ///
    /// - [Error::InvalidConfig] if the cookie secret is empty, the session length is
    ///   not positive or the synonym table is incomplete.
    /// - [Error::InvalidTimezoneError] if the timezone name is not known.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cookie_secret.is_empty() {
            return Err(Error::InvalidConfig("the cookie secret is empty".to_owned()));
        }

        if !self.session_duration.is_positive() {
            return Err(Error::InvalidConfig(
                "the session duration must be positive".to_owned(),
            ));
        }

        if get_local_offset(&self.local_timezone).is_none() {
            return Err(Error::InvalidTimezoneError(self.local_timezone.clone()));
        }

        self.column_synonyms.validate()
    }
}

#[cfg(test)]
mod config_tests {
    use std::path::Path;

    use time::Duration;

    use crate::{
        Error,
        config::{AppConfig, StorageConfig},
        scheme::Scheme,
    };

    fn valid_config() -> AppConfig {
        AppConfig::new("secret", StorageConfig::new("/srv/payroll").unwrap())
    }

    #[test]
    fn storage_paths_live_under_root() {
        let storage = StorageConfig::new("/srv/payroll").unwrap();

        assert_eq!(
            storage.processed_dir(Scheme::StateInsurance),
            Path::new("/srv/payroll/processed_esi")
        );
        assert_eq!(
            storage.challan_dir(),
            Path::new("/srv/payroll/remittance_challans")
        );
    }

    #[test]
    fn relative_root_is_made_absolute() {
        let storage = StorageConfig::new("data").unwrap();

        assert!(storage.root().is_absolute());
        assert!(storage.root().ends_with("data"));
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let mut config = valid_config();
        config.local_timezone = "Nowhere/Special".to_owned();

        assert_eq!(
            config.validate(),
            Err(Error::InvalidTimezoneError("Nowhere/Special".to_owned()))
        );
    }

    #[test]
    fn rejects_empty_secret_and_zero_session() {
        let mut config = valid_config();
        config.cookie_secret.clear();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = valid_config();
        config.session_duration = Duration::ZERO;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_incomplete_synonyms() {
        let mut config = valid_config();
        config.column_synonyms.pf.clear();

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
