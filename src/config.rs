//! Runtime Settings
//!
//! Configuration consumed by the cache/health subsystem. The host application
//! owns configuration loading; this module only reads the handful of values
//! the subsystem cares about and treats them as opaque booleans/strings.

/// Settings for the cache and monitoring subsystem.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Distributed cache connection URL. Absence means the local backend
    /// stays active for the whole process lifetime.
    pub redis_url: Option<String>,
    /// Production mode: forces a distributed-cache connection attempt and
    /// gates the admin-only operational endpoints.
    pub production: bool,
    /// Version string reported by the health payload.
    pub version: String,
}

impl Settings {
    /// Build settings from the process environment.
    ///
    /// Reads `REDIS_URL` (optional) and `APP_ENV` (`production` enables
    /// production mode); the version defaults to this crate's version.
    #[must_use]
    pub fn from_env() -> Self {
        let redis_url = std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty());
        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        Self {
            redis_url,
            production,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Local-only settings for development and tests.
    #[must_use]
    pub fn local() -> Self {
        Self {
            redis_url: None,
            production: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}
