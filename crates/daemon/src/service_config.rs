use std::path::PathBuf;
use std::time::Duration;

use common::prelude::Recipients;

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// Port for the API HTTP server
    pub api_port: u16,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,
    /// policy of the root directory for a fresh store
    pub root_recipients: Recipients,
    /// bound on waiting for the store's snapshot and commit locks
    pub lock_timeout: Duration,

    // request handling
    /// file suffix that marks a secret in listings
    pub container_suffix: String,
    /// header carrying the caller's identity
    pub identity_header: String,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
