//! Session management
//!
//! The [`Session`] is the process-wide context object. It is created once by the executable and
//! passed by reference to each component's constructor. The session epoch is guarded by a single
//! `OnceCell`, so creating more than one session in a process (for example one per test) is
//! allowed and all of them share the same epoch.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which diplays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A struct storing information about the current session
#[derive(Clone, Debug)]
pub struct Session {
    /// Name of the executable which owns the session
    pub exec_name: String,

    /// The root directory for this session, if the session writes to disk
    pub session_root: Option<PathBuf>,

    /// The path to the session's log file, if the session writes to disk
    pub log_file_path: Option<PathBuf>,

    epoch: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot determine the software root directory: {0}")]
    SwRootNotFound(std::io::Error),

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}` under
    /// `{sw_root}/{sessions_dir}`, which will hold the session's log file.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let epoch = init_epoch();

        // Get the root directory
        let root = crate::host::get_sw_root().map_err(SessionError::SwRootNotFound)?;

        // Create the session path
        let mut path: PathBuf = root;
        path.push(sessions_dir);
        path.push(format!("{}_{}", exec_name, epoch.format(TIMESTAMP_FORMAT)));

        // Create the directory
        fs::create_dir_all(&path).map_err(SessionError::CannotCreateDir)?;

        // Create the log file path
        let mut log_file_path = path.clone();
        log_file_path.push(format!("{}.log", exec_name));

        Ok(Session {
            exec_name: exec_name.to_string(),
            session_root: Some(path),
            log_file_path: Some(log_file_path),
            epoch,
        })
    }

    /// Create a session which does not write anything to disk.
    pub fn detached(exec_name: &str) -> Self {
        Session {
            exec_name: exec_name.to_string(),
            session_root: None,
            log_file_path: None,
            epoch: init_epoch(),
        }
    }

    /// The instant the first session of this process was created.
    pub fn epoch(&self) -> &DateTime<Utc> {
        &self.epoch
    }

    /// Number of seconds elapsed since the session epoch.
    pub fn elapsed_seconds(&self) -> f64 {
        time::duration_to_seconds(Utc::now() - self.epoch).unwrap_or(std::f64::NAN)
    }

    /// Current wall-clock time in nanoseconds since the unix epoch, the time base of the lab bus.
    pub fn time_ns(&self) -> u64 {
        time::now_ns()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// Returns `NaN` if no session has been created yet.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => time::duration_to_seconds(Utc::now() - *e).unwrap_or(std::f64::NAN),
        None => std::f64::NAN,
    }
}

/// Return the session's epoch, or `None` if no session has been created yet.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Initialise the session epoch if this has not already been done and return it.
fn init_epoch() -> DateTime<Utc> {
    *SESSION_EPOCH.get_or_init(Utc::now)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sessions_share_epoch() {
        let a = Session::detached("a");
        let b = Session::detached("b");

        assert_eq!(a.epoch(), b.epoch());
        assert_eq!(get_epoch(), Some(a.epoch()));
        assert!(a.log_file_path.is_none());
        assert!(a.elapsed_seconds() >= 0.0);
    }
}
