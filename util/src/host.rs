//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the software checkout.
pub const SW_ROOT_ENV_VAR: &str = "DONKEY_BRIDGE_ROOT";

/// Get the root directory of the software.
///
/// This is the value of `DONKEY_BRIDGE_ROOT` if set, otherwise the current working directory.
pub fn get_sw_root() -> std::io::Result<PathBuf> {
    match std::env::var_os(SW_ROOT_ENV_VAR) {
        Some(root) => Ok(PathBuf::from(root)),
        None => std::env::current_dir(),
    }
}

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<uname::Info> {
    uname::uname()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_uname() {
        let info = get_uname().unwrap();

        assert!(!info.sysname.is_empty());
        assert!(!info.machine.is_empty());
    }
}
