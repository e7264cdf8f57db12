use thiserror::Error;

use crate::rate::InvalidRate;

/// Everything a shaping request can fail with.
///
/// `InvalidRate`, `InvalidInterface`, `Unsupported` and `RedirectDeviceBusy` are raised
/// before any command runs. `CommandFailed` and `PermissionDenied` come from the
/// command boundary; by then the orchestrator has already attempted a rollback.
#[derive(Debug, Error)]
pub enum ShapingError {
    #[error(transparent)]
    InvalidRate(#[from] InvalidRate),

    #[error("invalid interface name {0:?}")]
    InvalidInterface(String),

    /// Traffic control is not available on this host.
    #[error("traffic shaping is not supported on this platform")]
    Unsupported,

    #[error("command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("permission denied running {command}: {reason}")]
    PermissionDenied { command: String, reason: String },

    /// The single redirect device already carries another interface's upload limit.
    #[error("upload shaping is already active on {holder}; remove it first")]
    RedirectDeviceBusy { holder: String },
}

/// Max length of a Linux interface name (IFNAMSIZ minus the trailing NUL).
const MAX_IFNAME_LEN: usize = 15;

/// Reject names that could not be a kernel interface or could be read as a flag.
pub fn validate_interface(name: &str) -> Result<(), ShapingError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_IFNAME_LEN
        && !name.starts_with('-')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'@' | b':'));
    if ok {
        Ok(())
    } else {
        Err(ShapingError::InvalidInterface(name.to_string()))
    }
}
