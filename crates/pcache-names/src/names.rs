//! Name validation.
//!
//! Valid names:
//! - Must be non-empty and at most [`MAX_NAME_LEN`] bytes
//! - Must consist of printable ASCII
//! - Must not contain whitespace or `/`
//! - Must not start with `.`

use crate::error::{NameError, Result};

/// Longest accepted name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

fn invalid(name: &str, reason: impl Into<String>) -> NameError {
    NameError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use pcache_names::validate_name;
///
/// assert!(validate_name("QmNodeKey").is_ok());
/// assert!(validate_name("").is_err());
/// assert!(validate_name("has space").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(
            name,
            format!("longer than {MAX_NAME_LEN} bytes"),
        ));
    }
    if let Some(ch) = name.chars().find(|c| !c.is_ascii_graphic()) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains('/') {
        return Err(invalid(name, "must not contain '/'"));
    }
    if name.starts_with('.') {
        return Err(invalid(name, "must not start with '.'"));
    }
    Ok(())
}
