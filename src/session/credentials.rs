//! Login credentials.

use std::fmt;

/// Email and password used for the one-time login handshake.
///
/// The password is redacted in `Debug` output so credentials never end up in
/// trace logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Institutional email (the Ariel login name).
    pub email: String,
    password: String,
}

impl Credentials {
    /// Creates a credentials pair.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Returns the password.
    ///
    /// Sensitive: avoid logging the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("student@studenti.unimi.it", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("student@studenti.unimi.it"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_password_accessor() {
        let credentials = Credentials::new("a@b.c", "pw");
        assert_eq!(credentials.password(), "pw");
    }
}
