//! API credential handling
//!
//! The key is held only by the session and the clients built from it. It is
//! never logged, formats as `***`, and its buffer is zeroed on drop.

use std::fmt;

use zeroize::Zeroizing;

use crate::{PdfQaError, Result};

const REDACTED: &str = "***";

/// A provider API key.
#[derive(Clone)]
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    /// Wrap a key, rejecting empty or whitespace-only input.
    pub fn new(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(PdfQaError::MissingCredential);
        }
        Ok(Self(Zeroizing::new(key.to_string())))
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replace any occurrence of the key in `text`.
    pub fn redact(&self, text: &str) -> String {
        text.replace(self.expose(), REDACTED)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&REDACTED).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl PartialEq for ApiKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for ApiKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(ApiKey::new(""), Err(PdfQaError::MissingCredential)));
        assert!(matches!(
            ApiKey::new("   \n"),
            Err(PdfQaError::MissingCredential)
        ));
    }

    #[test]
    fn test_key_is_trimmed() {
        let key = ApiKey::new("  sk-abc \n").unwrap();
        assert_eq!(key.expose(), "sk-abc");
    }

    #[test]
    fn test_formatting_hides_key() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert_eq!(format!("{}", key), "***");
        assert!(!format!("{:?}", key).contains("sk-secret"));
    }

    #[test]
    fn test_redact() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert_eq!(
            key.redact("bad key sk-secret supplied"),
            "bad key *** supplied"
        );
    }
}
