//! Identifier newtypes for ledger entities.
//!
//! Addresses and operation handles are opaque to this client: they are
//! validated for bounds and character set on ingest and otherwise passed
//! through unchanged. Note and tranche identifiers are plain ledger indices.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for an address string.
pub const MAX_ADDRESS_LENGTH: usize = 128;

/// Maximum length for an operation handle string.
pub const MAX_HANDLE_LENGTH: usize = 256;

/// Errors from identifier validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    /// The identifier is empty.
    #[error("{field} cannot be empty")]
    Empty {
        /// Which identifier was rejected.
        field: &'static str,
    },

    /// The identifier exceeds its length bound.
    #[error("{field} exceeds max length: {length} > {max}")]
    TooLong {
        /// Which identifier was rejected.
        field: &'static str,
        /// Actual length.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// The identifier contains a character outside the allowed set.
    #[error("{field} contains invalid character {character:?}")]
    InvalidCharacter {
        /// Which identifier was rejected.
        field: &'static str,
        /// The offending character.
        character: char,
    },
}

/// Validates an opaque identifier string: non-empty, bounded, and restricted
/// to alphanumerics plus `-`, `_`, `.`, and `:`.
fn validate_opaque(value: &str, field: &'static str, max: usize) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty { field });
    }
    if value.len() > max {
        return Err(IdError::TooLong {
            field,
            length: value.len(),
            max,
        });
    }
    if let Some(character) = value
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(IdError::InvalidCharacter { field, character });
    }
    Ok(())
}

/// An account address on the external ledger.
///
/// Opaque to the client; validated for bounds and character set only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Validates and wraps an address string.
    ///
    /// # Errors
    ///
    /// Returns `IdError` if the string is empty, too long, or contains
    /// characters outside the allowed set.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_opaque(&value, "address", MAX_ADDRESS_LENGTH)?;
        Ok(Self(value))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a funded note on the ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NoteId(pub u64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "note-{}", self.0)
    }
}

/// Identifier of a funding tranche on the ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrancheId(pub u64);

impl fmt::Display for TrancheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tranche-{}", self.0)
    }
}

/// Opaque receipt for a submitted write operation.
///
/// Issued by the ledger provider on submission; passed back to poll
/// confirmation status. The client never interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationHandle(String);

impl OperationHandle {
    /// Validates and wraps a handle string.
    ///
    /// # Errors
    ///
    /// Returns `IdError` if the string is empty, too long, or contains
    /// characters outside the allowed set.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_opaque(&value, "operation handle", MAX_HANDLE_LENGTH)?;
        Ok(Self(value))
    }

    /// Returns the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OperationHandle {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OperationHandle> for String {
    fn from(handle: OperationHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_accepts_hex_style() {
        let address = Address::new("0xAbC123def").unwrap();
        assert_eq!(address.as_str(), "0xAbC123def");
    }

    #[test]
    fn test_address_rejects_empty() {
        assert!(matches!(
            Address::new(""),
            Err(IdError::Empty { field: "address" })
        ));
    }

    #[test]
    fn test_address_rejects_too_long() {
        let long = "a".repeat(MAX_ADDRESS_LENGTH + 1);
        assert!(matches!(Address::new(long), Err(IdError::TooLong { .. })));
    }

    #[test]
    fn test_address_rejects_invalid_characters() {
        for input in ["with space", "semi;colon", "new\nline", "tab\there"] {
            assert!(
                matches!(Address::new(input), Err(IdError::InvalidCharacter { .. })),
                "expected rejection of {input:?}"
            );
        }
    }

    #[test]
    fn test_address_serde_round_trip() {
        let address = Address::new("0xfeed").unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"0xfeed\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn test_address_deserialization_validates() {
        let result: Result<Address, _> = serde_json::from_str("\"bad address\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_operation_handle_validation() {
        assert!(OperationHandle::new("op-17").is_ok());
        assert!(OperationHandle::new("").is_err());
        assert!(OperationHandle::new("op 17").is_err());
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(NoteId(3).to_string(), "note-3");
        assert_eq!(TrancheId(1).to_string(), "tranche-1");
    }
}
