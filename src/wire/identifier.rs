// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::fail::Fail;

use std::fmt;

//==============================================================================
// Identifier
//==============================================================================

/// The wire name-space type: a non-empty string matching
/// `[A-Za-z_][A-Za-z_0-9]*`. Used for method names and remote-error type
/// tags.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Identifier(String);

/// Associate functions for [Identifier].
impl Identifier {
    pub fn is_leader(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }

    pub fn is_follower(c: u8) -> bool {
        Identifier::is_leader(c) || c.is_ascii_digit()
    }

    /// Creates an identifier, validating the grammar.
    pub fn new<S: Into<String>>(name: S) -> Result<Self, Fail> {
        let name = name.into();
        let bytes = name.as_bytes();
        let valid = match bytes.split_first() {
            None => false,
            Some((first, rest)) => {
                Identifier::is_leader(*first)
                    && rest.iter().all(|c| Identifier::is_follower(*c))
            }
        };
        if !valid {
            return Err(Fail::parse(format!("invalid identifier '{}'", name)));
        }
        Ok(Identifier(name))
    }

    /// Wraps a string the caller has already validated.
    pub(crate) fn from_validated(name: String) -> Self {
        debug_assert!(Identifier::new(name.clone()).is_ok());
        Identifier(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Display trait implementation for [Identifier].
impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identifiers() {
        for name in &["a", "_", "add", "encode_frame", "CamelCase9"] {
            assert!(Identifier::new(*name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn rejects_invalid_identifiers() {
        for name in &["", "9lives", "has space", "dash-ed", "utf8é"] {
            assert!(Identifier::new(*name).is_err(), "{}", name);
        }
    }

    #[test]
    fn ordering_is_lexical() {
        let a = Identifier::new("abc").unwrap();
        let b = Identifier::new("abd").unwrap();
        assert!(a < b);
    }
}
