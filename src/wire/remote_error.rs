// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::fail::Fail;
use crate::wire::identifier::Identifier;
use crate::wire::TupleMapped;

use std::fmt;

//==============================================================================
// Remote Error
//==============================================================================

/// An error reported by the peer in-band: a type tag and a human-readable
/// description. Serialized as a two-field aggregate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteError {
    kind: Identifier,
    description: String,
}

/// Associate functions for [RemoteError].
impl RemoteError {
    pub fn new<S: Into<String>>(kind: Identifier, description: S) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// The error's type tag (e.g. `bad_request`, `method_failed`).
    pub fn kind(&self) -> &Identifier {
        &self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Display trait implementation for [RemoteError].
impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

/// Tuple mapping for [RemoteError]: `{ <type> <description> }`.
impl TupleMapped for RemoteError {
    type Tuple = (Identifier, String);

    fn into_tuple(self) -> Self::Tuple {
        (self.kind, self.description)
    }

    fn from_tuple(tuple: Self::Tuple) -> Result<Self, Fail> {
        let (kind, description) = tuple;
        Ok(RemoteError { kind, description })
    }
}

crate::wire_mapped!(RemoteError);
