// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types and the operation-id validation policy.
//!
//! These identifiers embed a caller-supplied participant string of
//! unbounded length, so the newtypes below wrap an owned `String`
//! rather than a fixed-size buffer.

use std::borrow::Borrow;
use std::fmt;

/// Characters allowed in an `operationId`. `..` and `/` are additionally
/// forbidden even though every character in them is individually allowed,
/// since both are meaningful to a filesystem path.
const OPERATION_ID_CHARS: fn(char) -> bool =
    |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.');

/// Errors from [`validate_operation_id`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvalidOperationId {
    #[error("operation id is empty")]
    Empty,
    #[error("operation id {0:?} contains a character outside [A-Za-z0-9_-:.]")]
    DisallowedChar(String),
    #[error("operation id {0:?} contains a forbidden substring \"..\"")]
    ParentTraversal(String),
    #[error("operation id {0:?} contains a forbidden \"/\"")]
    PathSeparator(String),
}

/// Validate an `operationId` against the allowed character set —
/// `[A-Za-z0-9_\-:.]`, with `..` and `/` forbidden.
///
/// Must be called before any filesystem path is constructed from an id.
pub fn validate_operation_id(id: &str) -> Result<(), InvalidOperationId> {
    if id.is_empty() {
        return Err(InvalidOperationId::Empty);
    }
    if id.contains('/') {
        return Err(InvalidOperationId::PathSeparator(id.to_string()));
    }
    if id.contains("..") {
        return Err(InvalidOperationId::ParentTraversal(id.to_string()));
    }
    if let Some(bad) = id.chars().find(|c| !OPERATION_ID_CHARS(*c)) {
        let _ = bad;
        return Err(InvalidOperationId::DisallowedChar(id.to_string()));
    }
    Ok(())
}

/// Define a simple `String`-backed identifier newtype.
///
/// Generates `Display`, `From<String>`/`From<&str>`, `AsRef<str>`,
/// `Borrow<str>`, `Deref<Target = str>`, and `PartialEq<str>`/`PartialEq<&str>`
/// impls so the type behaves like a string at call sites while staying
/// distinct at the type level.
macro_rules! define_string_id {
    ($(#[$meta:meta])* pub struct $name:ident; unchecked_from) => {
        define_string_id!($(#[$meta])* pub struct $name;);

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };

    ($(#[$meta:meta])* pub struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_string_id! {
    /// A participant in an operation, supplied by the caller (e.g. `"cli"`, `"bridge"`).
    /// Opaque to the ledger beyond equality and use as a map key.
    pub struct ParticipantId;
    unchecked_from
}

define_string_id! {
    /// The id of an `Operation`. Deliberately has no unchecked `From<&str>`/`From<String>` —
    /// construct one through [`OperationId::parse`] or [`OperationId::generate`] so every
    /// id is validated against [`validate_operation_id`] before it is ever used to
    /// construct a filesystem path.
    pub struct OperationId;
}

define_string_id! {
    /// The id of a single `CallFrame`, of the form `call_<participantId>_<counter>_<hex16>`.
    pub struct CallId;
    unchecked_from
}

impl OperationId {
    /// Construct a validated `OperationId`, rejecting ids that fail the
    /// character policy.
    pub fn parse(id: impl Into<String>) -> Result<Self, InvalidOperationId> {
        let id = id.into();
        validate_operation_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh id of the form `YYYYMMDDTHH-MM-SS.sss-<participantId>-<hex8>`.
    ///
    /// Canonicalizes the `:` separators in the timestamp to `-` for
    /// filesystem portability; the validator still accepts `:` for ids
    /// minted elsewhere.
    pub fn generate(now_ms_epoch: u64, participant: &ParticipantId, hex8: &str) -> Self {
        let ts = crate::clock::format_timestamp_compact(now_ms_epoch);
        Self(format!("{ts}-{participant}-{hex8}"))
    }
}

impl CallId {
    /// Generate a fresh call id: `call_<participantId>_<counter>_<hex16>`.
    pub fn generate(participant: &ParticipantId, counter: u64) -> Self {
        let hex16 = random_hex(16);
        Self(format!("call_{participant}_{counter}_{hex16}"))
    }
}

/// A random lowercase-hex string of `len` characters, used for the trailing
/// disambiguator on both `CallId::generate` and `OperationId`'s own
/// generation helper in `oplg-ledger::registry`.
pub fn random_hex(len: usize) -> String {
    nanoid::nanoid!(len, &nanoid_hex_alphabet())
}

fn nanoid_hex_alphabet() -> [char; 16] {
    [
        '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
    ]
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
