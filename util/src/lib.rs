//! Small error type shared across the workspace's crate boundaries.
//!
//! Kept deliberately tiny: each crate still defines its own `Error` enum for the failures that
//! are specific to it (compile errors, image-load errors, CLI errors), `From`-converting into it
//! from `ParseEnumError` where a wire string failed to match a known tag.

use std::{error::Error, fmt};

/// Failure to parse a string as one of an enum's known tags (e.g. an opcode mnemonic or wire
/// string that doesn't match any variant).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseEnumError {
    pub value: String,
    pub enum_name: &'static str,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\" is not a known {}", &self.value, &self.enum_name)
    }
}

impl Error for ParseEnumError {}
