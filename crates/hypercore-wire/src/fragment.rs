//! Digest fragment keys.
//!
//! A fragmented state digest shares one fresh UUID across all of its
//! fragments; the kind distinguishes the first, middle, and last piece.
//! The wire encoding is `<uuid>_<kind>` and receivers parse at the final
//! underscore.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WireError};

/// Position of a fragment within one digest broadcast.
///
/// Kinds form the sequence `begin, part*, finish`, or a lone `complete`
/// when the digest fits in a single fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    /// The whole digest in one fragment.
    Complete,
    /// First fragment of a multi-part digest.
    Begin,
    /// Middle fragment.
    Part,
    /// Last fragment; finalizes reassembly.
    Finish,
}

impl Display for FragmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Begin => "begin",
            Self::Part => "part",
            Self::Finish => "finish",
        };
        write!(f, "{s}")
    }
}

impl FragmentKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "complete" => Some(Self::Complete),
            "begin" => Some(Self::Begin),
            "part" => Some(Self::Part),
            "finish" => Some(Self::Finish),
            _ => None,
        }
    }
}

/// Key shared by all fragments of one digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentKey {
    /// Fresh UUID minted per broadcast.
    pub id: Uuid,

    /// Position of this fragment.
    pub kind: FragmentKind,
}

impl FragmentKey {
    /// Creates a key for the given broadcast id and kind.
    pub fn new(id: Uuid, kind: FragmentKind) -> Self {
        Self { id, kind }
    }

    /// Parses a `<uuid>_<kind>` string at the final underscore.
    pub fn parse(s: &str) -> Result<Self> {
        let (id, kind) = s
            .rsplit_once('_')
            .ok_or_else(|| WireError::InvalidFragmentKey(s.to_string()))?;

        let id = Uuid::parse_str(id).map_err(|_| WireError::InvalidFragmentKey(s.to_string()))?;
        let kind = FragmentKind::parse(kind)
            .ok_or_else(|| WireError::InvalidFragmentKey(s.to_string()))?;

        Ok(Self { id, kind })
    }
}

impl Display for FragmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.id, self.kind)
    }
}
