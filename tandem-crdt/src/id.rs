//! Character identifiers and their total order.
//!
//! Every replica must order identifiers identically, because the order is
//! the tie-breaker that makes concurrent inserts commute. Site ids and
//! clocks compare as a numeric `(site, clock)` tuple; comparing their
//! concatenated decimal forms would order `(19, …)` before `(2, …)`.

use std::fmt;
use std::str::FromStr;

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::woot::CrdtError;

/// Identifier of a character in the sequence.
///
/// The variant order matters: deriving `Ord` makes `Start` compare below
/// every site-minted id and `End` above, with site ids ordered by the
/// `(site, clock)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CharId {
    /// The invisible sentinel bounding the sequence on the left.
    Start,
    /// An id minted by a replica: server-assigned site, per-site clock.
    Site { site: u64, clock: u64 },
    /// The invisible sentinel bounding the sequence on the right.
    End,
}

impl CharId {
    pub fn site(site: u64, clock: u64) -> Self {
        CharId::Site { site, clock }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, CharId::Start | CharId::End)
    }
}

impl fmt::Display for CharId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharId::Start => f.write_str("start"),
            CharId::End => f.write_str("end"),
            CharId::Site { site, clock } => write!(f, "{site}.{clock}"),
        }
    }
}

impl FromStr for CharId {
    type Err = CrdtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(CrdtError::EmptyIdentifier),
            "start" => Ok(CharId::Start),
            "end" => Ok(CharId::End),
            other => {
                let (site, clock) = other
                    .split_once('.')
                    .ok_or_else(|| CrdtError::MalformedIdentifier(other.to_string()))?;
                let site = site
                    .parse()
                    .map_err(|_| CrdtError::MalformedIdentifier(other.to_string()))?;
                let clock = clock
                    .parse()
                    .map_err(|_| CrdtError::MalformedIdentifier(other.to_string()))?;
                Ok(CharId::Site { site, clock })
            }
        }
    }
}

// On the wire and on disk an id is its display form: "start", "end", or
// "<site>.<clock>".
impl Serialize for CharId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CharId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
