//! Head sets: the change identifiers that summarize a replica's version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

/// Identifier of one change in a replica's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeId {
    pub peer: u64,
    pub counter: i32,
}

impl ChangeId {
    pub fn new(peer: u64, counter: i32) -> Self {
        Self { peer, counter }
    }
}

impl Display for ChangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:016x}", self.counter, self.peer)
    }
}

/// The tips of a document's change graph.
///
/// Equality is set equality: the order in which an engine reports its heads
/// does not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Heads(BTreeSet<ChangeId>);

impl Heads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &ChangeId) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeId> {
        self.0.iter()
    }
}

impl FromIterator<ChangeId> for Heads {
    fn from_iter<I: IntoIterator<Item = ChangeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<&loro::Frontiers> for Heads {
    fn from(frontiers: &loro::Frontiers) -> Self {
        frontiers
            .iter()
            .map(|id| ChangeId::new(id.peer, id.counter))
            .collect()
    }
}

impl Display for Heads {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "]")
    }
}
