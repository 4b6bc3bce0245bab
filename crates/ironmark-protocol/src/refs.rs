use serde::{Deserialize, Serialize};

use crate::{Coord, EntityId, FactionId};

/// Weak, identity-stable reference to an entity across world snapshots.
///
/// Carries the display name captured at reference creation so the referent can
/// still be named after it is gone. Never extends the referent's lifetime:
/// resolution against any snapshot yields `None` once the entity's slot has
/// been reused or cleared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub name: String,
}

/// Weak reference to a faction across world snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionRef {
    pub id: FactionId,
    pub name: String,
}

/// Reference to a site. Sites are fixed for a scenario, so the coordinate is
/// the identity; resolution still fails on a grid of different dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    pub at: Coord,
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl std::fmt::Display for FactionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
