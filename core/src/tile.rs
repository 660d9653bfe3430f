use serde::{Deserialize, Serialize};

use crate::catalog::{ChallengeId, ShopItem};

/// Flag paint colors selectable by the player; blue is reserved for
/// engine-placed hint flags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagColor {
    White,
    Yellow,
    Blue,
}

impl Default for FlagColor {
    fn default() -> Self {
        Self::White
    }
}

/// Cardinal hint direction frozen at generation for Compass tiles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Display class a tile can be upgraded into by reveal effects. The numeric
/// payout is applied inside the reveal call; the kind swap is deferred so the
/// presentation layer can animate it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Quartz,
    Ore,
    Diamond,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    /// Pre-generation only; no tile keeps this kind on a finished board.
    Hidden,
    /// Zero-adjacency empty tile.
    Safe,
    /// Carries a 1-8 adjacency count.
    Number,
    Mine,
    Exit,
    Ore,
    Shop(ShopItem),
    Challenge(ChallengeId),
}

impl TileKind {
    pub const fn is_special(self) -> bool {
        matches!(self, Self::Shop(_) | Self::Challenge(_))
    }

    /// Whether this kind contributes to neighbor adjacency counts. Clover and
    /// MegaMine read as mines on the numbers without living in the minefield.
    pub const fn counts_as_mine(self) -> bool {
        matches!(
            self,
            Self::Mine | Self::Challenge(ChallengeId::Clover) | Self::Challenge(ChallengeId::MegaMine)
        )
    }
}

impl Default for TileKind {
    fn default() -> Self {
        Self::Hidden
    }
}

/// One grid cell. Kind is assigned once during placement and only changes
/// through the explicit pending-transform commit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub kind: TileKind,
    pub revealed: bool,
    pub flag: Option<FlagColor>,
    pub number: u8,
    pub compass: Option<Direction>,
    pub pending: Option<ResourceKind>,
    pub math_masked: bool,
    pub random_masked: bool,
    /// Set on a Jackhammer about to be auto-revealed by another Jackhammer so
    /// the two cannot re-trigger each other.
    pub cascade_guard: bool,
}

impl Tile {
    pub const fn is_unrevealed(&self) -> bool {
        !self.revealed
    }

    pub const fn is_flagged(&self) -> bool {
        self.flag.is_some()
    }

    /// A revealed Number whose true value is hidden from the player.
    pub const fn is_masked(&self) -> bool {
        (self.math_masked || self.random_masked) && self.number > 0
    }
}
