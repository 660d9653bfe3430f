use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::tile::Tile;
use crate::types::{mult, neighbors_of, CellCount, Coord, Coord2, Neighbors, ToNdIndex};

/// Level-scoped grid of tiles. Produced fresh by the generator each level and
/// owned by that level's engine until the level ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    tiles: Array2<Tile>,
}

impl Board {
    pub fn new((width, height): Coord2) -> Self {
        let width = width.clamp(1, Coord::MAX);
        let height = height.clamp(1, Coord::MAX);
        Self {
            tiles: Array2::default((width as usize, height as usize)),
        }
    }

    pub fn size(&self) -> Coord2 {
        let dim = self.tiles.dim();
        (dim.0 as Coord, dim.1 as Coord)
    }

    pub fn total_cells(&self) -> CellCount {
        let (width, height) = self.size();
        mult(width, height)
    }

    /// Row-major index of `coords`, used to salt per-tile RNG streams.
    pub fn flat_index(&self, (x, y): Coord2) -> CellCount {
        let (width, _) = self.size();
        CellCount::from(y) * CellCount::from(width) + CellCount::from(x)
    }

    pub fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        let (width, height) = self.size();
        if coords.0 < width && coords.1 < height {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    pub fn tile(&self, coords: Coord2) -> &Tile {
        &self.tiles[coords.to_nd_index()]
    }

    pub(crate) fn tile_mut(&mut self, coords: Coord2) -> &mut Tile {
        &mut self.tiles[coords.to_nd_index()]
    }

    pub fn neighbors(&self, coords: Coord2) -> Neighbors {
        neighbors_of(coords, self.size())
    }

    pub fn corners(&self) -> [Coord2; 4] {
        let (width, height) = self.size();
        [
            (0, 0),
            (width - 1, 0),
            (0, height - 1),
            (width - 1, height - 1),
        ]
    }

    /// All coordinates in row-major scan order. First-match effects (auto-flag
    /// and auto-reveal helpers) depend on this order being stable.
    pub fn iter_coords(&self) -> impl Iterator<Item = Coord2> + use<> {
        let (width, height) = self.size();
        (0..height).flat_map(move |y| (0..width).map(move |x| (x, y)))
    }

    pub fn adjacent_mine_count(&self, coords: Coord2) -> u8 {
        self.neighbors(coords)
            .iter()
            .filter(|&&pos| self.tile(pos).kind.counts_as_mine())
            .count() as u8
    }
}
