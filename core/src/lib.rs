//! Deterministic core for a roguelike minesweeper: seed-driven level
//! generation and the reveal rule engine, sharing one run-state model. The
//! presentation layer drives it through [`generate_level`], the
//! [`LevelEngine`] entry points, and the [`EventBus`]; nothing here knows how
//! tiles are drawn.

pub use board::*;
pub use catalog::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use generator::*;
pub use rng::*;
pub use state::*;
pub use tile::*;
pub use types::*;

mod board;
mod catalog;
mod engine;
mod error;
mod events;
mod generator;
mod relics;
mod rng;
mod state;
mod tile;
mod types;
