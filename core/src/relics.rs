//! Start-of-level relic triggers. One fixed checklist, run exactly once per
//! level right after generation, before the player's first action. None of
//! these re-enter each other; auto-reveals go through the normal reveal path
//! so masking and on-reveal relics apply to them like any player reveal.

use rand::seq::IndexedRandom;

use crate::catalog::{ChallengeId, Relic};
use crate::engine::LevelEngine;
use crate::events::{EventBus, GameEvent};
use crate::rng::effect_stream;
use crate::state::RunState;
use crate::tile::{FlagColor, TileKind};
use crate::types::Coord2;

pub(crate) fn activate_start_of_level(
    engine: &mut LevelEngine,
    run: &mut RunState,
    bus: &mut EventBus,
) {
    activate_pioneer(engine, run, bus);
    activate_cheapskate(run, bus);
    activate_debt_collector(run, bus);
    activate_fortune_teller(engine, run, bus);
    activate_mathematician(engine, run, bus);
    activate_researcher(engine, run, bus);
    activate_thieves(engine, run, bus);
}

fn unrevealed_unflagged(engine: &LevelEngine, kind: TileKind) -> Vec<Coord2> {
    let board = engine.board();
    board
        .iter_coords()
        .filter(|&coords| {
            let tile = board.tile(coords);
            tile.kind == kind && !tile.revealed && !tile.is_flagged()
        })
        .collect()
}

/// Flags one random unrevealed mine, falling back to a Clover when the board
/// somehow has no mines left to mark.
fn activate_pioneer(engine: &mut LevelEngine, run: &mut RunState, bus: &mut EventBus) {
    if !run.owns_relic(Relic::Pioneer) {
        return;
    }
    let mut stream = effect_stream(run.seed, run.level, "Pioneer", 0);
    let mines = unrevealed_unflagged(engine, TileKind::Mine);
    if let Some(&coords) = mines.choose(&mut stream) {
        engine.board_mut().tile_mut(coords).flag = Some(FlagColor::White);
        run.stats.mines_remaining = run.stats.mines_remaining.saturating_sub(1);
        bus.emit(GameEvent::BoardChanged { reason: "Pioneer" });
        return;
    }
    let clovers = unrevealed_unflagged(engine, TileKind::Challenge(ChallengeId::Clover));
    if let Some(&coords) = clovers.choose(&mut stream) {
        engine.board_mut().tile_mut(coords).flag = Some(FlagColor::White);
        bus.emit(GameEvent::BoardChanged { reason: "Pioneer" });
    }
}

/// Bonus lives for entering a level wealthy.
fn activate_cheapskate(run: &mut RunState, bus: &mut EventBus) {
    let stacks = run.relic_stacks(Relic::Cheapskate);
    if stacks > 0 && run.gold >= 10 {
        run.lives += stacks as i32;
        bus.emit(GameEvent::LifeChanged { delta: stacks as i32 });
    }
}

/// Bonus lives for entering a level in debt.
fn activate_debt_collector(run: &mut RunState, bus: &mut EventBus) {
    let stacks = run.relic_stacks(Relic::DebtCollector);
    if stacks > 0 && run.gold < 0 {
        run.lives += stacks as i32;
        bus.emit(GameEvent::LifeChanged { delta: stacks as i32 });
    }
}

fn activate_fortune_teller(engine: &mut LevelEngine, run: &mut RunState, bus: &mut EventBus) {
    if !run.owns_relic(Relic::FortuneTeller) {
        return;
    }
    let first_ore = engine
        .board()
        .iter_coords()
        .find(|&coords| engine.board().tile(coords).kind == TileKind::Ore
            && !engine.board().tile(coords).revealed);
    if let Some(coords) = first_ore {
        let _ = engine.reveal(run, bus, coords, false);
    }
}

/// Reveals the single highest-valued unrevealed Number; ties are broken
/// uniformly so the pick stays seed-stable.
fn activate_mathematician(engine: &mut LevelEngine, run: &mut RunState, bus: &mut EventBus) {
    if !run.owns_relic(Relic::Mathematician) {
        return;
    }
    let board = engine.board();
    let best = board
        .iter_coords()
        .filter(|&coords| {
            let tile = board.tile(coords);
            tile.kind == TileKind::Number && !tile.revealed
        })
        .map(|coords| board.tile(coords).number)
        .max();
    let Some(best) = best else {
        return;
    };
    let candidates: Vec<Coord2> = board
        .iter_coords()
        .filter(|&coords| {
            let tile = board.tile(coords);
            tile.kind == TileKind::Number && !tile.revealed && tile.number == best
        })
        .collect();
    let mut stream = effect_stream(run.seed, run.level, "Mathematician", 0);
    if let Some(&coords) = candidates.choose(&mut stream) {
        let _ = engine.reveal(run, bus, coords, false);
    }
}

/// Flags one random unrevealed challenge tile in the distinguishing color.
fn activate_researcher(engine: &mut LevelEngine, run: &mut RunState, bus: &mut EventBus) {
    if !run.owns_relic(Relic::Researcher) {
        return;
    }
    let board = engine.board();
    let candidates: Vec<Coord2> = board
        .iter_coords()
        .filter(|&coords| {
            let tile = board.tile(coords);
            matches!(tile.kind, TileKind::Challenge(_)) && !tile.revealed && !tile.is_flagged()
        })
        .collect();
    let mut stream = effect_stream(run.seed, run.level, "Researcher", 0);
    if let Some(&coords) = candidates.choose(&mut stream) {
        engine.board_mut().tile_mut(coords).flag = Some(FlagColor::Yellow);
        bus.emit(GameEvent::BoardChanged { reason: "Researcher" });
    }
}

/// Ambient theft: each Thief tile on the board takes one random owned
/// collectible at level start, whether or not it is ever revealed.
fn activate_thieves(engine: &mut LevelEngine, run: &mut RunState, bus: &mut EventBus) {
    let thieves = engine
        .board()
        .iter_coords()
        .filter(|&coords| {
            engine.board().tile(coords).kind == TileKind::Challenge(ChallengeId::Thief)
        })
        .count();
    for offset in 0..thieves as u64 {
        let mut stream = effect_stream(run.seed, run.level, "Thief", offset);
        if run.steal_random_relic(&mut stream).is_some() {
            bus.emit(GameEvent::BoardChanged { reason: "Thief" });
        }
    }
}
