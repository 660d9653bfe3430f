//! Level generation: places every tile kind under the run's modifiers, fixes
//! generation-time decorations, rebuilds the per-level stats block, and runs
//! the start-of-level relic triggers. Placement order is fixed; reordering any
//! step changes which RNG draws feed which decision and silently breaks seed
//! reproducibility.

use rand::RngExt;

use crate::board::Board;
use crate::catalog::{
    ACCOUNTANT_BONUS_CAP, ACCOUNTANT_BONUS_PER_STACK, ChallengeId, DIFFUSER_MINES_PER_STACK,
    MINE_DENSITY_MIN, MINE_DENSITY_SPAN, Relic, SHOP_BASE_SPAWN_CHANCE, SHOP_GUARANTEE_CHANCE,
    SHOP_SPAWN_CHANCE_CAP, ShopItem, base_ore, challenge_cap,
};
use crate::engine::LevelEngine;
use crate::events::{EventBus, GameEvent};
use crate::relics;
use crate::rng::{Stream, level_stream, pick_weighted};
use crate::state::RunState;
use crate::tile::{Direction, TileKind};
use crate::types::{CellCount, Coord2};

/// Builds a fully-determined board for the run's current level and hands it to
/// a fresh engine. Reads the run's owned items to decide what spawns; writes
/// the level stats and effect flags back before any player action.
pub fn generate_level(run: &mut RunState, bus: &mut EventBus, size: Coord2) -> LevelEngine {
    let mut board = Board::new(size);
    let mut stream = level_stream(run.seed, run.level);

    run.begin_level();

    // Exit first, then mines, then ore; each draws from a shrinking pool of
    // still-hidden cells so nothing can be placed twice.
    let exits_placed = place_random(&mut board, &mut stream, 1, TileKind::Exit);
    let mine_target = mine_count(&board, &mut stream, run);
    let mines_placed = place_random(&mut board, &mut stream, mine_target, TileKind::Mine);
    if mines_placed < mine_target {
        log::warn!("mine placement clamped by capacity: {mines_placed} of {mine_target}");
    }
    let ore_target = ore_count(run);
    let ore_placed = place_random(&mut board, &mut stream, ore_target, TileKind::Ore);

    place_challenges(&mut board, &mut stream, run);
    place_shop_tiles(&mut board, &mut stream, run);

    assign_numbers(&mut board);
    assign_compass_directions(&mut board);

    write_stats(&mut board, run, mines_placed, ore_placed, exits_placed);

    bus.emit(GameEvent::LevelStarted { level: run.level });

    let mut engine = LevelEngine::new(board);
    relics::activate_start_of_level(&mut engine, run, bus);
    engine
}

fn mine_count(board: &Board, stream: &mut Stream, run: &RunState) -> CellCount {
    let available = board.total_cells().saturating_sub(1);
    if available == 0 {
        log::warn!("board too small for any mines");
        return 0;
    }
    let density = MINE_DENSITY_MIN + stream.next_f64() * MINE_DENSITY_SPAN;
    let base = (density * f64::from(available)) as CellCount;
    let reduction = u16::try_from(run.relic_stacks(Relic::Diffuser))
        .unwrap_or(u16::MAX)
        .saturating_mul(DIFFUSER_MINES_PER_STACK);
    base.saturating_sub(reduction).clamp(1, available)
}

fn ore_count(run: &RunState) -> CellCount {
    let bonus = u16::try_from(run.relic_stacks(Relic::Entrepreneur)).unwrap_or(u16::MAX);
    base_ore(run.level).saturating_add(bonus)
}

/// Uniform sampling without replacement over the remaining hidden cells.
fn place_random(board: &mut Board, stream: &mut Stream, count: CellCount, kind: TileKind) -> CellCount {
    let mut pool: Vec<Coord2> = board
        .iter_coords()
        .filter(|&coords| board.tile(coords).kind == TileKind::Hidden)
        .collect();
    let mut placed = 0;
    while placed < count && !pool.is_empty() {
        let pick = stream.random_range(0..pool.len());
        let coords = pool.swap_remove(pick);
        board.tile_mut(coords).kind = kind;
        placed += 1;
    }
    placed
}

/// Prefers a hidden cell with at least 2 adjacent mines so special tiles do
/// not sit alone in open terrain where adjacency trivially exposes them.
fn place_special_near_mines(board: &mut Board, stream: &mut Stream, kind: TileKind) -> CellCount {
    let candidates: Vec<Coord2> = board
        .iter_coords()
        .filter(|&coords| {
            board.tile(coords).kind == TileKind::Hidden && strict_mine_neighbors(board, coords) >= 2
        })
        .collect();
    if candidates.is_empty() {
        return place_random(board, stream, 1, kind);
    }
    let pick = stream.random_range(0..candidates.len());
    board.tile_mut(candidates[pick]).kind = kind;
    1
}

fn strict_mine_neighbors(board: &Board, coords: Coord2) -> u8 {
    board
        .neighbors(coords)
        .iter()
        .filter(|&&pos| board.tile(pos).kind == TileKind::Mine)
        .count() as u8
}

/// Every drafted challenge appears at least once; the remaining per-level
/// budget is filled by weighted draws so heavier bands and deeper stacks spawn
/// noticeably more copies.
fn place_challenges(board: &mut Board, stream: &mut Stream, run: &RunState) {
    let cap = challenge_cap(run.level);
    let drafted: Vec<(ChallengeId, u32)> = ChallengeId::ALL
        .into_iter()
        .filter(|id| id.spawn_band().is_some())
        .filter_map(|id| {
            let stacks = run.challenge_stacks(id);
            (stacks > 0).then_some((id, stacks))
        })
        .collect();
    if drafted.is_empty() {
        return;
    }

    let mut placed = 0;
    for &(id, _) in &drafted {
        if placed >= cap {
            log::warn!("challenge guarantee truncated by per-level cap {cap}");
            break;
        }
        placed += place_special_near_mines(board, stream, TileKind::Challenge(id));
    }

    let weights: Vec<(ChallengeId, u32)> = drafted
        .iter()
        .map(|&(id, stacks)| {
            let target = id.spawn_band().map_or(0, |band| band.target());
            (id, target.saturating_mul(stacks))
        })
        .collect();
    for _ in placed..cap {
        let Some(&id) = pick_weighted(stream, &weights) else {
            break;
        };
        if stream.chance(0.5) {
            place_special_near_mines(board, stream, TileKind::Challenge(id));
        }
    }
}

fn place_shop_tiles(board: &mut Board, stream: &mut Stream, run: &RunState) {
    let bonus = (f64::from(run.relic_stacks(Relic::Accountant)) * ACCOUNTANT_BONUS_PER_STACK)
        .min(ACCOUNTANT_BONUS_CAP);
    let stack_chance = (SHOP_BASE_SPAWN_CHANCE + bonus).min(SHOP_SPAWN_CHANCE_CAP);

    for item in ShopItem::ALL {
        let stacks = run.shop_stacks(item);
        if stacks == 0 {
            continue;
        }
        let mut copies = 0;
        if stream.chance(SHOP_GUARANTEE_CHANCE) {
            copies += place_special_near_mines(board, stream, TileKind::Shop(item));
        }
        for _ in 1..stacks {
            if item.once_per_board() && copies >= 1 {
                break;
            }
            if stream.chance(stack_chance) {
                copies += place_special_near_mines(board, stream, TileKind::Shop(item));
            }
        }
    }

    // Every level offers at least one life-restoring tile.
    let has_one_up = board
        .iter_coords()
        .any(|coords| board.tile(coords).kind == TileKind::Shop(ShopItem::OneUp));
    if !has_one_up {
        place_special_near_mines(board, stream, TileKind::Shop(ShopItem::OneUp));
    }
}

/// Remaining hidden cells become Safe or Number from 8-neighbor adjacency.
pub(crate) fn assign_numbers(board: &mut Board) {
    let coords: Vec<Coord2> = board.iter_coords().collect();
    for pos in coords {
        if board.tile(pos).kind != TileKind::Hidden {
            continue;
        }
        let count = board.adjacent_mine_count(pos);
        let tile = board.tile_mut(pos);
        tile.number = count;
        tile.kind = if count == 0 { TileKind::Safe } else { TileKind::Number };
    }
}

fn assign_compass_directions(board: &mut Board) {
    let exits: Vec<Coord2> = board
        .iter_coords()
        .filter(|&coords| board.tile(coords).kind == TileKind::Exit)
        .collect();
    let compasses: Vec<Coord2> = board
        .iter_coords()
        .filter(|&coords| board.tile(coords).kind == TileKind::Shop(ShopItem::Compass))
        .collect();
    for coords in compasses {
        board.tile_mut(coords).compass = compass_direction(coords, &exits);
    }
}

/// Direction toward the Manhattan-nearest exit, frozen at generation. The
/// axis with the greater absolute delta wins; vertical wins the tie.
pub(crate) fn compass_direction(from: Coord2, exits: &[Coord2]) -> Option<Direction> {
    let nearest = exits.iter().min_by_key(|&&(x, y)| {
        i32::from(x).abs_diff(from.0.into()) + i32::from(y).abs_diff(from.1.into())
    })?;
    let dx = i32::from(nearest.0) - i32::from(from.0);
    let dy = i32::from(nearest.1) - i32::from(from.1);
    Some(if dx.abs() > dy.abs() {
        if dx >= 0 { Direction::Right } else { Direction::Left }
    } else if dy >= 0 {
        Direction::Down
    } else {
        Direction::Up
    })
}

fn write_stats(
    board: &mut Board,
    run: &mut RunState,
    mines_placed: CellCount,
    ore_placed: CellCount,
    exits_placed: CellCount,
) {
    run.stats.mines_remaining = mines_placed;
    run.stats.ore_remaining = ore_placed;
    run.stats.exits_remaining = exits_placed;
    for coords in board.iter_coords() {
        match board.tile(coords).kind {
            TileKind::Shop(item) => *run.stats.shop_counts.entry(item).or_insert(0) += 1,
            TileKind::Challenge(id) => *run.stats.challenge_counts.entry(id).or_insert(0) += 1,
            _ => {}
        }
    }
    run.stats.shop_remaining = run.stats.shop_counts.values().sum();
    run.stats.challenge_remaining = run.stats.challenge_counts.values().sum();

    // These three act from level start whenever their tile is on the board at
    // all, on top of arming again when revealed.
    let armed = |id: ChallengeId| run.stats.challenge_counts.get(&id).is_some_and(|&n| n > 0);
    run.effects.car_loan = armed(ChallengeId::CarLoan);
    run.effects.atm_fee = armed(ChallengeId::AtmFee);
    run.effects.blood_diamond = armed(ChallengeId::BloodDiamond);

    log::debug!(
        "level {} generated: {} mines, {} ore, {} shop, {} challenge",
        run.level,
        run.stats.mines_remaining,
        run.stats.ore_remaining,
        run.stats.shop_remaining,
        run.stats.challenge_remaining,
    );
}
