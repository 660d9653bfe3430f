//! The reveal engine: one [`LevelEngine`] per generated board, mutating tile
//! and run state for every reveal, cascading through empty regions, and
//! resolving level end. Modifier evaluation order is fixed; every branch that
//! consumes randomness pulls from the per-tile stream in a single documented
//! sequence so replays cannot diverge.

use std::collections::{BTreeSet, VecDeque};

use rand::RngExt;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::board::Board;
use crate::catalog::{ChallengeId, END_OF_LEVEL_GOLD, FINAL_LEVEL, Relic, ShopItem};
use crate::error::{GameError, Result};
use crate::events::{EndReason, EventBus, GameEvent};
use crate::rng::{Stream, tile_stream};
use crate::state::RunState;
use crate::tile::{FlagColor, ResourceKind, TileKind};
use crate::types::Coord2;

/// Net outcome of one reveal call, cascades included.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RevealResult {
    pub life_delta: i32,
    pub gold_delta: i64,
    pub ended_level: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MarkOutcome {
    NoChange,
    Changed,
}

/// What the run should do after level resolution.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LevelOutcome {
    RunWon,
    RunLost,
    /// Hand off to the shop flow for the next level.
    Continue,
}

pub struct LevelEngine {
    board: Board,
    ended: bool,
}

impl LevelEngine {
    pub(crate) fn new(board: Board) -> Self {
        Self {
            board,
            ended: false,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub(crate) fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Reveals the tile at `coords`. Revealing an already-revealed or flagged
    /// tile is a silent no-op; the two Exit exceptions are documented on the
    /// match arms below. Out-of-bounds coordinates are a caller bug and fail
    /// fast.
    pub fn reveal(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        coords: Coord2,
        by_player: bool,
    ) -> Result<RevealResult> {
        let coords = self.board.validate_coords(coords)?;
        if self.ended {
            return Err(GameError::AlreadyEnded);
        }
        let mut res = RevealResult::default();
        self.reveal_inner(run, bus, &mut res, coords, by_player);
        self.finish_reveal(run, bus, &mut res);
        Ok(res)
    }

    /// Toggles a flag, keeping the remaining-mines counter in step. Carries no
    /// other gameplay effect; relics that read flags do so at level end.
    pub fn toggle_flag(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        coords: Coord2,
        color: FlagColor,
    ) -> Result<MarkOutcome> {
        let coords = self.board.validate_coords(coords)?;
        if self.ended {
            return Err(GameError::AlreadyEnded);
        }
        let tile = self.board.tile_mut(coords);
        if tile.revealed {
            return Ok(MarkOutcome::NoChange);
        }
        let is_mine = tile.kind == TileKind::Mine;
        if tile.flag.take().is_some() {
            if is_mine {
                run.stats.mines_remaining += 1;
            }
        } else {
            tile.flag = Some(color);
            if is_mine {
                run.stats.mines_remaining = run.stats.mines_remaining.saturating_sub(1);
            }
        }
        bus.emit(GameEvent::BoardChanged { reason: "Flag" });
        Ok(MarkOutcome::Changed)
    }

    /// Applies a recorded pending transform, reclassifying the tile for
    /// display. The gold/life effects were already final inside the reveal
    /// call; a non-animated driver calls this immediately, an animated one
    /// after the flip completes.
    pub fn commit_transform(&mut self, coords: Coord2) -> Result<Option<TileKind>> {
        let coords = self.board.validate_coords(coords)?;
        let tile = self.board.tile_mut(coords);
        Ok(tile.pending.take().map(|resource| {
            let kind = match resource {
                ResourceKind::Quartz => TileKind::Shop(ShopItem::Quartz),
                ResourceKind::Ore => TileKind::Ore,
                ResourceKind::Diamond => TileKind::Shop(ShopItem::Diamond),
            };
            tile.kind = kind;
            kind
        }))
    }

    fn reveal_inner(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
        by_player: bool,
    ) {
        let tile = *self.board.tile(coords);

        if tile.revealed {
            // A second player click on the visible Exit attempts to leave.
            if by_player && tile.kind == TileKind::Exit {
                self.try_finish_level(bus, res);
            }
            return;
        }
        if tile.is_flagged() {
            // Click-to-unflag takes priority over click-to-reveal on an Exit.
            if by_player && tile.kind == TileKind::Exit {
                self.board.tile_mut(coords).flag = None;
                bus.emit(GameEvent::BoardChanged { reason: "UnflagExit" });
            }
            return;
        }

        // Special tiles cost gold while Car Loan is armed, before their own
        // effect runs.
        if run.effects.car_loan && tile.kind.is_special() {
            let fee = if run.effects.atm_fee { 2 } else { 1 };
            add_gold(run, bus, res, -fee, "CarLoan");
        }

        match tile.kind {
            TileKind::Mine => self.reveal_mine(run, bus, res, coords),
            TileKind::Ore => self.reveal_ore(run, bus, res, coords),
            TileKind::Exit => {
                self.mark_revealed(run, bus, coords);
                run.stats.exits_remaining = run.stats.exits_remaining.saturating_sub(1);
            }
            TileKind::Challenge(id) => self.reveal_challenge(run, bus, res, coords, id),
            TileKind::Shop(item) => self.reveal_shop(run, bus, res, coords, item),
            TileKind::Safe => self.flood_reveal(run, bus, res, coords),
            TileKind::Number => self.reveal_number(run, bus, res, coords),
            // Pre-generation kind; nothing to evaluate.
            TileKind::Hidden => self.mark_revealed(run, bus, coords),
        }
    }

    fn reveal_mine(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
    ) {
        // Optimist converts the first mine of the level before any prevention
        // roll, even when a Gambler roll would also have saved it.
        if !run.effects.optimist_used && run.owns_relic(Relic::Optimist) {
            run.effects.optimist_used = true;
            self.mark_revealed(run, bus, coords);
            self.board.tile_mut(coords).pending = Some(ResourceKind::Quartz);
            run.stats.mines_remaining = run.stats.mines_remaining.saturating_sub(1);
            self.award_lapidarist(run, bus, res);
            add_gold(run, bus, res, 1, "OptimistQuartz");
            return;
        }

        let mut stream = self.tile_stream(run, coords);
        let mut prevented = false;
        for _ in 0..run.relic_stacks(Relic::Gambler) {
            if stream.chance(0.25) {
                prevented = true;
                break;
            }
        }

        self.mark_revealed(run, bus, coords);
        run.stats.mines_remaining = run.stats.mines_remaining.saturating_sub(1);
        self.award_lapidarist(run, bus, res);
        if !prevented {
            lose_life(run, bus, res);
        }
    }

    /// Mine-opened payout, applied whether or not the mine exploded.
    fn award_lapidarist(&mut self, run: &mut RunState, bus: &mut EventBus, res: &mut RevealResult) {
        let stacks = run.relic_stacks(Relic::Lapidarist);
        if stacks > 0 {
            add_gold(run, bus, res, 3 * i64::from(stacks), "Lapidarist");
        }
    }

    /// Flat bonus on every special-tile reveal once Scratchcards are armed.
    fn award_scratchcard(&mut self, run: &mut RunState, bus: &mut EventBus, res: &mut RevealResult) {
        let stacks = run.effects.scratchcard_stacks;
        if stacks > 0 {
            add_gold(run, bus, res, i64::from(stacks), "Scratchcard");
        }
    }

    fn reveal_ore(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
    ) {
        self.mark_revealed(run, bus, coords);
        run.stats.ore_remaining = run.stats.ore_remaining.saturating_sub(1);

        let mut stream = self.tile_stream(run, coords);
        let upgraded = run.owns_relic(Relic::Investor) && stream.chance(0.25);
        let gain: i64 = if run.effects.snake_oil {
            0
        } else if upgraded {
            stream.random_range(7..=10)
        } else {
            stream.random_range(2..=5)
        };
        if gain > 0 {
            add_gold(run, bus, res, gain, if upgraded { "InvestorDiamond" } else { "Ore" });
        }
        if upgraded {
            self.board.tile_mut(coords).pending = Some(ResourceKind::Diamond);
        }
        if run.effects.blood_diamond {
            lose_life(run, bus, res);
        }
    }

    fn reveal_challenge(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
        id: ChallengeId,
    ) {
        self.mark_revealed(run, bus, coords);
        run.stats.challenge_remaining = run.stats.challenge_remaining.saturating_sub(1);
        if let Some(count) = run.stats.challenge_counts.get_mut(&id) {
            *count = count.saturating_sub(1);
        }
        run.stats.special_revealed += 1;
        self.award_scratchcard(run, bus, res);

        self.apply_challenge(run, bus, res, coords, id);

        // Applies after every challenge handler, whichever one fired.
        let auditor = run.relic_stacks(Relic::Auditor);
        if auditor > 0 {
            add_gold(run, bus, res, i64::from(auditor), "Auditor");
        }
    }

    fn apply_challenge(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
        id: ChallengeId,
    ) {
        use ChallengeId::*;
        match id {
            AutoGrat => {
                let fee = if run.effects.atm_fee { 2 } else { 1 };
                add_gold(run, bus, res, -fee, "AutoGrat");
            }
            MathTest => run.effects.math_test = true,
            BadDeal => {
                add_gold(run, bus, res, 1, "BadDeal");
                lose_life(run, bus, res);
            }
            SnakeOil => run.effects.snake_oil = true,
            SnakeVenom => run.effects.snake_venom = true,
            BloodPact => {
                if run.lives >= 3 {
                    lose_life(run, bus, res);
                }
            }
            CarLoan => run.effects.car_loan = true,
            MegaMine => {
                // Hits twice while the player can absorb it.
                let hits = if run.lives > 2 { 2 } else { 1 };
                for _ in 0..hits {
                    lose_life(run, bus, res);
                }
            }
            BloodDiamond => run.effects.blood_diamond = true,
            FindersFee => run.effects.no_end_gold = true,
            AtmFee => run.effects.atm_fee = true,
            BoxingDay => {
                let before = run.gold;
                let after = before.div_euclid(2);
                if after != before {
                    add_gold(run, bus, res, after - before, "BoxingDay");
                }
                if run.effects.atm_fee && after < before {
                    add_gold(run, bus, res, -1, "AtmFee");
                }
            }
            Jackhammer => self.apply_jackhammer(run, bus, res, coords),
            DonationBox => run.effects.donation_box_stacks += 1,
            Appraisal => run.effects.appraisal = true,
            // Thief acts at level start; Key gates the Exit; the rest are
            // inert on reveal.
            Thief | Key | Clover | Stopwatch | Coal => {}
        }
    }

    /// Reveals every unrevealed neighbor, mines included. Neighboring
    /// Jackhammers are marked before their reveal so two adjacent copies
    /// cannot re-trigger each other forever.
    fn apply_jackhammer(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
    ) {
        if self.board.tile(coords).cascade_guard {
            self.board.tile_mut(coords).cascade_guard = false;
            return;
        }
        for pos in self.board.neighbors(coords) {
            let neighbor = *self.board.tile(pos);
            if neighbor.revealed || neighbor.is_flagged() {
                continue;
            }
            if neighbor.kind == TileKind::Challenge(ChallengeId::Jackhammer) {
                self.board.tile_mut(pos).cascade_guard = true;
            }
            self.reveal_inner(run, bus, res, pos, false);
        }
    }

    fn reveal_shop(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
        item: ShopItem,
    ) {
        self.mark_revealed(run, bus, coords);
        run.stats.shop_remaining = run.stats.shop_remaining.saturating_sub(1);
        if let Some(count) = run.stats.shop_counts.get_mut(&item) {
            *count = count.saturating_sub(1);
        }
        run.stats.special_revealed += 1;
        self.award_scratchcard(run, bus, res);

        self.apply_shop(run, bus, res, coords, item);
    }

    fn apply_shop(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
        item: ShopItem,
    ) {
        use ShopItem::*;
        match item {
            Quartz => {
                // Upgrade roll first, then the life costs; reordering changes
                // observable gold when a loss kills the payout eligibility.
                let mut stream = self.tile_stream(run, coords);
                let upgraded = run.owns_relic(Relic::Investor) && stream.chance(0.25);
                let amount: i64 = if upgraded { stream.random_range(7..=10) } else { 1 };
                if !run.effects.snake_oil {
                    add_gold(run, bus, res, amount, if upgraded { "InvestorDiamond" } else { "Quartz" });
                }
                if upgraded {
                    self.board.tile_mut(coords).pending = Some(ResourceKind::Diamond);
                }
                if run.effects.blood_diamond {
                    lose_life(run, bus, res);
                }
                if run.effects.appraisal {
                    lose_life(run, bus, res);
                }
            }
            Diamond => {
                let mut stream = self.tile_stream(run, coords);
                if !run.effects.snake_oil {
                    let gain: i64 = stream.random_range(7..=10);
                    add_gold(run, bus, res, gain, "Diamond");
                }
                if run.effects.blood_diamond {
                    lose_life(run, bus, res);
                }
            }
            OneUp => gain_lives(run, res, 1),
            TwoUp => gain_lives(run, res, 2),
            Pickaxe => {
                let mut candidates: Vec<Coord2> = self
                    .board
                    .neighbors(coords)
                    .into_iter()
                    .filter(|&pos| {
                        let tile = self.board.tile(pos);
                        !tile.revealed && tile.kind != TileKind::Mine
                    })
                    .collect();
                let mut stream = self.tile_stream(run, coords);
                candidates.shuffle(&mut stream);
                candidates.truncate(2);
                for pos in candidates {
                    self.reveal_inner(run, bus, res, pos, false);
                }
            }
            // Direction was frozen at generation; nothing to do at reveal.
            Compass => {}
            GoodDeal => {
                if run.gold > 0 {
                    add_gold(run, bus, res, -1, "GoodDeal");
                    if run.effects.atm_fee {
                        add_gold(run, bus, res, -1, "AtmFee");
                    }
                    gain_lives(run, res, 1);
                }
            }
            RemoteControl => {
                let target = self.first_matching(|tile| tile.kind == TileKind::Mine).or_else(|| {
                    self.first_matching(|tile| {
                        tile.kind == TileKind::Challenge(ChallengeId::Clover)
                    })
                });
                if let Some(pos) = target {
                    self.auto_flag(run, pos);
                    bus.emit(GameEvent::BoardChanged { reason: "RemoteControl" });
                }
            }
            AdvancePayment => {
                let first_ore = self.first_matching(|tile| tile.kind == TileKind::Ore);
                if let Some(pos) = first_ore {
                    self.reveal_inner(run, bus, res, pos, false);
                }
            }
            Magnet => {
                for pos in self.board.neighbors(coords) {
                    let tile = *self.board.tile(pos);
                    if tile.kind == TileKind::Ore && !tile.revealed {
                        self.reveal_inner(run, bus, res, pos, false);
                    }
                }
            }
            Scratchcard => run.effects.scratchcard_stacks += 1,
            LuckyPenny => run.effects.lucky_penny_stacks += 1,
            NineToFive => run.effects.nine_to_five_stacks += 1,
            PokerChip => {
                if run.effects.poker_chip_used {
                    return;
                }
                run.effects.poker_chip_used = true;
                let exit = self.first_matching(|tile| tile.kind == TileKind::Exit);
                let mines: Vec<Coord2> = self
                    .board
                    .iter_coords()
                    .filter(|&pos| {
                        let tile = self.board.tile(pos);
                        tile.kind == TileKind::Mine && !tile.revealed && !tile.is_flagged()
                    })
                    .collect();
                let mut stream = self.tile_stream(run, coords);
                if let (Some(exit), Some(&mine)) = (exit, mines.choose(&mut stream)) {
                    self.auto_flag(run, exit);
                    self.auto_flag(run, mine);
                    bus.emit(GameEvent::BoardChanged { reason: "PokerChip" });
                }
            }
            Receipt => run.shop_free_purchases += 1,
            TarotCard => run.effects.tarot_card = true,
            MetalDetector => {
                let mut changed = false;
                for pos in self.board.neighbors(coords) {
                    let tile = *self.board.tile(pos);
                    let hazard = tile.kind == TileKind::Mine
                        || tile.kind == TileKind::Challenge(ChallengeId::Clover);
                    if hazard && !tile.revealed && !tile.is_flagged() {
                        self.auto_flag(run, pos);
                        changed = true;
                    }
                }
                if changed {
                    bus.emit(GameEvent::BoardChanged { reason: "MetalDetector" });
                }
            }
            LaundryMoney => {
                let before = run.gold;
                let mut after = before.div_euclid(5) * 5;
                if after != before {
                    after += 5;
                }
                if after != before {
                    add_gold(run, bus, res, after - before, "LaundryMoney");
                }
            }
            LuckyCat => {
                if run.lives > 0 {
                    add_gold(run, bus, res, i64::from(run.lives), "LuckyCat");
                }
            }
        }
    }

    fn reveal_number(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        coords: Coord2,
    ) {
        self.mark_revealed(run, bus, coords);
        let number = self.board.tile(coords).number;
        let mut stream = self.tile_stream(run, coords);

        let cruncher = run.relic_stacks(Relic::NumberCruncher);
        if cruncher > 0 && number > 0 {
            let chance = (f64::from(number) / 100.0).min(1.0);
            if stream.chance(chance) {
                add_gold(run, bus, res, i64::from(cruncher), "NumberCruncher");
            }
        }

        if run.effects.snake_venom && number >= 3 && stream.chance(0.25) {
            lose_life(run, bus, res);
        }

        // Not retroactive: only numbers revealed after the test was armed are
        // masked by it.
        if run.effects.math_test && number > 1 {
            self.board.tile_mut(coords).math_masked = true;
        }
        if stream.chance(0.20) {
            self.board.tile_mut(coords).random_masked = true;
        }

        if self.board.tile(coords).is_masked() {
            if run.effects.lucky_penny_stacks > 0 && stream.chance(0.05) {
                if !run.effects.snake_oil {
                    add_gold(run, bus, res, 1, "LuckyPennyQuartz");
                }
                self.board.tile_mut(coords).pending = Some(ResourceKind::Quartz);
            }
            if self.board.tile(coords).pending.is_none()
                && run.effects.tarot_card
                && stream.chance(0.05)
            {
                let (gain, shown, source): (i64, _, _) = match stream.random_range(0..3u8) {
                    0 => (1, ResourceKind::Quartz, "TarotQuartz"),
                    1 => (stream.random_range(2..=5), ResourceKind::Ore, "TarotOre"),
                    _ => (stream.random_range(7..=10), ResourceKind::Diamond, "TarotDiamond"),
                };
                if !run.effects.snake_oil {
                    add_gold(run, bus, res, gain, source);
                }
                self.board.tile_mut(coords).pending = Some(shown);
            }
        }
    }

    /// Opens the maximal connected Safe region plus its Number border. The
    /// border re-enters the normal Number path so masking and relic rolls
    /// apply there exactly as for a direct reveal.
    fn flood_reveal(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        res: &mut RevealResult,
        start: Coord2,
    ) {
        self.mark_revealed(run, bus, start);
        let mut visited = BTreeSet::from([start]);
        let mut to_visit = VecDeque::from([start]);
        while let Some(coords) = to_visit.pop_front() {
            for pos in self.board.neighbors(coords) {
                if !visited.insert(pos) {
                    continue;
                }
                let tile = *self.board.tile(pos);
                if tile.revealed || tile.is_flagged() {
                    continue;
                }
                match tile.kind {
                    TileKind::Safe => {
                        self.mark_revealed(run, bus, pos);
                        to_visit.push_back(pos);
                    }
                    TileKind::Number => self.reveal_number(run, bus, res, pos),
                    _ => {}
                }
            }
        }
        log::trace!("flood fill from {start:?} opened {} tiles", visited.len());
    }

    /// Second click on the visible Exit. Blocked while any Key challenge tile
    /// is still unrevealed.
    fn try_finish_level(&mut self, bus: &mut EventBus, res: &mut RevealResult) {
        let locked = self.board.iter_coords().any(|pos| {
            let tile = self.board.tile(pos);
            tile.kind == TileKind::Challenge(ChallengeId::Key) && !tile.revealed
        });
        if locked {
            log::debug!("exit refused: unrevealed key tiles remain");
            bus.emit(GameEvent::BoardChanged { reason: "LockedExit" });
            return;
        }
        res.ended_level = true;
        self.ended = true;
        bus.emit(GameEvent::LevelEndTriggered { reason: EndReason::ExitUsed });
    }

    /// Uniform post-reveal block, run once per public reveal call.
    fn finish_reveal(&mut self, run: &mut RunState, bus: &mut EventBus, res: &mut RevealResult) {
        if !res.ended_level && run.lives <= 0 {
            res.ended_level = true;
            self.ended = true;
            bus.emit(GameEvent::LevelEndTriggered { reason: EndReason::LivesDepleted });
        }

        if res.life_delta != 0 {
            bus.emit(GameEvent::LifeChanged { delta: res.life_delta });
        }
        if res.life_delta < 0 {
            let stacks = run.effects.nine_to_five_stacks;
            if stacks > 0 {
                let gain = 2 * i64::from(stacks) * i64::from(res.life_delta.unsigned_abs());
                add_gold(run, bus, res, gain, "NineToFive");
            }
        }

        // Fires the moment the fourth corner opens, not only at resolution.
        let stacks = run.relic_stacks(Relic::Cartographer);
        if stacks > 0 && !run.effects.corners_awarded && self.all_corners_revealed() {
            run.effects.corners_awarded = true;
            add_gold(run, bus, res, 5 * i64::from(stacks), "Cartographer");
        }
    }

    /// End-of-level resolution: relic bonuses in fixed order, base gold, then
    /// the run-level verdict.
    pub fn resolve_level(
        &mut self,
        run: &mut RunState,
        bus: &mut EventBus,
        survived: bool,
    ) -> LevelOutcome {
        self.ended = true;

        if survived {
            let resurrector = run.relic_stacks(Relic::Resurrector);
            if resurrector > 0 && run.lives == 1 {
                run.lives += resurrector as i32;
                bus.emit(GameEvent::LifeChanged { delta: resurrector as i32 });
            }

            let minimalist = run.relic_stacks(Relic::Minimalist);
            if minimalist > 0 && run.stats.special_revealed == 0 {
                award_gold(run, bus, 6 * i64::from(minimalist), "Minimalist");
            }

            let vexillologist = run.relic_stacks(Relic::Vexillologist);
            if vexillologist > 0 && self.flags_are_perfect() {
                award_gold(run, bus, 5 * i64::from(vexillologist), "Vexillologist");
            }

            let cartographer = run.relic_stacks(Relic::Cartographer);
            if cartographer > 0 && !run.effects.corners_awarded && self.all_corners_revealed() {
                run.effects.corners_awarded = true;
                award_gold(run, bus, 5 * i64::from(cartographer), "Cartographer");
            }

            if !run.effects.no_end_gold {
                award_gold(run, bus, END_OF_LEVEL_GOLD, "LevelClear");
            }
        }

        bus.emit(GameEvent::LevelEndResolved { survived });
        log::debug!(
            "level {} resolved: survived={survived} lives={} gold={}",
            run.level,
            run.lives,
            run.gold
        );

        if !survived {
            LevelOutcome::RunLost
        } else if run.level >= FINAL_LEVEL {
            LevelOutcome::RunWon
        } else {
            LevelOutcome::Continue
        }
    }

    /// All true mines flagged, and nothing else flagged.
    fn flags_are_perfect(&self) -> bool {
        self.board.iter_coords().all(|pos| {
            let tile = self.board.tile(pos);
            match tile.kind {
                TileKind::Mine => tile.is_flagged() || tile.revealed,
                _ => !tile.is_flagged(),
            }
        }) && self
            .board
            .iter_coords()
            .any(|pos| self.board.tile(pos).kind == TileKind::Mine)
    }

    fn all_corners_revealed(&self) -> bool {
        self.board
            .corners()
            .into_iter()
            .all(|pos| self.board.tile(pos).revealed)
    }

    fn mark_revealed(&mut self, run: &mut RunState, bus: &mut EventBus, coords: Coord2) {
        let tile = self.board.tile_mut(coords);
        tile.revealed = true;
        run.stats.revealed_count += 1;
        let kind = tile.kind;
        bus.emit(GameEvent::TileRevealed { coords, kind });
    }

    /// Blue-flags a hidden tile on the engine's own initiative, keeping the
    /// mines counter in sync.
    fn auto_flag(&mut self, run: &mut RunState, coords: Coord2) {
        let tile = self.board.tile_mut(coords);
        if tile.is_flagged() || tile.revealed {
            return;
        }
        tile.flag = Some(FlagColor::Blue);
        if tile.kind == TileKind::Mine {
            run.stats.mines_remaining = run.stats.mines_remaining.saturating_sub(1);
        }
    }

    fn first_matching(&self, predicate: impl Fn(&crate::tile::Tile) -> bool) -> Option<Coord2> {
        self.board.iter_coords().find(|&pos| {
            let tile = self.board.tile(pos);
            predicate(tile) && !tile.revealed && !tile.is_flagged()
        })
    }

    fn tile_stream(&self, run: &RunState, coords: Coord2) -> Stream {
        tile_stream(run.seed, run.level, self.board.flat_index(coords))
    }
}

/// The single path for every gold mutation during a reveal; keeps the run
/// total, the per-call delta, and the event stream in lockstep.
fn add_gold(
    run: &mut RunState,
    bus: &mut EventBus,
    res: &mut RevealResult,
    amount: i64,
    source: &'static str,
) {
    if amount == 0 {
        return;
    }
    run.gold += amount;
    res.gold_delta += amount;
    bus.emit(GameEvent::GoldChanged { amount, source });
}

/// Gold mutation outside a reveal (resolution bonuses).
fn award_gold(run: &mut RunState, bus: &mut EventBus, amount: i64, source: &'static str) {
    if amount == 0 {
        return;
    }
    run.gold += amount;
    bus.emit(GameEvent::GoldChanged { amount, source });
}

fn gain_lives(run: &mut RunState, res: &mut RevealResult, count: i32) {
    run.lives += count;
    res.life_delta += count;
}

/// One life hit, with the uniform substitution order: Billionaire payment
/// (only above 1 life and 5 gold) absorbs the hit, the ATM fee amplifies the
/// payment, otherwise the life is lost and clamped at zero.
fn lose_life(run: &mut RunState, bus: &mut EventBus, res: &mut RevealResult) {
    if run.owns_relic(Relic::Billionaire) && run.lives > 1 && run.gold >= 5 {
        add_gold(run, bus, res, -5, "Billionaire");
        if run.effects.atm_fee {
            add_gold(run, bus, res, -1, "AtmFee");
        }
    } else {
        run.lives = (run.lives - 1).max(0);
        res.life_delta -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::generator::{assign_numbers, generate_level};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn engine_with(size: Coord2, kinds: &[(Coord2, TileKind)]) -> LevelEngine {
        let mut board = Board::new(size);
        for &(coords, kind) in kinds {
            board.tile_mut(coords).kind = kind;
        }
        assign_numbers(&mut board);
        LevelEngine::new(board)
    }

    fn event_counter(
        bus: &mut EventBus,
        filter: fn(&GameEvent) -> bool,
    ) -> Rc<RefCell<Vec<GameEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _ = bus.subscribe(move |event| {
            if filter(event) {
                sink.borrow_mut().push(event.clone());
            }
        });
        seen
    }

    #[test]
    fn bare_mine_costs_one_life_and_no_gold() {
        let mut engine = engine_with((3, 3), &[((1, 1), TileKind::Mine)]);
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();

        assert_eq!(res.life_delta, -1);
        assert_eq!(res.gold_delta, 0);
        assert!(!res.ended_level);
        assert_eq!(run.lives, 2);
    }

    #[test]
    fn mine_on_last_life_ends_the_level() {
        let mut engine = engine_with((3, 3), &[((1, 1), TileKind::Mine)]);
        let mut run = RunState::new(42);
        run.lives = 1;
        let mut bus = EventBus::new();
        let triggered = event_counter(&mut bus, |event| {
            matches!(event, GameEvent::LevelEndTriggered { reason: EndReason::LivesDepleted })
        });

        let res = engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();

        assert_eq!(res.life_delta, -1);
        assert!(res.ended_level);
        assert_eq!(run.lives, 0);
        assert_eq!(triggered.borrow().len(), 1);
        assert!(engine.is_ended());
        assert_eq!(
            engine.reveal(&mut run, &mut bus, (0, 0), true),
            Err(GameError::AlreadyEnded)
        );
    }

    #[test]
    fn billionaire_pays_gold_instead_of_a_life() {
        let mut engine = engine_with((3, 3), &[((1, 1), TileKind::Mine)]);
        let mut run = RunState::new(42);
        run.add_relic(Relic::Billionaire, 1);
        run.gold = 10;
        run.lives = 3;
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();

        assert_eq!(res.gold_delta, -5);
        assert_eq!(res.life_delta, 0);
        assert_eq!(run.gold, 5);
        assert_eq!(run.lives, 3);
    }

    #[test]
    fn billionaire_never_spends_the_last_life_slot() {
        let mut engine = engine_with((3, 3), &[((1, 1), TileKind::Mine)]);
        let mut run = RunState::new(42);
        run.add_relic(Relic::Billionaire, 1);
        run.gold = 10;
        run.lives = 1;
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();

        assert_eq!(res.life_delta, -1);
        assert_eq!(res.gold_delta, 0);
    }

    #[test]
    fn revealing_twice_is_a_silent_no_op() {
        let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Ore)]);
        let mut run = RunState::new(7);
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        let before = run.clone();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert_eq!(res, RevealResult::default());
        assert_eq!(run, before);
    }

    #[test]
    fn flagged_tiles_do_not_reveal() {
        let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Mine)]);
        let mut run = RunState::new(7);
        let mut bus = EventBus::new();

        engine
            .toggle_flag(&mut run, &mut bus, (0, 0), FlagColor::White)
            .unwrap();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert_eq!(res, RevealResult::default());
        assert!(!engine.board().tile((0, 0)).revealed);
        assert_eq!(run.lives, 3);
    }

    #[test]
    fn out_of_bounds_reveal_fails_fast() {
        let mut engine = engine_with((3, 3), &[]);
        let mut run = RunState::new(7);
        let mut bus = EventBus::new();
        assert_eq!(
            engine.reveal(&mut run, &mut bus, (3, 0), true),
            Err(GameError::InvalidCoords)
        );
    }

    #[test]
    fn exit_needs_a_second_click_to_finish() {
        let mut engine = engine_with((3, 3), &[((2, 2), TileKind::Exit)]);
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();
        let triggered = event_counter(&mut bus, |event| {
            matches!(event, GameEvent::LevelEndTriggered { reason: EndReason::ExitUsed })
        });

        let first = engine.reveal(&mut run, &mut bus, (2, 2), true).unwrap();
        assert!(!first.ended_level);
        assert!(engine.board().tile((2, 2)).revealed);
        assert_eq!(run.stats.exits_remaining, 0);

        let second = engine.reveal(&mut run, &mut bus, (2, 2), true).unwrap();
        assert!(second.ended_level);
        assert_eq!(triggered.borrow().len(), 1);
    }

    #[test]
    fn clicking_a_flagged_exit_unflags_it_first() {
        let mut engine = engine_with((3, 3), &[((2, 2), TileKind::Exit)]);
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();

        engine
            .toggle_flag(&mut run, &mut bus, (2, 2), FlagColor::Yellow)
            .unwrap();
        let res = engine.reveal(&mut run, &mut bus, (2, 2), true).unwrap();

        assert_eq!(res, RevealResult::default());
        assert!(!engine.board().tile((2, 2)).is_flagged());
        assert!(!engine.board().tile((2, 2)).revealed);

        let res = engine.reveal(&mut run, &mut bus, (2, 2), true).unwrap();
        assert!(engine.board().tile((2, 2)).revealed);
        assert!(!res.ended_level);
    }

    #[test]
    fn key_tiles_lock_the_exit() {
        let mut engine = engine_with(
            (4, 1),
            &[
                ((0, 0), TileKind::Exit),
                ((3, 0), TileKind::Challenge(ChallengeId::Key)),
            ],
        );
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        let blocked = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert!(!blocked.ended_level);

        engine.reveal(&mut run, &mut bus, (3, 0), true).unwrap();
        let done = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert!(done.ended_level);
    }

    #[test]
    fn flood_fill_opens_an_all_safe_board_exactly_once() {
        let mut engine = engine_with((4, 4), &[]);
        let mut run = RunState::new(1);
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert_eq!(run.stats.revealed_count, 16);
        assert_eq!(res.life_delta, 0);
        for coords in engine.board().iter_coords() {
            assert!(engine.board().tile(coords).revealed);
        }
    }

    #[test]
    fn flood_fill_stops_at_the_number_border() {
        // Mine in one corner; the rest floods open with its 1-number ring.
        let mut engine = engine_with((5, 5), &[((4, 4), TileKind::Mine)]);
        let mut run = RunState::new(1);
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert!(!engine.board().tile((4, 4)).revealed);
        assert!(engine.board().tile((3, 3)).revealed);
        assert_eq!(engine.board().tile((3, 3)).number, 1);
        assert_eq!(run.stats.revealed_count, 24);
    }

    #[test]
    fn flagged_tiles_block_the_flood() {
        let mut engine = engine_with((3, 1), &[]);
        let mut run = RunState::new(1);
        let mut bus = EventBus::new();

        engine
            .toggle_flag(&mut run, &mut bus, (1, 0), FlagColor::White)
            .unwrap();
        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert!(engine.board().tile((0, 0)).revealed);
        assert!(!engine.board().tile((1, 0)).revealed);
        assert!(!engine.board().tile((2, 0)).revealed);
    }

    #[test]
    fn gold_deltas_account_for_every_mutation() {
        let mut run = RunState::new(2024);
        run.lives = 1_000;
        run.add_relic(Relic::Lapidarist, 1);
        run.add_relic(Relic::Investor, 1);
        run.add_challenge(ChallengeId::AutoGrat, 2);
        run.add_challenge(ChallengeId::BoxingDay, 1);
        let mut bus = EventBus::new();
        let mut engine = generate_level(&mut run, &mut bus, (7, 7));

        let initial = run.gold;
        let mut total = 0;
        for coords in engine.board().iter_coords().collect::<Vec<_>>() {
            let res = engine.reveal(&mut run, &mut bus, coords, false).unwrap();
            total += res.gold_delta;
        }
        assert_eq!(total, run.gold - initial);
    }

    #[test]
    fn math_test_masking_is_not_retroactive() {
        let mut engine = engine_with(
            (3, 3),
            &[
                ((0, 0), TileKind::Mine),
                ((2, 0), TileKind::Mine),
                ((0, 2), TileKind::Mine),
            ],
        );
        let mut run = RunState::new(42);
        run.lives = 100;
        let mut bus = EventBus::new();

        // (1,0) touches two mines; revealed before the test is armed.
        engine.reveal(&mut run, &mut bus, (1, 0), true).unwrap();
        assert!(!engine.board().tile((1, 0)).math_masked);

        run.effects.math_test = true;
        // (1,1) touches all three mines; revealed after arming.
        engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();
        let tile = engine.board().tile((1, 1));
        assert_eq!(tile.number, 3);
        assert!(tile.math_masked);
        assert!(tile.is_masked());
    }

    #[test]
    fn mega_mine_scales_with_current_lives() {
        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::MegaMine))],
        );
        let mut run = RunState::new(42);
        run.lives = 3;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.life_delta, -2);
        assert_eq!(run.lives, 1);

        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::MegaMine))],
        );
        let mut run = RunState::new(42);
        run.lives = 1;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.life_delta, -1);
        assert!(res.ended_level);
    }

    #[test]
    fn blood_pact_only_bites_at_three_lives() {
        for (lives, expected) in [(3, -1), (2, 0)] {
            let mut engine = engine_with(
                (3, 3),
                &[((0, 0), TileKind::Challenge(ChallengeId::BloodPact))],
            );
            let mut run = RunState::new(42);
            run.lives = lives;
            let mut bus = EventBus::new();
            let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
            assert_eq!(res.life_delta, expected, "lives={lives}");
        }
    }

    #[test]
    fn boxing_day_halves_gold_and_atm_fee_amplifies() {
        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::BoxingDay))],
        );
        let mut run = RunState::new(42);
        run.gold = 9;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.gold_delta, -5);
        assert_eq!(run.gold, 4);

        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::BoxingDay))],
        );
        let mut run = RunState::new(42);
        run.gold = 9;
        run.effects.atm_fee = true;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.gold_delta, -6);
        assert_eq!(run.gold, 3);
    }

    #[test]
    fn car_loan_charges_special_reveals_up_front() {
        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::Coal))],
        );
        let mut run = RunState::new(42);
        run.effects.car_loan = true;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.gold_delta, -1);
        assert_eq!(run.gold, -1);

        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::Coal))],
        );
        let mut run = RunState::new(42);
        run.effects.car_loan = true;
        run.effects.atm_fee = true;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.gold_delta, -2);
    }

    #[test]
    fn auto_grat_steals_and_can_go_negative() {
        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::AutoGrat))],
        );
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.gold_delta, -1);
        assert_eq!(run.gold, -1);
    }

    #[test]
    fn scratchcard_and_auditor_pay_on_challenge_reveals() {
        let mut engine = engine_with(
            (3, 3),
            &[((0, 0), TileKind::Challenge(ChallengeId::Coal))],
        );
        let mut run = RunState::new(42);
        run.effects.scratchcard_stacks = 2;
        run.add_relic(Relic::Auditor, 1);
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.gold_delta, 3);
        assert_eq!(run.stats.special_revealed, 1);
    }

    #[test]
    fn jackhammers_cannot_cascade_into_each_other_forever() {
        let mut engine = engine_with(
            (3, 1),
            &[
                ((0, 0), TileKind::Challenge(ChallengeId::Jackhammer)),
                ((1, 0), TileKind::Challenge(ChallengeId::Jackhammer)),
                ((2, 0), TileKind::Mine),
            ],
        );
        let mut run = RunState::new(42);
        run.lives = 10;
        let mut bus = EventBus::new();

        // The middle Jackhammer opens both neighbors; the left one is guarded
        // and must not fire back.
        let res = engine.reveal(&mut run, &mut bus, (1, 0), true).unwrap();

        assert!(engine.board().tile((0, 0)).revealed);
        assert!(engine.board().tile((1, 0)).revealed);
        assert!(engine.board().tile((2, 0)).revealed);
        assert_eq!(res.life_delta, -1);
        assert!(!engine.board().tile((0, 0)).cascade_guard);
    }

    #[test]
    fn optimist_converts_the_first_mine_before_gambler_rolls() {
        let mut engine = engine_with(
            (3, 1),
            &[((0, 0), TileKind::Mine), ((2, 0), TileKind::Mine)],
        );
        let mut run = RunState::new(42);
        run.add_relic(Relic::Optimist, 1);
        run.add_relic(Relic::Gambler, 1);
        run.stats.mines_remaining = 2;
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert!(run.effects.optimist_used);
        assert_eq!(res.life_delta, 0);
        assert_eq!(res.gold_delta, 1);
        assert_eq!(engine.board().tile((0, 0)).pending, Some(ResourceKind::Quartz));
        assert_eq!(run.stats.mines_remaining, 1);
    }

    #[test]
    fn gambler_stacks_prevent_some_explosions() {
        let mut run = RunState::new(555);
        run.lives = 1_000;
        run.add_relic(Relic::Gambler, 10);
        let mut bus = EventBus::new();
        let mut engine = engine_with((5, 5), &[]);
        for coords in engine.board().iter_coords().collect::<Vec<_>>() {
            engine.board_mut().tile_mut(coords).kind = TileKind::Mine;
        }
        let mut lost = 0;
        for coords in engine.board().iter_coords().collect::<Vec<_>>() {
            let res = engine.reveal(&mut run, &mut bus, coords, true).unwrap();
            lost -= res.life_delta;
        }
        assert!(lost < 25, "ten stacks should prevent most explosions");
    }

    #[test]
    fn snake_oil_zeroes_ore_gold() {
        let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Ore)]);
        let mut run = RunState::new(42);
        run.effects.snake_oil = true;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.gold_delta, 0);
        assert!(engine.board().tile((0, 0)).revealed);
    }

    #[test]
    fn ore_pays_in_range_and_decrements_the_counter() {
        for seed in 0..20 {
            let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Ore)]);
            let mut run = RunState::new(seed);
            run.stats.ore_remaining = 1;
            let mut bus = EventBus::new();
            let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
            assert!((2..=5).contains(&res.gold_delta), "seed {seed}: {}", res.gold_delta);
            assert_eq!(run.stats.ore_remaining, 0);
        }
    }

    #[test]
    fn one_up_and_lucky_cat_pay_out() {
        let mut engine = engine_with(
            (3, 1),
            &[
                ((0, 0), TileKind::Shop(ShopItem::OneUp)),
                ((2, 0), TileKind::Shop(ShopItem::LuckyCat)),
            ],
        );
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.life_delta, 1);
        assert_eq!(run.lives, 4);

        let res = engine.reveal(&mut run, &mut bus, (2, 0), true).unwrap();
        assert_eq!(res.gold_delta, 4);
    }

    #[test]
    fn good_deal_is_a_no_op_without_gold() {
        let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Shop(ShopItem::GoodDeal))]);
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.life_delta, 0);
        assert_eq!(res.gold_delta, 0);

        let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Shop(ShopItem::GoodDeal))]);
        let mut run = RunState::new(42);
        run.gold = 3;
        let mut bus = EventBus::new();
        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(res.life_delta, 1);
        assert_eq!(res.gold_delta, -1);
    }

    #[test]
    fn laundry_money_rounds_up_to_a_multiple_of_five() {
        for (gold, delta) in [(7, 3), (10, 0), (0, 0), (-7, 2)] {
            let mut engine =
                engine_with((3, 3), &[((0, 0), TileKind::Shop(ShopItem::LaundryMoney))]);
            let mut run = RunState::new(42);
            run.gold = gold;
            let mut bus = EventBus::new();
            let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
            assert_eq!(res.gold_delta, delta, "gold={gold}");
            assert_eq!(run.gold % 5, 0);
        }
    }

    #[test]
    fn remote_control_flags_the_first_mine() {
        let mut engine = engine_with(
            (3, 1),
            &[
                ((0, 0), TileKind::Shop(ShopItem::RemoteControl)),
                ((2, 0), TileKind::Mine),
            ],
        );
        let mut run = RunState::new(42);
        run.stats.mines_remaining = 1;
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert_eq!(engine.board().tile((2, 0)).flag, Some(FlagColor::Blue));
        assert_eq!(run.stats.mines_remaining, 0);
    }

    #[test]
    fn metal_detector_flags_adjacent_hazards() {
        let mut engine = engine_with(
            (3, 3),
            &[
                ((1, 1), TileKind::Shop(ShopItem::MetalDetector)),
                ((0, 0), TileKind::Mine),
                ((2, 2), TileKind::Challenge(ChallengeId::Clover)),
                ((2, 0), TileKind::Ore),
            ],
        );
        let mut run = RunState::new(42);
        run.stats.mines_remaining = 1;
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();

        assert_eq!(engine.board().tile((0, 0)).flag, Some(FlagColor::Blue));
        assert_eq!(engine.board().tile((2, 2)).flag, Some(FlagColor::Blue));
        assert!(!engine.board().tile((2, 0)).is_flagged());
        assert_eq!(run.stats.mines_remaining, 0);
    }

    #[test]
    fn poker_chip_marks_one_exit_and_one_mine_once_per_board() {
        let mut engine = engine_with(
            (4, 1),
            &[
                ((0, 0), TileKind::Shop(ShopItem::PokerChip)),
                ((1, 0), TileKind::Shop(ShopItem::PokerChip)),
                ((2, 0), TileKind::Exit),
                ((3, 0), TileKind::Mine),
            ],
        );
        let mut run = RunState::new(42);
        run.stats.mines_remaining = 1;
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        assert_eq!(engine.board().tile((2, 0)).flag, Some(FlagColor::Blue));
        assert_eq!(engine.board().tile((3, 0)).flag, Some(FlagColor::Blue));
        assert!(run.effects.poker_chip_used);

        // Second chip is inert; the exit flag survives for the player to clear.
        engine
            .toggle_flag(&mut run, &mut bus, (2, 0), FlagColor::Blue)
            .unwrap();
        engine
            .toggle_flag(&mut run, &mut bus, (3, 0), FlagColor::Blue)
            .unwrap();
        engine.reveal(&mut run, &mut bus, (1, 0), true).unwrap();
        assert!(!engine.board().tile((2, 0)).is_flagged());
    }

    #[test]
    fn pickaxe_opens_up_to_two_safe_neighbors() {
        let mut engine = engine_with(
            (3, 3),
            &[
                ((1, 1), TileKind::Shop(ShopItem::Pickaxe)),
                ((0, 0), TileKind::Mine),
                ((1, 0), TileKind::Mine),
                ((2, 0), TileKind::Mine),
                ((0, 1), TileKind::Mine),
                ((2, 1), TileKind::Mine),
                ((0, 2), TileKind::Mine),
                ((1, 2), TileKind::Ore),
            ],
        );
        let mut run = RunState::new(42);
        run.lives = 100;
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();

        let opened: Vec<Coord2> = engine
            .board()
            .iter_coords()
            .filter(|&pos| pos != (1, 1) && engine.board().tile(pos).revealed)
            .collect();
        assert_eq!(opened.len(), 2);
        for pos in opened {
            assert_ne!(engine.board().tile(pos).kind, TileKind::Mine);
        }
        assert_eq!(run.lives, 100);
    }

    #[test]
    fn magnet_opens_every_adjacent_ore() {
        let mut engine = engine_with(
            (3, 3),
            &[
                ((1, 1), TileKind::Shop(ShopItem::Magnet)),
                ((0, 0), TileKind::Ore),
                ((2, 2), TileKind::Ore),
                ((2, 0), TileKind::Mine),
            ],
        );
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (1, 1), true).unwrap();

        assert!(engine.board().tile((0, 0)).revealed);
        assert!(engine.board().tile((2, 2)).revealed);
        assert!(!engine.board().tile((2, 0)).revealed);
        assert!(res.gold_delta >= 4, "two ore payouts expected");
    }

    #[test]
    fn cartographer_pays_the_moment_all_corners_open() {
        let mut engine = engine_with((2, 2), &[]);
        let mut run = RunState::new(42);
        run.add_relic(Relic::Cartographer, 1);
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert_eq!(res.gold_delta, 5);
        assert!(run.effects.corners_awarded);

        // Resolution must not double-pay.
        let gold = run.gold;
        engine.resolve_level(&mut run, &mut bus, true);
        assert_eq!(run.gold, gold + END_OF_LEVEL_GOLD);
    }

    #[test]
    fn nine_to_five_pays_per_life_lost() {
        let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Mine)]);
        let mut run = RunState::new(42);
        run.effects.nine_to_five_stacks = 2;
        let mut bus = EventBus::new();

        let res = engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();

        assert_eq!(res.life_delta, -1);
        assert_eq!(res.gold_delta, 4);
    }

    #[test]
    fn toggle_flag_tracks_the_mine_counter() {
        let mut engine = engine_with(
            (3, 1),
            &[((0, 0), TileKind::Mine)],
        );
        let mut run = RunState::new(42);
        run.stats.mines_remaining = 1;
        let mut bus = EventBus::new();

        engine.toggle_flag(&mut run, &mut bus, (0, 0), FlagColor::White).unwrap();
        assert_eq!(run.stats.mines_remaining, 0);
        engine.toggle_flag(&mut run, &mut bus, (0, 0), FlagColor::White).unwrap();
        assert_eq!(run.stats.mines_remaining, 1);

        // Non-mine flags never touch the counter.
        engine.toggle_flag(&mut run, &mut bus, (2, 0), FlagColor::Yellow).unwrap();
        assert_eq!(run.stats.mines_remaining, 1);

        // Saturates instead of going negative.
        run.stats.mines_remaining = 0;
        engine.toggle_flag(&mut run, &mut bus, (0, 0), FlagColor::White).unwrap();
        assert_eq!(run.stats.mines_remaining, 0);
    }

    #[test]
    fn resolution_applies_bonuses_in_order() {
        let mut engine = engine_with((2, 1), &[((0, 0), TileKind::Mine)]);
        let mut run = RunState::new(42);
        run.lives = 1;
        run.add_relic(Relic::Resurrector, 1);
        run.add_relic(Relic::Minimalist, 1);
        run.add_relic(Relic::Vexillologist, 1);
        let mut bus = EventBus::new();
        engine
            .toggle_flag(&mut run, &mut bus, (0, 0), FlagColor::White)
            .unwrap();

        let outcome = engine.resolve_level(&mut run, &mut bus, true);

        assert_eq!(outcome, LevelOutcome::Continue);
        assert_eq!(run.lives, 2);
        // Minimalist 6 + Vexillologist 5 + base 5
        assert_eq!(run.gold, 16);
    }

    #[test]
    fn finders_fee_suppresses_the_base_award() {
        let mut engine = engine_with((2, 1), &[]);
        let mut run = RunState::new(42);
        run.effects.no_end_gold = true;
        let mut bus = EventBus::new();
        engine.resolve_level(&mut run, &mut bus, true);
        assert_eq!(run.gold, 0);
    }

    #[test]
    fn resolution_reports_the_run_verdict() {
        let mut engine = engine_with((2, 1), &[]);
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();
        assert_eq!(
            engine.resolve_level(&mut run, &mut bus, false),
            LevelOutcome::RunLost
        );

        let mut engine = engine_with((2, 1), &[]);
        let mut run = RunState::new(42);
        run.level = FINAL_LEVEL;
        let mut bus = EventBus::new();
        assert_eq!(
            engine.resolve_level(&mut run, &mut bus, true),
            LevelOutcome::RunWon
        );
    }

    #[test]
    fn commit_transform_reclassifies_the_tile() {
        let mut engine = engine_with((3, 3), &[((0, 0), TileKind::Mine)]);
        let mut run = RunState::new(42);
        run.add_relic(Relic::Optimist, 1);
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        let committed = engine.commit_transform((0, 0)).unwrap();

        assert_eq!(committed, Some(TileKind::Shop(ShopItem::Quartz)));
        assert_eq!(engine.board().tile((0, 0)).kind, TileKind::Shop(ShopItem::Quartz));
        assert_eq!(engine.commit_transform((0, 0)).unwrap(), None);
    }

    #[test]
    fn donation_box_and_stack_shops_accumulate() {
        let mut engine = engine_with(
            (5, 1),
            &[
                ((0, 0), TileKind::Challenge(ChallengeId::DonationBox)),
                ((2, 0), TileKind::Shop(ShopItem::Scratchcard)),
                ((4, 0), TileKind::Shop(ShopItem::LuckyPenny)),
            ],
        );
        let mut run = RunState::new(42);
        let mut bus = EventBus::new();

        engine.reveal(&mut run, &mut bus, (0, 0), true).unwrap();
        engine.reveal(&mut run, &mut bus, (2, 0), true).unwrap();
        engine.reveal(&mut run, &mut bus, (4, 0), true).unwrap();

        assert_eq!(run.effects.donation_box_stacks, 1);
        assert_eq!(run.effects.scratchcard_stacks, 1);
        assert_eq!(run.effects.lucky_penny_stacks, 1);
        // The Lucky Penny reveal came after Scratchcard armed, so it paid 1.
        assert_eq!(run.gold, 1);
    }
}
