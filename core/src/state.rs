use hashbrown::HashMap;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::catalog::{ChallengeId, Relic, ShopItem};
use crate::rng::Stream;
use crate::tile::FlagColor;

/// Effect toggles and stacks armed during a level. The whole struct is reset
/// to defaults by the generator before every level; nothing here may survive a
/// level transition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelEffects {
    /// Shop/Challenge reveals cost 1 gold.
    pub car_loan: bool,
    /// Amplifies fees and payment substitutions by 1 gold.
    pub atm_fee: bool,
    /// Resource tiles also cost a life.
    pub blood_diamond: bool,
    /// All Ore/Quartz/Diamond gold is zeroed.
    pub snake_oil: bool,
    /// Numbers >= 3 have a 25% chance to cost a life.
    pub snake_venom: bool,
    /// Numbers > 1 revealed from now on display as unknown.
    pub math_test: bool,
    /// Quartz costs a life when revealed.
    pub appraisal: bool,
    /// Masked numbers may upgrade into resources.
    pub tarot_card: bool,
    /// Suppresses the base end-of-level gold award.
    pub no_end_gold: bool,
    pub optimist_used: bool,
    pub poker_chip_used: bool,
    pub corners_awarded: bool,
    pub scratchcard_stacks: u32,
    pub lucky_penny_stacks: u32,
    pub nine_to_five_stacks: u32,
    /// Consumed by the presentation layer: each gold gain reveals a random
    /// tile per stack.
    pub donation_box_stacks: u32,
}

/// Per-level counters, rebuilt by the generator and kept in sync by the
/// reveal engine. All decrements saturate at zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub revealed_count: u32,
    pub special_revealed: u32,
    pub mines_remaining: u16,
    pub ore_remaining: u16,
    pub exits_remaining: u16,
    pub shop_remaining: u16,
    pub challenge_remaining: u16,
    pub shop_counts: HashMap<ShopItem, u16>,
    pub challenge_counts: HashMap<ChallengeId, u16>,
}

/// The single source of truth surviving across levels within one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Immutable for the whole run; all streams derive from it.
    pub seed: u64,
    pub level: u32,
    pub lives: i32,
    /// Intentionally signed: several effects push it below zero.
    pub gold: i64,
    pub flag_color: FlagColor,
    pub shop_free_purchases: u32,
    pub owned_shop_tiles: HashMap<ShopItem, u32>,
    pub owned_relics: HashMap<Relic, u32>,
    pub owned_challenges: HashMap<ChallengeId, u32>,
    pub effects: LevelEffects,
    pub stats: LevelStats,
}

impl RunState {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            level: 1,
            lives: 3,
            gold: 0,
            flag_color: FlagColor::default(),
            shop_free_purchases: 0,
            owned_shop_tiles: HashMap::new(),
            owned_relics: HashMap::new(),
            owned_challenges: HashMap::new(),
            effects: LevelEffects::default(),
            stats: LevelStats::default(),
        }
    }

    pub fn relic_stacks(&self, relic: Relic) -> u32 {
        self.owned_relics.get(&relic).copied().unwrap_or(0)
    }

    pub fn owns_relic(&self, relic: Relic) -> bool {
        self.relic_stacks(relic) > 0
    }

    pub fn shop_stacks(&self, item: ShopItem) -> u32 {
        self.owned_shop_tiles.get(&item).copied().unwrap_or(0)
    }

    pub fn challenge_stacks(&self, id: ChallengeId) -> u32 {
        self.owned_challenges.get(&id).copied().unwrap_or(0)
    }

    pub fn add_relic(&mut self, relic: Relic, count: u32) {
        *self.owned_relics.entry(relic).or_insert(0) += count;
    }

    pub fn add_shop_tile(&mut self, item: ShopItem, count: u32) {
        *self.owned_shop_tiles.entry(item).or_insert(0) += count;
    }

    pub fn add_challenge(&mut self, id: ChallengeId, count: u32) {
        *self.owned_challenges.entry(id).or_insert(0) += count;
    }

    /// Removes one stack of a uniformly-picked owned collectible. The only
    /// path by which owned-item maps shrink.
    pub(crate) fn steal_random_relic(&mut self, stream: &mut Stream) -> Option<Relic> {
        let owned: Vec<Relic> = Relic::ALL
            .into_iter()
            .filter(|&relic| self.relic_stacks(relic) > 0)
            .collect();
        let &victim = owned.choose(stream)?;
        match self.owned_relics.get_mut(&victim) {
            Some(stacks) if *stacks > 1 => *stacks -= 1,
            _ => {
                self.owned_relics.remove(&victim);
            }
        }
        Some(victim)
    }

    /// Clears everything level-scoped. Stale per-level flags leaking across
    /// levels would corrupt every later reveal, so this runs unconditionally
    /// at the top of generation.
    pub(crate) fn begin_level(&mut self) {
        self.effects = LevelEffects::default();
        self.stats = LevelStats::default();
    }
}
