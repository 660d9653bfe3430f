//! Static item tables: shop tiles, drafted challenges, collectibles, and the
//! per-level tuning knobs the generator reads. The shop/draft screens consume
//! the same tables for pricing; they own nothing here.

use serde::{Deserialize, Serialize};

use crate::types::Coord;

pub const MAX_GRID_SIZE: Coord = 20;

/// Board side caps at 20, which occurs at level 16 (4 + 16 = 20).
pub const FINAL_LEVEL: u32 = 16;

pub const END_OF_LEVEL_GOLD: i64 = 5;

/// Mine density band for non-exit cells, rolled per level.
pub const MINE_DENSITY_MIN: f64 = 0.16;
pub const MINE_DENSITY_SPAN: f64 = 0.04;

pub const DIFFUSER_MINES_PER_STACK: u16 = 5;

/// Shop tile spawn tuning: one high-probability guarantee roll for the first
/// copy, then per-stack rolls at base chance plus the Accountant bonus.
pub const SHOP_GUARANTEE_CHANCE: f64 = 0.80;
pub const SHOP_BASE_SPAWN_CHANCE: f64 = 0.505;
pub const ACCOUNTANT_BONUS_PER_STACK: f64 = 0.01;
pub const ACCOUNTANT_BONUS_CAP: f64 = 0.40;
pub const SHOP_SPAWN_CHANCE_CAP: f64 = 0.95;

pub const fn board_side(level: u32) -> Coord {
    let side = 4 + level;
    if side >= MAX_GRID_SIZE as u32 {
        MAX_GRID_SIZE
    } else {
        side as Coord
    }
}

pub const fn base_ore(level: u32) -> u16 {
    if level >= 7 { 4 } else { 3 }
}

/// Total drafted-challenge tiles allowed per board; grows with the board so
/// small early levels are not swamped.
pub const fn challenge_cap(level: u32) -> u16 {
    let cap = 2 + level;
    if cap > 12 { 12 } else { cap as u16 }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    VeryRare,
}

impl Rarity {
    pub const fn price(self) -> i64 {
        match self {
            Self::Common => 5,
            Self::Uncommon => 7,
            Self::Rare => 10,
            Self::VeryRare => 10,
        }
    }
}

/// Expected-spawn weighting band for drafted challenges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnBand {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl SpawnBand {
    pub const fn target(self) -> u32 {
        match self {
            Self::Low => 2,
            Self::Medium => 4,
            Self::High => 7,
            Self::VeryHigh => 10,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShopItem {
    Quartz,
    Diamond,
    OneUp,
    TwoUp,
    Pickaxe,
    Compass,
    Scratchcard,
    GoodDeal,
    RemoteControl,
    AdvancePayment,
    Magnet,
    LuckyCat,
    TarotCard,
    MetalDetector,
    LaundryMoney,
    PokerChip,
    LuckyPenny,
    NineToFive,
    Receipt,
}

impl ShopItem {
    /// Catalog order; generation iterates this instead of owned-map order so
    /// map internals can never perturb placement.
    pub const ALL: [Self; 19] = [
        Self::Quartz,
        Self::Diamond,
        Self::OneUp,
        Self::TwoUp,
        Self::Pickaxe,
        Self::Compass,
        Self::Scratchcard,
        Self::GoodDeal,
        Self::RemoteControl,
        Self::AdvancePayment,
        Self::Magnet,
        Self::LuckyCat,
        Self::TarotCard,
        Self::MetalDetector,
        Self::LaundryMoney,
        Self::PokerChip,
        Self::LuckyPenny,
        Self::NineToFive,
        Self::Receipt,
    ];

    pub const fn rarity(self) -> Rarity {
        use Rarity::*;
        match self {
            Self::Quartz => Common,
            Self::Diamond => Rare,
            Self::OneUp => Uncommon,
            Self::TwoUp => Rare,
            Self::Pickaxe => Common,
            Self::Compass => Uncommon,
            Self::Scratchcard => Rare,
            Self::GoodDeal => Common,
            Self::RemoteControl => Common,
            Self::AdvancePayment => Common,
            Self::Magnet => Uncommon,
            Self::LuckyCat => Uncommon,
            Self::TarotCard => Uncommon,
            Self::MetalDetector => Uncommon,
            Self::LaundryMoney => Uncommon,
            Self::PokerChip => Rare,
            Self::LuckyPenny => Uncommon,
            Self::NineToFive => Common,
            Self::Receipt => Rare,
        }
    }

    pub const fn price(self) -> i64 {
        self.rarity().price()
    }

    /// At most one copy may exist on a single board.
    pub const fn once_per_board(self) -> bool {
        matches!(self, Self::PokerChip)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeId {
    AutoGrat,
    Stopwatch,
    MathTest,
    BadDeal,
    Clover,
    SnakeOil,
    SnakeVenom,
    BloodPact,
    CarLoan,
    MegaMine,
    BloodDiamond,
    FindersFee,
    AtmFee,
    BoxingDay,
    Thief,
    Jackhammer,
    DonationBox,
    Appraisal,
    Key,
    Coal,
}

impl ChallengeId {
    pub const ALL: [Self; 20] = [
        Self::AutoGrat,
        Self::Stopwatch,
        Self::MathTest,
        Self::BadDeal,
        Self::Clover,
        Self::SnakeOil,
        Self::SnakeVenom,
        Self::BloodPact,
        Self::CarLoan,
        Self::MegaMine,
        Self::BloodDiamond,
        Self::FindersFee,
        Self::AtmFee,
        Self::BoxingDay,
        Self::Thief,
        Self::Jackhammer,
        Self::DonationBox,
        Self::Appraisal,
        Self::Key,
        Self::Coal,
    ];

    /// Spawn weighting for the drafted pool; `None` never spawns by drafting.
    pub const fn spawn_band(self) -> Option<SpawnBand> {
        use SpawnBand::*;
        match self {
            Self::AutoGrat => Some(High),
            Self::Stopwatch => Some(Medium),
            Self::MathTest => Some(Low),
            Self::BadDeal => Some(Low),
            Self::Clover => Some(High),
            Self::SnakeOil => Some(Medium),
            Self::SnakeVenom => Some(Medium),
            Self::BloodPact => Some(High),
            Self::CarLoan => Some(Medium),
            Self::MegaMine => Some(Medium),
            Self::BloodDiamond => Some(Low),
            Self::FindersFee => Some(High),
            Self::AtmFee => Some(Medium),
            Self::BoxingDay => Some(Medium),
            Self::Thief => Some(Medium),
            Self::Jackhammer => Some(High),
            Self::DonationBox => Some(High),
            Self::Appraisal => Some(High),
            Self::Key => Some(Medium),
            Self::Coal => None,
        }
    }
}

/// Run-persistent collectibles. Stacks multiply or repeat the effect.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relic {
    Vexillologist,
    Pioneer,
    Diffuser,
    Mathematician,
    Accountant,
    Minimalist,
    Lapidarist,
    Gambler,
    Cheapskate,
    Cartographer,
    Resurrector,
    NumberCruncher,
    Entrepreneur,
    Researcher,
    DebtCollector,
    Billionaire,
    Investor,
    Optimist,
    FortuneTeller,
    Auditor,
}

impl Relic {
    pub const ALL: [Self; 20] = [
        Self::Vexillologist,
        Self::Pioneer,
        Self::Diffuser,
        Self::Mathematician,
        Self::Accountant,
        Self::Minimalist,
        Self::Lapidarist,
        Self::Gambler,
        Self::Cheapskate,
        Self::Cartographer,
        Self::Resurrector,
        Self::NumberCruncher,
        Self::Entrepreneur,
        Self::Researcher,
        Self::DebtCollector,
        Self::Billionaire,
        Self::Investor,
        Self::Optimist,
        Self::FortuneTeller,
        Self::Auditor,
    ];

    pub const PRICE: i64 = 15;

    pub const fn rarity(self) -> Rarity {
        use Rarity::*;
        match self {
            Self::Vexillologist => Rare,
            Self::Pioneer => Uncommon,
            Self::Diffuser => Uncommon,
            Self::Mathematician => Uncommon,
            Self::Accountant => Rare,
            Self::Minimalist => Rare,
            Self::Lapidarist => Uncommon,
            Self::Gambler => Uncommon,
            Self::Cheapskate => Uncommon,
            Self::Cartographer => Uncommon,
            Self::Resurrector => Uncommon,
            Self::NumberCruncher => Rare,
            Self::Entrepreneur => Uncommon,
            Self::Researcher => Uncommon,
            Self::DebtCollector => Uncommon,
            Self::Billionaire => Rare,
            Self::Investor => Rare,
            Self::Optimist => Rare,
            Self::FortuneTeller => Uncommon,
            Self::Auditor => Uncommon,
        }
    }
}
