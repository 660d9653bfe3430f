//! Typed publish/subscribe bus decoupling the simulation from presentation.
//! Single-threaded by design; listeners run synchronously inside `emit`.

use crate::tile::TileKind;
use crate::types::Coord2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    ExitUsed,
    LivesDepleted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    LevelStarted { level: u32 },
    TileRevealed { coords: Coord2, kind: TileKind },
    GoldChanged { amount: i64, source: &'static str },
    LifeChanged { delta: i32 },
    LevelEndTriggered { reason: EndReason },
    LevelEndResolved { survived: bool },
    /// Tiles changed without a reveal (auto-flag effects).
    BoardChanged { reason: &'static str },
}

type Listener = Box<dyn FnMut(&GameEvent)>;

/// Handle returned by [`EventBus::subscribe`]. Slots are never reused, so a
/// handle kept past its unsubscribe stays harmless.
#[derive(Debug)]
pub struct Subscription {
    slot: usize,
}

#[derive(Default)]
pub struct EventBus {
    slots: Vec<Option<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&GameEvent) + 'static) -> Subscription {
        self.slots.push(Some(Box::new(listener)));
        Subscription {
            slot: self.slots.len() - 1,
        }
    }

    /// Idempotent; unsubscribing an already-removed listener is a no-op.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        if let Some(slot) = self.slots.get_mut(subscription.slot) {
            *slot = None;
        }
    }

    /// Drops every listener. Level teardown calls this so listeners cannot
    /// accumulate across level transitions.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn emit(&mut self, event: GameEvent) {
        for listener in self.slots.iter_mut().flatten() {
            listener(&event);
        }
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.slots.iter().flatten().count())
            .finish()
    }
}
