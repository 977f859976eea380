use std::time::Duration;

use shared::CellPos;
use tracing::{debug, warn};

use crate::{
    clock::{Clock, SystemClock},
    grid_store::GridStore,
    shake::{ShakeSignal, SHAKE_THROTTLE},
};

/// Grace period after a touch ends during which the trailing synthetic
/// click is still treated as a tap.
pub const TOUCH_COOLDOWN: Duration = Duration::from_millis(200);
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(500);
pub const MAX_SUPERCHARGED_CELLS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        meta: false,
    };
    pub const CTRL: Self = Self {
        ctrl: true,
        meta: false,
    };

    pub fn is_chorded(self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Space,
    Enter,
    Other,
}

/// Raw input delivered to a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellEvent {
    TouchStart,
    TouchEnd,
    Click(Modifiers),
    KeyDown(Key),
    ContextMenu,
}

/// Grid mutation a gesture resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    SingleTap,
    DoubleTap,
    ToggleActive,
    ToggleSupercharged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing was attempted: bookkeeping events, shared grids, stale indices.
    Ignored,
    Applied(Gesture),
    /// The lock policy refused the gesture; the grid is as it was before.
    Rejected(Gesture),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOutcome {
    pub disposition: Disposition,
    /// Whether the host should suppress the platform default for the event.
    pub prevent_default: bool,
}

impl EventOutcome {
    fn ignored() -> Self {
        Self {
            disposition: Disposition::Ignored,
            prevent_default: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InteractionConfig {
    pub touch_cooldown: Duration,
    pub double_tap_window: Duration,
    pub max_supercharged: usize,
    /// Route plain clicks through tap handling even without a touch.
    pub clicks_as_taps: bool,
    pub shake_throttle: Duration,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            touch_cooldown: TOUCH_COOLDOWN,
            double_tap_window: DOUBLE_TAP_WINDOW,
            max_supercharged: MAX_SUPERCHARGED_CELLS,
            clicks_as_taps: false,
            shake_throttle: SHAKE_THROTTLE,
        }
    }
}

/// Turns pointer, touch and keyboard events on grid cells into
/// [`GridStore`] mutations.
///
/// Touch input arms tap mode. Clicks that arrive while armed are taps; a
/// tap within the double-tap window of the previous one is a double tap
/// that supercharges relative to the state before the first tap. Any other
/// click is a direct mouse gesture. Rejected gestures leave the grid
/// untouched and fire the shake signal.
pub struct CellInteractionController<C: Clock = SystemClock> {
    clock: C,
    config: InteractionConfig,
    touch_armed: bool,
    touch_release_at_ms: Option<u64>,
    touching: Option<CellPos>,
    last_tap_ms: Option<u64>,
    shake: ShakeSignal,
}

impl CellInteractionController<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new(), InteractionConfig::default())
    }
}

impl Default for CellInteractionController<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> CellInteractionController<C> {
    pub fn with_clock(clock: C, config: InteractionConfig) -> Self {
        Self {
            clock,
            shake: ShakeSignal::new(config.shake_throttle),
            config,
            touch_armed: false,
            touch_release_at_ms: None,
            touching: None,
            last_tap_ms: None,
        }
    }

    pub fn shake(&self) -> &ShakeSignal {
        &self.shake
    }

    pub fn is_touching(&self, pos: CellPos) -> bool {
        self.touching == Some(pos)
    }

    pub fn is_touch_armed(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.touch_armed_at(now)
    }

    pub fn handle(&mut self, store: &mut GridStore, pos: CellPos, event: CellEvent) -> EventOutcome {
        let now = self.clock.now_ms();
        match event {
            CellEvent::TouchStart => {
                self.touch_armed = true;
                self.touch_release_at_ms = None;
                self.touching = Some(pos);
                EventOutcome::ignored()
            }
            CellEvent::TouchEnd => {
                self.touching = None;
                self.touch_release_at_ms =
                    Some(now + self.config.touch_cooldown.as_millis() as u64);
                EventOutcome::ignored()
            }
            CellEvent::ContextMenu => EventOutcome {
                disposition: Disposition::Ignored,
                prevent_default: true,
            },
            CellEvent::KeyDown(Key::Space | Key::Enter) => {
                let disposition = self.run(store, pos, now, Gesture::ToggleActive);
                EventOutcome {
                    disposition,
                    prevent_default: true,
                }
            }
            CellEvent::KeyDown(Key::Other) => EventOutcome::ignored(),
            CellEvent::Click(modifiers) => {
                let gesture = if self.touch_armed_at(now) || self.config.clicks_as_taps {
                    self.classify_tap(now)
                } else if modifiers.is_chorded() {
                    Gesture::ToggleActive
                } else {
                    Gesture::ToggleSupercharged
                };
                EventOutcome {
                    disposition: self.run(store, pos, now, gesture),
                    prevent_default: false,
                }
            }
        }
    }

    fn touch_armed_at(&mut self, now: u64) -> bool {
        if let Some(release_at) = self.touch_release_at_ms {
            if now >= release_at {
                self.touch_armed = false;
                self.touch_release_at_ms = None;
            }
        }
        self.touch_armed
    }

    fn classify_tap(&self, now: u64) -> Gesture {
        let window = self.config.double_tap_window.as_millis() as u64;
        match self.last_tap_ms {
            Some(last) if now > last && now - last < window => Gesture::DoubleTap,
            _ => Gesture::SingleTap,
        }
    }

    fn run(&mut self, store: &mut GridStore, pos: CellPos, now: u64, gesture: Gesture) -> Disposition {
        if store.is_shared_grid() {
            debug!(row = pos.row, col = pos.col, "interaction ignored on shared grid");
            return Disposition::Ignored;
        }
        let Some(cell) = store.cell(pos) else {
            warn!(row = pos.row, col = pos.col, "interaction on out-of-range cell");
            return Disposition::Ignored;
        };

        let allowed = match gesture {
            Gesture::SingleTap | Gesture::ToggleActive => {
                !(store.grid_fixed() || (store.supercharged_fixed() && cell.supercharged))
            }
            Gesture::DoubleTap => {
                // Judge "already supercharged" by the state before the first tap.
                let was_supercharged = store
                    .pending_tap_snapshot()
                    .map_or(cell.supercharged, |snapshot| snapshot.supercharged);
                self.supercharge_allowed(store, was_supercharged)
            }
            Gesture::ToggleSupercharged => self.supercharge_allowed(store, cell.supercharged),
        };

        match gesture {
            Gesture::SingleTap => {
                self.last_tap_ms = Some(now);
                if allowed {
                    store.handle_cell_tap(pos);
                } else {
                    store.clear_initial_cell_state_for_tap();
                }
            }
            Gesture::DoubleTap => {
                self.last_tap_ms = None;
                if allowed {
                    store.handle_cell_double_tap(pos);
                } else {
                    store.revert_cell_tap(pos);
                }
            }
            Gesture::ToggleActive if allowed => store.toggle_cell_active(pos),
            Gesture::ToggleSupercharged if allowed => store.toggle_cell_supercharged(pos),
            Gesture::ToggleActive | Gesture::ToggleSupercharged => {}
        }

        if allowed {
            Disposition::Applied(gesture)
        } else {
            debug!(row = pos.row, col = pos.col, ?gesture, "interaction rejected");
            self.shake.trigger(now);
            Disposition::Rejected(gesture)
        }
    }

    fn supercharge_allowed(&self, store: &GridStore, already_supercharged: bool) -> bool {
        !(store.supercharged_fixed()
            || store.grid_fixed()
            || (store.total_supercharged_cells() >= self.config.max_supercharged
                && !already_supercharged))
    }
}

#[cfg(test)]
#[path = "tests/interaction_tests.rs"]
mod tests;
