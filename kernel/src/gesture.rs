// Single-button gesture recognizer
//
// Fed raw level samples (pressed / released + a millisecond timestamp)
// from the main loop tick, returns at most one event per sample.
//
//   < 50ms press       bounce, ignored; a click run in progress survives
//   >= 2000ms held     LongPress, fired while still held; aborts any run
//   short presses      counted while each press starts < 500ms after the
//                      previous release; finalized once the window
//                      passes with the button up, or at the third release
//
// A run of two is provisionally a double click while the window is
// still open; `provisional()` exposes that so callers can give instant
// feedback without committing to an action.

use crate::consts::{HOLD_THRESHOLD_MS, MULTI_CLICK_WINDOW_MS, SHORT_PRESS_MIN_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    None,
    SingleClick,
    DoubleClick,
    TripleClick,
    LongPress,
}

impl GestureEvent {
    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub hold_ms: u32,
    pub short_press_min_ms: u32,
    pub multi_click_window_ms: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            hold_ms: HOLD_THRESHOLD_MS,
            short_press_min_ms: SHORT_PRESS_MIN_MS,
            multi_click_window_ms: MULTI_CLICK_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// Button down since `since`. `run` clicks precede this press; the
    /// last of them was released at `prev_release`.
    Held {
        since: u32,
        run: u8,
        prev_release: u32,
    },
    /// Button up; `count` clicks so far, the last released at `since`.
    CountingClicks { count: u8, since: u32 },
    /// Long press already reported; waiting for the release.
    Latched,
}

pub struct GestureDetector {
    cfg: GestureConfig,
    state: State,
}

impl GestureDetector {
    pub const fn new(cfg: GestureConfig) -> Self {
        Self {
            cfg,
            state: State::Idle,
        }
    }

    /// Feeds one sample. Timestamps may wrap.
    pub fn update(&mut self, pressed: bool, now_ms: u32) -> GestureEvent {
        let cfg = self.cfg;
        let (next, event) = match (self.state, pressed) {
            (State::Idle, true) => (
                State::Held {
                    since: now_ms,
                    run: 0,
                    prev_release: now_ms,
                },
                GestureEvent::None,
            ),
            (State::Idle, false) => (State::Idle, GestureEvent::None),

            (State::Held { since, .. }, true) => {
                if now_ms.wrapping_sub(since) >= cfg.hold_ms {
                    (State::Latched, GestureEvent::LongPress)
                } else {
                    (self.state, GestureEvent::None)
                }
            }
            (
                State::Held {
                    since,
                    run,
                    prev_release,
                },
                false,
            ) => {
                let held = now_ms.wrapping_sub(since);
                if held >= cfg.hold_ms {
                    // only sampled after the threshold passed
                    (State::Idle, GestureEvent::LongPress)
                } else if held < cfg.short_press_min_ms {
                    let back = if run == 0 {
                        State::Idle
                    } else {
                        State::CountingClicks {
                            count: run,
                            since: prev_release,
                        }
                    };
                    (back, GestureEvent::None)
                } else if run + 1 >= 3 {
                    (State::Idle, GestureEvent::TripleClick)
                } else {
                    (
                        State::CountingClicks {
                            count: run + 1,
                            since: now_ms,
                        },
                        GestureEvent::None,
                    )
                }
            }

            (State::CountingClicks { count, since }, true) => {
                if now_ms.wrapping_sub(since) < cfg.multi_click_window_ms {
                    (
                        State::Held {
                            since: now_ms,
                            run: count,
                            prev_release: since,
                        },
                        GestureEvent::None,
                    )
                } else {
                    // window ran out between samples; close the old run
                    // and treat this as a fresh press
                    (
                        State::Held {
                            since: now_ms,
                            run: 0,
                            prev_release: now_ms,
                        },
                        finalize(count),
                    )
                }
            }
            (State::CountingClicks { count, since }, false) => {
                if now_ms.wrapping_sub(since) >= cfg.multi_click_window_ms {
                    (State::Idle, finalize(count))
                } else {
                    (self.state, GestureEvent::None)
                }
            }

            (State::Latched, true) => (State::Latched, GestureEvent::None),
            (State::Latched, false) => (State::Idle, GestureEvent::None),
        };
        self.state = next;
        event
    }

    /// What the run in progress would finalize as right now, if it is
    /// a double click. Cleared by a third click or by finalization.
    pub fn provisional(&self) -> Option<GestureEvent> {
        match self.state {
            State::CountingClicks { count: 2, .. } | State::Held { run: 2, .. } => {
                Some(GestureEvent::DoubleClick)
            }
            _ => None,
        }
    }
}

impl Default for GestureDetector {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

fn finalize(count: u8) -> GestureEvent {
    match count {
        0 => GestureEvent::None,
        1 => GestureEvent::SingleClick,
        2 => GestureEvent::DoubleClick,
        _ => GestureEvent::TripleClick,
    }
}
