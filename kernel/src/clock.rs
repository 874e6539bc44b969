// Software wall clock for the on-screen time
//
// Seeded once per fetch (SNTP, or midnight when that fails), then
// advanced from the monotonic millisecond counter. The anchor moves in
// whole seconds so late ticks never lose time.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftClock {
    hour: u8,
    min: u8,
    sec: u8,
    anchor_ms: u64,
}

impl SoftClock {
    pub const fn midnight(now_ms: u64) -> Self {
        Self {
            hour: 0,
            min: 0,
            sec: 0,
            anchor_ms: now_ms,
        }
    }

    /// Local time of day from Unix seconds plus a UTC offset.
    pub fn from_unix(unix: u32, utc_offset_secs: i32, now_ms: u64) -> Self {
        let local = (unix as i64 + utc_offset_secs as i64).rem_euclid(86_400) as u32;
        Self {
            hour: (local / 3600) as u8,
            min: (local / 60 % 60) as u8,
            sec: (local % 60) as u8,
            anchor_ms: now_ms,
        }
    }

    #[inline]
    pub fn hms(&self) -> (u8, u8, u8) {
        (self.hour, self.min, self.sec)
    }

    /// Catches up on every whole second since the last call; returns
    /// whether the displayed time changed.
    pub fn advance(&mut self, now_ms: u64) -> bool {
        let mut changed = false;
        while now_ms.saturating_sub(self.anchor_ms) >= 1000 {
            self.anchor_ms += 1000;
            self.tick();
            changed = true;
        }
        changed
    }

    fn tick(&mut self) {
        self.sec += 1;
        if self.sec >= 60 {
            self.sec = 0;
            self.min += 1;
        }
        if self.min >= 60 {
            self.min = 0;
            self.hour += 1;
        }
        if self.hour >= 24 {
            self.hour = 0;
        }
    }
}
