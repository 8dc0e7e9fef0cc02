use std::time::{Duration, Instant};

/// Frame delta source for the runtime loop: either a fixed step or the
/// measured wall-clock time between ticks.
pub struct FrameClock {
    start: Instant,
    last: Instant,
    fixed: Option<f32>,
    pub delta: Duration,
    frame: u64,
}

impl FrameClock {
    pub fn measured() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, fixed: None, delta: Duration::ZERO, frame: 0 }
    }

    pub fn fixed(dt: f32) -> Self {
        Self { fixed: Some(dt), delta: Duration::from_secs_f32(dt), ..Self::measured() }
    }

    /// Advances one frame and returns its delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.frame += 1;
        match self.fixed {
            Some(dt) => {
                self.last = now;
                dt
            }
            None => {
                self.delta = now - self.last;
                self.last = now;
                self.delta.as_secs_f32()
            }
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reports_constant_delta() {
        let mut clock = FrameClock::fixed(0.5);
        assert_eq!(clock.tick(), 0.5);
        assert_eq!(clock.tick(), 0.5);
        assert_eq!(clock.frame(), 2);
    }
}
