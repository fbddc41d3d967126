//! Fixed-timestep game loop bookkeeping.
//!
//! Logic runs at 60 ticks per second no matter how often the presentation
//! callback fires. Elapsed wall time is folded into an accumulator and
//! paid out in whole ticks; leftover time carries over to the next frame.

use std::time::Duration;

use log::warn;

/// Tick accountant for the game loop.
pub struct Scheduler {
    accumulator: Duration,
    running: bool,
}

impl Scheduler {
    /// One logic tick: 1000/60 ms.
    pub const TICK: Duration = Duration::from_nanos(1_000_000_000 / 60);

    /// Backlog past this point is reported as a stall.
    const STALL: Duration = Duration::from_millis(200);

    pub fn new() -> Self {
        Self {
            accumulator: Duration::ZERO,
            running: false,
        }
    }

    /// Begin scheduling ticks. Starting twice has no duplicate effect.
    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            self.accumulator = Duration::ZERO;
        }
    }

    /// Stop scheduling ticks and discard any backlog, so nothing fires
    /// until the loop is started again. Stopping a stopped loop is a
    /// no-op.
    pub fn stop(&mut self) {
        self.running = false;
        self.accumulator = Duration::ZERO;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Account `elapsed` wall time and return the number of whole ticks
    /// due before the next presentation. Late ticks are reported, never
    /// dropped.
    pub fn drain(&mut self, elapsed: Duration) -> u32 {
        if !self.running {
            return 0;
        }
        self.accumulator += elapsed;
        if self.accumulator > Self::STALL {
            warn!(
                "performance degradation detected: {} ms backlog",
                self.accumulator.as_millis()
            );
        }
        let mut ticks = 0;
        while self.accumulator >= Self::TICK {
            self.accumulator -= Self::TICK;
            ticks += 1;
        }
        ticks
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiples_pay_out_exactly() {
        let mut scheduler = Scheduler::new();
        scheduler.start();
        assert_eq!(scheduler.drain(Scheduler::TICK * 3), 3);
        // the accumulator drained completely, nothing carries over
        assert_eq!(scheduler.drain(Duration::ZERO), 0);
    }

    #[test]
    fn remainders_carry_over() {
        let mut scheduler = Scheduler::new();
        scheduler.start();
        let half = Scheduler::TICK / 2;
        assert_eq!(scheduler.drain(half), 0);
        assert_eq!(scheduler.drain(half), 1);
    }

    #[test]
    fn stalls_drain_every_pending_tick() {
        let mut scheduler = Scheduler::new();
        scheduler.start();
        // half a second of backlog: 30 ticks, none skipped
        assert_eq!(scheduler.drain(Scheduler::TICK * 30), 30);
    }

    #[test]
    fn stopped_loop_pays_nothing_and_forgets_backlog() {
        let mut scheduler = Scheduler::new();
        assert_eq!(scheduler.drain(Scheduler::TICK * 5), 0);

        scheduler.start();
        scheduler.drain(Scheduler::TICK / 2);
        scheduler.stop();
        scheduler.stop(); // idempotent

        scheduler.start();
        // the pre-stop remainder is gone
        assert_eq!(scheduler.drain(Scheduler::TICK - Duration::from_nanos(1)), 0);
    }

    #[test]
    fn start_is_idempotent() {
        let mut scheduler = Scheduler::new();
        scheduler.start();
        scheduler.drain(Scheduler::TICK / 2);
        scheduler.start(); // must not reset the in-flight remainder
        assert_eq!(scheduler.drain(Scheduler::TICK / 2), 1);
    }
}
