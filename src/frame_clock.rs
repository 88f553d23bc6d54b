use std::time::{Duration, Instant};

/// Wall-clock source for the frame clock. Seconds are relative to an
/// arbitrary origin.
pub trait TimeSource {
    fn now(&self) -> f64;
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

const FPS_LOG_PERIOD: f64 = 0.5;

/// Virtual animation clock paced to a target frame rate.
///
/// While the loop keeps up, the virtual time advances by exactly one ideal
/// frame period per call and the caller is put to sleep to line it up with
/// wall-clock time. A gap of more than two periods (startup, a stall, a
/// debugger pause) snaps the virtual clock to the wall clock instead.
#[derive(Debug)]
pub struct FrameClock<S: TimeSource = SystemTimeSource> {
    source: S,
    time: f64,
    ideal_dt: f64,
    show_fps: bool,
    fps_frames: u32,
    fps_time: f64,
    observed_fps: Option<f64>,
}

impl FrameClock<SystemTimeSource> {
    pub fn new(target_fps: u32, show_fps: bool) -> Self {
        Self::with_source(SystemTimeSource::new(), target_fps, show_fps)
    }
}

impl<S: TimeSource> FrameClock<S> {
    pub fn with_source(source: S, target_fps: u32, show_fps: bool) -> Self {
        let time = source.now();
        Self {
            source,
            time,
            ideal_dt: 1.0 / f64::from(target_fps.max(1)),
            show_fps,
            fps_frames: 0,
            fps_time: time,
            observed_fps: None,
        }
    }

    /// Advance the virtual clock and return the animation time delta.
    pub fn advance(&mut self) -> f64 {
        let now = self.source.now();
        let real_dt = now - self.time;

        let animation_dt = if real_dt > self.ideal_dt * 2.0 {
            self.time = now;
            real_dt
        } else {
            self.time += self.ideal_dt;
            if real_dt < self.ideal_dt {
                self.source
                    .sleep(Duration::from_secs_f64(self.ideal_dt - real_dt));
            }
            self.ideal_dt
        };

        self.observe_frame_rate(now);
        animation_dt
    }

    fn observe_frame_rate(&mut self, now: f64) {
        self.fps_frames += 1;
        let elapsed = now - self.fps_time;
        if elapsed > FPS_LOG_PERIOD {
            let fps = f64::from(self.fps_frames) / elapsed;
            self.fps_time = now;
            self.fps_frames = 0;
            self.observed_fps = Some(fps);
            if self.show_fps {
                tracing::info!(action = "frame_rate", fps = format_args!("{fps:.2}"));
            }
        }
    }

    /// Current virtual time, in the time source's seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn ideal_dt(&self) -> f64 {
        self.ideal_dt
    }

    /// Most recent frame-rate observation, if a full period has elapsed.
    pub fn observed_fps(&self) -> Option<f64> {
        self.observed_fps
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

/// Deterministic time source for tests and offline rendering: time only
/// moves when `sleep` or `advance_by` is called.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: f64,
    slept: Duration,
}

impl ManualTimeSource {
    pub fn starting_at(now: f64) -> Self {
        Self {
            now,
            slept: Duration::ZERO,
        }
    }

    pub fn advance_by(&mut self, seconds: f64) {
        self.now += seconds;
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.slept
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> f64 {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.slept += duration;
        self.now += duration.as_secs_f64();
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameClock, ManualTimeSource, TimeSource};
    use proptest::prelude::*;

    const FPS: u32 = 30;

    #[test]
    fn stall_snaps_to_wall_clock_once() {
        let mut clock = FrameClock::with_source(ManualTimeSource::starting_at(10.0), FPS, false);
        clock.source_mut().advance_by(1.25);

        let dt = clock.advance();
        assert!((dt - 1.25).abs() < 1e-9);
        assert_eq!(clock.time(), 11.25);
        assert_eq!(clock.source().slept().as_secs_f64(), 0.0);

        clock.source_mut().advance_by(0.01);
        let dt = clock.advance();
        assert!((dt - clock.ideal_dt()).abs() < 1e-12);
        assert!((clock.time() - (11.25 + clock.ideal_dt())).abs() < 1e-9);
    }

    #[test]
    fn fast_frames_sleep_up_to_the_ideal_period() {
        let mut clock = FrameClock::with_source(ManualTimeSource::starting_at(0.0), FPS, false);
        clock.source_mut().advance_by(0.005);
        let dt = clock.advance();

        assert!((dt - 1.0 / 30.0).abs() < 1e-12);
        let slept = clock.source().slept().as_secs_f64();
        assert!((slept - (1.0 / 30.0 - 0.005)).abs() < 1e-6, "slept {slept}");
    }

    #[test]
    fn frame_rate_is_observed_after_log_period() {
        let mut clock = FrameClock::with_source(ManualTimeSource::starting_at(0.0), FPS, true);
        assert_eq!(clock.observed_fps(), None);
        for _ in 0..20 {
            clock.advance();
        }
        let fps = clock.observed_fps().expect("half a second has elapsed");
        assert!((fps - 30.0).abs() < 3.0, "fps {fps}");
    }

    #[test]
    fn zero_fps_is_treated_as_one() {
        let clock = FrameClock::with_source(ManualTimeSource::default(), 0, false);
        assert_eq!(clock.ideal_dt(), 1.0);
    }

    proptest! {
        #[test]
        fn advancement_is_drift_free_under_bounded_jitter(
            jitter in proptest::collection::vec(0.0f64..(2.0 / 30.0), 1..200)
        ) {
            let start = 5.0;
            let mut clock = FrameClock::with_source(ManualTimeSource::starting_at(start), FPS, false);
            let ideal = clock.ideal_dt();

            for work in &jitter {
                // Keep each call inside the 2x window relative to the virtual clock.
                let lag = clock.source().now() - clock.time();
                let budget = (2.0 * ideal - lag - 1e-9).max(0.0);
                clock.source_mut().advance_by(work.min(budget));
                let dt = clock.advance();
                prop_assert!((dt - ideal).abs() < 1e-12);
            }

            let expected = start + jitter.len() as f64 * ideal;
            prop_assert!((clock.time() - expected).abs() < 1e-6);
        }
    }
}
