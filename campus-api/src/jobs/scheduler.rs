//! Wall-clock task scheduling.
//!
//! A [`ScheduledTask`] declares a [`MinuteSchedule`]; [`run_scheduled`]
//! sleeps until the next matching minute, runs the task, and repeats until
//! the shutdown signal flips. Time comes from an injectable [`Clock`].

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use tokio::sync::watch;

// ============================================================================
// CLOCK
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.0.lock() {
            *now = to;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.0.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.0.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// ============================================================================
// SCHEDULE
// ============================================================================

/// Fires at second zero of every minute divisible by `every_minutes`,
/// like the cron expression `*/N * * * *`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteSchedule {
    every_minutes: u32,
}

impl MinuteSchedule {
    /// `minutes` is clamped to 1..=60.
    pub fn every(minutes: u32) -> Self {
        Self {
            every_minutes: minutes.clamp(1, 60),
        }
    }

    pub fn every_minutes(&self) -> u32 {
        self.every_minutes
    }

    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        at.second() == 0 && at.nanosecond() == 0 && at.minute() % self.every_minutes == 0
    }

    /// The first matching instant strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let minute_start = after
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(after);
        let mut candidate = minute_start + Duration::minutes(1);
        // Any divisor of an hour is reached within 60 steps.
        for _ in 0..60 {
            if candidate.minute() % self.every_minutes == 0 {
                return candidate;
            }
            candidate += Duration::minutes(1);
        }
        candidate
    }
}

// ============================================================================
// TASKS
// ============================================================================

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &'static str;

    fn schedule(&self) -> MinuteSchedule;

    /// Run once for the tick scheduled at `at`.
    async fn run(&self, at: DateTime<Utc>);
}

/// Drive `task` on its schedule until `shutdown_rx` reports `true` or its
/// sender is dropped. Returns the number of runs.
pub async fn run_scheduled(
    task: Arc<dyn ScheduledTask>,
    clock: Arc<dyn Clock>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> u64 {
    let schedule = task.schedule();
    tracing::info!(
        task = task.name(),
        every_minutes = schedule.every_minutes(),
        "Scheduled task started"
    );

    let mut runs = 0u64;
    let mut last_fired: Option<DateTime<Utc>> = None;
    loop {
        let now = clock.now();
        // A tick fires at most once, even if the clock stalls or steps back.
        let from = last_fired.map_or(now, |last| last.max(now));
        let next = schedule.next_after(from);
        let wait = (next - now).to_std().unwrap_or(StdDuration::ZERO);

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!(task = task.name(), runs, "Scheduled task shutting down");
                    break;
                }
            }
            _ = tokio::time::sleep(wait) => {
                tracing::debug!(task = task.name(), at = %next, "Running scheduled task");
                task.run(next).await;
                last_fired = Some(next);
                runs += 1;
            }
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, m, s)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn test_every_two_minutes_fires_on_even_minutes() {
        let schedule = MinuteSchedule::every(2);
        assert_eq!(schedule.next_after(at(9, 0, 0)), at(9, 2, 0));
        assert_eq!(schedule.next_after(at(9, 0, 30)), at(9, 2, 0));
        assert_eq!(schedule.next_after(at(9, 1, 59)), at(9, 2, 0));
        assert_eq!(schedule.next_after(at(9, 59, 10)), at(10, 0, 0));
        assert!(schedule.matches(at(9, 4, 0)));
        assert!(!schedule.matches(at(9, 5, 0)));
        assert!(!schedule.matches(at(9, 4, 1)));
    }

    #[test]
    fn test_every_is_clamped() {
        assert_eq!(MinuteSchedule::every(0).every_minutes(), 1);
        assert_eq!(MinuteSchedule::every(500).every_minutes(), 60);
        assert_eq!(MinuteSchedule::every(60).next_after(at(9, 30, 0)), at(10, 0, 0));
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(at(9, 0, 0));
        clock.advance(Duration::minutes(3));
        assert_eq!(clock.now(), at(9, 3, 0));
        clock.set(at(12, 0, 0));
        assert_eq!(clock.now(), at(12, 0, 0));
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<DateTime<Utc>>>);

    impl Recording {
        fn ticks(&self) -> Vec<DateTime<Utc>> {
            self.0.lock().map(|t| t.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ScheduledTask for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn schedule(&self) -> MinuteSchedule {
            MinuteSchedule::every(2)
        }

        async fn run(&self, at: DateTime<Utc>) {
            if let Ok(mut ticks) = self.0.lock() {
                ticks.push(at);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_clock_fires_each_tick_once() {
        let task = Arc::new(Recording::default());
        let clock = Arc::new(ManualClock::new(
            at(9, 1, 59) + Duration::milliseconds(999),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduled(task.clone(), clock, shutdown_rx));

        // Five minutes of paused time: the 09:02 tick fires after 1ms, 09:04
        // about two minutes later, and 09:06 is still four minutes out.
        tokio::time::sleep(StdDuration::from_secs(5 * 60)).await;
        shutdown_tx.send(true).expect("send shutdown");
        let runs = handle.await.expect("join");

        assert_eq!(task.ticks(), vec![at(9, 2, 0), at(9, 4, 0)]);
        assert_eq!(runs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_stepping_back_does_not_repeat_tick() {
        let task = Arc::new(Recording::default());
        let clock = Arc::new(ManualClock::new(at(9, 3, 59)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduled(task.clone(), clock.clone(), shutdown_rx));

        tokio::time::sleep(StdDuration::from_secs(2)).await;
        assert_eq!(task.ticks(), vec![at(9, 4, 0)]);

        // With the clock stepped back behind 09:04, the next waits are
        // scheduled from the last fired tick rather than from "now".
        clock.set(at(9, 3, 0));
        tokio::time::sleep(StdDuration::from_secs(180)).await;
        assert_eq!(task.ticks(), vec![at(9, 4, 0), at(9, 6, 0)]);

        shutdown_tx.send(true).expect("send shutdown");
        handle.await.expect("join");
    }

    struct Counting(AtomicU64);

    #[async_trait]
    impl ScheduledTask for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn schedule(&self) -> MinuteSchedule {
            MinuteSchedule::every(2)
        }

        async fn run(&self, at: DateTime<Utc>) {
            assert!(self.schedule().matches(at));
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_run_scheduled_runs_and_stops() {
        let task = Arc::new(Counting(AtomicU64::new(0)));
        // A millisecond before an even minute: each wait is tiny.
        let clock = Arc::new(ManualClock::new(
            at(9, 1, 59) + Duration::milliseconds(999),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_scheduled(task.clone(), clock, shutdown_rx));
        while task.0.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        shutdown_tx.send(true).expect("send shutdown");

        let runs = handle.await.expect("join");
        assert!(runs >= 1);
    }
}
