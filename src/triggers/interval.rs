use super::{Trigger, TriggerError, TriggerEvent};
use crate::context::Context;
use duration_string::DurationString;
use log::{debug, info, trace};
use std::{
    sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError},
    thread,
    time::{Duration, Instant},
};

/// Shorter intervals would hammer the remote.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A trigger that polls periodically.
///
/// The first event is sent immediately, then one on every tick of a fixed
/// schedule. If the previous event is not yet consumed when the tick arrives,
/// the tick is dropped: one pending update already covers it.
pub struct IntervalTrigger {
    interval: Duration,
    started: bool,
}

impl IntervalTrigger {
    /// Creates a new IntervalTrigger, the interval must be at least 5 seconds.
    pub fn new(interval: Duration) -> Result<Self, TriggerError> {
        if interval.is_zero() {
            return Err(TriggerError::Misconfigured(String::from(
                "interval cannot be zero",
            )));
        }
        if interval < MIN_INTERVAL {
            return Err(TriggerError::Misconfigured(format!(
                "interval {} is shorter than the minimum {}",
                DurationString::new(interval),
                DurationString::new(MIN_INTERVAL)
            )));
        }

        Ok(IntervalTrigger {
            interval,
            started: false,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn tick(tx: &SyncSender<TriggerEvent>) -> bool {
        match tx.try_send(TriggerEvent::Update) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("Previous update is still pending, skipping tick.");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn run(tx: SyncSender<TriggerEvent>, interval: Duration, context: Context) {
        info!(
            "Checking for updates every {}.",
            DurationString::new(interval)
        );

        let mut next_tick = Instant::now();
        loop {
            if !IntervalTrigger::tick(&tx) {
                debug!("Receiver hang up, stopping the interval.");
                return;
            }

            next_tick += interval;
            if context.wait_until(next_tick) {
                break;
            }
        }

        debug!("Context cancelled, stopping the interval.");
        let _ = tx.send(TriggerEvent::Failed(TriggerError::Cancelled));
    }
}

impl Trigger for IntervalTrigger {
    /// Starts the ticks on a new thread.
    fn start(&mut self, context: &Context) -> Result<Receiver<TriggerEvent>, TriggerError> {
        if self.started {
            return Err(TriggerError::AlreadyStarted);
        }

        let (tx, rx) = sync_channel(1);
        let interval = self.interval;
        let context = context.clone();
        thread::Builder::new()
            .name(String::from("interval"))
            .spawn(move || IntervalTrigger::run(tx, interval, context))
            .map_err(|err| TriggerError::Misconfigured(err.to_string()))?;
        self.started = true;

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_fast_trigger() -> IntervalTrigger {
        IntervalTrigger {
            interval: Duration::from_millis(100),
            started: false,
        }
    }

    #[test]
    fn it_should_be_created_from_duration() {
        let trigger = IntervalTrigger::new(Duration::from_secs(60)).unwrap();
        assert_eq!(Duration::from_secs(60), trigger.interval());

        let trigger = IntervalTrigger::new(MIN_INTERVAL).unwrap();
        assert_eq!(Duration::from_secs(5), trigger.interval());
    }

    #[test]
    fn it_should_reject_short_intervals() {
        for interval in [Duration::ZERO, Duration::from_millis(100), Duration::from_secs(4)] {
            let result = IntervalTrigger::new(interval);
            assert!(
                matches!(result, Err(TriggerError::Misconfigured(_))),
                "{interval:?} should be Misconfigured"
            );
        }
    }

    #[test]
    fn it_should_trigger_immediately_and_every_100_ms() {
        let mut trigger = create_fast_trigger();
        let context = Context::new();

        let start = Instant::now();
        let rx = trigger.start(&context).unwrap();

        let event = rx.recv().unwrap();
        assert_eq!(TriggerEvent::Update, event);
        assert!(start.elapsed() < Duration::from_millis(50));

        for i in 1..4 {
            let event = rx.recv().unwrap();
            assert_eq!(TriggerEvent::Update, event);

            // It should be close to the schedule
            let diff = start.elapsed();
            assert!(diff >= Duration::from_millis(i * 100 - 5), "{diff:?}");
            assert!(diff <= Duration::from_millis(i * 100 + 50), "{diff:?}");
        }

        context.cancel();
    }

    #[test]
    fn it_should_close_once_after_cancellation() {
        let mut trigger = create_fast_trigger();
        let context = Context::new();
        let rx = trigger.start(&context).unwrap();

        assert_eq!(TriggerEvent::Update, rx.recv().unwrap());
        context.cancel();

        let events: Vec<TriggerEvent> = rx.iter().collect();
        let cancelled: Vec<&TriggerEvent> = events
            .iter()
            .filter(|event| event.error().is_some())
            .collect();
        assert_eq!(
            vec![&TriggerEvent::Failed(TriggerError::Cancelled)],
            cancelled
        );
        assert_eq!(
            Some(&TriggerEvent::Failed(TriggerError::Cancelled)),
            events.last()
        );
    }

    #[test]
    fn it_should_skip_ticks_while_an_event_is_pending() {
        let mut trigger = create_fast_trigger();
        let context = Context::new();
        let rx = trigger.start(&context).unwrap();

        // Two ticks pass without reading, only the first event is kept
        thread::sleep(Duration::from_millis(250));
        let pending: Vec<TriggerEvent> = rx.try_iter().collect();
        assert_eq!(vec![TriggerEvent::Update], pending);

        context.cancel();
    }

    #[test]
    fn it_should_not_start_twice() {
        let mut trigger = create_fast_trigger();
        let context = Context::new();

        let _rx = trigger.start(&context).unwrap();
        let result = trigger.start(&context);
        assert!(
            matches!(result, Err(TriggerError::AlreadyStarted)),
            "should be AlreadyStarted"
        );

        context.cancel();
    }
}
