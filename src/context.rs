use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// A cancellation token shared between the sessions, triggers and commands.
///
/// Cloning is cheap and every clone observes the same cancellation. Once cancelled,
/// a context never becomes active again.
#[derive(Clone, Debug, Default)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl Context {
    /// Create a new, active context.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A poisoned flag is still a valid flag.
        self.inner
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancel the context and wake up everyone waiting on it.
    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    /// Returns true if the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Block until the context is cancelled or the timeout elapses.
    /// Returns true if the context was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.wait_until(deadline)
    }

    /// Block until the context is cancelled or the deadline is reached.
    /// Returns true if the context was cancelled.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = self.lock();
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = match self.inner.condvar.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Block until the context is cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.lock();
        while !*cancelled {
            cancelled = match self.inner.condvar.wait(cancelled) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn it_should_start_active() {
        let context = Context::new();
        assert!(!context.is_cancelled());
    }

    #[test]
    fn it_should_cancel_every_clone() {
        let context = Context::new();
        let clone = context.clone();

        context.cancel();

        assert!(clone.is_cancelled());
    }

    #[test]
    fn it_should_time_out_if_not_cancelled() {
        let context = Context::new();

        let start = Instant::now();
        let cancelled = context.wait_timeout(Duration::from_millis(100));

        assert!(!cancelled);
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[test]
    fn it_should_wake_up_waiters_on_cancel() {
        let context = Context::new();
        let clone = context.clone();

        let handle = thread::spawn(move || clone.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(50));
        context.cancel();

        let start = Instant::now();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn it_should_return_immediately_if_already_cancelled() {
        let context = Context::new();
        context.cancel();

        context.wait();
        assert!(context.wait_timeout(Duration::from_secs(10)));
    }
}
