use crate::context::Context;
use log::debug;
use std::sync::atomic::AtomicU8;

/// Cancels the context on a termination signal.
///
/// On the first signal the sessions are stopped gracefully, on the second the
/// program exits immediately.
pub struct SignalHandler {
    signal_count: AtomicU8,
}

impl SignalHandler {
    pub fn new() -> SignalHandler {
        SignalHandler {
            signal_count: AtomicU8::new(0),
        }
    }

    #[cfg(unix)]
    fn listen_inner<I>(&self, context: &Context, signals: I)
    where
        I: IntoIterator<Item = i32>,
    {
        use std::{process, sync::atomic::Ordering, thread::sleep, time::Duration};
        for signal in signals.into_iter() {
            let previous = self.signal_count.fetch_add(1, Ordering::Acquire);
            if previous == 0 {
                debug!("Got signal {signal}, terminating after all commands finished.");
                context.cancel();
            } else {
                // Allow a little time for the clean shutdown to still happen.
                sleep(Duration::from_millis(100));
                debug!("Got signal {signal}, terminating right now.");
                process::exit(signal);
            }
        }
    }

    /// Listen on the termination signals on a new thread.
    #[cfg(unix)]
    pub fn listen(self, context: &Context) {
        use log::warn;
        use signal_hook::{
            consts::TERM_SIGNALS,
            iterator::{exfiltrator::SignalOnly, SignalsInfo},
        };
        let mut signals = match SignalsInfo::<SignalOnly>::new(TERM_SIGNALS) {
            Ok(signals) => signals,
            Err(err) => {
                warn!("Failed setting up signal handler: {err}.");
                return;
            }
        };

        let context = context.clone();
        let spawned = std::thread::Builder::new()
            .name(String::from("signals"))
            .spawn(move || self.listen_inner(&context, &mut signals));
        if let Err(err) = spawned {
            warn!("Failed setting up signal handler: {err}.");
        }
    }

    #[cfg(not(unix))]
    pub fn listen(self, _context: &Context) {
        debug!("Signal handlers are not supported on non-unix systems.");
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
