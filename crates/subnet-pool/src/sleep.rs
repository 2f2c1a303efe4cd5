use core::time::Duration;

/// A trait that abstracts over how to sleep for a given [`Duration`] in async
/// contexts.
///
/// The loader sleeps between retries of unprocessed records. Tests swap in a
/// provider that records the requested delays instead of waiting them out.
pub trait SleepProvider: Send + Sync {
    /// We require `Send` so that the loader future can move across threads.
    type Sleep: Future<Output = ()> + Send;

    fn sleep_for(&self, dur: Duration) -> Self::Sleep;
}

/// An implementation of [`SleepProvider`] using Tokio's timer.
///
/// This is the default provider for the loader.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleep;

impl SleepProvider for TokioSleep {
    type Sleep = tokio::time::Sleep;

    fn sleep_for(&self, dur: Duration) -> Self::Sleep {
        tokio::time::sleep(dur)
    }
}
