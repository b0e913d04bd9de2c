//! Completion coalescing.
//!
//! With a window configured, completions that arrive close together are
//! queued and run in one flush when the window closes. The first queued
//! completion arms a one-shot timer; completions arriving before it fires
//! join the same flush. Without a window every completion runs immediately.
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::channel::oneshot;

use crate::errors::NetError;
use crate::net::step::Step;

/// Callback run by a timer or a flush.
pub type Callback = Box<dyn FnOnce() + Send>;

/// Observes each flush with the number of completions it ran.
pub type FlushHook = Arc<dyn Fn(usize) + Send + Sync>;

/// One-shot timer primitive.
pub trait Timer: Send + Sync {
    /// Runs `callback` once after `delay`.
    fn after(&self, delay: Duration, callback: Callback) -> TimerHandle;
}

/// A handle to a timer trait.
pub type TimerRef = Arc<dyn Timer>;

/// Cancels a scheduled timer. Dropping the handle leaves the timer running.
pub struct TimerHandle {
    cancel: Option<Callback>,
}

impl TimerHandle {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle for a timer that cannot be cancelled.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Timer backed by tokio tasks.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: tokio::runtime::Handle,
}

impl TokioTimer {
    /// Uses the runtime the caller is running on.
    pub fn current() -> Result<Self, NetError> {
        tokio::runtime::Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| NetError::InvalidArgument(format!("no tokio runtime for the timer: {e}")))
    }

    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Timer for TokioTimer {
    fn after(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(move || task.abort())
    }
}

#[derive(Default)]
struct State {
    queue: Vec<Callback>,
    armed: bool,
    generation: u64,
    timer: Option<TimerHandle>,
}

struct Inner {
    window: Option<Duration>,
    timer: Option<TimerRef>,
    hook: Option<FlushHook>,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Timer callback; ignores timers that a flush already superseded.
    fn fire(&self, generation: u64) {
        let queue = {
            let mut state = self.lock();
            if !state.armed || state.generation != generation {
                return;
            }
            state.armed = false;
            state.timer = None;
            std::mem::take(&mut state.queue)
        };
        self.run(queue);
    }

    fn flush(&self) {
        let (queue, timer) = {
            let mut state = self.lock();
            state.armed = false;
            state.generation += 1;
            (std::mem::take(&mut state.queue), state.timer.take())
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        if !queue.is_empty() {
            self.run(queue);
        }
    }

    fn run(&self, queue: Vec<Callback>) {
        log::trace!("coalescer flushing {} completion(s)", queue.len());
        if let Some(hook) = &self.hook {
            hook(queue.len());
        }
        for completion in queue {
            completion();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Batches completions into timed flushes.
///
/// Cloning shares the queue. Dropping the last clone runs whatever is still
/// queued.
#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<Inner>,
}

impl Coalescer {
    /// Completions run immediately.
    pub fn immediate() -> Self {
        Self::build(None, None, None)
    }

    /// Completions within `window` of the first queued one run together.
    pub fn windowed(window: Duration, timer: TimerRef) -> Self {
        Self::build(Some(window), Some(timer), None)
    }

    fn build(window: Option<Duration>, timer: Option<TimerRef>, hook: Option<FlushHook>) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                timer,
                hook,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Installs a hook observing every flush.
    pub fn with_flush_hook(self, hook: FlushHook) -> Self {
        let (window, timer) = (self.inner.window, self.inner.timer.clone());
        Self::build(window, timer, Some(hook))
    }

    pub fn window(&self) -> Option<Duration> {
        self.inner.window
    }

    /// Number of completions waiting for the next flush.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Runs `completion` now, or queues it for the current window.
    pub fn enqueue(&self, completion: Callback) {
        let (window, timer) = match (self.inner.window, &self.inner.timer) {
            (Some(window), Some(timer)) => (window, timer.clone()),
            _ => return completion(),
        };

        let generation = {
            let mut state = self.inner.lock();
            state.queue.push(completion);
            if state.armed {
                return;
            }
            state.armed = true;
            state.generation += 1;
            state.generation
        };

        // The timer is armed outside the lock; a callback that fires before
        // the handle is stored finds the generation already consumed.
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = timer.after(
            window,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire(generation);
                }
            }),
        );

        let mut state = self.inner.lock();
        if state.armed && state.generation == generation {
            state.timer = Some(handle);
        }
    }

    /// Runs every queued completion now and disarms the timer.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Hands `outcome` to the caller through the coalescing queue.
    pub fn deliver<T: Send + 'static>(&self, outcome: Result<T, NetError>) -> Step<T> {
        if self.inner.window.is_none() {
            return Step::Ready(outcome);
        }

        let (tx, rx) = oneshot::channel();
        self.enqueue(Box::new(move || {
            let _ = tx.send(outcome);
        }));

        Step::pending(async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(NetError::Internal("coalesced completion was discarded".into())),
            }
        })
    }
}

impl std::fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("window", &self.inner.window)
            .field("queued", &self.queued())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Timer that fires only when told to.
    #[derive(Default)]
    struct ManualTimer {
        scheduled: Mutex<Vec<(Duration, Callback, Arc<AtomicBool>)>>,
    }

    impl ManualTimer {
        fn armed(&self) -> usize {
            self.scheduled.lock().unwrap().len()
        }

        fn fire_all(&self) {
            let scheduled = std::mem::take(&mut *self.scheduled.lock().unwrap());
            for (_, callback, cancelled) in scheduled {
                if !cancelled.load(Ordering::SeqCst) {
                    callback();
                }
            }
        }
    }

    impl Timer for ManualTimer {
        fn after(&self, delay: Duration, callback: Callback) -> TimerHandle {
            let cancelled = Arc::new(AtomicBool::new(false));
            self.scheduled.lock().unwrap().push((delay, callback, cancelled.clone()));
            TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<usize>>>, impl Fn(usize) -> Callback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let make = move |i: usize| -> Callback {
            let sink = sink.clone();
            Box::new(move || sink.lock().unwrap().push(i))
        };
        (seen, make)
    }

    #[test]
    fn without_window_completions_run_immediately() {
        let (seen, make) = recorder();
        let coalescer = Coalescer::immediate();

        coalescer.enqueue(make(1));
        coalescer.enqueue(make(2));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(coalescer.queued(), 0);
        assert!(coalescer.deliver(Ok(7)).is_ready());
    }

    #[test]
    fn one_timer_per_window() {
        let timer = Arc::new(ManualTimer::default());
        let (seen, make) = recorder();
        let coalescer = Coalescer::windowed(Duration::from_millis(100), timer.clone());

        for i in 0..3 {
            coalescer.enqueue(make(i));
        }
        assert_eq!(timer.armed(), 1);
        assert!(seen.lock().unwrap().is_empty());

        timer.fire_all();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);

        // next window arms a fresh timer
        coalescer.enqueue(make(3));
        assert_eq!(timer.armed(), 1);
        timer.fire_all();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn manual_flush_disarms_the_timer() {
        let timer = Arc::new(ManualTimer::default());
        let (seen, make) = recorder();
        let coalescer = Coalescer::windowed(Duration::from_millis(100), timer.clone());

        coalescer.enqueue(make(1));
        coalescer.flush();
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        timer.fire_all();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn dropping_runs_queued_completions() {
        let timer = Arc::new(ManualTimer::default());
        let (seen, make) = recorder();
        let coalescer = Coalescer::windowed(Duration::from_millis(100), timer.clone());
        let clone = coalescer.clone();

        coalescer.enqueue(make(1));
        drop(coalescer);
        assert!(seen.lock().unwrap().is_empty());

        drop(clone);
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        // the stale timer finds nothing to upgrade
        timer.fire_all();
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn five_completions_inside_the_window_flush_once_in_order() {
        let flushes = Arc::new(Mutex::new(Vec::new()));
        let observed = flushes.clone();
        let hook: FlushHook = Arc::new(move |n| observed.lock().unwrap().push(n));

        let (seen, make) = recorder();
        let timer = Arc::new(TokioTimer::current().unwrap());
        let coalescer = Coalescer::windowed(Duration::from_millis(100), timer).with_flush_hook(hook);

        for i in 0..5 {
            coalescer.enqueue(make(i));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*flushes.lock().unwrap(), vec![5]);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn delivered_outcome_waits_for_the_flush() {
        let timer = Arc::new(TokioTimer::current().unwrap());
        let coalescer = Coalescer::windowed(Duration::from_millis(50), timer);

        let step = coalescer.deliver(Ok::<_, NetError>("done"));
        assert!(!step.is_ready());
        assert_eq!(coalescer.queued(), 1);

        assert_eq!(step.await.unwrap(), "done");
        assert_eq!(coalescer.queued(), 0);
    }
}
