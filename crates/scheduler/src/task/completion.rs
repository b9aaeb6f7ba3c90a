use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::watch;

/// Sending side of a task's one-shot completion signal.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Mark complete. Returns `false` if it already was.
    pub fn complete(&self) -> bool {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    pub fn is_complete(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Completion {
        Completion { rx: self.tx.subscribe() }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a completion signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the task has completed, or its signal was dropped.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|done| *done).await;
    }

    /// Block the current thread until completion. Must not be called from
    /// inside an async runtime worker.
    pub fn wait_blocking(self) {
        futures::executor::block_on(self.wait());
    }
}

/// Future resolving once every task in a set has completed.
pub struct AllCompleted {
    inner: BoxFuture<'static, ()>,
}

impl AllCompleted {
    pub fn new(completions: Vec<Completion>) -> Self {
        let inner = future::join_all(completions.into_iter().map(Completion::wait))
            .map(|_| ())
            .boxed();
        Self { inner }
    }

    /// An already-resolved set.
    pub fn ready() -> Self {
        Self { inner: future::ready(()).boxed() }
    }

    /// Block the current thread until every task has completed.
    pub fn wait_blocking(self) {
        futures::executor::block_on(self);
    }
}

impl Future for AllCompleted {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_is_idempotent() {
        let signal = CompletionSignal::new();
        let completion = signal.subscribe();
        assert!(!completion.is_complete());
        assert!(signal.complete());
        assert!(!signal.complete());
        assert!(completion.is_complete());
        assert!(signal.is_complete());
    }

    #[test]
    fn late_subscriber_sees_completion() {
        let signal = CompletionSignal::new();
        signal.complete();
        let completion = signal.subscribe();
        assert!(completion.is_complete());
        completion.wait_blocking();
    }

    #[test]
    fn all_completed_waits_for_every_signal() {
        let a = CompletionSignal::new();
        let b = CompletionSignal::new();
        let mut all = AllCompleted::new(vec![a.subscribe(), b.subscribe()]);

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(Pin::new(&mut all).poll(&mut cx).is_pending());

        a.complete();
        assert!(Pin::new(&mut all).poll(&mut cx).is_pending());

        b.complete();
        assert!(Pin::new(&mut all).poll(&mut cx).is_ready());
    }

    #[test]
    fn empty_set_is_ready() {
        AllCompleted::new(Vec::new()).wait_blocking();
        AllCompleted::ready().wait_blocking();
    }
}
