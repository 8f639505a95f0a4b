use crate::types::CertificateRecord;
use std::fmt::{Debug, Formatter};
use tokio::sync::oneshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn is_accept(self) -> bool {
        self == Decision::Accept
    }
}

/// A one-shot completion handle handed over by the networking layer.
///
/// [`Continuation::resolve`] consumes the handle, so a continuation can be
/// invoked at most once. Dropping it unresolved abandons the decision; a
/// channel-backed receiver then observes a closed channel.
pub struct Continuation<T> {
    inner: Inner<T>,
}

enum Inner<T> {
    Channel(oneshot::Sender<T>),
    Callback(Box<dyn FnOnce(T) + Send>),
}

pub type TrustContinuation = Continuation<Decision>;
pub type ClientCertificateContinuation = Continuation<Option<CertificateRecord>>;

impl<T> Continuation<T> {
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner: Inner::Channel(tx),
            },
            rx,
        )
    }

    pub fn from_fn<F>(callback: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            inner: Inner::Callback(Box::new(callback)),
        }
    }

    pub fn resolve(self, value: T) {
        match self.inner {
            Inner::Channel(tx) => {
                if tx.send(value).is_err() {
                    debug!("Continuation receiver is gone, the connection was closed");
                }
            }
            Inner::Callback(callback) => callback(value),
        }
    }
}

impl<T> Debug for Continuation<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            Inner::Channel(_) => "channel",
            Inner::Callback(_) => "callback",
        };
        f.debug_struct("Continuation").field("kind", &kind).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn channel_continuation_delivers_decision() {
        let (continuation, rx) = TrustContinuation::channel();
        continuation.resolve(Decision::Accept);
        assert_eq!(rx.await.unwrap(), Decision::Accept);
    }

    #[tokio::test]
    async fn dropped_continuation_is_observed_as_abandoned() {
        let (continuation, rx) = TrustContinuation::channel();
        drop(continuation);
        assert!(rx.await.is_err());
    }

    #[test]
    fn callback_runs_once_with_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let continuation = TrustContinuation::from_fn(move |decision| {
            assert_eq!(decision, Decision::Reject);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        continuation.resolve(Decision::Reject);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
