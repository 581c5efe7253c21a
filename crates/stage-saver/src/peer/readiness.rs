//! One-shot transport readiness signal
//!
//! The offer may only be submitted once the transport can actually reach the
//! stage. With relay-only transport that means the first relay candidate has
//! been gathered; otherwise readiness is immediate.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// Fires the readiness signal; only the first call has any effect
#[derive(Debug)]
pub struct ReadinessTrigger {
    sender: Mutex<Option<oneshot::Sender<()>>>,
}

/// Waiting half of the readiness signal
#[derive(Debug)]
pub struct ReadinessSignal {
    receiver: oneshot::Receiver<()>,
}

impl ReadinessTrigger {
    /// Create an unfired trigger and the signal it resolves
    pub fn new() -> (Self, ReadinessSignal) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            ReadinessSignal { receiver },
        )
    }

    /// Fire the trigger
    ///
    /// Returns `true` for the call that actually resolved the signal and
    /// `false` for every later call.
    pub fn fire(&self) -> bool {
        match self.sender.lock().take() {
            // The waiter may already be gone; the trigger still counts as fired.
            Some(sender) => {
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }
}

impl ReadinessSignal {
    /// A signal that is already resolved
    pub fn ready() -> Self {
        let (trigger, signal) = ReadinessTrigger::new();
        trigger.fire();
        signal
    }

    /// Wait until the trigger fires
    ///
    /// With `timeout` set, gives up with [`Error::TransportNotReady`] once it
    /// elapses. Without it, waits for as long as the trigger is alive.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<()> {
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.receiver)
                .await
                .map_err(|_| {
                    Error::TransportNotReady(format!(
                        "no relay candidate gathered within {}ms",
                        limit.as_millis()
                    ))
                })?,
            None => self.receiver.await,
        };

        outcome.map_err(|_| {
            Error::TransportNotReady("readiness trigger dropped before firing".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_fire_resolves() {
        let (trigger, signal) = ReadinessTrigger::new();
        assert!(trigger.fire());
        signal.wait(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_extra_fires_are_noops() {
        let (trigger, signal) = ReadinessTrigger::new();
        assert!(trigger.fire());
        assert!(!trigger.fire());
        assert!(!trigger.fire());
        signal.wait(Some(Duration::from_millis(10))).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_fires_resolve_once() {
        let (trigger, signal) = ReadinessTrigger::new();
        let trigger = Arc::new(trigger);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let trigger = Arc::clone(&trigger);
                tokio::spawn(async move { trigger.fire() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        signal.wait(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_already_ready() {
        ReadinessSignal::ready().wait(None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let (_trigger, signal) = ReadinessTrigger::new();
        let result = signal.wait(Some(Duration::from_secs(2))).await;
        assert!(matches!(result, Err(Error::TransportNotReady(_))));
    }

    #[tokio::test]
    async fn test_dropped_trigger() {
        let (trigger, signal) = ReadinessTrigger::new();
        drop(trigger);
        assert!(matches!(
            signal.wait(None).await,
            Err(Error::TransportNotReady(_))
        ));
    }
}
