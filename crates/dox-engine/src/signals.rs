//! Forwarding of host signals into a running container
//!
//! A [`SignalRelay`] is installed when the container starts and uninstalled
//! when it is dropped. While installed, the host process no longer dies on
//! the forwarded signals; each one is delivered to the container instead.

use crate::error::Result;
use nix::sys::signal::Signal;
use std::future::{Future, poll_fn};
use std::task::Poll;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::debug;

/// Host signals that are relayed into the container
pub const FORWARDED_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Where a relay receives its signals from
#[derive(Debug)]
pub enum SignalSource {
    /// The host process's own signal dispositions
    Host,
    /// An in-process channel, used when embedding the engine
    Channel(mpsc::UnboundedReceiver<Signal>),
}

impl SignalSource {
    /// Create a channel source and the sender that feeds it
    pub fn channel() -> (mpsc::UnboundedSender<Signal>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, SignalSource::Channel(rx))
    }
}

enum Subscription {
    Host(Vec<(Signal, tokio::signal::unix::Signal)>),
    Channel(mpsc::UnboundedReceiver<Signal>),
}

/// An installed signal subscription
pub struct SignalRelay {
    subscription: Subscription,
    delivered: usize,
}

impl SignalRelay {
    /// Subscribe to the forwarded signals.
    pub fn install(source: SignalSource) -> Result<Self> {
        let subscription = match source {
            SignalSource::Host => {
                let mut streams = Vec::with_capacity(FORWARDED_SIGNALS.len());
                for sig in FORWARDED_SIGNALS {
                    streams.push((sig, signal(SignalKind::from_raw(sig as i32))?));
                }
                Subscription::Host(streams)
            }
            SignalSource::Channel(rx) => Subscription::Channel(rx),
        };
        debug!("Signal relay installed");

        Ok(Self {
            subscription,
            delivered: 0,
        })
    }

    /// Number of signals handed to the delivery callback so far
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Wait for the next signal. Returns `None` once the source is closed.
    pub async fn next(&mut self) -> Option<Signal> {
        match &mut self.subscription {
            Subscription::Host(streams) => {
                poll_fn(|cx| {
                    for (sig, stream) in streams.iter_mut() {
                        if let Poll::Ready(Some(())) = stream.poll_recv(cx) {
                            return Poll::Ready(Some(*sig));
                        }
                    }
                    Poll::Pending
                })
                .await
            }
            Subscription::Channel(rx) => rx.recv().await,
        }
    }

    /// Deliver every received signal through `deliver` until the source closes.
    ///
    /// Delivery failures are swallowed: the container may already have exited.
    pub async fn forward<F, Fut>(&mut self, mut deliver: F)
    where
        F: FnMut(Signal) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        while let Some(sig) = self.next().await {
            debug!("Forwarding {} to container", sig);
            self.delivered += 1;
            if let Err(e) = deliver(sig).await {
                debug!("Failed to forward {}: {}", sig, e);
            }
        }
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        debug!("Signal relay uninstalled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_forwards_each_signal_once() {
        let (tx, source) = SignalSource::channel();
        let mut relay = SignalRelay::install(source).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        tx.send(Signal::SIGINT).unwrap();
        tx.send(Signal::SIGTERM).unwrap();
        drop(tx);

        let sink = seen.clone();
        relay
            .forward(|sig| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(sig);
                    Ok(())
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![Signal::SIGINT, Signal::SIGTERM]);
        assert_eq!(relay.delivered(), 2);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let (tx, source) = SignalSource::channel();
        let mut relay = SignalRelay::install(source).unwrap();

        tx.send(Signal::SIGHUP).unwrap();
        tx.send(Signal::SIGQUIT).unwrap();
        drop(tx);

        relay
            .forward(|_| async { Err(Error::stream("container already exited")) })
            .await;

        assert_eq!(relay.delivered(), 2);
    }
}
