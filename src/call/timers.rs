//! Per-call one-shot timers.
//!
//! All timers of a call hang off one root [`CancellationToken`], so
//! [`CallTimers::cancel_all`] tears the whole set down at once. Scheduling
//! under an existing key replaces the pending timer.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::machine::CallInput;

/// Keys for the timers a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Window,
    PromptRefresh(usize),
}

#[derive(Debug)]
pub struct CallTimers {
    root: CancellationToken,
    timers: HashMap<TimerKey, CancellationToken>,
    tx: mpsc::Sender<CallInput>,
}

impl CallTimers {
    /// Expiries are delivered on `tx`.
    pub fn new(tx: mpsc::Sender<CallInput>) -> Self {
        Self {
            root: CancellationToken::new(),
            timers: HashMap::new(),
            tx,
        }
    }

    /// Deliver `input` after `after` unless cancelled first.
    pub fn schedule(&mut self, key: TimerKey, after: Duration, input: CallInput) {
        self.cancel(key);
        let token = self.root.child_token();
        self.timers.insert(key, token.clone());
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if tx.send(input).await.is_err() {
                        tracing::debug!(?key, "timer fired after call ended");
                    }
                }
            }
        });
    }

    pub fn cancel(&mut self, key: TimerKey) {
        if let Some(token) = self.timers.remove(&key) {
            token.cancel();
        }
    }

    /// Cancel every pending timer. The set can be reused afterwards.
    pub fn cancel_all(&mut self) {
        self.root.cancel();
        self.timers.clear();
        self.root = CancellationToken::new();
    }

    /// Timers scheduled and not cancelled (fired ones included).
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for CallTimers {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
