// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Round-committed signal shared between the collector and its consumers.
///
/// Only consumers already waiting when a round is committed are woken; a
/// consumer that starts waiting afterwards waits for the next round. Several
/// rounds committed while a consumer was busy are seen as one wake-up, and
/// [`Notifier::last_round`] tells it how far the collector got.
#[derive(Debug, Default)]
pub struct Notifier {
    notify: Notify,
    last_round: AtomicU64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `round` as committed and wakes every current waiter.
    pub fn notify(&self, round: u64) {
        self.last_round.fetch_max(round, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// Number of the last committed round, `0` before the first one.
    pub fn last_round(&self) -> u64 {
        self.last_round.load(Ordering::Acquire)
    }

    /// Waits for the next committed round and returns its number.
    pub async fn wait(&self) -> u64 {
        self.notify.notified().await;
        self.last_round()
    }

    /// Like [`Notifier::wait`], giving up after `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<u64> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }
}
