// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Interval-driven collection loop.
//!
//! Each round fetches every target group concurrently, waits for all of them
//! (or the round deadline), writes one record per target into the window
//! store and then signals the notifier. A round that overruns its interval is
//! followed immediately by the next one; missed ticks are not replayed.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::errors::FetchError;
use crate::normalizer::normalize_group;
use crate::notifier::Notifier;
use crate::source::MetricSource;
use crate::target::TargetGroup;
use crate::window::WindowStore;

/// Outcome of one committed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub round: u64,
    pub live: usize,
    pub down: usize,
    pub elapsed: Duration,
}

pub struct Collector {
    groups: Vec<TargetGroup>,
    source: Arc<dyn MetricSource>,
    store: Arc<WindowStore>,
    notifier: Arc<Notifier>,
    interval: Duration,
    round: u64,
}

impl Collector {
    pub fn new(
        groups: Vec<TargetGroup>,
        source: Arc<dyn MetricSource>,
        store: Arc<WindowStore>,
        notifier: Arc<Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            groups,
            source,
            store,
            notifier,
            interval,
            round: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of rounds committed so far.
    pub fn rounds(&self) -> u64 {
        self.round
    }

    /// Runs rounds until `cancel` fires. Cancellation during a fetch drops the
    /// round before anything of it is written.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!(
            "Starting collector: {} target groups every {:?}",
            self.groups.len(),
            self.interval
        );

        let mut round_start = Instant::now();
        loop {
            let deadline = round_start + self.interval;

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = self.run_round(deadline) => {}
            }

            let now = Instant::now();
            let next_start = if now >= deadline {
                warn!(
                    "Round {} overran the {:?} interval by {:?}, starting the next one now",
                    self.round,
                    self.interval,
                    now - deadline
                );
                now
            } else {
                deadline
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = sleep_until(next_start) => {}
            }
            round_start = next_start;
        }

        debug!("Collector stopped after {} rounds", self.round);
    }

    /// Runs a single round whose fetches must complete by `deadline`.
    ///
    /// The write phase does not await, so once the fetches resolve the round
    /// is committed as a whole.
    pub async fn run_round(&mut self, deadline: Instant) -> RoundSummary {
        let started = Instant::now();

        let source = &self.source;
        let fetches = self.groups.iter().map(|group| async move {
            let fetch_start = Instant::now();
            let outcome = timeout_at(deadline, source.fetch(group))
                .await
                .unwrap_or(Err(FetchError::Timeout));
            (outcome, fetch_start.elapsed())
        });
        let outcomes = join_all(fetches).await;

        self.round += 1;
        let round = self.round;
        let mut live = 0;
        let mut down = 0;

        for (group, (outcome, latency)) in self.groups.iter().zip(outcomes) {
            if let Err(e) = &outcome {
                warn!("Round {round}: fetch from {} failed: {e}", group.host());
            }

            for record in normalize_group(group, &outcome, latency) {
                let committed = self.store.commit(&record);
                debug_assert!(
                    committed.is_ok(),
                    "round {round} was not recorded for {}: {committed:?}",
                    record.target()
                );
                if let Err(e) = committed {
                    error!("Round {round}: {e}");
                }

                if record.is_live() {
                    live += 1;
                } else {
                    down += 1;
                }
            }
        }

        self.notifier.notify(round);

        let summary = RoundSummary {
            round,
            live,
            down,
            elapsed: started.elapsed(),
        };
        debug!(
            "Round {round} committed in {:?}: {live} live, {down} down",
            summary.elapsed
        );
        summary
    }
}
