// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded sliding windows of samples, one per series.
//!
//! The store is partitioned by target. Each partition holds every series of
//! one target behind its own lock, so a round's record for a target is
//! appended under a single write and readers always see the target's windows
//! at equal length. Writes for different targets never contend.

use std::collections::VecDeque;
use std::sync::RwLock;

use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use serde::Serialize;

use crate::errors::StoreError;
use crate::metric::{MetricName, Sample, SeriesKey};
use crate::normalizer::Record;
use crate::target::Target;

/// Copy of one series' samples, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Window(Vec<Sample>);

impl Window {
    pub fn samples(&self) -> &[Sample] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most recent sample, if any round has been recorded.
    pub fn latest(&self) -> Option<Sample> {
        self.0.last().copied()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.0
    }
}

impl From<Vec<Sample>> for Window {
    fn from(samples: Vec<Sample>) -> Self {
        Self(samples)
    }
}

struct Partition {
    series: Vec<(MetricName, VecDeque<Sample>)>,
}

impl Partition {
    fn new(target: &Target, capacity: usize) -> Self {
        let series = target
            .vocabulary()
            .iter()
            .map(|metric| (*metric, VecDeque::with_capacity(capacity)))
            .collect();
        Self { series }
    }

    fn series(&self, metric: MetricName) -> Option<&VecDeque<Sample>> {
        self.series
            .iter()
            .find(|(name, _)| *name == metric)
            .map(|(_, window)| window)
    }

    fn series_mut(&mut self, metric: MetricName) -> Option<&mut VecDeque<Sample>> {
        self.series
            .iter_mut()
            .find(|(name, _)| *name == metric)
            .map(|(_, window)| window)
    }

    fn matches(&self, record: &Record) -> bool {
        self.series.len() == record.samples().len()
            && self
                .series
                .iter()
                .zip(record.samples())
                .all(|((ours, _), (theirs, _))| ours == theirs)
    }

    fn is_lock_step(&self) -> bool {
        let mut lengths = self.series.iter().map(|(_, window)| window.len());
        match lengths.next() {
            Some(first) => lengths.all(|len| len == first),
            None => true,
        }
    }
}

fn push_bounded(window: &mut VecDeque<Sample>, sample: Sample, capacity: usize) {
    if window.len() == capacity {
        window.pop_front();
    }
    window.push_back(sample);
}

/// Owner of every window. Built once for a fixed set of targets.
pub struct WindowStore {
    capacity: usize,
    partitions: HashMap<Target, RwLock<Partition>, FnvBuildHasher>,
}

impl WindowStore {
    /// Creates empty windows of at most `capacity` samples for every series of
    /// every target. A zero capacity is raised to one.
    pub fn new(capacity: usize, targets: impl IntoIterator<Item = Target>) -> Self {
        let capacity = capacity.max(1);

        let mut partitions = HashMap::with_hasher(FnvBuildHasher::default());
        for target in targets {
            let partition = Partition::new(&target, capacity);
            partitions.insert(target, RwLock::new(partition));
        }

        Self {
            capacity,
            partitions,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.partitions.keys()
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.partitions.contains_key(target)
    }

    /// Appends one sample to a single series, evicting the oldest sample once
    /// the window is full.
    ///
    /// Appending to one series alone breaks lock-step with its siblings until
    /// they are appended too; the collector writes through [`Self::commit`].
    pub fn append(&self, key: &SeriesKey, sample: Sample) -> Result<(), StoreError> {
        let partition = self
            .partitions
            .get(&key.target)
            .ok_or_else(|| StoreError::UnknownSeries(key.clone()))?;

        #[allow(clippy::expect_used)]
        let mut partition = partition.write().expect("lock poisoned");
        let window = partition
            .series_mut(key.metric)
            .ok_or_else(|| StoreError::UnknownSeries(key.clone()))?;
        push_bounded(window, sample, self.capacity);
        Ok(())
    }

    /// Appends every sample of a round's record to its target's windows under
    /// one write lock.
    ///
    /// The record must carry exactly the target's vocabulary, in order. A
    /// mismatching record is rejected before anything is written.
    pub fn commit(&self, record: &Record) -> Result<(), StoreError> {
        let target = record.target();
        let partition = self
            .partitions
            .get(target)
            .ok_or_else(|| StoreError::UnknownTarget(target.clone()))?;

        #[allow(clippy::expect_used)]
        let mut partition = partition.write().expect("lock poisoned");
        if !partition.matches(record) {
            return Err(StoreError::IncompleteRecord(target.clone()));
        }

        for ((_, window), (_, sample)) in partition.series.iter_mut().zip(record.samples()) {
            push_bounded(window, *sample, self.capacity);
        }
        debug_assert!(
            partition.is_lock_step(),
            "windows of {target} diverged in length"
        );
        Ok(())
    }

    /// Copies the current contents of one window. Unknown keys yield an empty
    /// window.
    pub fn window(&self, key: &SeriesKey) -> Window {
        let Some(partition) = self.partitions.get(&key.target) else {
            return Window::default();
        };

        #[allow(clippy::expect_used)]
        let partition = partition.read().expect("lock poisoned");
        partition
            .series(key.metric)
            .map(|window| Window(window.iter().copied().collect()))
            .unwrap_or_default()
    }

    /// Copies the requested windows, in request order.
    pub fn snapshot(&self, keys: &[SeriesKey]) -> Vec<Window> {
        keys.iter().map(|key| self.window(key)).collect()
    }

    /// Copies every window of one target under a single read lock, in
    /// vocabulary order. Unknown targets yield no windows.
    pub fn target_snapshot(&self, target: &Target) -> Vec<(MetricName, Window)> {
        let Some(partition) = self.partitions.get(target) else {
            return Vec::new();
        };

        #[allow(clippy::expect_used)]
        let partition = partition.read().expect("lock poisoned");
        partition
            .series
            .iter()
            .map(|(metric, window)| (*metric, Window(window.iter().copied().collect())))
            .collect()
    }

    /// The most recent sample of one series without copying the window.
    pub fn latest(&self, key: &SeriesKey) -> Option<Sample> {
        let partition = self.partitions.get(&key.target)?;

        #[allow(clippy::expect_used)]
        let partition = partition.read().expect("lock poisoned");
        partition.series(key.metric)?.back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::HostAddr;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn host() -> Target {
        Target::host(HostAddr::new("10.0.0.1:8001"))
    }

    fn cpu(target: &Target) -> SeriesKey {
        SeriesKey::new(target.clone(), MetricName::CpuUsage)
    }

    fn values(window: &Window) -> Vec<Option<f64>> {
        window.samples().iter().map(Sample::value).collect()
    }

    #[test]
    fn test_append_evicts_oldest() {
        let target = host();
        let store = WindowStore::new(3, [target.clone()]);

        for v in 1..=5 {
            store.append(&cpu(&target), Sample::Value(f64::from(v))).unwrap();
        }

        assert_eq!(
            values(&store.window(&cpu(&target))),
            vec![Some(3.0), Some(4.0), Some(5.0)]
        );
        assert_eq!(store.latest(&cpu(&target)), Some(Sample::Value(5.0)));
    }

    #[test]
    fn test_unknown_keys_read_empty() {
        let store = WindowStore::new(3, [host()]);
        let other = Target::host(HostAddr::new("10.9.9.9:1"));

        assert!(store.window(&cpu(&other)).is_empty());
        assert!(store.target_snapshot(&other).is_empty());
        assert_eq!(store.latest(&cpu(&other)), None);
        // a container metric on a host target
        let key = SeriesKey::new(host(), MetricName::NetworkInput);
        assert!(store.window(&key).is_empty());
    }

    #[test]
    fn test_append_to_unknown_series_is_an_error() {
        let store = WindowStore::new(3, [host()]);
        let key = SeriesKey::new(host(), MetricName::DiskRead);

        assert_eq!(
            store.append(&key, Sample::Value(1.0)),
            Err(StoreError::UnknownSeries(key))
        );
    }

    #[test]
    fn test_commit_keeps_lock_step() {
        let target = Target::container(HostAddr::new("10.0.0.2:8080"), "web");
        let store = WindowStore::new(2, [target.clone()]);

        for _ in 0..3 {
            store.commit(&Record::unavailable(target.clone())).unwrap();
        }

        let windows = store.target_snapshot(&target);
        assert_eq!(windows.len(), target.vocabulary().len());
        assert!(windows.iter().all(|(_, window)| window.len() == 2));
    }

    #[test]
    fn test_commit_rejects_foreign_record() {
        let target = host();
        let store = WindowStore::new(2, [target.clone()]);
        let stranger = Target::host(HostAddr::new("10.0.0.7:8001"));

        assert_eq!(
            store.commit(&Record::unavailable(stranger.clone())),
            Err(StoreError::UnknownTarget(stranger))
        );
        assert!(store.target_snapshot(&target)[0].1.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let target = host();
        let store = WindowStore::new(0, [target.clone()]);
        assert_eq!(store.capacity(), 1);

        store.append(&cpu(&target), Sample::Value(1.0)).unwrap();
        store.append(&cpu(&target), Sample::Value(2.0)).unwrap();
        assert_eq!(values(&store.window(&cpu(&target))), vec![Some(2.0)]);
    }

    #[test]
    fn test_snapshot_during_appends_is_never_torn() {
        let target = host();
        let key = cpu(&target);
        let store = Arc::new(WindowStore::new(4, [target]));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let store = Arc::clone(&store);
            let key = key.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for v in 0..5_000u32 {
                    store.append(&key, Sample::Value(f64::from(v))).unwrap();
                }
                done.store(true, Ordering::Release);
            })
        };

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let key = key.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let window = store.snapshot(std::slice::from_ref(&key)).remove(0);
                        assert!(window.len() <= 4);
                        let seen: Vec<f64> =
                            window.samples().iter().filter_map(Sample::value).collect();
                        assert!(
                            seen.windows(2).all(|pair| pair[1] == pair[0] + 1.0),
                            "torn window {seen:?}"
                        );
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    proptest! {
        #[test]
        fn window_keeps_newest_samples(
            capacity in 1usize..16,
            samples in proptest::collection::vec(-1000.0f64..1000.0, 0..64),
        ) {
            let target = host();
            let store = WindowStore::new(capacity, [target.clone()]);
            for v in &samples {
                store.append(&cpu(&target), Sample::Value(*v)).unwrap();
            }

            let window = store.window(&cpu(&target));
            let expected: Vec<Option<f64>> = samples
                .iter()
                .skip(samples.len().saturating_sub(capacity))
                .map(|v| Some(*v))
                .collect();
            prop_assert!(window.len() <= capacity);
            prop_assert_eq!(values(&window), expected);
        }
    }
}
