// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only view over the window store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::metric::{MetricName, SeriesKey};
use crate::target::Target;
use crate::window::{Window, WindowStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Live,
    Down,
}

#[derive(Clone)]
pub struct QueryApi {
    store: Arc<WindowStore>,
}

impl QueryApi {
    pub fn new(store: Arc<WindowStore>) -> Self {
        Self { store }
    }

    pub fn window_size(&self) -> usize {
        self.store.capacity()
    }

    pub fn get_window(&self, target: &Target, metric: MetricName) -> Window {
        self.store
            .window(&SeriesKey::new(target.clone(), metric))
    }

    /// Every series of `target` from one consistent snapshot.
    pub fn get_windows(&self, target: &Target) -> Vec<(MetricName, Window)> {
        self.store.target_snapshot(target)
    }

    /// A target is live when the latest sample of its liveness metric is a
    /// value. Targets without samples, and unknown targets, are down.
    pub fn get_status(&self, target: &Target) -> Status {
        let key = SeriesKey::new(target.clone(), target.liveness_metric());
        match self.store.latest(&key) {
            Some(sample) if sample.is_available() => Status::Live,
            _ => Status::Down,
        }
    }

    pub fn list_targets(&self) -> BTreeSet<Target> {
        self.store.targets().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Sample;
    use crate::normalizer::Record;
    use crate::target::HostAddr;

    fn api_with(targets: &[Target]) -> (Arc<WindowStore>, QueryApi) {
        let store = Arc::new(WindowStore::new(3, targets.iter().cloned()));
        (Arc::clone(&store), QueryApi::new(store))
    }

    #[test]
    fn test_status_follows_latest_sample() {
        let target = Target::host(HostAddr::new("10.0.0.1:8001"));
        let (store, api) = api_with(std::slice::from_ref(&target));
        assert_eq!(api.get_status(&target), Status::Down);

        let key = SeriesKey::new(target.clone(), MetricName::CpuUsage);
        store.append(&key, Sample::Value(0.0)).unwrap();
        assert_eq!(api.get_status(&target), Status::Live);

        store.commit(&Record::unavailable(target.clone())).unwrap();
        assert_eq!(api.get_status(&target), Status::Down);
    }

    #[test]
    fn test_unknown_target_is_down_and_empty() {
        let (_, api) = api_with(&[Target::host(HostAddr::new("10.0.0.1:8001"))]);
        let unknown = Target::container(HostAddr::new("10.0.0.1:8001"), "ghost");

        assert_eq!(api.get_status(&unknown), Status::Down);
        assert!(api
            .get_window(&unknown, MetricName::CpuPercentUsage)
            .is_empty());
        assert!(api.get_windows(&unknown).is_empty());
    }

    #[test]
    fn test_list_targets() {
        let a = Target::host(HostAddr::new("10.0.0.1:8001"));
        let b = Target::container(HostAddr::new("10.0.0.2:8080"), "db");
        let (_, api) = api_with(&[a.clone(), b.clone()]);

        assert_eq!(api.list_targets(), BTreeSet::from([a, b]));
        assert_eq!(api.window_size(), 3);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Live).unwrap(), "\"live\"");
        assert_eq!(serde_json::to_string(&Status::Down).unwrap(), "\"down\"");
    }
}
