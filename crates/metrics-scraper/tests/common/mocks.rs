// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted metric source for driving collection rounds

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use metrics_scraper::{
    errors::FetchError,
    source::{GroupPayload, MetricSource},
    target::{HostAddr, Target, TargetGroup},
};

use super::helpers::{container_bundle, host_bundle};

/// What a host answers in one round.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A host endpoint bundle with the given cpu usage
    Cpu(f64),
    /// A monitor reply covering the listed containers
    Containers(Vec<(&'static str, f64)>),
    /// The host is unreachable
    Unreachable,
}

/// Answers each host from its script, one reply per round. A host whose
/// script ran out keeps repeating its last reply; unscripted hosts are
/// unreachable.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<HostAddr, VecDeque<Reply>>>,
    last: Mutex<HashMap<HostAddr, Reply>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, host: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(HostAddr::new(host), replies.into_iter().collect());
        self
    }

    fn next_reply(&self, host: &HostAddr) -> Reply {
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(host)
            .and_then(VecDeque::pop_front);
        let mut last = self.last.lock().unwrap();
        match next {
            Some(reply) => {
                last.insert(host.clone(), reply.clone());
                reply
            }
            None => last.get(host).cloned().unwrap_or(Reply::Unreachable),
        }
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    async fn fetch(&self, group: &TargetGroup) -> Result<GroupPayload, FetchError> {
        let host = group.host().clone();
        match self.next_reply(&host) {
            Reply::Unreachable => Err(FetchError::Status(503)),
            Reply::Cpu(cpu) => Ok(HashMap::from([(Target::host(host), host_bundle(cpu))])),
            Reply::Containers(containers) => Ok(containers
                .into_iter()
                .map(|(name, value)| (Target::container(host.clone(), name), container_bundle(value)))
                .collect()),
        }
    }
}
