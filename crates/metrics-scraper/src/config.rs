// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::time::Duration;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::errors::ConfigError;
use crate::source::group_url;
use crate::target::{HostAddr, Target, TargetGroup, DEFAULT_METRICS_PATH};

pub const DEFAULT_QUERY_PORT: u16 = 8050;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration of the scraper, read once at start-up.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Fetch units: one per host endpoint, one per monitor host
    pub groups: Vec<TargetGroup>,
    /// Time between round starts
    pub interval: Duration,
    /// Number of samples kept per series
    pub window_size: usize,
    /// Port of the HTTP query server
    pub query_port: u16,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            interval: Duration::from_secs(5),
            window_size: 60,
            query_port: DEFAULT_QUERY_PORT,
            log_level: "info".to_string(),
        }
    }
}

impl ScraperConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut groups = match env::var("SCRAPER_ENDPOINTS") {
            Ok(raw) => parse_endpoints(&raw)?,
            Err(_) => Vec::new(),
        };
        if let Ok(raw) = env::var("SCRAPER_MONITORS") {
            groups.extend(parse_monitors(&raw)?);
        }

        let interval = Duration::from_secs(required_positive("SCRAPER_INTERVAL")?);
        let window_size = usize::try_from(required_positive("SCRAPER_WINDOW_SIZE")?).map_err(
            |e| ConfigError::Invalid {
                name: "SCRAPER_WINDOW_SIZE",
                reason: e.to_string(),
            },
        )?;

        let query_port = match env::var("SCRAPER_QUERY_PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "SCRAPER_QUERY_PORT",
                reason: format!("'{raw}' is not a port number: {e}"),
            })?,
            Err(_) => DEFAULT_QUERY_PORT,
        };
        let log_level = env::var("SCRAPER_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            groups,
            interval,
            window_size,
            query_port,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: "SCRAPER_INTERVAL",
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.window_size == 0 {
            return Err(ConfigError::Invalid {
                name: "SCRAPER_WINDOW_SIZE",
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.query_port == 0 {
            return Err(ConfigError::Invalid {
                name: "SCRAPER_QUERY_PORT",
                reason: "must be greater than 0".to_string(),
            });
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid {
                name: "SCRAPER_LOG_LEVEL",
                reason: format!(
                    "'{}' must be one of: trace, debug, info, warn, error",
                    self.log_level
                ),
            });
        }

        for group in &self.groups {
            let name = match group {
                TargetGroup::Endpoint { .. } => "SCRAPER_ENDPOINTS",
                TargetGroup::Monitor { .. } => "SCRAPER_MONITORS",
            };
            if let TargetGroup::Monitor { host, containers } = group {
                if containers.is_empty() {
                    return Err(ConfigError::Invalid {
                        name,
                        reason: format!("monitor {host} lists no containers"),
                    });
                }
            }
            group_url(group).map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })?;
        }

        let mut seen = HashSet::new();
        for target in self.targets() {
            if !seen.insert(target.clone()) {
                return Err(ConfigError::DuplicateTarget(target));
            }
        }
        if seen.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        Ok(())
    }

    /// Every configured target, in configuration order.
    pub fn targets(&self) -> Vec<Target> {
        self.groups.iter().flat_map(TargetGroup::targets).collect()
    }
}

fn required_positive(name: &'static str) -> Result<u64, ConfigError> {
    let raw = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    let value = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        name,
        reason: format!("'{raw}' is not a positive integer: {e}"),
    })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(value)
}

fn parse_host(name: &'static str, host: &str) -> Result<HostAddr, ConfigError> {
    let valid = host
        .rsplit_once(':')
        .is_some_and(|(addr, port)| !addr.is_empty() && port.parse::<u16>().is_ok());
    if !valid {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("'{host}' is not a host:port address"),
        });
    }
    Ok(HostAddr::new(host))
}

/// Parses a comma-separated list of host endpoints. Each entry is
/// `host:port`, `host:port/path` or `http://host:port/path`; the path
/// defaults to `/metrics`.
pub fn parse_endpoints(raw: &str) -> Result<Vec<TargetGroup>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            if entry.contains("://") && !entry.starts_with("http://") {
                return Err(ConfigError::Invalid {
                    name: "SCRAPER_ENDPOINTS",
                    reason: format!("'{entry}' is not a plain http endpoint"),
                });
            }
            let rest = entry.trim_start_matches("http://");
            let (host, path) = match rest.find('/') {
                Some(i) => rest.split_at(i),
                None => (rest, DEFAULT_METRICS_PATH),
            };
            Ok(TargetGroup::Endpoint {
                host: parse_host("SCRAPER_ENDPOINTS", host)?,
                path: path.to_string(),
            })
        })
        .collect()
}

/// Monitor map entries in document order, repeated hosts included.
struct MonitorEntries(Vec<(String, Vec<String>)>);

struct MonitorEntriesVisitor;

impl<'de> Visitor<'de> for MonitorEntriesVisitor {
    type Value = MonitorEntries;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object from monitor host to container names")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::new();
        while let Some(entry) = map.next_entry::<String, Vec<String>>()? {
            entries.push(entry);
        }
        Ok(MonitorEntries(entries))
    }
}

impl<'de> Deserialize<'de> for MonitorEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(MonitorEntriesVisitor)
    }
}

/// Parses the monitor map, a JSON object from monitor host to the names of
/// the containers it reports. Groups come out sorted by host; a host listed
/// twice is rejected.
pub fn parse_monitors(raw: &str) -> Result<Vec<TargetGroup>, ConfigError> {
    let MonitorEntries(mut monitors) =
        serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
            name: "SCRAPER_MONITORS",
            reason: e.to_string(),
        })?;
    monitors.sort_by(|(a, _), (b, _)| a.trim().cmp(b.trim()));

    if let Some(pair) = monitors
        .windows(2)
        .find(|pair| pair[0].0.trim() == pair[1].0.trim())
    {
        return Err(ConfigError::Invalid {
            name: "SCRAPER_MONITORS",
            reason: format!("monitor host {} is listed more than once", pair[0].0.trim()),
        });
    }

    monitors
        .into_iter()
        .map(|(host, containers)| {
            let host = parse_host("SCRAPER_MONITORS", host.trim())?;
            if containers.iter().any(|name| name.trim().is_empty()) {
                return Err(ConfigError::Invalid {
                    name: "SCRAPER_MONITORS",
                    reason: format!("monitor {host} lists an empty container name"),
                });
            }
            Ok(TargetGroup::monitor(host, containers))
        })
        .collect()
}
