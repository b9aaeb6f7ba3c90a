use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LanesError, Result};
use crate::lane::{AllocationMap, Priority};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_opt(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LanesError::InvalidEnv { key: key.to_string(), value }),
        None => Ok(None),
    }
}

/// Parse the compact allocation form `"1000:1,2000:1"` into an [`AllocationMap`].
///
/// Repeated thresholds add their slot counts together. Whitespace around
/// pairs is ignored; an empty string yields an empty map.
pub fn parse_allocations(spec: &str) -> Result<AllocationMap> {
    let mut map = AllocationMap::new();
    for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (threshold, slots) = pair
            .split_once(':')
            .ok_or_else(|| LanesError::InvalidAllocation(format!("missing ':' in {pair:?}")))?;
        let threshold: Priority = threshold.trim().parse().map_err(|_| {
            LanesError::InvalidAllocation(format!("bad threshold in {pair:?}"))
        })?;
        let slots: usize = slots
            .trim()
            .parse()
            .map_err(|_| LanesError::InvalidAllocation(format!("bad slot count in {pair:?}")))?;
        *map.entry(threshold).or_default() += slots;
    }
    Ok(map)
}

// ── Lanes ─────────────────────────────────────────────────────

/// One allocation lane: up to `slots` tasks with priority up to `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub threshold: Priority,
    pub slots: usize,
}

fn default_lanes() -> Vec<LaneConfig> {
    vec![
        LaneConfig { threshold: 1000, slots: 1 },
        LaneConfig { threshold: 2000, slots: 1 },
        LaneConfig { threshold: 10000, slots: 2 },
    ]
}

fn default_worker_threads() -> usize { 0 }
fn default_ping_interval() -> u64 { 500 }
fn default_shutdown_timeout() -> u64 { 5000 }

// ── Top-level config ──────────────────────────────────────────

/// Scheduler configuration, parsed from TOML with env overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanesConfig {
    /// Allocation lanes (`[[lanes]]` tables).
    #[serde(default = "default_lanes")]
    pub lanes: Vec<LaneConfig>,
    /// Executor pool size. 0 = allocation budget plus one for the ping task.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Delay of the idle re-evaluation ping, in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    /// How long shutdown waits for in-flight tasks, in milliseconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            lanes: default_lanes(),
            worker_threads: default_worker_threads(),
            ping_interval_ms: default_ping_interval(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

impl LanesConfig {
    /// Load config from a TOML file (or defaults when `path` is `None`),
    /// then apply `LANES_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML file without env overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loading lanes config");
        Ok(toml::from_str(&content)?)
    }

    /// Override fields from `LANES_ALLOCATIONS`, `LANES_WORKER_THREADS`,
    /// `LANES_PING_INTERVAL_MS` and `LANES_SHUTDOWN_TIMEOUT_MS`.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(spec) = env_opt("LANES_ALLOCATIONS") {
            self.lanes = parse_allocations(&spec)?
                .into_iter()
                .map(|(threshold, slots)| LaneConfig { threshold, slots })
                .collect();
        }
        if let Some(threads) = env_parsed("LANES_WORKER_THREADS")? {
            self.worker_threads = threads;
        }
        if let Some(ms) = env_parsed("LANES_PING_INTERVAL_MS")? {
            self.ping_interval_ms = ms;
        }
        if let Some(ms) = env_parsed("LANES_SHUTDOWN_TIMEOUT_MS")? {
            self.shutdown_timeout_ms = ms;
        }
        Ok(())
    }

    /// Collapse the configured lanes into an allocation map.
    pub fn allocation_map(&self) -> AllocationMap {
        let mut map = AllocationMap::new();
        for lane in &self.lanes {
            *map.entry(lane.threshold).or_default() += lane.slots;
        }
        map
    }

    /// Resolve the executor pool size (0 means budget + 1).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            let budget: usize = self.lanes.iter().map(|l| l.slots).sum();
            budget.max(1) + 1
        } else {
            self.worker_threads
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Lanes config loaded:");
        for lane in &self.lanes {
            tracing::info!("  lane:        threshold={}, slots={}", lane.threshold, lane.slots);
        }
        tracing::info!("  workers:     {}", self.resolved_worker_threads());
        tracing::info!("  ping:        {}ms", self.ping_interval_ms);
        tracing::info!("  shutdown:    {}ms", self.shutdown_timeout_ms);
    }

    /// JSON view of the resolved configuration.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "lanes": self.allocation_map(),
            "worker_threads": self.resolved_worker_threads(),
            "ping_interval_ms": self.ping_interval_ms,
            "shutdown_timeout_ms": self.shutdown_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_compact_allocations() {
        let map = parse_allocations("1000:1, 2000:2").unwrap();
        assert_eq!(map.get(&1000), Some(&1));
        assert_eq!(map.get(&2000), Some(&2));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn parse_allocations_merges_duplicates() {
        let map = parse_allocations("500:1,500:3").unwrap();
        assert_eq!(map.get(&500), Some(&4));
    }

    #[test]
    fn parse_allocations_empty() {
        assert!(parse_allocations("").unwrap().is_empty());
        assert!(parse_allocations(" , ").unwrap().is_empty());
    }

    #[test]
    fn parse_allocations_rejects_garbage() {
        assert!(matches!(parse_allocations("1000"), Err(LanesError::InvalidAllocation(_))));
        assert!(matches!(parse_allocations("x:1"), Err(LanesError::InvalidAllocation(_))));
        assert!(matches!(parse_allocations("1000:-1"), Err(LanesError::InvalidAllocation(_))));
    }

    #[test]
    fn defaults() {
        let config = LanesConfig::default();
        assert_eq!(config.ping_interval_ms, 500);
        assert_eq!(config.shutdown_timeout_ms, 5000);
        let map = config.allocation_map();
        assert_eq!(map.values().sum::<usize>(), 4);
        // 4 slots + 1 ping worker
        assert_eq!(config.resolved_worker_threads(), 5);
    }

    #[test]
    fn explicit_worker_threads() {
        let config = LanesConfig { worker_threads: 3, ..LanesConfig::default() };
        assert_eq!(config.resolved_worker_threads(), 3);
    }

    #[test]
    fn from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
ping_interval_ms = 50

[[lanes]]
threshold = 100
slots = 2

[[lanes]]
threshold = 100
slots = 1
"#
        )
        .unwrap();

        let config = LanesConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ping_interval_ms, 50);
        assert_eq!(config.shutdown_timeout_ms, 5000);
        assert_eq!(config.allocation_map().get(&100), Some(&3));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lanes = 7").unwrap();
        assert!(matches!(
            LanesConfig::from_file(file.path()),
            Err(LanesError::ConfigParse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = LanesConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(LanesError::ConfigIo(_))));
    }
}
