//! Strategy selection: trading memory for speed.
//!
//! Three execution strategies cover the input-size spectrum:
//!
//! - **Fast**: everything in memory, one pass, quickest.
//! - **Safe**: two streaming passes, memory bounded by distinct keys.
//! - **Disk**: external sort + k-way merge, memory bounded by chunk size
//!   and merge fan-in only.
//!
//! The selector projects each mode's memory need from the total input size
//! and picks the cheapest mode that fits under the configured fraction of
//! available memory. When available memory cannot be determined, it
//! defaults to Safe.

use bytesize::ByteSize;

use crate::config::EngineConfig;
use crate::error::DupeError;

/// Projected fraction of input size resident in memory in Fast mode.
pub const FAST_MODE_MEMORY_FACTOR: f64 = 0.40;

/// Projected fraction of input size resident in memory in Safe mode.
pub const SAFE_MODE_MEMORY_FACTOR: f64 = 0.10;

/// One of the three execution strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// In-memory, single-pass, parallel by file.
    Fast,
    /// Two-pass streaming, memory bounded by distinct keys.
    Safe,
    /// External sort + k-way merge on disk.
    Disk,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Safe => write!(f, "safe"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// The user-facing strategy option: a concrete strategy or `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyChoice {
    /// Let the selector decide from input size and available memory.
    #[default]
    Auto,
    /// Force the named strategy, bypassing the memory projection.
    Forced(Strategy),
}

impl std::str::FromStr for StrategyChoice {
    type Err = DupeError;

    /// Parse a strategy name. An unrecognized name is a fatal
    /// configuration error, never silently coerced.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "fast" => Ok(Self::Forced(Strategy::Fast)),
            "safe" => Ok(Self::Forced(Strategy::Safe)),
            "disk" => Ok(Self::Forced(Strategy::Disk)),
            other => Err(DupeError::Config(format!(
                "unknown strategy '{other}' (expected auto, fast, safe or disk)"
            ))),
        }
    }
}

/// The selected strategy plus the parameters derived for it.
#[derive(Debug, Clone)]
pub struct StrategyDecision {
    /// The strategy the run will execute.
    pub strategy: Strategy,
    /// Number of parallel workers.
    pub workers: usize,
    /// Disk-mode chunk size in bytes (carried even when unused, so a
    /// decision is self-describing in logs).
    pub chunk_bytes: u64,
}

/// Chooses among Fast / Safe / Disk based on input size and available
/// memory.
#[derive(Debug)]
pub struct StrategySelector {
    choice: StrategyChoice,
    threshold: f64,
    workers: usize,
    chunk_bytes: u64,
}

impl StrategySelector {
    /// Build a selector from the run configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            choice: config.strategy,
            threshold: config.ram_usage_threshold,
            workers: crate::config::default_workers().min(config.max_workers).max(1),
            chunk_bytes: config.chunk_bytes(),
        }
    }

    /// Select a strategy for `total_bytes` of input, probing the host for
    /// available memory.
    #[must_use]
    pub fn select(&self, total_bytes: u64) -> StrategyDecision {
        self.select_with_memory(total_bytes, probe_available_memory())
    }

    /// Select a strategy with an explicit memory reading (`None` when the
    /// host memory could not be determined).
    ///
    /// Both comparisons are inclusive: a projection exactly at the limit
    /// still fits.
    #[must_use]
    pub fn select_with_memory(
        &self,
        total_bytes: u64,
        available_memory: Option<u64>,
    ) -> StrategyDecision {
        let strategy = match self.choice {
            StrategyChoice::Forced(strategy) => {
                log::info!("Strategy forced to '{strategy}' by configuration");
                strategy
            }
            StrategyChoice::Auto => self.auto_select(total_bytes, available_memory),
        };
        StrategyDecision {
            strategy,
            workers: self.workers,
            chunk_bytes: self.chunk_bytes,
        }
    }

    fn auto_select(&self, total_bytes: u64, available_memory: Option<u64>) -> Strategy {
        let Some(available) = available_memory.filter(|&m| m > 0) else {
            log::warn!("Available memory unknown; defaulting to the 'safe' strategy");
            return Strategy::Safe;
        };

        let budget = available as f64 * self.threshold;
        let fast_need = total_bytes as f64 * FAST_MODE_MEMORY_FACTOR;
        let safe_need = total_bytes as f64 * SAFE_MODE_MEMORY_FACTOR;

        log::info!(
            "Auto strategy selection: input {}, available memory {}, budget {} ({:.0}%)",
            ByteSize(total_bytes),
            ByteSize(available),
            ByteSize(budget as u64),
            self.threshold * 100.0
        );
        log::info!(
            "Projected memory: fast {} / safe {} / disk scratch ~{}",
            ByteSize(fast_need as u64),
            ByteSize(safe_need as u64),
            ByteSize(total_bytes)
        );

        if fast_need <= budget {
            log::info!("Decision: enough memory, selecting 'fast'");
            Strategy::Fast
        } else if safe_need <= budget {
            log::info!("Decision: 'fast' would not fit, selecting 'safe'");
            Strategy::Safe
        } else {
            log::info!("Decision: even 'safe' would not fit, selecting 'disk'");
            Strategy::Disk
        }
    }
}

/// Probe the host for currently available memory in bytes.
///
/// Returns `None` when the platform reports nothing useful.
#[must_use]
pub fn probe_available_memory() -> Option<u64> {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    let available = system.available_memory();
    (available > 0).then_some(available)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(threshold: f64) -> StrategySelector {
        StrategySelector::new(&EngineConfig::default().with_ram_usage_threshold(threshold))
    }

    #[test]
    fn test_unknown_memory_defaults_to_safe() {
        let s = selector(0.7);
        assert_eq!(
            s.select_with_memory(1_000_000, None).strategy,
            Strategy::Safe
        );
        assert_eq!(
            s.select_with_memory(1_000_000, Some(0)).strategy,
            Strategy::Safe
        );
    }

    #[test]
    fn test_fast_boundary_is_inclusive() {
        // 0.40 * S == T * M exactly (all values representable):
        // S = 5 MiB, T = 0.5, M = 4 MiB, both sides 2 MiB.
        let s = selector(0.5);
        let decision = s.select_with_memory(5 << 20, Some(4 << 20));
        assert_eq!(decision.strategy, Strategy::Fast);
    }

    #[test]
    fn test_safe_boundary_is_inclusive() {
        // Past the fast boundary but 0.10 * S == T * M exactly: S = 20 MiB.
        let s = selector(0.5);
        let decision = s.select_with_memory(20 << 20, Some(4 << 20));
        assert_eq!(decision.strategy, Strategy::Safe);
    }

    #[test]
    fn test_disk_when_nothing_fits() {
        let s = selector(0.5);
        let decision = s.select_with_memory(1 << 30, Some(4 << 20));
        assert_eq!(decision.strategy, Strategy::Disk);
    }

    #[test]
    fn test_plenty_of_memory_selects_fast() {
        let s = selector(0.7);
        let decision = s.select_with_memory(1_000, Some(1_000_000_000));
        assert_eq!(decision.strategy, Strategy::Fast);
    }

    #[test]
    fn test_forced_choice_bypasses_projection() {
        let config = EngineConfig::default()
            .with_strategy(StrategyChoice::Forced(Strategy::Disk));
        let s = StrategySelector::new(&config);
        // Tiny input, no memory info: the override still wins.
        assert_eq!(s.select_with_memory(1, None).strategy, Strategy::Disk);
    }

    #[test]
    fn test_invalid_strategy_name_is_config_error() {
        let err = "turbo".parse::<StrategyChoice>().unwrap_err();
        assert!(matches!(err, DupeError::Config(_)));
    }

    #[test]
    fn test_strategy_names_parse() {
        assert_eq!("auto".parse::<StrategyChoice>().unwrap(), StrategyChoice::Auto);
        assert_eq!(
            "fast".parse::<StrategyChoice>().unwrap(),
            StrategyChoice::Forced(Strategy::Fast)
        );
        assert_eq!(
            "safe".parse::<StrategyChoice>().unwrap(),
            StrategyChoice::Forced(Strategy::Safe)
        );
        assert_eq!(
            "disk".parse::<StrategyChoice>().unwrap(),
            StrategyChoice::Forced(Strategy::Disk)
        );
    }

    #[test]
    fn test_worker_cap_applies() {
        let config = EngineConfig::default().with_max_workers(1);
        let s = StrategySelector::new(&config);
        assert_eq!(s.select_with_memory(10, Some(1 << 30)).workers, 1);
    }
}
