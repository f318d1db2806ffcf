//! Tier policy - maps a source size to a resource profile
//!
//! Tiers partition `[0, tier3.max_bytes]` into contiguous ascending ranges. Every range is
//! half-open except the last one, whose upper bound is inclusive. Routing only affects the
//! resources a job runs with, never its output.

use crate::error::{ConfigError, JobError};
use crate::models::{ImageMetadata, TierName};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Resource budget attached to a size range
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierProfile {
    pub name: TierName,
    pub min_bytes: u64,
    pub max_bytes: u64,
    pub memory_budget_mb: u64,
    pub ephemeral_storage_budget_mb: u64,
    pub timeout_budget: Duration,
}

impl TierProfile {
    pub fn memory_budget_bytes(&self) -> u64 {
        self.memory_budget_mb.saturating_mul(MIB)
    }

    /// How many variant renders may be in flight without exceeding the memory budget
    ///
    /// The decoded source (one RGBA frame) and the fetched bytes are resident for the whole
    /// job; each render is charged two full-resolution RGBA frames (resize output plus
    /// encoder working set). Never below one, never above `requested`.
    pub fn render_parallelism(
        &self,
        metadata: &ImageMetadata,
        source_bytes: u64,
        requested: usize,
    ) -> usize {
        let frame = metadata.pixel_count().saturating_mul(4).max(1);
        let resident = frame.saturating_add(source_bytes);
        let available = self.memory_budget_bytes().saturating_sub(resident);
        let per_render = frame.saturating_mul(2);
        let cap = usize::try_from(available / per_render).unwrap_or(usize::MAX);
        requested.min(cap).max(1)
    }
}

/// Ordered set of tiers and the size-based selection rule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierPolicy {
    profiles: Vec<TierProfile>,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            profiles: vec![
                TierProfile {
                    name: TierName::Tier1,
                    min_bytes: 0,
                    max_bytes: 5 * MIB,
                    memory_budget_mb: 1024,
                    ephemeral_storage_budget_mb: 512,
                    timeout_budget: Duration::from_secs(30),
                },
                TierProfile {
                    name: TierName::Tier2,
                    min_bytes: 5 * MIB,
                    max_bytes: 15 * MIB,
                    memory_budget_mb: 2048,
                    ephemeral_storage_budget_mb: 1024,
                    timeout_budget: Duration::from_secs(60),
                },
                TierProfile {
                    name: TierName::Tier3,
                    min_bytes: 15 * MIB,
                    max_bytes: 25 * MIB,
                    memory_budget_mb: 4096,
                    ephemeral_storage_budget_mb: 2048,
                    timeout_budget: Duration::from_secs(120),
                },
            ],
        }
    }
}

impl TierPolicy {
    pub fn new(profiles: Vec<TierProfile>) -> Result<Self, ConfigError> {
        let policy = Self { profiles };
        policy.validate()?;
        Ok(policy)
    }

    pub fn profiles(&self) -> &[TierProfile] {
        &self.profiles
    }

    pub fn profile(&self, name: TierName) -> Option<&TierProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Largest accepted size, inclusive
    pub fn max_bytes(&self) -> u64 {
        self.profiles.last().map(|p| p.max_bytes).unwrap_or(0)
    }

    /// Check the partition invariant
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profiles.len() != TierName::ALL.len() {
            return Err(ConfigError::Tiers(format!(
                "expected {} tiers, got {}",
                TierName::ALL.len(),
                self.profiles.len()
            )));
        }

        for (profile, expected) in self.profiles.iter().zip(TierName::ALL) {
            if profile.name != expected {
                return Err(ConfigError::Tiers(format!(
                    "tier {} out of order, expected {}",
                    profile.name, expected
                )));
            }
            if profile.min_bytes >= profile.max_bytes {
                return Err(ConfigError::Tiers(format!(
                    "{} has an empty range [{}, {})",
                    profile.name, profile.min_bytes, profile.max_bytes
                )));
            }
            if profile.memory_budget_mb == 0 || profile.timeout_budget.is_zero() {
                return Err(ConfigError::Tiers(format!(
                    "{} needs a non-zero memory and timeout budget",
                    profile.name
                )));
            }
        }

        if self.profiles[0].min_bytes != 0 {
            return Err(ConfigError::Tiers("tier1 must start at 0 bytes".into()));
        }

        for pair in self.profiles.windows(2) {
            if pair[1].min_bytes != pair[0].max_bytes {
                return Err(ConfigError::Tiers(format!(
                    "{} must start where {} ends ({} != {})",
                    pair[1].name, pair[0].name, pair[1].min_bytes, pair[0].max_bytes
                )));
            }
        }

        Ok(())
    }

    /// Select the tier for a source size
    pub fn select(&self, size_bytes: u64) -> Result<&TierProfile, JobError> {
        let last = self.profiles.len().saturating_sub(1);
        self.profiles
            .iter()
            .enumerate()
            .find(|(index, p)| {
                if *index == last {
                    p.min_bytes <= size_bytes && size_bytes <= p.max_bytes
                } else {
                    p.min_bytes <= size_bytes && size_bytes < p.max_bytes
                }
            })
            .map(|(_, p)| p)
            .ok_or(JobError::SizeOutOfRange {
                size: size_bytes,
                max: self.max_bytes(),
            })
    }

    /// Range filters for a dispatch layer that routes on a numeric `size` attribute
    pub fn routing_filters(&self) -> Vec<(TierName, String)> {
        let last = self.profiles.len().saturating_sub(1);
        self.profiles
            .iter()
            .enumerate()
            .map(|(index, p)| {
                let filter = if index == 0 && p.min_bytes == 0 {
                    format!("size < {}", p.max_bytes)
                } else if index == last {
                    format!("{} <= size <= {}", p.min_bytes, p.max_bytes)
                } else {
                    format!("{} <= size < {}", p.min_bytes, p.max_bytes)
                };
                (p.name, filter)
            })
            .collect()
    }
}
