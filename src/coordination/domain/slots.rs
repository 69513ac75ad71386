//! Per-platform build slot accounting on a builder.

use crate::config::PlatformLimit;
use std::collections::BTreeMap;

/// Running builds against the configured limit of one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotUsage {
    /// Builds currently running.
    pub ongoing: u32,
    /// Maximum concurrent builds.
    pub limit: u32,
}

impl SlotUsage {
    /// Returns `true` when no further build may start.
    #[must_use]
    pub const fn is_saturated(self) -> bool {
        self.ongoing >= self.limit
    }
}

/// Result of trying to take a build slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    /// A slot was taken; usage after the claim.
    Claimed(SlotUsage),
    /// No slot was free; usage at the time of the attempt.
    Saturated(SlotUsage),
}

/// Concurrency counters for every platform a builder serves.
#[derive(Debug, Clone, Default)]
pub struct PlatformSlots {
    slots: BTreeMap<String, SlotUsage>,
}

impl PlatformSlots {
    /// Creates counters for the configured platforms, all idle.
    #[must_use]
    pub fn from_limits(limits: &[PlatformLimit]) -> Self {
        let slots = limits
            .iter()
            .map(|limit| {
                (
                    limit.name.clone(),
                    SlotUsage {
                        ongoing: 0,
                        limit: limit.instances,
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// Takes a slot on `platform` if one is free.
    ///
    /// A platform this builder does not serve is always saturated with a
    /// limit of zero.
    pub fn claim(&mut self, platform: &str) -> SlotClaim {
        let Some(usage) = self.slots.get_mut(platform) else {
            return SlotClaim::Saturated(SlotUsage::default());
        };
        if usage.is_saturated() {
            return SlotClaim::Saturated(*usage);
        }
        usage.ongoing += 1;
        SlotClaim::Claimed(*usage)
    }

    /// Gives a slot on `platform` back. Never drops below zero.
    pub fn release(&mut self, platform: &str) -> Option<SlotUsage> {
        let usage = self.slots.get_mut(platform)?;
        usage.ongoing = usage.ongoing.saturating_sub(1);
        Some(*usage)
    }

    /// Returns the usage of `platform`.
    #[must_use]
    pub fn usage(&self, platform: &str) -> Option<SlotUsage> {
        self.slots.get(platform).copied()
    }

    /// Iterates platforms in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, SlotUsage)> {
        self.slots
            .iter()
            .map(|(name, usage)| (name.as_str(), *usage))
    }
}
