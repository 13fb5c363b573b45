//! Index eligibility classification.
//!
//! Maps each fragmented index or heap to exactly one [`Action`]. Rules are
//! evaluated in order and the first match wins:
//!
//! 1. Online-only mode, fragmentation at the rebuild threshold, and no online
//!    rebuild possible (edition or LOB column): skip
//! 2. Heap at the rebuild threshold: rebuild heap
//! 3. Index at the rebuild threshold: rebuild index
//! 4. Index with page locks at the reorganize threshold: reorganize
//! 5. Anything else: skip
//!
//! Classification is pure. Candidates below the page-count and reorganize
//! floors are filtered out by the catalog reader before they get here.

use crate::capability::CapabilityProfile;
use crate::catalog::{MaintenanceCandidate, ObjectName};
use crate::error::PreconditionError;
use std::fmt;
use std::str::FromStr;

/// Requested rebuild behaviour for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// Only rebuild online; skip what cannot be rebuilt online
    OnlineOnly,
    /// Always rebuild offline
    OfflineOnly,
    /// Online where possible, engine default otherwise
    Mixed,
}

impl FromStr for RebuildMode {
    type Err = PreconditionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-' && *c != ' ')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "onlineonly" | "online" => Ok(RebuildMode::OnlineOnly),
            "offlineonly" | "offline" => Ok(RebuildMode::OfflineOnly),
            "mixed" => Ok(RebuildMode::Mixed),
            _ => Err(PreconditionError::InvalidRebuildMode(value.to_string())),
        }
    }
}

impl fmt::Display for RebuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildMode::OnlineOnly => "online_only",
            RebuildMode::OfflineOnly => "offline_only",
            RebuildMode::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// `ONLINE` option of a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineOption {
    /// `ONLINE = ON`
    Online,
    /// `ONLINE = OFF`
    Offline,
    /// No option, the engine decides
    EngineDefault,
}

/// Options attached to a rebuild action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildHint {
    pub online: OnlineOption,
    pub max_degree_of_parallelism: Option<u16>,
}

impl fmt::Display for RebuildHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let online = match self.online {
            OnlineOption::Online => "online",
            OnlineOption::Offline => "offline",
            OnlineOption::EngineDefault => "default",
        };
        match self.max_degree_of_parallelism {
            Some(dop) => write!(f, "{}, maxdop {}", online, dop),
            None => f.write_str(online),
        }
    }
}

/// Why a candidate was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Online-only run, but the edition or a LOB column prevents it
    OnlineRebuildUnavailable,
    /// Page locks disabled, so the index cannot be reorganized
    PageLocksDisabled,
    /// Heaps below the rebuild threshold have no cheaper action
    HeapBelowRebuildThreshold,
    /// Below every threshold
    BelowThreshold,
    /// Statistics failed the size gate
    BelowSizeGate,
    /// Statistics are newer than the cutoff
    StatisticsCurrent,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::OnlineRebuildUnavailable => {
                "online rebuild unavailable (LOB column or edition)"
            }
            SkipReason::PageLocksDisabled => "page locks disabled, reorganize not possible",
            SkipReason::HeapBelowRebuildThreshold => "heap below rebuild threshold",
            SkipReason::BelowThreshold => "below maintenance threshold",
            SkipReason::BelowSizeGate => "below size threshold",
            SkipReason::StatisticsCurrent => "statistics are current",
        };
        f.write_str(text)
    }
}

/// Corrective action for one object.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Skip {
        object: ObjectName,
        reason: SkipReason,
    },
    ReorganizeIndex {
        object: ObjectName,
    },
    RebuildIndexOnline {
        object: ObjectName,
        hint: RebuildHint,
    },
    /// Offline or engine-default rebuild
    RebuildIndexOffline {
        object: ObjectName,
        hint: RebuildHint,
    },
    RebuildHeap {
        object: ObjectName,
        hint: RebuildHint,
    },
    UpdateStatisticsFullScan {
        object: ObjectName,
    },
}

impl Action {
    /// Pick the index rebuild variant matching the hint.
    pub fn rebuild_index(object: ObjectName, hint: RebuildHint) -> Self {
        if hint.online == OnlineOption::Online {
            Action::RebuildIndexOnline { object, hint }
        } else {
            Action::RebuildIndexOffline { object, hint }
        }
    }

    /// Target of the action.
    pub fn object(&self) -> &ObjectName {
        match self {
            Action::Skip { object, .. }
            | Action::ReorganizeIndex { object }
            | Action::RebuildIndexOnline { object, .. }
            | Action::RebuildIndexOffline { object, .. }
            | Action::RebuildHeap { object, .. }
            | Action::UpdateStatisticsFullScan { object } => object,
        }
    }

    /// Rebuild options, for rebuild variants.
    pub fn hint(&self) -> Option<&RebuildHint> {
        match self {
            Action::RebuildIndexOnline { hint, .. }
            | Action::RebuildIndexOffline { hint, .. }
            | Action::RebuildHeap { hint, .. } => Some(hint),
            _ => None,
        }
    }

    /// Whether this is a skip.
    pub fn is_skip(&self) -> bool {
        matches!(self, Action::Skip { .. })
    }

    /// Short action name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Skip { .. } => "skip",
            Action::ReorganizeIndex { .. } => "reorganize_index",
            Action::RebuildIndexOnline { .. } => "rebuild_index_online",
            Action::RebuildIndexOffline { .. } => "rebuild_index_offline",
            Action::RebuildHeap { .. } => "rebuild_heap",
            Action::UpdateStatisticsFullScan { .. } => "update_statistics_fullscan",
        }
    }
}

/// Fragmentation thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Reorganize at or above this percent
    pub reorganize_percent: f64,
    /// Rebuild at or above this percent
    pub rebuild_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            reorganize_percent: 5.0,
            rebuild_percent: 30.0,
        }
    }
}

/// Classifier bound to one run's capabilities and parameters.
pub struct IndexClassifier<'a> {
    profile: &'a CapabilityProfile,
    mode: RebuildMode,
    thresholds: Thresholds,
    max_parallelism: Option<u16>,
}

impl<'a> IndexClassifier<'a> {
    /// Create a classifier.
    pub fn new(profile: &'a CapabilityProfile, mode: RebuildMode, thresholds: Thresholds) -> Self {
        Self {
            profile,
            mode,
            thresholds,
            max_parallelism: None,
        }
    }

    /// Set a MAXDOP hint for rebuilds.
    pub fn with_max_parallelism(mut self, max_parallelism: Option<u16>) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    /// Classify one candidate.
    pub fn classify(&self, candidate: &MaintenanceCandidate) -> Action {
        let object = candidate.object.clone();
        let fragmentation = candidate.fragmentation_percent;
        let needs_rebuild = fragmentation >= self.thresholds.rebuild_percent;

        if self.mode == RebuildMode::OnlineOnly
            && needs_rebuild
            && (!self.profile.online_rebuild_supported || candidate.contains_lob)
        {
            return Action::Skip {
                object,
                reason: SkipReason::OnlineRebuildUnavailable,
            };
        }

        if needs_rebuild {
            let hint = self.rebuild_hint(candidate);
            return if object.is_heap() {
                Action::RebuildHeap { object, hint }
            } else {
                Action::rebuild_index(object, hint)
            };
        }

        if object.is_heap() {
            return Action::Skip {
                object,
                reason: SkipReason::HeapBelowRebuildThreshold,
            };
        }

        if fragmentation >= self.thresholds.reorganize_percent {
            if candidate.page_locks_enabled {
                return Action::ReorganizeIndex { object };
            }
            return Action::Skip {
                object,
                reason: SkipReason::PageLocksDisabled,
            };
        }

        Action::Skip {
            object,
            reason: SkipReason::BelowThreshold,
        }
    }

    fn rebuild_hint(&self, candidate: &MaintenanceCandidate) -> RebuildHint {
        let online_possible = self.mode != RebuildMode::OfflineOnly
            && self.profile.online_rebuild_supported
            && !candidate.contains_lob;

        if online_possible {
            // Online rebuilds of indexes without page locks must run serially.
            let max_degree_of_parallelism = if candidate.page_locks_enabled {
                self.max_parallelism
            } else {
                Some(1)
            };
            return RebuildHint {
                online: OnlineOption::Online,
                max_degree_of_parallelism,
            };
        }

        let online = if self.mode == RebuildMode::OfflineOnly {
            OnlineOption::Offline
        } else {
            OnlineOption::EngineDefault
        };

        RebuildHint {
            online,
            max_degree_of_parallelism: self.max_parallelism,
        }
    }
}
