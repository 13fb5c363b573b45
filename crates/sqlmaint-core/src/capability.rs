//! Server capability detection.
//!
//! Works out, once per run, whether the server can rebuild indexes online and
//! which column types count as large objects for the active compatibility
//! level. The resulting [`CapabilityProfile`] is immutable for the rest of the
//! run.

use crate::error::PreconditionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Compatibility levels with a known large-object type set.
///
/// Level 100 uses the wide set (adds xml and the `(max)` types); every other
/// listed level uses the narrow image/text/ntext set. Levels not listed here
/// abort the run with an unsupported-compatibility precondition, so adding
/// support for a new server release means appending its level here.
pub const KNOWN_COMPATIBILITY_LEVELS: [u16; 7] = [100, 110, 120, 130, 140, 150, 160];

/// Feature tier an edition string maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditionTier {
    /// Enterprise feature set (Enterprise, Developer, Evaluation)
    Enterprise,
    /// Hosted cloud database
    Cloud,
    /// Everything else (Standard, Web, Express, ...)
    Standard,
}

impl EditionTier {
    /// Classify a server edition name such as `"Enterprise Edition (64-bit)"`
    /// or `"SQL Azure"`.
    pub fn from_edition_name(edition: &str) -> Self {
        let edition = edition.to_ascii_lowercase();
        if edition.contains("azure") {
            EditionTier::Cloud
        } else if edition.contains("enterprise")
            || edition.contains("developer")
            || edition.contains("evaluation")
        {
            EditionTier::Enterprise
        } else {
            EditionTier::Standard
        }
    }

    /// Whether indexes can be rebuilt with `ONLINE = ON` on this tier.
    pub fn supports_online_rebuild(&self) -> bool {
        matches!(self, EditionTier::Enterprise | EditionTier::Cloud)
    }
}

/// Column types that may block an online rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobType {
    Image,
    Text,
    NText,
    Xml,
    VarBinaryMax,
    VarCharMax,
    NVarCharMax,
}

impl LobType {
    /// System type id of the underlying column type (`sys.types.system_type_id`).
    pub fn system_type_id(&self) -> u8 {
        match self {
            LobType::Image => 34,
            LobType::Text => 35,
            LobType::NText => 99,
            LobType::Xml => 241,
            LobType::VarBinaryMax => 165,
            LobType::VarCharMax => 167,
            LobType::NVarCharMax => 231,
        }
    }

    /// MAX-sized variable types only count when declared with `max_length = -1`.
    pub fn requires_max_length(&self) -> bool {
        matches!(
            self,
            LobType::VarBinaryMax | LobType::VarCharMax | LobType::NVarCharMax
        )
    }

    /// Whether a column with the given system type id and declared length is
    /// this type.
    pub fn matches_column(&self, system_type_id: u8, max_length: i32) -> bool {
        self.system_type_id() == system_type_id && (!self.requires_max_length() || max_length == -1)
    }
}

impl fmt::Display for LobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LobType::Image => "image",
            LobType::Text => "text",
            LobType::NText => "ntext",
            LobType::Xml => "xml",
            LobType::VarBinaryMax => "varbinary(max)",
            LobType::VarCharMax => "varchar(max)",
            LobType::NVarCharMax => "nvarchar(max)",
        };
        f.write_str(name)
    }
}

const LEGACY_LOB_TYPES: [LobType; 3] = [LobType::Image, LobType::Text, LobType::NText];

/// Capabilities of the server/database pair for the current run.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityProfile {
    /// Edition name as reported by the server
    pub edition: String,
    /// Tier the edition maps to
    pub tier: EditionTier,
    /// Database compatibility level
    pub compatibility_level: u16,
    /// Whether online rebuilds are available
    pub online_rebuild_supported: bool,
    /// Column types treated as large objects
    pub lob_types: Vec<LobType>,
}

impl CapabilityProfile {
    /// Detect capabilities from the edition name and compatibility level.
    ///
    /// Fails with [`PreconditionError::UnsupportedCompatibilityLevel`] when the
    /// level has no known type set; cloud tiers always use the narrow set.
    pub fn detect(edition: &str, compatibility_level: u16) -> Result<Self, PreconditionError> {
        let tier = EditionTier::from_edition_name(edition);
        let lob_types = lob_types_for(tier, compatibility_level)?;

        let profile = Self {
            edition: edition.to_string(),
            tier,
            compatibility_level,
            online_rebuild_supported: tier.supports_online_rebuild(),
            lob_types,
        };

        debug!(
            edition = %profile.edition,
            tier = ?profile.tier,
            compatibility_level,
            online = profile.online_rebuild_supported,
            lob_types = profile.lob_types.len(),
            "Detected server capabilities"
        );

        Ok(profile)
    }

    /// Comma separated type list, for reports.
    pub fn lob_type_names(&self) -> String {
        self.lob_types
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn lob_types_for(tier: EditionTier, level: u16) -> Result<Vec<LobType>, PreconditionError> {
    if tier == EditionTier::Cloud {
        return Ok(LEGACY_LOB_TYPES.to_vec());
    }

    match level {
        100 => Ok(vec![
            LobType::Image,
            LobType::Text,
            LobType::NText,
            LobType::Xml,
            LobType::VarBinaryMax,
            LobType::VarCharMax,
            LobType::NVarCharMax,
        ]),
        l if KNOWN_COMPATIBILITY_LEVELS.contains(&l) => Ok(LEGACY_LOB_TYPES.to_vec()),
        other => Err(PreconditionError::UnsupportedCompatibilityLevel(other)),
    }
}
