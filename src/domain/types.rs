//! Shared types for the check-in core

use crate::domain::errors::StatusParseError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Newtype wrapper for pilgrim record IDs (opaque, owned by the record store)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PilgrimId(pub String);

impl std::fmt::Display for PilgrimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PilgrimId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Newtype wrapper for proximity card identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub String);

impl std::fmt::Display for CardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Boarding status of a pilgrim. Exactly two values exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PilgrimStatus {
    Onboard,
    Offboard,
}

impl PilgrimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PilgrimStatus::Onboard => "onboard",
            PilgrimStatus::Offboard => "offboard",
        }
    }
}

impl std::fmt::Display for PilgrimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PilgrimStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onboard" => Ok(PilgrimStatus::Onboard),
            "offboard" => Ok(PilgrimStatus::Offboard),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

/// What a session's successful scans should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Idle,
    Onboard,
    Offboard,
}

impl ScanMode {
    /// Target status for this mode; `None` for idle
    pub fn target_status(&self) -> Option<PilgrimStatus> {
        match self {
            ScanMode::Idle => None,
            ScanMode::Onboard => Some(PilgrimStatus::Onboard),
            ScanMode::Offboard => Some(PilgrimStatus::Offboard),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Idle => "idle",
            ScanMode::Onboard => "onboard",
            ScanMode::Offboard => "offboard",
        }
    }
}

impl From<PilgrimStatus> for ScanMode {
    fn from(status: PilgrimStatus) -> Self {
        match status {
            PilgrimStatus::Onboard => ScanMode::Onboard,
            PilgrimStatus::Offboard => ScanMode::Offboard,
        }
    }
}

/// Pilgrim record as stored in the remote collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pilgrim {
    pub id: PilgrimId,
    pub name: String,
    #[serde(default)]
    pub passport_number: String,
    pub card_id: CardId,
    #[serde(default)]
    pub seat_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    pub status: PilgrimStatus,
    #[serde(default, deserialize_with = "deserialize_record_time")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_record_time")]
    pub updated: Option<DateTime<Utc>>,
}

impl Pilgrim {
    /// Minimal record, mostly for seeding stores
    pub fn new(id: &str, name: &str, card_id: &str, status: PilgrimStatus) -> Self {
        Self {
            id: PilgrimId::from(id),
            name: name.to_string(),
            passport_number: String::new(),
            card_id: CardId::from(card_id),
            seat_number: None,
            phone: None,
            photo: None,
            date_of_birth: None,
            sex: None,
            nationality: None,
            status,
            created: None,
            updated: None,
        }
    }
}

/// Record timestamps arrive either as RFC 3339 or as
/// `YYYY-MM-DD HH:MM:SS.fffZ`; empty strings mean unset.
fn deserialize_record_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    parse_record_time(&raw)
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid record timestamp: {raw}")))
}

fn parse_record_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Roster-wide counts reported by the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RosterStats {
    pub total: u64,
    pub onboard: u64,
    pub offboard: u64,
}

impl RosterStats {
    pub fn from_pilgrims<'a>(pilgrims: impl IntoIterator<Item = &'a Pilgrim>) -> Self {
        pilgrims.into_iter().fold(Self::default(), |mut acc, p| {
            acc.total += 1;
            match p.status {
                PilgrimStatus::Onboard => acc.onboard += 1,
                PilgrimStatus::Offboard => acc.offboard += 1,
            }
            acc
        })
    }
}
