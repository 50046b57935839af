//! Self-exclusion data models and state machine logic.
//!
//! Access-state derivation and most-restrictive selection are pure
//! functions over the stored records so the state machine can be tested
//! without a database.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fixed cooldown duration
pub const COOLDOWN_HOURS: i64 = 24;
/// Grace window after a cooldown ends, during which the user may upgrade
/// to a longer exclusion
pub const POST_COOLDOWN_WINDOW_HOURS: i64 = 24;
/// Countdown between a limit-removal request and actual deletion
pub const REMOVAL_GRACE_HOURS: i64 = 24;

/// Kind of self-exclusion record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionType {
    Cooldown,
    Temporary,
    Permanent,
    DepositLimit,
    LossLimit,
    WagerLimit,
}

impl ExclusionType {
    /// Storage string for this type
    pub fn as_str(self) -> &'static str {
        match self {
            ExclusionType::Cooldown => "cooldown",
            ExclusionType::Temporary => "temporary",
            ExclusionType::Permanent => "permanent",
            ExclusionType::DepositLimit => "deposit_limit",
            ExclusionType::LossLimit => "loss_limit",
            ExclusionType::WagerLimit => "wager_limit",
        }
    }

    /// Parse a storage string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cooldown" => Some(ExclusionType::Cooldown),
            "temporary" => Some(ExclusionType::Temporary),
            "permanent" => Some(ExclusionType::Permanent),
            "deposit_limit" => Some(ExclusionType::DepositLimit),
            "loss_limit" => Some(ExclusionType::LossLimit),
            "wager_limit" => Some(ExclusionType::WagerLimit),
            _ => None,
        }
    }

    /// Limit types restrict amounts; access types restrict access.
    pub fn is_limit(self) -> bool {
        matches!(
            self,
            ExclusionType::DepositLimit | ExclusionType::LossLimit | ExclusionType::WagerLimit
        )
    }

    /// Human-readable label used in rejection messages
    pub fn label(self) -> &'static str {
        match self {
            ExclusionType::Cooldown => "Cooldown",
            ExclusionType::Temporary => "Temporary exclusion",
            ExclusionType::Permanent => "Permanent exclusion",
            ExclusionType::DepositLimit => "Deposit limit",
            ExclusionType::LossLimit => "Loss limit",
            ExclusionType::WagerLimit => "Wager limit",
        }
    }
}

impl std::fmt::Display for ExclusionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform segment an exclusion or limit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformType {
    Sports,
    Casino,
    /// Platform-wide; applies in addition to any segment-specific record
    Platform,
}

impl PlatformType {
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformType::Sports => "SPORTS",
            PlatformType::Casino => "CASINO",
            PlatformType::Platform => "PLATFORM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SPORTS" => Some(PlatformType::Sports),
            "CASINO" => Some(PlatformType::Casino),
            "PLATFORM" => Some(PlatformType::Platform),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation period for a spending limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitPeriod {
    Daily,
    Weekly,
    Monthly,
    HalfYear,
    Session,
}

impl LimitPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitPeriod::Daily => "DAILY",
            LimitPeriod::Weekly => "WEEKLY",
            LimitPeriod::Monthly => "MONTHLY",
            LimitPeriod::HalfYear => "HALF_YEAR",
            LimitPeriod::Session => "SESSION",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DAILY" => Some(LimitPeriod::Daily),
            "WEEKLY" => Some(LimitPeriod::Weekly),
            "MONTHLY" => Some(LimitPeriod::Monthly),
            "HALF_YEAR" => Some(LimitPeriod::HalfYear),
            "SESSION" => Some(LimitPeriod::Session),
            _ => None,
        }
    }
}

impl std::fmt::Display for LimitPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current access restriction derived from a record.
///
/// Variant order is restrictiveness order; `Ord` picks the most
/// restrictive applicable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Cooldown,
    PostCooldownWindow,
    Temporary,
    Permanent,
}

impl AccessState {
    /// User-facing denial message. Clients branch on the fixed substrings
    /// "cooldown", "post-cooldown window", "temporarily excluded" and
    /// "permanently excluded".
    pub fn user_message(self) -> &'static str {
        match self {
            AccessState::Cooldown => {
                "You are in a cooldown period. This action is not allowed"
            }
            AccessState::PostCooldownWindow => {
                "You are in a post-cooldown window. This action is not allowed"
            }
            AccessState::Temporary => {
                "You are temporarily excluded. You may still withdraw your funds"
            }
            AccessState::Permanent => {
                "You are permanently excluded. You may still withdraw your funds"
            }
        }
    }
}

/// A self-exclusion or spending-limit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfExclusion {
    pub id: i64,
    pub user_id: i64,
    pub exclusion_type: ExclusionType,
    pub platform_type: PlatformType,
    /// Aggregation period; limit types only
    pub period: Option<LimitPeriod>,
    /// Limit in minor units; limit types only
    pub limit_amount: Option<i64>,
    pub start_date: DateTime<Utc>,
    /// `None` = open-ended (permanent exclusions and limits)
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Set when the user requests removal of a limit; the record stays
    /// enforced until the grace countdown elapses
    pub removal_requested_at: Option<DateTime<Utc>>,
    /// Stamped by the expiry sweep when a cooldown's end date passes
    pub post_cooldown_window_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SelfExclusion {
    /// The access restriction this record imposes at `now`, if any.
    ///
    /// Limit records never restrict access. A cooldown whose end date has
    /// passed is reinterpreted as being in its post-cooldown window even
    /// before the expiry sweep stamps `post_cooldown_window_end`.
    pub fn access_state(&self, now: DateTime<Utc>) -> Option<AccessState> {
        if !self.is_active {
            return None;
        }
        match self.exclusion_type {
            ExclusionType::Permanent => Some(AccessState::Permanent),
            ExclusionType::Temporary => match self.end_date {
                Some(end) if now < end => Some(AccessState::Temporary),
                Some(_) => None,
                None => Some(AccessState::Temporary),
            },
            ExclusionType::Cooldown => match self.end_date {
                Some(end) if now < end => Some(AccessState::Cooldown),
                Some(end) => {
                    let window_end = self
                        .post_cooldown_window_end
                        .unwrap_or(end + Duration::hours(POST_COOLDOWN_WINDOW_HOURS));
                    (now < window_end).then_some(AccessState::PostCooldownWindow)
                }
                None => Some(AccessState::Cooldown),
            },
            _ => None,
        }
    }

    /// Whether this record is scoped to the given segment.
    ///
    /// A platform-wide record applies to every segment; `None` matches
    /// everything (the unscoped "what applies at all" query).
    pub fn applies_to(&self, segment: Option<PlatformType>) -> bool {
        match segment {
            None => true,
            Some(seg) => {
                self.platform_type == PlatformType::Platform || self.platform_type == seg
            }
        }
    }

    /// Whether a limit-removal countdown is running
    pub fn is_removal_pending(&self) -> bool {
        self.removal_requested_at.is_some()
    }

    /// Whether this cooldown is currently inside its post-cooldown window
    pub fn is_in_post_cooldown_window(&self, now: DateTime<Utc>) -> bool {
        matches!(self.access_state(now), Some(AccessState::PostCooldownWindow))
    }
}

/// An applicable access restriction together with its source record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExclusion {
    pub exclusion: SelfExclusion,
    pub state: AccessState,
}

/// Pick the single most restrictive access-state exclusion applicable to
/// `segment` at `now`. Limit records are ignored; platform-wide records
/// always participate.
pub fn most_restrictive(
    records: &[SelfExclusion],
    segment: Option<PlatformType>,
    now: DateTime<Utc>,
) -> Option<ActiveExclusion> {
    records
        .iter()
        .filter(|r| r.applies_to(segment))
        .filter_map(|r| r.access_state(now).map(|state| (r, state)))
        .max_by_key(|(_, state)| *state)
        .map(|(r, state)| ActiveExclusion {
            exclusion: r.clone(),
            state,
        })
}
