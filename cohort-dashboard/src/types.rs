//! Payloads exchanged with the dashboard backend.

use chrono::{DateTime, Utc};
use cohort_core::{CommunityId, Role, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunitySummary {
    pub community_id: CommunityId,
    pub name: String,
    pub member_count: u32,
    pub mentor_count: u32,
    pub student_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityInsights {
    pub community_id: CommunityId,
    pub active_pairings: u32,
    pub sessions_this_week: u32,
    pub engagement_score: f64,
}

/// Summary and insights merged for one community.
///
/// A viewer without a community gets the empty context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityContext {
    pub community_id: Option<CommunityId>,
    pub summary: Option<CommunitySummary>,
    pub insights: Option<CommunityInsights>,
}

impl CommunityContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.community_id.is_none() && self.summary.is_none() && self.insights.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCard {
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub headline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatTile {
    pub label: String,
    pub value: i64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl StatTile {
    pub fn new(label: impl Into<String>, value: i64) -> Self {
        Self {
            label: label.into(),
            value,
            unit: None,
        }
    }
}

/// Per-user dashboard payload loaded once per page view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPayload {
    pub user_id: UserId,
    pub profile: ProfileCard,
    #[serde(default)]
    pub stats: Vec<StatTile>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub community_id: Option<CommunityId>,
}

/// Filter for member listings. Serialized into both the cache key and the
/// query string, so field order does not matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community_id: Option<CommunityId>,
}

impl MemberQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn role_in(role: Role, community: Option<&CommunityId>) -> Self {
        Self {
            role: Some(role),
            community_id: community.cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub community_id: CommunityId,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalOverview {
    pub user_id: UserId,
    #[serde(default)]
    pub goals: Vec<String>,
    pub completed_sessions: u32,
}
