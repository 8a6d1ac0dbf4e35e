use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{CompetitionId, ContainerId, PowerAction, ScoreAction, TeamId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompetitionSummary {
    #[serde(rename = "competitionID")]
    pub competition_id: CompetitionId,
    pub name: String,
    pub description: String,
    pub host: String,
    pub team_count: u32,
    pub container_count: u32,
    pub is_private: bool,
    pub scoring_active: bool,
    #[serde(rename = "networkCIDR")]
    pub network_cidr: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionsResponse {
    pub competitions: Vec<CompetitionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerTeam {
    #[serde(default)]
    pub id: Option<TeamId>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ContainerTeam {
    pub fn label(&self) -> String {
        match (self.name.as_deref(), self.id) {
            (Some(name), _) => name.to_string(),
            (None, Some(id)) => format!("Team {id}"),
            (None, None) => "Team".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: ContainerId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub team: Option<ContainerTeam>,
    #[serde(default)]
    pub container_config_name: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl ContainerRecord {
    /// Normalizes a loosely-typed container entry. Only an entry without an
    /// integral id is rejected; any other field that is null or of the wrong
    /// type is treated as missing.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let id = value.get("id").and_then(integral)?;
        let team = value.get("team").filter(|team| team.is_object()).map(|team| ContainerTeam {
            id: team.get("id").and_then(integral).map(TeamId),
            name: text_field(team, "name"),
        });
        Some(Self {
            id: ContainerId(id),
            name: text_field(value, "name"),
            ip_address: text_field(value, "ipAddress"),
            node: text_field(value, "node"),
            status: text_field(value, "status").unwrap_or_default(),
            team,
            container_config_name: text_field(value, "containerConfigName"),
            last_updated: text_field(value, "lastUpdated"),
        })
    }

    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("CT-{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersResponse {
    pub containers: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    pub score: i64,
    pub last_updated: String,
    pub network: String,
}

impl TeamRecord {
    /// Normalizes a loosely-typed team entry. Ids and scores may arrive as
    /// numbers or numeric strings; entries without an integral id are skipped.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let id = value.get("id").and_then(integral)?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Team {id}"));
        let score = value.get("score").and_then(integral).unwrap_or(0);
        let last_updated = value
            .get("lastUpdated")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let network = value
            .get("networkCIDR")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(Self {
            id: TeamId(id),
            name,
            score,
            last_updated,
            network,
        })
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamsResponse {
    pub teams: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerRequest {
    pub ids: Vec<ContainerId>,
    pub action: PowerAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeployRequest {
    pub ids: Vec<ContainerId>,
    pub start_after: bool,
    pub enable_advanced_logging: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub action: ScoreAction,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub amount: Option<i64>,
}

impl ScoreRequest {
    pub fn reset() -> Self {
        Self {
            action: ScoreAction::Reset,
            amount: None,
        }
    }

    pub fn adjust(amount: i64) -> Self {
        Self {
            action: ScoreAction::Adjust,
            amount: Some(amount),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreResponse {
    pub score: Option<i64>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageResponse {
    pub message: Option<String>,
}

/// Response for operations that may hand off to a background job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobResponse {
    pub message: Option<String>,
    #[serde(rename = "jobID")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadResponse {
    pub message: Option<String>,
    #[serde(rename = "jobID")]
    pub job_id: Option<String>,
    pub logs: Option<Vec<String>>,
    #[serde(rename = "competitionID")]
    pub competition_id: Option<String>,
    pub competition_name: Option<String>,
    #[serde(rename = "packageID")]
    pub package_id: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn team_entries_are_normalized() {
        let team = TeamRecord::from_wire(&json!({
            "id": "4",
            "score": 12.0,
            "networkCIDR": "10.0.4.0/24"
        }))
        .expect("team");
        assert_eq!(team.id, TeamId(4));
        assert_eq!(team.name, "Team 4");
        assert_eq!(team.score, 12);
        assert_eq!(team.network, "10.0.4.0/24");
        assert!(team.last_updated.is_empty());
    }

    #[test]
    fn team_entries_without_integral_id_are_skipped() {
        assert!(TeamRecord::from_wire(&json!({ "name": "ghost" })).is_none());
        assert!(TeamRecord::from_wire(&json!({ "id": "abc" })).is_none());
        assert!(TeamRecord::from_wire(&json!({ "id": 1.5 })).is_none());
    }

    #[test]
    fn container_entries_keep_loosely_typed_fields() {
        let null_status = ContainerRecord::from_wire(&json!({ "id": 301, "status": null }))
            .expect("null status");
        assert_eq!(null_status.status, "");
        assert_eq!(null_status.display_name(), "CT-301");

        let string_id = ContainerRecord::from_wire(&json!({ "id": "302", "status": "running" }))
            .expect("string id");
        assert_eq!(string_id.id, ContainerId(302));

        let float_id = ContainerRecord::from_wire(&json!({ "id": 304.0 })).expect("float id");
        assert_eq!(float_id.id, ContainerId(304));

        let anonymous_team = ContainerRecord::from_wire(&json!({
            "id": 303,
            "name": 7,
            "ipAddress": null,
            "team": { "name": "Red" }
        }))
        .expect("team without id");
        assert_eq!(anonymous_team.name, None);
        assert_eq!(anonymous_team.ip_address, None);
        let team = anonymous_team.team.expect("team");
        assert_eq!(team.id, None);
        assert_eq!(team.label(), "Red");
    }

    #[test]
    fn container_entries_without_integral_id_are_skipped() {
        assert!(ContainerRecord::from_wire(&json!({ "status": "running" })).is_none());
        assert!(ContainerRecord::from_wire(&json!({ "id": "ct-9" })).is_none());
        assert!(ContainerRecord::from_wire(&json!({ "id": 305.5 })).is_none());
        assert!(ContainerRecord::from_wire(&json!(null)).is_none());
    }

    #[test]
    fn competition_summary_uses_backend_field_names() {
        let summary: CompetitionSummary = serde_json::from_value(json!({
            "competitionID": "koth-2026",
            "name": "King of the Hill",
            "teamCount": 4,
            "containerCount": 8,
            "isPrivate": true,
            "scoringActive": true,
            "networkCIDR": "10.10.0.0/16"
        }))
        .expect("summary");
        assert_eq!(summary.competition_id, CompetitionId::from("koth-2026"));
        assert_eq!(summary.team_count, 4);
        assert!(summary.is_private && summary.scoring_active);
        assert_eq!(summary.network_cidr.as_deref(), Some("10.10.0.0/16"));
    }

    #[test]
    fn adjust_request_serializes_amount_only_when_present() {
        let reset = serde_json::to_value(ScoreRequest::reset()).expect("reset");
        assert_eq!(reset, json!({ "action": "reset" }));
        let adjust = serde_json::to_value(ScoreRequest::adjust(-5)).expect("adjust");
        assert_eq!(adjust, json!({ "action": "adjust", "amount": -5 }));
    }

    #[test]
    fn redeploy_request_uses_camel_case() {
        let body = serde_json::to_value(RedeployRequest {
            ids: vec![ContainerId(301)],
            start_after: true,
            enable_advanced_logging: false,
        })
        .expect("body");
        assert_eq!(
            body,
            json!({ "ids": [301], "startAfter": true, "enableAdvancedLogging": false })
        );
    }
}
