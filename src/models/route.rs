use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named bus route the console offers when assigning buses and students.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusRoute {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub stops: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusRouteRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub stops: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBusRouteRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub stops: Option<Vec<String>>,
}
