use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Boarding/alighting event recorded by supervisors from the mobile app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub bus_id: String,
    #[serde(default)]
    pub supervisor_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TripQuery {
    pub limit: Option<i64>,
}
