use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bus {
    pub id: String,
    pub plate_number: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub route: String,
    pub capacity: u32,
    pub is_active: bool,
    #[serde(default)]
    pub students_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusRequest {
    pub plate_number: String,
    #[serde(default)]
    pub driver_name: String,
    #[serde(default)]
    pub driver_phone: String,
    pub route: String,
    pub capacity: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBusRequest {
    pub plate_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub route: Option<String>,
    pub capacity: Option<u32>,
    pub is_active: Option<bool>,
}
