use serde::Serialize;
use serde_json::{Map, Value};

/// Free-form settings document. Keys are whatever the console stores.
pub type SettingsDoc = Map<String, Value>;

/// One settings category (`general`, `notifications`, ...) as stored.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SettingsEntry {
    pub category: String,
    pub values: SettingsDoc,
}

/// Every category folded into one object, later categories winning on key
/// clashes. Categories arrive sorted by name.
pub fn merged(entries: &[SettingsEntry]) -> SettingsDoc {
    let mut out = SettingsDoc::new();
    for entry in entries {
        for (key, value) in &entry.values {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}
