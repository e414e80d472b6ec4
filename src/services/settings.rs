use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::settings::{merged, SettingsDoc},
    store::DataSource,
};

pub struct SettingsService;

impl SettingsService {
    /// All categories folded into one object.
    pub async fn get(store: &dyn DataSource) -> AppResult<SettingsDoc> {
        Ok(merged(&store.list_settings().await?))
    }

    /// Merges `values` into one category; keys not named are kept.
    pub async fn update(store: &dyn DataSource, category: &str, values: SettingsDoc) -> AppResult<SettingsDoc> {
        let category = category.trim();
        if category.is_empty() || !category.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(AppError::Validation(format!("Invalid settings category: {category}")));
        }
        store.merge_settings(category, &values).await?;
        info!("Settings category {category} updated ({} keys)", values.len());
        Self::get(store).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::FixtureStore;

    fn doc(value: serde_json::Value) -> SettingsDoc {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn updates_merge_within_and_across_categories() {
        let store = FixtureStore::new();
        SettingsService::update(&store, "general", doc(json!({ "schoolName": "النور", "language": "ar" })))
            .await
            .unwrap();
        SettingsService::update(&store, "general", doc(json!({ "language": "en" }))).await.unwrap();
        let all = SettingsService::update(&store, "notifications", doc(json!({ "quietHours": true })))
            .await
            .unwrap();

        assert_eq!(all["schoolName"], "النور");
        assert_eq!(all["language"], "en");
        assert_eq!(all["quietHours"], true);
    }

    #[tokio::test]
    async fn category_name_is_validated() {
        let store = FixtureStore::new();
        let err = SettingsService::update(&store, "../x", SettingsDoc::new()).await.unwrap_err();
        assert_eq!(err.kind(), "invalid-argument");
    }
}
