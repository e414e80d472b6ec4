use chrono::Utc;
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::route::{BusRoute, CreateBusRouteRequest, UpdateBusRouteRequest},
    store::{new_id, DataSource},
};

pub struct BusRouteService;

impl BusRouteService {
    pub async fn list(store: &dyn DataSource) -> AppResult<Vec<BusRoute>> {
        Ok(store.list_bus_routes().await?)
    }

    pub async fn create(store: &dyn DataSource, req: CreateBusRouteRequest) -> AppResult<BusRoute> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Missing required field: name".into()));
        }
        let now = Utc::now();
        let route = BusRoute {
            id: new_id(),
            name: name.to_string(),
            description: non_blank(req.description),
            stops: clean_stops(req.stops),
            created_at: now,
            updated_at: now,
        };
        store.insert_bus_route(&route).await?;
        info!("Created bus route {} ({})", route.id, route.name);
        Ok(route)
    }

    pub async fn update(store: &dyn DataSource, id: &str, req: UpdateBusRouteRequest) -> AppResult<BusRoute> {
        let mut route = store
            .get_bus_route(id)
            .await?
            .ok_or_else(|| AppError::not_found("bus route", id))?;
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("name must not be empty".into()));
            }
            route.name = name.to_string();
        }
        if req.description.is_some() {
            route.description = non_blank(req.description);
        }
        if let Some(stops) = req.stops {
            route.stops = clean_stops(stops);
        }
        route.updated_at = Utc::now();

        if !store.update_bus_route(&route).await? {
            return Err(AppError::not_found("bus route", id));
        }
        Ok(route)
    }

    /// Hard delete. Buses and students keep the route name they were given.
    pub async fn delete(store: &dyn DataSource, id: &str) -> AppResult<()> {
        if !store.delete_bus_route(id).await? {
            return Err(AppError::not_found("bus route", id));
        }
        info!("Deleted bus route {id}");
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn clean_stops(stops: Vec<String>) -> Vec<String> {
    stops
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FixtureStore;

    #[tokio::test]
    async fn routes_are_listed_by_name() {
        let store = FixtureStore::new();
        for name in ["الخط الثاني", "الخط الأول"] {
            BusRouteService::create(
                &store,
                CreateBusRouteRequest { name: name.into(), description: None, stops: Vec::new() },
            )
            .await
            .unwrap();
        }
        let names: Vec<String> = BusRouteService::list(&store).await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["الخط الأول".to_string(), "الخط الثاني".to_string()]);
    }

    #[tokio::test]
    async fn update_trims_and_delete_is_final() {
        let store = FixtureStore::seeded().await;
        let route = BusRouteService::update(
            &store,
            "route_1",
            UpdateBusRouteRequest {
                stops: Some(vec![" المدرسة ".into(), "".into(), "حي النرجس".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(route.stops, vec!["المدرسة".to_string(), "حي النرجس".to_string()]);

        BusRouteService::delete(&store, "route_1").await.unwrap();
        let err = BusRouteService::delete(&store, "route_1").await.unwrap_err();
        assert_eq!(err.kind(), "not-found");
        assert!(store.get_bus_route("route_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let store = FixtureStore::new();
        let err = BusRouteService::create(
            &store,
            CreateBusRouteRequest { name: " ".into(), description: None, stops: Vec::new() },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid-argument");
    }
}
