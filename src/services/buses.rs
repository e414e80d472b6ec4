use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::{
        bus::{Bus, CreateBusRequest, UpdateBusRequest},
        trip::Trip,
    },
    store::{new_id, DataSource},
};

pub const DEFAULT_TRIP_LIMIT: i64 = 50;
pub const MAX_TRIP_LIMIT: i64 = 500;

pub struct BusService;

impl BusService {
    /// Active buses, each with the number of active students assigned to it.
    pub async fn list(store: &dyn DataSource) -> AppResult<Vec<Bus>> {
        let mut buses = store.list_buses(true).await?;
        let students = store.list_students(None, true).await?;
        for bus in &mut buses {
            bus.students_count = students
                .iter()
                .filter(|s| s.bus_id.as_deref() == Some(bus.id.as_str()))
                .count() as u32;
        }
        Ok(buses)
    }

    pub async fn create(store: &dyn DataSource, req: CreateBusRequest) -> AppResult<Bus> {
        if req.plate_number.trim().is_empty() || req.route.trim().is_empty() {
            return Err(AppError::Validation("Missing required fields: plateNumber, route".into()));
        }
        if req.capacity == 0 {
            return Err(AppError::Validation("capacity must be positive".into()));
        }
        let bus = Bus {
            id: new_id(),
            plate_number: req.plate_number.trim().to_string(),
            driver_name: req.driver_name,
            driver_phone: req.driver_phone,
            route: req.route.trim().to_string(),
            capacity: req.capacity,
            is_active: true,
            students_count: 0,
        };
        store.insert_bus(&bus).await?;
        info!("Created bus {} ({})", bus.id, bus.plate_number);
        Ok(bus)
    }

    pub async fn update(store: &dyn DataSource, id: &str, req: UpdateBusRequest) -> AppResult<Bus> {
        let mut bus = store
            .get_bus(id)
            .await?
            .ok_or_else(|| AppError::not_found("bus", id))?;
        if let Some(v) = req.plate_number {
            bus.plate_number = v;
        }
        if let Some(v) = req.driver_name {
            bus.driver_name = v;
        }
        if let Some(v) = req.driver_phone {
            bus.driver_phone = v;
        }
        if let Some(v) = req.route {
            bus.route = v;
        }
        if let Some(v) = req.capacity {
            if v == 0 {
                return Err(AppError::Validation("capacity must be positive".into()));
            }
            bus.capacity = v;
        }
        if let Some(v) = req.is_active {
            bus.is_active = v;
        }
        if !store.update_bus(&bus).await? {
            return Err(AppError::not_found("bus", id));
        }
        Ok(bus)
    }

    pub async fn deactivate(store: &dyn DataSource, id: &str) -> AppResult<Bus> {
        Self::update(
            store,
            id,
            UpdateBusRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn recent_trips(store: &dyn DataSource, limit: Option<i64>) -> AppResult<Vec<Trip>> {
        let limit = limit.unwrap_or(DEFAULT_TRIP_LIMIT).clamp(1, MAX_TRIP_LIMIT);
        Ok(store.list_trips(limit).await?)
    }
}
