pub mod auth;
pub mod bus_routes;
pub mod buses;
pub mod complaints;
pub mod health;
pub mod maintenance;
pub mod metrics;
pub mod notifications;
pub mod push;
pub mod queue;
pub mod settings;
pub mod stats;
pub mod students;
pub mod users;
