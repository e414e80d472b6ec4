pub mod auth;
pub mod bus_routes;
pub mod buses;
pub mod complaints;
pub mod dispatcher;
pub mod email;
pub mod export;
pub mod import;
pub mod metrics;
pub mod notifications;
pub mod payload;
pub mod push;
pub mod queue;
pub mod relationship;
pub mod retention;
pub mod session;
pub mod settings;
pub mod stats;
pub mod students;
pub mod triggers;
pub mod users;
