pub mod auth;
pub mod bus;
pub mod complaint;
pub mod notification;
pub mod route;
pub mod settings;
pub mod student;
pub mod trip;
pub mod user;
