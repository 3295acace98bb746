pub mod app;
pub mod config;
pub mod infrastructure;
pub mod model;
pub mod sync;
