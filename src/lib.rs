pub mod app;
pub mod bridge;
pub mod constants;
pub mod errors;
pub mod models;
pub mod services;
pub mod utils;
