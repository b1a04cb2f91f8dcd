pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod models;
pub mod notify;
pub mod observability;
pub mod presence;
pub mod pricing;
pub mod sampler;
pub mod state;
pub mod store;
