pub mod audit;
pub mod auth_middleware;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod metrics_handler;
pub mod observability;
pub mod rate_limit;
pub mod records;
pub mod routes;
pub mod state;
pub mod validation;
