pub mod auth;
pub mod capability;
pub mod cleanup;
pub mod clock;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod ratelimit;
pub mod routes;
pub mod storage;
