// Library exports for Melodex
// This allows integration tests to drive the full router

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod notifications;
pub mod posts;
pub mod recommend;
pub mod routes;
pub mod social;
pub mod state;
