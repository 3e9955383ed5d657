pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod parsers;
pub mod routes;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod upsert;
