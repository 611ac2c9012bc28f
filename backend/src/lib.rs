pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod routes;
pub mod service;
pub mod storage;
