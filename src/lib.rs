pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod storage;
pub mod tasks;
pub mod voting;
