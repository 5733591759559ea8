pub mod assist;
pub mod config;
pub mod embed;
pub mod models;
pub mod solve;
pub mod stream;
