pub mod api;
pub mod client_ip;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod tls;
