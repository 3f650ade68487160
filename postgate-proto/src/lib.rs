pub mod config;
pub mod inbound;
pub mod server;
pub mod smtp;
