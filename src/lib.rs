pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod permissions;
pub mod registry;
pub mod server;
pub mod services;
pub mod sweeper;
pub mod types;
