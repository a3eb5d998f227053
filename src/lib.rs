pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod model;
pub mod plugins;
pub mod query;
pub mod schemas;
pub mod seed;
pub mod store;
pub mod tenant;
