pub mod action;
pub mod advisor;
pub mod cognition;
pub mod config;
pub mod insight;
pub mod io;
pub mod platform;
pub mod session;
pub mod store;
pub mod types;
