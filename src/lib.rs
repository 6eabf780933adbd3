// src/lib.rs
pub mod admin;
pub mod config;
pub mod connection;
pub mod health;
pub mod messaging;
pub mod transport;
pub mod workflow;
