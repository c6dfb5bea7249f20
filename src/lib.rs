// src/lib.rs

pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod offload;
pub mod transfer;
pub mod usage;
