//! Control plane API models

pub mod models;
