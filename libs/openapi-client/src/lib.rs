//! Source-control provider models

pub mod models;
