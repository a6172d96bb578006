// src/lib.rs

//! ReviewA2Z site backend library

#[cfg(feature = "server")]
pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod seo;
pub mod services;
pub mod utils;
