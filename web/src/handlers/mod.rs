//! HTTP request handlers, one module per domain.

pub mod crew;
pub mod dashboard;
pub mod docking;
pub mod health;
pub mod life_support;
pub mod power;

pub use health::health_check;
