//! Client options: model, file loading and the flat key surface.

pub mod loader;
pub mod model;
pub mod surface;

pub use model::{ClientOptions, DiscoveryOptions, HealthOptions, RetryOptions};
