//! Route Line Demo - Application Library
//!
//! Drives the route line core through a simulated trip against an in-process renderer,
//! logging what a real map would be asked to draw.

mod app;
pub mod logging;

pub use app::settings::Settings;
pub use app::{DemoError, run};
