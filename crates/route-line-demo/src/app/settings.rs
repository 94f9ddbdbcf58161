use clap::Parser;
use route_line_lib::RouteLineConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Route Line Demo - Drives the route line core through a simulated trip
pub struct Settings {
    /// JSON file with the routes to show (an array of routes); synthesized when absent
    #[clap(short, long, value_name = "FILE")]
    pub routes: Option<PathBuf>,

    /// JSON file overriding parts of the route line configuration
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of routes to synthesize, the first one is primary
    #[clap(long, default_value = "3")]
    pub synthetic_routes: usize,

    /// Legs per synthesized route
    #[clap(long, default_value = "2")]
    pub synthetic_legs: usize,

    /// Geometry points per synthesized leg
    #[clap(long, default_value = "200")]
    pub points_per_leg: usize,

    /// Promote this route id to primary before the trip starts
    #[clap(long, value_name = "ROUTE_ID")]
    pub promote: Option<String>,

    /// Number of simulated position updates along the primary route
    #[clap(short, long, default_value = "20")]
    pub ticks: usize,

    /// Simulated time between position updates in milliseconds
    #[clap(long, default_value = "1000")]
    pub tick_interval_ms: u64,

    /// Simulated travel speed in meters per second
    #[clap(long, default_value = "13.9")]
    pub speed: f64,

    /// Simulated renderer latency per source update in milliseconds
    #[clap(long, default_value = "25")]
    pub render_latency_ms: u64,

    /// Half side of the tap hit-test box, in Web Mercator meters
    #[clap(long, default_value = "15.0")]
    pub tap_padding: f64,

    /// Maximum distance in meters between the position and the route line
    #[clap(long)]
    pub max_jump_meters: Option<f64>,

    /// Length in meters of the gradient between traffic colors
    #[clap(long)]
    pub soft_gradient_meters: Option<f64>,

    /// Print the final render state as JSON on stdout
    #[clap(long, default_value = "false")]
    pub json: bool,
}

impl Settings {
    /// Parse settings from the command line, exiting on invalid arguments
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Apply the command line overrides on top of `base`
    pub fn apply_to(&self, base: RouteLineConfig) -> RouteLineConfig {
        RouteLineConfig {
            max_jump_meters: self.max_jump_meters.unwrap_or(base.max_jump_meters),
            soft_gradient_transition: self.soft_gradient_meters.or(base.soft_gradient_transition),
            ..base
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn render_latency(&self) -> Duration {
        Duration::from_millis(self.render_latency_ms)
    }
}
