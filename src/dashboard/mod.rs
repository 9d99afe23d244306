pub mod classifier;
pub mod directional;
pub mod service;

pub use service::{Dashboard, DashboardService};
