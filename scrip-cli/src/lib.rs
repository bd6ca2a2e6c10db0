pub mod app;
pub mod pipeline;
pub mod telemetry;

pub use app::run as run_app;
