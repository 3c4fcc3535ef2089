pub mod controller;
pub mod model;
pub mod report;

pub use controller::RunController;
pub use model::{RunError, RunErrorKind, RunSnapshot, RunState};
pub use report::{ReportAggregator, ReportBundle};
