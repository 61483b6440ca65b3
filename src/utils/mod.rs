//! Utility modules and helper functions

pub mod logging;
pub mod validation;

pub use logging::init_tracing;
pub use validation::{is_http_url, validate_job_url};
