//! Reductions from query results to report values.

mod response_times;
mod status;

pub use response_times::*;
pub use status::*;
