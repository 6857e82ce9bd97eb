//! Request and response bodies for the operator API.

pub mod requests;
pub mod responses;

pub use requests::{CourseRequest, DrillRequest, SeatRequest};
pub use responses::{HealthResponse, SeatResponse, StatsResponse};
