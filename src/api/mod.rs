//! API Module
//!
//! Operator HTTP surface over the store, cache and gate.
//!
//! - `GET /health` - store ping, `UP` or `DOWN`
//! - `GET /stats` - store and loader counters
//! - `POST /drill/stampede` - run a stampede drill
//! - `DELETE /cache/:key` - invalidate a cached key
//! - `PUT /courses/:id` - register a course and its capacity
//! - `GET /courses/:id/seats` - current seat counter
//! - `POST /courses/:id/seats` - take a seat
//! - `DELETE /courses/:id/seats` - give a seat back

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
