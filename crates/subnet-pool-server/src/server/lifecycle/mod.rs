//! Custom-resource style lifecycle requests: parsing, the deadline-bounded
//! handler and outcome delivery.

mod callback;
mod handler;
mod request;
mod response;

pub use callback::*;
pub use handler::*;
pub use request::*;
pub use response::*;
