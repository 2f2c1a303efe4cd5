mod generator;
mod layout;

pub use generator::*;
pub use layout::*;
