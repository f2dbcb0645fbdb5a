mod handler;
mod model;

pub use handler::{reverse_geocode, route};
