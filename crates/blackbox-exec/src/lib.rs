pub mod backends;
pub mod fragments;
pub mod generator;

pub use backends::*;
pub use generator::*;
