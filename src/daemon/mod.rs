pub mod dial;
pub mod probe;
