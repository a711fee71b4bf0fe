pub mod envelope;
pub mod peer;
