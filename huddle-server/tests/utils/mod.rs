pub mod local_signaling;

pub use local_signaling::*;
