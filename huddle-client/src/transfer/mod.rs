mod engine;
mod incoming;
mod outgoing;


pub use engine::*;
