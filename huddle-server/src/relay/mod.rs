mod service;
mod session;
mod ws_handler;

pub use service::*;
pub use session::*;
pub use ws_handler::*;
