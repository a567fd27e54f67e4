pub mod builder;
pub mod handler;
pub mod listener;
pub mod shutdown;

pub use builder::{serve_listener, ServerBuilder};
pub use handler::RequestHandler;
pub use shutdown::shutdown_signal;
