mod backward;
pub mod builder;
mod forward;
pub mod session;

pub use builder::SessionBuilder;
pub use session::Session;
