pub mod handler;
pub mod protocol;

pub use handler::ChannelTransport;
