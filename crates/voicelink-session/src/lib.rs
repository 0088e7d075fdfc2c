pub mod session;
pub mod transport;

pub use session::{SessionOptions, SessionState, StreamingSession};
pub use transport::{ChannelHandle, ChannelTransport, Frame, Transport, WsTransport};
