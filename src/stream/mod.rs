pub mod multipart;
pub mod session;
pub mod sink;

pub use multipart::{part_head, StreamHead, PART_TAIL};
pub use session::{SessionReport, SessionState, StreamSession};
pub use sink::{channel, ChannelReceiver, ChannelSink, ChunkSink, WriterSink};
