//! Content chunks and the per-request content queue.
//!
//! - [`Chunk`]: one immutable unit of received body bytes, or a terminal
//!   end-of-stream sentinel
//! - [`ContentQueue`]: the ordered buffer of pending chunks, tracking the
//!   terminal state of the stream

mod chunk;
pub use chunk::Chunk;

mod queue;
pub use queue::ContentQueue;
pub use queue::ReadOutcome;
pub use queue::Terminal;
