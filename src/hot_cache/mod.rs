//! Hot cache: short-term, per-namespace conversational memory
//!
//! Each (user, namespace) pair owns a fixed-capacity ring buffer of recent
//! exchanges. Search is a linear cosine-similarity scan over that single
//! buffer, padded to a fixed latency floor.
//!
//! ```text
//! user ──┬── user_alice  [RingBuffer<CachedMessage>; N]
//!        └── group_team  [RingBuffer<CachedMessage>; N]
//! ```

pub mod cache;
pub mod ring;
pub mod similarity;
pub mod summarize;

pub use cache::{CachedMessage, HotCache, HotCacheStats, SearchResult};
pub use ring::RingBuffer;
pub use similarity::cosine_similarity;
pub use summarize::Summarizer;
