//! Three-tier memory for minder: a bounded short-term buffer per session,
//! summarized long-term records with semantic recall, and a durable user
//! profile.

mod embed;
mod error;
mod manager;
mod model;
mod profile;
mod recall;
mod store;
mod summarize;

pub use embed::{EMBEDDING_DIM, Embedder, HashEmbedder, cosine_similarity, l2_normalize};
pub use error::MemoryError;
pub use manager::{MemoryManager, RetrievedContext};
pub use model::{MemoryRecord, UserProfileFact};
pub use profile::ProfileStore;
pub use recall::rank_records;
pub use store::RecordStore;
pub use summarize::{ExtractiveSummarizer, Summarizer};
