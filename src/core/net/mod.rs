pub mod cache;
pub mod download;
pub mod job;

pub use cache::MetaCache;
pub use download::{Checksum, Download};
pub use job::NetJob;
