//! Storage adapters: JSON documents, Arrow record batches and Parquet tables.

mod error;
pub use error::StoreError;

pub mod batch;
pub mod files;
pub mod sink;

pub use batch::rows_to_batch;
pub use files::{load_json, read_parquet, save_json, write_parquet};
pub use sink::{DirectorySink, JsonMentionFile};
