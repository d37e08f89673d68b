//! Self-edit lifecycle: generate → validate → dedup/store → review.

pub mod batch;
pub mod extract;
pub mod generate;
pub mod hash;
pub mod review;
pub mod store;
pub mod types;
pub mod validate;

pub use batch::run_batch_review;
pub use generate::generate_self_edit;
pub use review::review_entry;
pub use store::RecordStore;
pub use types::{ReviewEntry, ReviewResult};
pub use validate::validate_self_edit;
