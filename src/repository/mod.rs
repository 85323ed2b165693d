//! Document repository
//!
//! Typed records over the bucket store: `put / get / get_all / find_one /
//! count / count_where / delete`, each in its own transaction, plus scoped
//! `view` / `update` for callers that need several steps to be atomic.

mod bucket;
mod codec;
mod documents;
mod errors;
mod store;

pub use bucket::Bucket;
pub use codec::{decode, encode};
pub use documents::{DocTxn, DocView, Documents};
pub use errors::{RepositoryError, RepositoryResult};
pub use store::DocumentStore;
