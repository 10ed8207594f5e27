//! Foundation types for metamerge.
//!
//! Metadata fragments from different acquisition pipelines are decoded into
//! the tree types defined here before the merge engine combines them. Every
//! other metamerge crate depends on `metamerge-types`.
//!
//! # Key Types
//!
//! - [`DocumentValue`]: One node of a metadata tree (null, bool, number, string, list, map)
//! - [`MetadataDocument`]: Ordered, key-unique map of fields; one per fragment
//! - [`ValueKind`]: Payload-free variant tag used in conflict reports

pub mod document;
pub mod error;
pub mod value;

pub use document::MetadataDocument;
pub use error::TypeError;
pub use value::{DocumentValue, ValueKind};
