pub mod catalog;
pub mod object_store;

pub use catalog::CatalogClient;
pub use object_store::{ObjectStore, S3ObjectStore};
