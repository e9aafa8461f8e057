pub mod catalog;
pub mod classifier;
pub mod error;

pub use catalog::{InstanceTypeCatalog, SkuSource, StaticSkuSource, DEFAULT_REFRESH_INTERVAL};
pub use classifier::{Classification, CloudErrorKind, ErrorClassifier, RetryPolicy};
pub use error::CatalogError;
