pub mod detector;
pub mod error;
pub mod nic;

pub use detector::{DriftDetector, DriftOptions};
pub use error::DriftError;
pub use nic::{NicLookup, StaticNicLookup};
