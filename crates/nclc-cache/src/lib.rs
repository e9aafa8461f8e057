mod cache;

pub use cache::{OfferingCache, DEFAULT_TTL};
