use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("SKU enumeration failed: {0}")]
    SourceUnavailable(String),

    #[error("no SKU data has ever been successfully fetched")]
    NeverPopulated,
}
