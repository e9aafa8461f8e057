use std::sync::Arc;

use nclc_cache::OfferingCache;

use crate::facade::CloudProvider;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn CloudProvider>,
    pub catalog: Arc<nclc_catalog::InstanceTypeCatalog>,
    /// Exposed directly (beyond the `CloudProvider` facade) for the admin
    /// cache-flush route (§"Supplementary features": operational escape
    /// hatch for a stuck unavailable-offerings entry).
    pub offering_cache: Arc<OfferingCache>,
    pub auth_token: Arc<String>,
}
