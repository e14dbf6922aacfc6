mod models;
pub(crate) mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use trait_def::EnrichmentStore;
