mod error;
mod models;
mod release_date;
mod schema;
mod store;
mod trait_def;

pub use error::CatalogError;
pub use models::*;
pub use release_date::normalize_release_date;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;
