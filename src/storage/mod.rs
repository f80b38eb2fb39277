pub mod entities;
pub mod migrate;
pub mod query;
pub mod store;
