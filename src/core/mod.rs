pub mod cache;
pub mod db;
pub mod errors;
pub mod helpers;
pub mod paginator;
pub mod query_params;
pub mod store;
