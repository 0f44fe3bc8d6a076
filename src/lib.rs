pub mod ingest;
pub mod normalization;
pub mod store;
pub mod tracing;

pub mod util {
    pub mod env;
}
