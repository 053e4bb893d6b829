pub mod feed_ingester;
pub mod query_runner;
