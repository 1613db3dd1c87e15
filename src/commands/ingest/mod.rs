const DB_SCHEMA_VERSION: &str = "1.0.0";

mod batch;
mod db_setup;
mod dispatch;
mod errors;
mod extract;
mod parse;
mod persist;
mod resume;
mod run;
mod types;

pub use run::run;
