pub mod app_config;
pub mod database;
pub mod memory;
pub mod postgres;

pub use app_config::{CancellationRules, Config};
pub use database::DbClient;
pub use memory::{MemoryEligibility, MemoryStore};
pub use postgres::PgStore;
