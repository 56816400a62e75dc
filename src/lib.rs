pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod policy;
pub mod router;
pub mod ui;

pub use config::{Backend, Config};
pub use db::{ConnectionSettings, Db, DbOptions};
pub use error::CrmError;
