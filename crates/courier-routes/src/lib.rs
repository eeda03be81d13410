pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::RouteError;
pub use store::{RouteStore, SqliteRouteStore};
pub use types::Route;
