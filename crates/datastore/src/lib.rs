pub mod entities;
pub mod postgres;
pub mod traits;

pub use entities::*;
pub use postgres::PostgresDatastore;
pub use traits::{MatchStore, SubscriptionStore, UserStore};
