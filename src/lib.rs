pub mod assistant;
pub mod backup;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod gateway;
pub mod models;
pub mod relay;
pub mod session;
pub mod store;
pub mod utils;
pub mod views;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use database::Database;
pub use gateway::{Gateway, GatewayError};
pub use models::{DevelopmentPlan, Goal, JournalEntry, ScheduleBlock, Task, Transaction};
pub use relay::{ChangeMessage, Collection, Relay};
pub use session::Session;
pub use store::{LoadState, StoreError};
pub use utils::Profile;
