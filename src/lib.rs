pub mod clock;
pub mod cockpit;
pub mod config;
pub mod conn_state;
pub mod error;
pub mod fetch;
pub mod models;
pub mod socket;
pub mod store;
pub mod window;

pub use config::CockpitConfig;
pub use store::{CockpitView, DataStore, Phase, Slice};
