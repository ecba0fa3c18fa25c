//! Server state.

pub mod cities;
pub mod store;

pub use cities::CityStore;
pub use store::{AppState, GraphStats};
