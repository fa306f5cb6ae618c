pub mod adapters;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod relay;
pub mod session;
pub mod singleflight;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
pub use relay::{RelayActor, RelayRegistry};
