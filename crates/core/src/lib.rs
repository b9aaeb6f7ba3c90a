pub mod config;
pub mod error;
pub mod lane;

pub use config::{load_dotenv, parse_allocations, LaneConfig, LanesConfig};
pub use error::*;
pub use lane::{AllocationMap, Priority};
