pub mod context;
pub mod enrich_use_case;
pub mod ports;

pub use context::{BatchSettings, EnrichContext};
