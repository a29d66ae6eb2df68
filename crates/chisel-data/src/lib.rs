mod ids;
mod snapshot;

pub use ids::*;
pub use snapshot::*;
