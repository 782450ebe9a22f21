pub mod router;
pub mod strategies;

pub use router::{Route, RoutingRules};
pub use strategies::{Fallback, FetchStrategies};
