//! Core types for network subsetting.

pub mod ids;
pub mod edge;
pub mod origin;
pub mod table;

pub use ids::{NodeId, LegacyId, PartitionKey};
pub use edge::{NetworkEdge, FlowEdge};
pub use origin::{OriginReference, OriginParseError, ResolvedOrigin};
pub use table::{Table, Value, Crs};
