pub mod error;
pub mod graph;
pub mod location;
pub mod node;
pub mod stage;

pub use error::{GraphError, Result};
pub use graph::{Graph, Input, Use};
pub use location::{ElementKind, FieldRef, LocationIdentity};
pub use node::{CycleClass, EdgeKind, NodeCost, NodeId, NodeKind, SizeClass};
pub use stage::{StageFlag, StageFlags};
