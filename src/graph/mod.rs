//! Operations over graph documents.
//!
//! - `mutation`: the mutation log entries and their atomic application
//! - `resolver`: connection-driven variant resolution
//! - `layout`: default placement of new nodes
//! - `plan`: execution order for flow generation

mod layout;
mod mutation;
mod plan;
mod resolver;

pub use layout::default_position;
pub use mutation::{AddNodeOptions, Applied, EditPolicy, Mutation};
pub use plan::execution_order;
pub use resolver::VariantResolver;
