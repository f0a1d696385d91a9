//! Concrete storage backends.

pub mod hierarchical;
pub mod isolated;

pub use hierarchical::{HierarchicalContext, HierarchicalStorage, ManagedObject};
pub use isolated::{IsolatedContext, IsolatedStorage, LiveObject};
