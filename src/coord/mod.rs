//! Incremental compile/execute coordination
//!
//! Keeps the compiled programs in step with the node graph and re-runs them on
//! every host trigger.

pub mod types;
pub mod gate;
pub mod store;
pub mod coordinator;
pub mod trigger;

pub use types::*;
pub use gate::*;
pub use store::*;
pub use coordinator::*;
pub use trigger::*;
