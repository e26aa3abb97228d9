//! Repository layer — entity-scoped database operations.

mod audit;
mod requisition;
mod specimen;
mod user;

pub use audit::*;
pub use requisition::*;
pub use specimen::*;
pub use user::*;
