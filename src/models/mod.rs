pub mod enums;
pub mod filters;
pub mod history;
pub mod inputs;
pub mod requisition;
pub mod specimen;
pub mod user;

pub use enums::*;
pub use filters::*;
pub use history::*;
pub use inputs::*;
pub use requisition::*;
pub use specimen::*;
pub use user::*;
