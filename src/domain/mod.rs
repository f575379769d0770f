pub mod cycle;
pub mod item;
pub mod source;

pub use cycle::{CycleResult, SourceUpdate};
pub use item::{IdentityRule, Item, RawItem};
pub use source::Source;
