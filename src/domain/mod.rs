pub mod bucket;
pub mod entry;

pub use bucket::*;
pub use entry::*;
