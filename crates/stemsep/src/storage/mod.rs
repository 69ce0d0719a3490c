pub mod allocator;

pub use allocator::{ResourceAllocator, TempResource};
