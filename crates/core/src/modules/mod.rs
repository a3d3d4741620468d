pub mod definition;
pub mod descriptors;
pub(crate) mod loader;
pub mod registry;
pub mod runtime;
pub mod scanner;

pub use definition::*;
pub use descriptors::*;
pub use registry::*;
pub use runtime::*;
pub use scanner::*;
