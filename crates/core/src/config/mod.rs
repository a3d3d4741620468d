pub mod runtime;
pub mod sources;
pub mod validation;

pub use runtime::*;
pub use sources::*;
pub use validation::*;
