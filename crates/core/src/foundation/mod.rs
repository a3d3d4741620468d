pub mod lifecycle;

pub use lifecycle::{FreezeState, LifecycleState};
