pub mod bindable;
pub mod binding;
pub mod cache;
pub mod descriptor;
pub mod pending;
pub mod registry;


pub use bindable::{Bindable, BindableKind, ErasedMultiton, Instance, MultitonCell, SingletonCell};
pub use binding::{Binding, BindingBuilder, BindingError};
pub use cache::BindingCache;
pub use descriptor::{BindKey, Tag, TypeInfo};
pub use pending::Pending;
pub use registry::{ObjectRegistry, RegistryError};
