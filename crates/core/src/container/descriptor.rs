use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime identity of a Rust type: its `TypeId` plus a readable name
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeInfo {
    /// Capture the identity of `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Check whether this is the identity of `T`
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identifier distinguishing several bindings of the same types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Tag {
    /// The "no tag" sentinel
    #[default]
    Default,
    Named(String),
}

impl Tag {
    /// Create a named tag
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Tag from a descriptor string, where the empty string means no tag
    pub fn from_declared(name: &str) -> Self {
        if name.is_empty() {
            Self::Default
        } else {
            Self::Named(name.to_string())
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Default => f.write_str("<default>"),
            Tag::Named(name) => f.write_str(name),
        }
    }
}

/// Binding identifier: (result type, parameter type, tag).
///
/// Equality and hashing both cover all three components, so two bindings
/// sharing a tag but differing in types never mask each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindKey {
    pub result: TypeInfo,
    pub param: TypeInfo,
    pub tag: Tag,
}

impl BindKey {
    /// Key for a binding producing `T` from a parameter `P`
    pub fn of<T: ?Sized + 'static, P: ?Sized + 'static>(tag: impl Into<Tag>) -> Self {
        Self {
            result: TypeInfo::of::<T>(),
            param: TypeInfo::of::<P>(),
            tag: tag.into(),
        }
    }

    /// Untagged key for a parameterless binding producing `T`
    pub fn unit<T: ?Sized + 'static>() -> Self {
        Self::of::<T, ()>(Tag::Default)
    }

    /// Key from already resolved type identities
    pub fn new(result: TypeInfo, param: TypeInfo, tag: Tag) -> Self {
        Self { result, param, tag }
    }
}

impl fmt::Display for BindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) #{}", self.result, self.param, self.tag)
    }
}
