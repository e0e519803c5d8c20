use std::fmt;

/// Globally unique id of a vertex or edge, issued at creation and never
/// reused.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Gid(pub u64);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LabelId(pub u32);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PropertyId(pub u32);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EdgeTypeId(pub u32);

/// Read mode of an accessor operation: `Old` reads the state as of the
/// start of the current command, `New` includes the transaction's own
/// in-progress writes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum View {
    Old,
    New,
}

/// An inclusive or exclusive range endpoint for index range scans.
#[derive(Clone, Debug, PartialEq)]
pub enum Bound<T> {
    Included(T),
    Excluded(T),
}

impl<T> Bound<T> {
    pub fn value(&self) -> &T {
        match self {
            Bound::Included(value) | Bound::Excluded(value) => value,
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, Bound::Included(_))
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Gid {
    fn from(value: u64) -> Self {
        Gid(value)
    }
}

impl From<Gid> for u64 {
    fn from(value: Gid) -> Self {
        value.0
    }
}

impl From<u32> for LabelId {
    fn from(value: u32) -> Self {
        LabelId(value)
    }
}

impl From<LabelId> for u32 {
    fn from(value: LabelId) -> Self {
        value.0
    }
}

impl From<u32> for PropertyId {
    fn from(value: u32) -> Self {
        PropertyId(value)
    }
}

impl From<PropertyId> for u32 {
    fn from(value: PropertyId) -> Self {
        value.0
    }
}

impl From<u32> for EdgeTypeId {
    fn from(value: u32) -> Self {
        EdgeTypeId(value)
    }
}

impl From<EdgeTypeId> for u32 {
    fn from(value: EdgeTypeId) -> Self {
        value.0
    }
}
