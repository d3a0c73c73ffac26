use serde::{Deserialize, Serialize};

/// A capture endpoint from one enumeration pass.
///
/// `index` is the device's ordinal in that pass and is only meaningful
/// against the list it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

impl DeviceDescriptor {
    pub fn new(index: usize, name: impl Into<String>, is_default: bool) -> Self {
        Self {
            index,
            name: name.into(),
            is_default,
        }
    }
}
