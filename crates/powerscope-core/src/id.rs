use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies one powered device in the device table.
    pub struct DeviceId;
}

/// Identifies a registered device type (e.g. "solar panel").
/// Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTypeId(pub u32);
