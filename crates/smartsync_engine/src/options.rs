//! Per-job sync options.

use serde::{Deserialize, Serialize};

/// How incoming records treat locally modified ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeMode {
    /// The incoming side wins.
    #[default]
    Overwrite,
    /// Locally modified records are left alone on download, and records
    /// changed on the server are left alone on upload.
    LeaveIfChanged,
}

/// Options persisted with a job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// Merge mode.
    #[serde(default)]
    pub merge_mode: MergeMode,
    /// Fields sent on upload when the push target does not name its own.
    #[serde(default, rename = "fieldlist")]
    pub field_list: Vec<String>,
}

impl SyncOptions {
    /// Options with the given merge mode and no field list.
    pub fn new(merge_mode: MergeMode) -> Self {
        Self {
            merge_mode,
            field_list: Vec::new(),
        }
    }

    /// Sets the upload field list.
    pub fn with_field_list<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_list = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_shape() {
        let options = SyncOptions::new(MergeMode::LeaveIfChanged).with_field_list(["Name"]);
        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({"mergeMode": "LEAVE_IF_CHANGED", "fieldlist": ["Name"]})
        );
    }

    #[test]
    fn missing_fields_default() {
        let options: SyncOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options.merge_mode, MergeMode::Overwrite);
        assert!(options.field_list.is_empty());
    }
}
