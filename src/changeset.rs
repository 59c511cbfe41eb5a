//! Change sets as authored in a changelog.

use serde::{Deserialize, Serialize};

use crate::action::ChangeAction;

/// One uniquely identified mutation plus its execution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Identity used to detect new, applied and changed change sets.
    pub global_unique_change_id: String,
    /// Author of the change set.
    pub author: String,
    /// Collection the change applies to; created on first write.
    pub target_collection: String,
    /// The mutation.
    pub change: ChangeAction,
    /// Explicit inverse, recorded instead of the synthesized one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_change: Option<ChangeAction>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Execution options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<Run>,
}

impl ChangeSet {
    /// `run.onChange`: execute again when applied before with different content.
    pub fn run_on_change(&self) -> bool {
        self.run.as_ref().and_then(|run| run.on_change) == Some(true)
    }

    /// `run.always`: execute again when applied before with the same content.
    pub fn run_always(&self) -> bool {
        self.run.as_ref().and_then(|run| run.always) == Some(true)
    }
}

/// Re-run policy of a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    /// Re-run when the content changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_change: Option<bool>,
    /// Re-run when the content is unchanged; combinable with `on_change`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub always: Option<bool>,
}
