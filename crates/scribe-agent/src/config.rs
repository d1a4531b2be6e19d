use serde::{Deserialize, Serialize};

/// Read-only snapshot of the operator's settings.
///
/// The settings screen owns persistence; the core reads a fresh snapshot
/// through [`SettingsSource`] for every permission decision and guard check
/// so a mid-session change takes effect on the next tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub auto_approve_vault_writes: bool,
    pub require_bash_approval: bool,
    pub always_allowed_tools: Vec<String>,
    /// Session spend ceiling in currency units. Zero disables the guard.
    pub max_budget_per_session: f64,
    /// Turn-count ceiling. Zero disables the guard.
    pub max_turns: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_approve_vault_writes: false,
            require_bash_approval: true,
            always_allowed_tools: Vec::new(),
            max_budget_per_session: 1.0,
            max_turns: 50,
        }
    }
}

/// Provider of settings snapshots, implemented by the settings subsystem.
pub trait SettingsSource: Send + Sync {
    fn snapshot(&self) -> Settings;
}

/// A fixed snapshot; useful for tests and single-shot embedding.
impl SettingsSource for Settings {
    fn snapshot(&self) -> Settings {
        self.clone()
    }
}
