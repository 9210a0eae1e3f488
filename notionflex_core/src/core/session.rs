use serde::{Deserialize, Serialize};

use super::model::{Page, Workspace};
use crate::api::error::ErrorRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Transient: published once, then folded back into `Disconnected`.
    Failed,
}

/// Connection and selection state; one per running client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub status: ConnectionStatus,
    pub active_profile_name: Option<String>,
    pub workspaces: Vec<Workspace>,
    pub selected_workspace: Option<Workspace>,
    /// Pages of the selected workspace only.
    pub pages: Vec<Page>,
    pub selected_page: Option<Page>,
    pub loading: bool,
    pub error: Option<ErrorRecord>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Selects `workspace` and drops the now-stale page list and page selection.
    pub fn select_workspace(&mut self, workspace: Workspace) {
        self.selected_workspace = Some(workspace);
        self.pages.clear();
        self.selected_page = None;
    }

    /// Back to `Disconnected` with nothing selected. `loading` is left alone.
    pub fn clear_connection(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.active_profile_name = None;
        self.workspaces.clear();
        self.selected_workspace = None;
        self.pages.clear();
        self.selected_page = None;
        self.error = None;
    }
}
