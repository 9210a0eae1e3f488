use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};

use super::model::{workspaces_from_user, Page, Workspace};
use super::session::{ConnectionStatus, Session};
use crate::api::client::NotionClient;
use crate::api::error::{ErrorRecord, NotionError};
use crate::config::ApiConfig;
use crate::storage::{Profile, ProfileStore};

/// Mutable state behind the manager's lock.
#[derive(Default)]
struct State {
    session: Session,
    credential: Option<String>,
    /// Profile a pending connect will claim once it succeeds.
    connecting: Option<String>,
    in_flight: usize,
    /// Bumped whenever a connect starts or the connection is dropped.
    connection_epoch: u64,
    /// Bumped whenever the scope of `pages` changes (workspace or connection).
    page_epoch: u64,
}

impl State {
    fn begin(&mut self, clear_error: bool) {
        self.in_flight += 1;
        if clear_error {
            self.session.error = None;
        }
    }

    fn end(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn reset_connection(&mut self) {
        self.credential = None;
        self.connecting = None;
        self.session.clear_connection();
        self.connection_epoch += 1;
        self.page_epoch += 1;
    }

    /// Records `err`; an authentication failure also drops the connection.
    fn record_failure(&mut self, err: &NotionError) {
        if err.is_authentication() {
            warn!("Credential rejected, disconnecting");
            self.reset_connection();
        }
        self.session.error = Some(err.record());
    }

    fn connected_credential(&self) -> Option<String> {
        if self.session.is_connected() {
            self.credential.clone()
        } else {
            None
        }
    }

    /// Whether `name` is the connected profile or the one being connected.
    fn claims(&self, name: &str) -> bool {
        self.session.active_profile_name.as_deref() == Some(name)
            || self.connecting.as_deref() == Some(name)
    }
}

/// What a successful connect also writes to the profile store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    Nothing,
    /// Point last-selected at the profile, which must still exist.
    Pointer,
    /// Store the credential under the profile name, then point at it.
    Profile,
}

fn cancelled() -> NotionError {
    NotionError::configuration("Connection attempt was cancelled.")
}

/// Owns the [`Session`] and drives every operation a UI can trigger.
///
/// Talks to the remote only through [`NotionClient`] and to storage only
/// through [`ProfileStore`]. Every change to the session is published on a
/// watch channel; call [`subscribe`](Self::subscribe) to observe them.
///
/// The lock is never held across a network call, so operations interleave
/// freely; results that arrive after their scope changed are dropped. Cloning
/// merely increases reference counts, so clones share one session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Mutex<State>>,
    updates: Arc<watch::Sender<Session>>,
    client: NotionClient,
    profiles: ProfileStore,
}

impl ConnectionManager {
    pub fn new(client: NotionClient, profiles: ProfileStore) -> Self {
        let (updates, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Mutex::new(State::default())),
            updates: Arc::new(updates),
            client,
            profiles,
        }
    }

    pub fn from_config(config: &ApiConfig, profiles: ProfileStore) -> Self {
        Self::new(NotionClient::from_config(config), profiles)
    }

    /// Receives a fresh [`Session`] snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.updates.subscribe()
    }

    pub async fn session(&self) -> Session {
        self.inner.lock().await.session.clone()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.lock().await.session.status
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles.list()
    }

    async fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.inner.lock().await;
        let out = f(&mut state);
        state.session.loading = state.in_flight > 0;
        self.updates.send_replace(state.session.clone());
        out
    }

    /// Stores `err` on the session and hands it back for returning.
    async fn reject<T>(&self, err: NotionError) -> Result<T, NotionError> {
        error!("{err}");
        self.update(|s| s.session.error = Some(err.record())).await;
        Err(err)
    }

    /// Ends an operation started under connection `epoch`. Failures are only
    /// recorded while that connection is still the current one.
    async fn finish<T>(&self, epoch: u64, result: Result<T, NotionError>) -> Result<T, NotionError> {
        self.update(|s| {
            s.end();
            let Err(err) = &result else {
                return;
            };
            if s.connection_epoch != epoch {
                debug!("Ignoring failure from a previous connection: {err}");
                return;
            }
            if err.is_authentication() {
                self.profiles.set_last_selected(None);
            }
            s.record_failure(err);
        })
        .await;
        if let Err(err) = &result {
            error!("{err}");
        }
        result
    }

    fn persist(&self, profile: Option<&str>, credential: &str, persist: Persist) -> Result<(), NotionError> {
        let Some(name) = profile else {
            return Ok(());
        };
        match persist {
            Persist::Nothing => {}
            Persist::Pointer => {
                if self.profiles.get(name).is_none() {
                    self.profiles.set_last_selected(None);
                    return Err(NotionError::validation(format!("Profile '{name}' not found.")));
                }
                self.profiles.set_last_selected(Some(name));
            }
            Persist::Profile => {
                self.profiles.upsert(name, credential)?;
                self.profiles.set_last_selected(Some(name));
            }
        }
        Ok(())
    }

    /// Authenticates with `credential` and, on success, becomes `Connected`
    /// as `profile`. Any failure leaves the session `Disconnected` with
    /// `error` set and every list and selection cleared.
    ///
    /// A result that arrives after a newer connect, a disconnect, or the
    /// deletion of `profile` is dropped and reported as cancelled.
    async fn establish(
        &self,
        profile: Option<&str>,
        credential: &str,
        persist: Persist,
    ) -> Result<(), NotionError> {
        let label = profile.unwrap_or("<key>");
        info!("Connecting as '{label}'");
        let epoch = self
            .update(|s| {
                s.begin(true);
                s.connection_epoch += 1;
                s.page_epoch += 1;
                s.connecting = profile.map(str::to_owned);
                s.session.status = ConnectionStatus::Connecting;
                s.connection_epoch
            })
            .await;

        match self.client.current_user(credential).await {
            Ok(user) => {
                let workspaces = workspaces_from_user(&user);
                self.update(|s| {
                    s.end();
                    if s.connection_epoch != epoch {
                        debug!("Dropping connect result for '{label}'");
                        return Err(cancelled());
                    }
                    if let Err(err) = self.persist(profile, credential, persist) {
                        s.reset_connection();
                        s.session.error = Some(err.record());
                        return Err(err);
                    }
                    s.connecting = None;
                    s.credential = Some(credential.to_string());
                    s.session.status = ConnectionStatus::Connected;
                    s.session.active_profile_name = profile.map(str::to_owned);
                    s.session.workspaces = workspaces;
                    s.session.selected_workspace = None;
                    s.session.pages.clear();
                    s.session.selected_page = None;
                    Ok(())
                })
                .await?;
                info!("Connected as '{label}'");
                Ok(())
            }
            Err(err) => {
                error!("Failed to connect as '{label}': {err}");
                let current = self
                    .update(|s| {
                        if s.connection_epoch != epoch {
                            s.end();
                            return false;
                        }
                        s.session.status = ConnectionStatus::Failed;
                        true
                    })
                    .await;
                if current {
                    self.update(|s| {
                        s.end();
                        if s.connection_epoch != epoch {
                            return;
                        }
                        s.reset_connection();
                        s.session.error = Some(err.record());
                        if persist == Persist::Pointer {
                            self.profiles.set_last_selected(None);
                        }
                    })
                    .await;
                }
                Err(err)
            }
        }
    }

    /// Connects with a credential that is not stored as a profile.
    /// `active_profile_name` stays `None`.
    pub async fn connect_with_key(&self, credential: &str) -> Result<(), NotionError> {
        self.establish(None, credential, Persist::Nothing).await
    }

    /// Connects with `credential` and only then stores it as `name`.
    /// A credential that fails to authenticate is never persisted.
    pub async fn add_or_update_profile(&self, name: &str, credential: &str) -> Result<(), NotionError> {
        if name.trim().is_empty() || credential.trim().is_empty() {
            return self
                .reject(NotionError::validation("Profile name and key cannot be empty."))
                .await;
        }
        self.establish(Some(name), credential, Persist::Profile).await
    }

    /// Switches to a stored profile. Already being connected as `name` is a
    /// no-op; a failed connection also clears the last-selected pointer.
    pub async fn select_profile(&self, name: &str) -> Result<(), NotionError> {
        let Some(profile) = self.profiles.get(name) else {
            return self
                .reject(NotionError::validation(format!("Profile '{name}' not found.")))
                .await;
        };

        {
            let state = self.inner.lock().await;
            if state.session.is_connected()
                && state.session.active_profile_name.as_deref() == Some(name)
            {
                debug!("Already connected as '{name}'");
                return Ok(());
            }
        }

        self.establish(Some(&profile.name), &profile.credential, Persist::Pointer)
            .await
    }

    /// Removes a stored profile, disconnecting if it is connected or still
    /// connecting.
    pub async fn delete_profile(&self, name: &str) {
        self.profiles.delete(name);
        let was_current = self
            .update(|s| {
                let current = s.claims(name);
                if current {
                    s.reset_connection();
                }
                if current || self.profiles.last_selected().as_deref() == Some(name) {
                    self.profiles.set_last_selected(None);
                }
                current
            })
            .await;
        if was_current {
            info!("Deleted the active profile '{name}', disconnected");
        }
    }

    /// Reconnects with the profile that was selected when the client last ran.
    ///
    /// Returns `Ok(false)` when there is nothing to restore. A pointer to a
    /// profile that no longer exists is cleared; a failed reconnect keeps it.
    pub async fn restore_last_session(&self) -> Result<bool, NotionError> {
        let Some(name) = self.profiles.last_selected() else {
            return Ok(false);
        };
        let Some(profile) = self.profiles.get(&name) else {
            warn!("Last selected profile '{name}' no longer exists");
            self.profiles.set_last_selected(None);
            return Ok(false);
        };
        self.establish(Some(&profile.name), &profile.credential, Persist::Nothing)
            .await?;
        Ok(true)
    }

    /// Drops the connection and every selection, cancelling a pending
    /// connect. Never fails.
    pub async fn disconnect(&self) {
        self.update(|s| {
            s.reset_connection();
            self.profiles.set_last_selected(None);
        })
        .await;
        info!("Disconnected");
    }

    pub async fn clear_error(&self) {
        self.update(|s| s.session.error = None).await;
    }

    /// Selects `workspace`; the page list and page selection are cleared.
    pub async fn select_workspace(&self, workspace: Workspace) {
        self.update(|s| {
            s.page_epoch += 1;
            s.session.select_workspace(workspace);
        })
        .await;
    }

    pub async fn select_page(&self, page: Option<Page>) {
        self.update(|s| s.session.selected_page = page).await;
    }

    /// Re-reads the workspace list. Empty and untouched when not connected.
    pub async fn fetch_workspaces(&self) -> Result<Vec<Workspace>, NotionError> {
        let Some((credential, epoch)) = self
            .update(|s| {
                let credential = s.connected_credential()?;
                s.begin(true);
                Some((credential, s.connection_epoch))
            })
            .await
        else {
            return Ok(Vec::new());
        };

        let result = self.client.current_user(&credential).await;
        let result = match result {
            Ok(user) => {
                let workspaces = workspaces_from_user(&user);
                let stored = self
                    .update(|s| {
                        if s.connection_epoch != epoch {
                            return false;
                        }
                        s.session.workspaces = workspaces.clone();
                        true
                    })
                    .await;
                if !stored {
                    debug!("Discarding workspaces fetched for a previous connection");
                }
                Ok(workspaces)
            }
            Err(err) => {
                self.update(|s| {
                    if s.connection_epoch == epoch {
                        s.session.workspaces.clear();
                    }
                })
                .await;
                Err(err)
            }
        };
        self.finish(epoch, result).await
    }

    /// Searches pages (most recently edited first) and replaces the page list.
    /// Empty and untouched when not connected.
    pub async fn fetch_pages(&self, query: &str) -> Result<Vec<Page>, NotionError> {
        let Some((credential, epoch, connection)) = self
            .update(|s| {
                let credential = s.connected_credential()?;
                s.begin(true);
                Some((credential, s.page_epoch, s.connection_epoch))
            })
            .await
        else {
            return Ok(Vec::new());
        };

        let params = json!({
            "query": query,
            "filter": { "value": "page", "property": "object" },
            "sort": { "direction": "descending", "timestamp": "last_edited_time" }
        });
        let result = match self.client.search_all(&credential, params).await {
            Ok(items) => {
                let pages: Vec<Page> = items.iter().filter_map(Page::from_value).collect();
                let stored = self
                    .update(|s| {
                        if s.page_epoch != epoch {
                            return false;
                        }
                        s.session.pages = pages.clone();
                        true
                    })
                    .await;
                if stored {
                    Ok(pages)
                } else {
                    debug!("Discarding pages fetched for a previous workspace");
                    Ok(Vec::new())
                }
            }
            Err(err) => {
                self.update(|s| {
                    if s.page_epoch == epoch {
                        s.session.pages.clear();
                    }
                })
                .await;
                Err(err)
            }
        };
        self.finish(connection, result).await
    }

    /// Creates a page titled `title` under `parent_id` (or under the selected
    /// page when `None`), then refreshes the page list.
    ///
    /// Identifiers containing `-` are treated as pages, others as databases.
    pub async fn create_page(
        &self,
        title: &str,
        parent_id: Option<&str>,
        blocks: Vec<Value>,
    ) -> Result<Page, NotionError> {
        if title.trim().is_empty() {
            return self
                .reject(NotionError::validation("Page title is required."))
                .await;
        }

        let (credential, selected, epoch) = {
            let state = self.inner.lock().await;
            (
                state.connected_credential(),
                state.session.selected_page.as_ref().map(|p| p.id.clone()),
                state.connection_epoch,
            )
        };
        let parent = parent_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .or(selected);
        let Some(parent) = parent else {
            return self
                .reject(NotionError::validation("A parent page is required."))
                .await;
        };
        let Some(credential) = credential else {
            return self
                .reject(NotionError::configuration("Not connected to Notion."))
                .await;
        };

        let parent_type = if parent.contains('-') {
            "page_id"
        } else {
            "database_id"
        };
        let mut parent_ref = serde_json::Map::new();
        parent_ref.insert("type".into(), json!(parent_type));
        parent_ref.insert(parent_type.into(), json!(parent));
        let body = json!({
            "parent": parent_ref,
            "properties": {
                "title": { "title": [{ "text": { "content": title } }] }
            },
            "children": blocks,
        });

        self.update(|s| s.begin(true)).await;
        let result = self.client.create_page(&credential, body).await.and_then(|created| {
            Page::from_value(&created.data).ok_or_else(|| {
                NotionError::Api(ErrorRecord::new("Created page response had no id", 500))
            })
        });
        let page = self.finish(epoch, result).await?;
        info!("Created page '{}' ({})", page.title, page.id);

        // Full refresh rather than inserting locally.
        if let Err(err) = self.fetch_pages("").await {
            warn!("Page list refresh after create failed: {err}");
        }
        Ok(page)
    }

    /// Replaces the selected page's content with `blocks`.
    ///
    /// Existing children are deleted before the new ones are appended. If the
    /// append fails after the deletes went through, the page stays empty and
    /// `error` is set.
    pub async fn export_to_page(&self, blocks: Vec<Value>) -> Result<(), NotionError> {
        let (credential, page, epoch) = {
            let state = self.inner.lock().await;
            (
                state.connected_credential(),
                state.session.selected_page.clone(),
                state.connection_epoch,
            )
        };
        let Some(credential) = credential else {
            return self
                .reject(NotionError::configuration("Not connected to Notion."))
                .await;
        };
        let Some(page) = page else {
            return self
                .reject(NotionError::validation("Select a page to export to."))
                .await;
        };
        if blocks.is_empty() {
            return self
                .reject(NotionError::validation("Blocks are required for export."))
                .await;
        }

        info!("Exporting {} blocks to page {}", blocks.len(), page.id);
        self.update(|s| s.begin(true)).await;
        let result = self
            .client
            .replace_page_content(&credential, &page.id, blocks)
            .await
            .map(|_| ());
        self.finish(epoch, result).await
    }

    /// Fetches the page `page_id` and selects it, wherever it sits in the
    /// workspace.
    pub async fn open_page(&self, page_id: &str) -> Result<Page, NotionError> {
        let Some((credential, epoch)) = self
            .update(|s| {
                let credential = s.connected_credential()?;
                s.begin(true);
                Some((credential, s.connection_epoch))
            })
            .await
        else {
            return self
                .reject(NotionError::configuration("Not connected to Notion."))
                .await;
        };

        let result = self
            .client
            .get_page(&credential, page_id)
            .await
            .and_then(|response| {
                Page::from_value(&response.data).ok_or_else(|| {
                    NotionError::Api(ErrorRecord::new(format!("Page {page_id} not found"), 404))
                })
            });
        if let Ok(page) = &result {
            let page = page.clone();
            self.update(|s| {
                if s.connection_epoch == epoch {
                    s.session.selected_page = Some(page);
                }
            })
            .await;
        }
        self.finish(epoch, result).await
    }
}
