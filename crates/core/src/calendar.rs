//! Reminder Execution Against the Calendar Service
//!
//! Executing an `Action` takes two dependent calls: the caller's directory of
//! known people is fetched once to resolve recipient forenames to identities,
//! then the resolved reminder is persisted. Both calls are authorized with the
//! bearer token the client supplied when it connected.

use crate::model::{Action, RecipientRef, ResolvedAction};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("cannot get the users id: {0}")]
    Directory(String),
    #[error("cannot save the reminder: {0}")]
    Save(String),
}

/// A person known to the calling user.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Contact {
    #[serde(alias = "displayName")]
    pub forename: String,
    pub id: serde_json::Value,
}

/// Lists the people a user can address reminders to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    async fn contacts(&self, token: &str) -> Result<Vec<Contact>, ExecuteError>;
}

/// Persists resolved reminders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn save(&self, token: &str, reminder: &ResolvedAction) -> Result<(), ExecuteError>;
}

/// Executes an extracted action on behalf of the connected user.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, token: &str, action: Action) -> Result<ResolvedAction, ExecuteError>;
}

/// Maps each forename to the first contact with the same name, ignoring case.
/// Names without a match resolve to an empty reference.
pub fn resolve_recipients(names: &[String], contacts: &[Contact]) -> Vec<RecipientRef> {
    names
        .iter()
        .map(|name| {
            let id = contacts
                .iter()
                .find(|c| c.forename.to_lowercase() == name.to_lowercase())
                .map(|c| c.id.clone());
            RecipientRef { id }
        })
        .collect()
}

/// The two-step resolve-then-save pipeline over any directory and store.
pub struct ReminderExecutor<D, R> {
    directory: D,
    store: R,
}

impl<D, R> ReminderExecutor<D, R> {
    pub fn new(directory: D, store: R) -> Self {
        Self { directory, store }
    }
}

#[async_trait]
impl<D, R> ActionExecutor for ReminderExecutor<D, R>
where
    D: Directory,
    R: ReminderStore,
{
    async fn execute(&self, token: &str, action: Action) -> Result<ResolvedAction, ExecuteError> {
        let contacts = self.directory.contacts(token).await?;
        let resolved = ResolvedAction {
            recipients: resolve_recipients(&action.recipients, &contacts),
            action: action.action,
            due: action.due,
        };
        debug!(?resolved, "recipients resolved");

        self.store.save(token, &resolved).await?;
        info!("reminder saved");
        Ok(resolved)
    }
}

/// HTTP client for the calendar service's directory and reminder endpoints.
#[derive(Clone)]
pub struct CueClient {
    client: reqwest::Client,
    base_url: String,
}

impl CueClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/json;charset=UTF-8",
            )
            .bearer_auth(token)
    }
}

#[async_trait]
impl Directory for CueClient {
    async fn contacts(&self, token: &str) -> Result<Vec<Contact>, ExecuteError> {
        let response = self
            .request(reqwest::Method::GET, "/api/v2/users/myself/relations", token)
            .send()
            .await
            .map_err(|e| ExecuteError::Directory(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecuteError::Directory(format!("status {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| ExecuteError::Directory(e.to_string()))
    }
}

#[async_trait]
impl ReminderStore for CueClient {
    async fn save(&self, token: &str, reminder: &ResolvedAction) -> Result<(), ExecuteError> {
        let response = self
            .request(reqwest::Method::POST, "/api/v2/reminders", token)
            .json(reminder)
            .send()
            .await
            .map_err(|e| ExecuteError::Save(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecuteError::Save(format!("status {status}")));
        }
        Ok(())
    }
}
