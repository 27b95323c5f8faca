//! Request authorization.
//!
//! After a payload has been classified and before any global middleware
//! runs, the dispatcher asks an [`Authorize`] implementation for the
//! credentials of the workspace the request comes from. The result seeds
//! the request [`Context`](crate::Context).
//!
//! Two implementations ship:
//!
//! - [`SingleTeamAuthorize`]: one static bot token for a single workspace
//! - [`InstallationAuthorize`]: looks up per-workspace installations in an
//!   [`InstallationStore`]

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use sluice_core::IncomingPayload;

use crate::error::BoxError;

// =============================================================================
// Source & Result
// =============================================================================

/// Where a request originates from, as far as authorization cares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeSource {
    /// Workspace id; `None` for organization-wide installs.
    pub team_id: Option<String>,
    /// Enterprise organization id.
    pub enterprise_id: Option<String>,
    /// Acting user.
    pub user_id: Option<String>,
    /// Channel or conversation the payload refers to.
    pub conversation_id: Option<String>,
    /// Whether the app is installed at the organization level.
    pub is_enterprise_install: bool,
}

impl AuthorizeSource {
    /// Extracts the source fields from a classified payload.
    pub fn from_payload(payload: &IncomingPayload) -> Self {
        let is_enterprise_install = payload.is_enterprise_install();
        Self {
            // Org-wide installs are keyed by enterprise only.
            team_id: if is_enterprise_install {
                None
            } else {
                payload.team_id().map(str::to_string)
            },
            enterprise_id: payload.enterprise_id().map(str::to_string),
            user_id: payload.user_id().map(str::to_string),
            conversation_id: payload.conversation_id().map(str::to_string),
            is_enterprise_install,
        }
    }
}

/// Credentials resolved for a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizeResult {
    /// Bot token for platform calls.
    pub bot_token: Option<String>,
    /// Token of the acting user, when it installed the app.
    pub user_token: Option<String>,
    /// Bot identifier of this app.
    pub bot_id: Option<String>,
    /// Bot user identifier of this app.
    pub bot_user_id: Option<String>,
    /// Workspace the credentials belong to.
    pub team_id: Option<String>,
    /// Enterprise organization the credentials belong to.
    pub enterprise_id: Option<String>,
    /// Whether the app is installed at the organization level.
    pub is_enterprise_install: bool,
}

// =============================================================================
// Authorize Trait
// =============================================================================

/// Resolves credentials for an incoming request.
///
/// Returning an error rejects the request with `401`.
#[async_trait]
pub trait Authorize: Send + Sync {
    /// Returns the credentials for `source`.
    async fn authorize(&self, source: &AuthorizeSource) -> Result<AuthorizeResult, BoxError>;
}

/// A shared, type-erased authorizer.
pub type BoxedAuthorize = Arc<dyn Authorize>;

/// Authorizes every request with one static bot token.
#[derive(Debug, Clone, Default)]
pub struct SingleTeamAuthorize {
    bot_token: Option<String>,
    bot_id: Option<String>,
    bot_user_id: Option<String>,
}

impl SingleTeamAuthorize {
    /// Creates an authorizer returning `bot_token` for every request.
    pub fn new(bot_token: Option<String>) -> Self {
        Self {
            bot_token,
            ..Default::default()
        }
    }

    /// Sets the bot identity, used to recognise the app's own messages.
    pub fn identity(mut self, bot_id: Option<String>, bot_user_id: Option<String>) -> Self {
        self.bot_id = bot_id;
        self.bot_user_id = bot_user_id;
        self
    }
}

#[async_trait]
impl Authorize for SingleTeamAuthorize {
    async fn authorize(&self, source: &AuthorizeSource) -> Result<AuthorizeResult, BoxError> {
        Ok(AuthorizeResult {
            bot_token: self.bot_token.clone(),
            user_token: None,
            bot_id: self.bot_id.clone(),
            bot_user_id: self.bot_user_id.clone(),
            team_id: source.team_id.clone(),
            enterprise_id: source.enterprise_id.clone(),
            is_enterprise_install: source.is_enterprise_install,
        })
    }
}

// =============================================================================
// Installations
// =============================================================================

/// An app installation in a workspace or organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    /// Workspace id; `None` for organization-wide installs.
    pub team_id: Option<String>,
    /// Enterprise organization id.
    pub enterprise_id: Option<String>,
    /// Whether the app is installed at the organization level.
    #[serde(default)]
    pub is_enterprise_install: bool,
    /// Bot token issued at install time.
    pub bot_token: Option<String>,
    /// Bot identifier.
    pub bot_id: Option<String>,
    /// Bot user identifier.
    pub bot_user_id: Option<String>,
    /// Id of the user who installed the app.
    pub user_id: Option<String>,
    /// Token of the installing user.
    pub user_token: Option<String>,
}

/// Key used to look up an installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InstallationQuery {
    /// Workspace id.
    pub team_id: Option<String>,
    /// Enterprise organization id.
    pub enterprise_id: Option<String>,
    /// Acting user.
    pub user_id: Option<String>,
    /// Look up the organization-wide installation.
    pub is_enterprise_install: bool,
}

impl From<&AuthorizeSource> for InstallationQuery {
    fn from(source: &AuthorizeSource) -> Self {
        Self {
            team_id: source.team_id.clone(),
            enterprise_id: source.enterprise_id.clone(),
            user_id: source.user_id.clone(),
            is_enterprise_install: source.is_enterprise_install,
        }
    }
}

/// Persistence for installations.
///
/// No implementation ships; applications back it with their own storage.
#[async_trait]
pub trait InstallationStore: Send + Sync {
    /// Fetches the installation matching `query`.
    async fn fetch(&self, query: &InstallationQuery) -> Result<Option<Installation>, BoxError>;

    /// Stores or replaces an installation.
    async fn store(&self, installation: Installation) -> Result<(), BoxError>;

    /// Deletes the installation matching `query`.
    async fn delete(&self, query: &InstallationQuery) -> Result<(), BoxError>;
}

/// Authorizes requests from installations in an [`InstallationStore`].
#[derive(Debug, Clone)]
pub struct InstallationAuthorize<S> {
    store: S,
}

impl<S: InstallationStore> InstallationAuthorize<S> {
    /// Wraps an installation store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: InstallationStore> Authorize for InstallationAuthorize<S> {
    async fn authorize(&self, source: &AuthorizeSource) -> Result<AuthorizeResult, BoxError> {
        let query = InstallationQuery::from(source);
        trace!(?query, "Fetching installation");

        let Some(installation) = self.store.fetch(&query).await? else {
            debug!(
                team_id = ?source.team_id,
                enterprise_id = ?source.enterprise_id,
                "No installation found"
            );
            return Err(format!(
                "no installation found for team {:?} / enterprise {:?}",
                source.team_id, source.enterprise_id
            )
            .into());
        };

        // A user token is only valid for the user who installed the app.
        let user_token = match (&installation.user_id, &source.user_id) {
            (Some(installer), Some(actor)) if installer == actor => installation.user_token,
            _ => None,
        };

        Ok(AuthorizeResult {
            bot_token: installation.bot_token,
            user_token,
            bot_id: installation.bot_id,
            bot_user_id: installation.bot_user_id,
            team_id: installation.team_id.or_else(|| source.team_id.clone()),
            enterprise_id: installation
                .enterprise_id
                .or_else(|| source.enterprise_id.clone()),
            is_enterprise_install: installation.is_enterprise_install,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct MemoryStore {
        installations: Mutex<Vec<Installation>>,
    }

    #[async_trait]
    impl InstallationStore for MemoryStore {
        async fn fetch(&self, query: &InstallationQuery) -> Result<Option<Installation>, BoxError> {
            Ok(self
                .installations
                .lock()
                .iter()
                .find(|i| {
                    if query.is_enterprise_install {
                        i.enterprise_id == query.enterprise_id
                    } else {
                        i.team_id == query.team_id
                    }
                })
                .cloned())
        }

        async fn store(&self, installation: Installation) -> Result<(), BoxError> {
            self.installations.lock().push(installation);
            Ok(())
        }

        async fn delete(&self, query: &InstallationQuery) -> Result<(), BoxError> {
            self.installations
                .lock()
                .retain(|i| i.team_id != query.team_id);
            Ok(())
        }
    }

    fn source(team: &str, user: &str) -> AuthorizeSource {
        AuthorizeSource {
            team_id: Some(team.into()),
            user_id: Some(user.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_source_from_payload() {
        let payload = IncomingPayload::classify(json!({
            "command": "/deploy",
            "team_id": "T1",
            "user_id": "U1",
            "channel_id": "C1"
        }))
        .unwrap();
        let source = AuthorizeSource::from_payload(&payload);
        assert_eq!(source.team_id.as_deref(), Some("T1"));
        assert_eq!(source.user_id.as_deref(), Some("U1"));
        assert_eq!(source.conversation_id.as_deref(), Some("C1"));
        assert!(!source.is_enterprise_install);
    }

    #[test]
    fn test_enterprise_install_drops_team() {
        let payload = IncomingPayload::classify(json!({
            "type": "event_callback",
            "team_id": "T1",
            "enterprise_id": "E1",
            "is_enterprise_install": true,
            "event": {"type": "app_mention", "user": "U1", "channel": "C1"}
        }))
        .unwrap();
        let source = AuthorizeSource::from_payload(&payload);
        assert_eq!(source.team_id, None);
        assert_eq!(source.enterprise_id.as_deref(), Some("E1"));
        assert_eq!(source.user_id.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn test_single_team_authorize() {
        let auth = SingleTeamAuthorize::new(Some("xoxb-1".into()))
            .identity(Some("B1".into()), Some("U0BOT".into()));
        let result = auth.authorize(&source("T1", "U1")).await.unwrap();
        assert_eq!(result.bot_token.as_deref(), Some("xoxb-1"));
        assert_eq!(result.bot_user_id.as_deref(), Some("U0BOT"));
        assert_eq!(result.team_id.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_installation_authorize() {
        let store = MemoryStore::default();
        store
            .store(Installation {
                team_id: Some("T1".into()),
                bot_token: Some("xoxb-t1".into()),
                user_id: Some("U1".into()),
                user_token: Some("xoxp-u1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let auth = InstallationAuthorize::new(store);

        let installer = auth.authorize(&source("T1", "U1")).await.unwrap();
        assert_eq!(installer.bot_token.as_deref(), Some("xoxb-t1"));
        assert_eq!(installer.user_token.as_deref(), Some("xoxp-u1"));

        let other_user = auth.authorize(&source("T1", "U2")).await.unwrap();
        assert_eq!(other_user.user_token, None);
    }

    #[tokio::test]
    async fn test_missing_installation_fails() {
        let auth = InstallationAuthorize::new(MemoryStore::default());
        assert!(auth.authorize(&source("T9", "U1")).await.is_err());
    }

    #[tokio::test]
    async fn test_deleted_installation_fails() {
        let store = MemoryStore::default();
        store
            .store(Installation {
                team_id: Some("T1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let auth = InstallationAuthorize::new(store);
        auth.store()
            .delete(&InstallationQuery::from(&source("T1", "U1")))
            .await
            .unwrap();
        assert!(auth.authorize(&source("T1", "U1")).await.is_err());
    }
}
