//! Public surface for application code: cached init data, session actions
//! and mutations.
//!
//! Every successful mutation invalidates the cached init data of all roles
//! before it returns, so a committed change is never hidden behind a cached
//! aggregate.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{Action, ApiClient, ApiError, RemoteEndpoint};
use crate::auth::{Role, SessionContext};
use crate::cache::RolePartitionedCache;
use crate::config::Config;
use crate::models::init_data::{
    display_name, error_message, is_data_response, is_success, role_tag, username,
};
use crate::models::{
    normalize_tasks, MemberRef, NewMember, NewTask, ResponseSubmission, TaskRef, TaskUpdate,
};
use crate::storage::{FileKeyValueStore, KeyValueStore};
use crate::utils::json::non_empty_str;

const LOAD_FAILED_MESSAGE: &str = "Failed to load init data";

#[derive(Error, Debug)]
pub enum DataError {
    /// No fresh data and no cached fallback.
    #[error("{0}")]
    LoadFailed(String),

    #[error("{0}")]
    LoginFailed(String),

    /// The server answered without a success indicator.
    #[error("{message}")]
    MutationFailed { action: Action, message: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct InitDataFacade<S, E> {
    cache: RolePartitionedCache<S>,
    endpoint: E,
}

impl InitDataFacade<Arc<FileKeyValueStore>, ApiClient> {
    /// Facade over the on-disk store and the configured remote endpoint.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(FileKeyValueStore::in_dir(&config.data_dir()?)?);
        let cache = RolePartitionedCache::new(store)
            .with_ttl(config.init_cache_ttl()?)
            .with_version(config.cache_version.clone());
        let endpoint = ApiClient::from_config(config)?;
        Ok(Self::new(cache, endpoint))
    }
}

impl<S: KeyValueStore, E: RemoteEndpoint> InitDataFacade<S, E> {
    pub fn new(cache: RolePartitionedCache<S>, endpoint: E) -> Self {
        Self { cache, endpoint }
    }

    pub fn cache(&self) -> &RolePartitionedCache<S> {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    // =========================================================================
    // Init data
    // =========================================================================

    /// Aggregate application state for the session's role.
    ///
    /// Served from cache unless `force` is set or the entry has expired. On a
    /// failed load the last cached payload for the role is returned, however
    /// old.
    pub async fn get_init_data(
        &self,
        session: &mut SessionContext,
        force: bool,
    ) -> Result<Value, DataError> {
        if !force {
            if let Some(cached) = self.cache.read(session.role) {
                return Ok(cached);
            }
        }

        let outcome = self
            .endpoint
            .call(Action::GetInitData, json!({}), session.token())
            .await;

        let server_message = match outcome {
            Ok(mut response) if is_data_response(&response) => {
                Self::apply_identity(session, &response);
                normalize_tasks(&mut response);
                self.cache.write(session.role, &response);
                debug!(role = %session.role, "Init data loaded from server");
                return Ok(response);
            }
            Ok(response) => {
                let message = error_message(&response);
                warn!(error = ?message, "Server refused init data");
                message
            }
            Err(e) => {
                warn!(error = %e, "Init data request failed");
                None
            }
        };

        if let Some(stale) = self.cache.read_stale(session.role) {
            info!(role = %session.role, "Serving cached init data after failed load");
            return Ok(stale);
        }

        Err(DataError::LoadFailed(
            server_message.unwrap_or_else(|| LOAD_FAILED_MESSAGE.to_string()),
        ))
    }

    /// Copy role and identity fields the server reported into the session.
    fn apply_identity(session: &mut SessionContext, response: &Value) {
        if let Some(tag) = role_tag(response) {
            session.apply_role_tag(tag);
        }
        if let Some(name) = username(response) {
            session.username = Some(name.to_string());
        }
        if let Some(name) = non_empty_str(response, "displayName") {
            session.display_name = Some(name.to_string());
        }
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn login(
        &self,
        session: &mut SessionContext,
        user: &str,
        password: &str,
    ) -> Result<Value, DataError> {
        let body = json!({ "username": user, "password": password });
        let response = self.endpoint.call(Action::Login, body, None).await?;

        if !is_success(&response) {
            let message = error_message(&response).unwrap_or_else(|| "login failed".to_string());
            warn!(username = user, error = %message, "Login rejected");
            return Err(DataError::LoginFailed(message));
        }

        *session = SessionContext {
            token: response
                .get("token")
                .and_then(Value::as_str)
                .map(str::to_string),
            role: role_tag(&response)
                .and_then(Role::parse)
                .unwrap_or(Role::User),
            username: Some(username(&response).unwrap_or(user).to_string()),
            display_name: display_name(&response).map(str::to_string),
        };
        info!(username = user, role = %session.role, "Logged in");

        self.cache.invalidate_all();
        Ok(response)
    }

    /// Refresh the session identity from the server.
    ///
    /// Without a token no call is made. A rejected token clears the session.
    pub async fn me(&self, session: &mut SessionContext) -> Result<Value, DataError> {
        if !session.is_logged_in() {
            return Ok(json!({ "success": false, "error": "no token" }));
        }

        let response = self
            .endpoint
            .call(Action::Me, json!({}), session.token())
            .await?;

        if is_success(&response) {
            if let Some(role) = role_tag(&response).and_then(Role::parse) {
                session.role = role;
            }
            if let Some(name) = username(&response) {
                session.username = Some(name.to_string());
            }
            if let Some(name) = display_name(&response) {
                session.display_name = Some(name.to_string());
            }
        } else {
            info!("Session rejected by server, clearing");
            session.clear();
            self.cache.invalidate_all();
        }
        Ok(response)
    }

    /// End the session locally, telling the server on a best-effort basis.
    pub async fn logout(&self, session: &mut SessionContext) {
        if let Some(token) = session.token() {
            if let Err(e) = self.endpoint.call(Action::Logout, json!({}), Some(token)).await {
                debug!(error = %e, "Remote logout failed, clearing locally anyway");
            }
        }
        session.clear();
        self.cache.invalidate_all();
        info!("Logged out");
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn add_task(&self, session: &SessionContext, task: &NewTask) -> Result<Value, DataError> {
        self.mutate(session, Action::AddTask, &task.normalized()).await
    }

    pub async fn remove_task(&self, session: &SessionContext, task: &TaskRef) -> Result<Value, DataError> {
        self.mutate(session, Action::RemoveTask, task).await
    }

    pub async fn update_task(
        &self,
        session: &SessionContext,
        update: &TaskUpdate,
    ) -> Result<Value, DataError> {
        self.mutate(session, Action::UpdateTask, &update.normalized()).await
    }

    /// `update_task` for servers that only know the legacy action name.
    pub async fn edit_task(
        &self,
        session: &SessionContext,
        update: &TaskUpdate,
    ) -> Result<Value, DataError> {
        self.mutate(session, Action::EditTask, &update.normalized()).await
    }

    pub async fn post_response(
        &self,
        session: &SessionContext,
        submission: &ResponseSubmission,
    ) -> Result<Value, DataError> {
        self.mutate(session, Action::PostResponse, submission).await
    }

    pub async fn add_member(&self, session: &SessionContext, member: &NewMember) -> Result<Value, DataError> {
        self.mutate(session, Action::AddMember, member).await
    }

    pub async fn remove_member(
        &self,
        session: &SessionContext,
        member: &MemberRef,
    ) -> Result<Value, DataError> {
        self.mutate(session, Action::RemoveMember, member).await
    }

    async fn mutate<B: Serialize>(
        &self,
        session: &SessionContext,
        action: Action,
        body: &B,
    ) -> Result<Value, DataError> {
        debug_assert!(action.is_mutation(), "{} is not a mutation", action);
        let body = serde_json::to_value(body)?;
        let response = self.endpoint.call(action, body, session.token()).await?;

        if !is_success(&response) {
            if let Some(detail) = response.get("debug") {
                warn!(action = %action, detail = %detail, "Mutation rejected");
            }
            let message = error_message(&response).unwrap_or_else(|| format!("{} failed", action));
            return Err(DataError::MutationFailed { action, message });
        }

        self.cache.invalidate_all();
        info!(action = %action, "Mutation committed");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::MemoryKeyValueStore;
    use crate::testing::{init_tracing, serve_once, FailingKeyValueStore, ScriptedEndpoint};

    type TestFacade = InitDataFacade<Arc<MemoryKeyValueStore>, Arc<ScriptedEndpoint>>;

    fn facade() -> (TestFacade, Arc<ScriptedEndpoint>, Arc<ManualClock>) {
        init_tracing();
        let clock = Arc::new(ManualClock::default());
        let cache = RolePartitionedCache::new(Arc::new(MemoryKeyValueStore::new()))
            .with_clock(clock.clone() as Arc<dyn Clock>);
        let endpoint = Arc::new(ScriptedEndpoint::new());
        (InitDataFacade::new(cache, endpoint.clone()), endpoint, clock)
    }

    fn user_session() -> SessionContext {
        SessionContext {
            token: Some("tok-user".to_string()),
            role: Role::User,
            username: Some("avi".to_string()),
            display_name: None,
        }
    }

    fn init_payload(role: &str) -> Value {
        json!({
            "success": true,
            "role": role,
            "tasks": [{"id": 1, "אפשרויות": "Yes,No"}],
            "members": ["Avi", "Noa"],
        })
    }

    #[tokio::test]
    async fn test_cached_until_mutation() {
        let (facade, endpoint, clock) = facade();
        let mut session = user_session();

        endpoint.push_reply(init_payload("user"));
        let first = facade.get_init_data(&mut session, false).await.unwrap();
        assert_eq!(endpoint.call_count(), 1);
        assert_eq!(endpoint.calls()[0].credential.as_deref(), Some("tok-user"));

        clock.advance(Duration::seconds(119));
        let second = facade.get_init_data(&mut session, false).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(endpoint.call_count(), 1);

        endpoint.push_reply(json!({"success": true}));
        let submission = ResponseSubmission {
            task: "Guard".to_string(),
            date: "2025-09-01".to_string(),
            status: "yes".to_string(),
            member: "Avi".to_string(),
            ..ResponseSubmission::default()
        };
        facade.post_response(&session, &submission).await.unwrap();
        assert_eq!(facade.cache().read(Role::User), None);

        endpoint.push_reply(init_payload("user"));
        facade.get_init_data(&mut session, false).await.unwrap();
        assert_eq!(endpoint.call_count(), 3);
        assert_eq!(endpoint.calls()[2].action, Action::GetInitData);
    }

    #[tokio::test]
    async fn test_payload_is_normalized_and_cached_under_response_role() {
        let (facade, endpoint, _clock) = facade();
        let mut session = SessionContext {
            token: Some("tok-admin".to_string()),
            ..SessionContext::guest()
        };

        endpoint.push_reply(json!({
            "success": true,
            "role": "admin",
            "displayName": "Dana",
            "tasks": [{"id": 1, "אפשרויות": ["A"]}],
            "responses": []
        }));
        let data = facade.get_init_data(&mut session, false).await.unwrap();

        assert_eq!(
            data["tasks"][0]["אפשרויות"],
            json!(r#"[{"text":"A","requireNote":false}]"#)
        );
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.display_name.as_deref(), Some("Dana"));
        assert_eq!(facade.cache().read(Role::Admin), Some(data));
        assert_eq!(facade.cache().read(Role::Guest), None);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let (facade, endpoint, _clock) = facade();
        let mut session = user_session();
        facade.cache().write(Role::User, &json!({"tasks": []}));

        endpoint.push_reply(init_payload("user"));
        let data = facade.get_init_data(&mut session, true).await.unwrap();
        assert_eq!(endpoint.call_count(), 1);
        assert_eq!(data["members"], json!(["Avi", "Noa"]));
    }

    #[tokio::test]
    async fn test_failed_load_falls_back_to_stale_cache() {
        let (facade, endpoint, clock) = facade();
        let mut session = user_session();
        let stale = json!({"success": true, "tasks": [], "members": ["old"]});
        facade.cache().write(Role::User, &stale);
        clock.advance(Duration::minutes(30));

        endpoint.push_error(ApiError::Timeout);
        assert_eq!(facade.get_init_data(&mut session, false).await.unwrap(), stale);

        endpoint.push_reply(json!({"error": "Invalid token"}));
        assert_eq!(facade.get_init_data(&mut session, false).await.unwrap(), stale);
    }

    #[tokio::test]
    async fn test_failed_load_without_cache_is_an_error() {
        let (facade, endpoint, _clock) = facade();
        let mut session = user_session();

        endpoint.push_reply(json!({"success": false, "error": "DB down"}));
        let err = facade.get_init_data(&mut session, false).await.unwrap_err();
        assert!(matches!(err, DataError::LoadFailed(ref m) if m == "DB down"));

        endpoint.push_error(ApiError::Network("offline".to_string()));
        let err = facade.get_init_data(&mut session, false).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to load init data");
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_break_loading() {
        init_tracing();
        let endpoint = Arc::new(ScriptedEndpoint::new());
        let facade = InitDataFacade::new(RolePartitionedCache::new(FailingKeyValueStore), endpoint.clone());
        let mut session = user_session();

        endpoint.push_reply(init_payload("user"));
        endpoint.push_reply(init_payload("user"));
        assert!(facade.get_init_data(&mut session, false).await.is_ok());
        assert!(facade.get_init_data(&mut session, false).await.is_ok());
        assert_eq!(endpoint.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mutation_failure_keeps_cache_and_surfaces_message() {
        let (facade, endpoint, _clock) = facade();
        let session = user_session();
        facade.cache().write(Role::User, &json!({"tasks": []}));

        endpoint.push_reply(json!({"success": false, "error": "Missing task/date", "debug": {"task": null}}));
        let err = facade
            .remove_task(&session, &TaskRef::new("", "", None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::MutationFailed { action: Action::RemoveTask, ref message } if message == "Missing task/date"
        ));
        assert!(facade.cache().read(Role::User).is_some());

        endpoint.push_reply(json!({}));
        let err = facade
            .add_member(&session, &NewMember::new("lior", "Lior"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "addMember failed");

        endpoint.push_error(ApiError::Timeout);
        let err = facade.remove_member(&session, &MemberRef::new("lior")).await.unwrap_err();
        assert!(matches!(err, DataError::Api(ApiError::Timeout)));
    }

    #[tokio::test]
    async fn test_rejection_over_http_keeps_server_message() {
        init_tracing();
        let base = serve_once("400 Bad Request", r#"{"success":false,"error":"Missing fields"}"#);
        let endpoint = ApiClient::new(&base, std::time::Duration::from_secs(5)).unwrap();
        let facade = InitDataFacade::new(RolePartitionedCache::new(MemoryKeyValueStore::new()), endpoint);
        facade.cache().write(Role::User, &json!({"tasks": []}));

        let err = facade
            .post_response(&user_session(), &ResponseSubmission::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DataError::MutationFailed { action: Action::PostResponse, ref message } if message == "Missing fields"
        ));
        assert!(facade.cache().read(Role::User).is_some());
    }

    #[tokio::test]
    async fn test_rejected_load_over_http_keeps_server_message() {
        let base = serve_once("401 Unauthorized", r#"{"error":"Invalid token"}"#);
        let endpoint = ApiClient::new(&base, std::time::Duration::from_secs(5)).unwrap();
        let facade = InitDataFacade::new(RolePartitionedCache::new(MemoryKeyValueStore::new()), endpoint);
        let mut session = user_session();

        let err = facade.get_init_data(&mut session, false).await.unwrap_err();
        assert!(matches!(err, DataError::LoadFailed(ref m) if m == "Invalid token"));
    }

    #[tokio::test]
    async fn test_every_mutation_invalidates_all_roles() {
        let (facade, endpoint, _clock) = facade();
        let session = user_session();
        let update = TaskUpdate {
            old_task: "Guard".to_string(),
            old_date: "2025-09-01".to_string(),
            ..TaskUpdate::default()
        };

        for step in 0..7 {
            for role in Role::ALL {
                facade.cache().write(role, &json!({"role": role.as_str()}));
            }
            endpoint.push_reply(json!({"success": true}));
            let result = match step {
                0 => facade.add_task(&session, &NewTask::new("Guard", "2025-09-01")).await,
                1 => facade.remove_task(&session, &TaskRef::new("Guard", "2025-09-01", None)).await,
                2 => facade.update_task(&session, &update).await,
                3 => facade.edit_task(&session, &update).await,
                4 => facade.post_response(&session, &ResponseSubmission::default()).await,
                5 => facade.add_member(&session, &NewMember::new("lior", "Lior")).await,
                _ => facade.remove_member(&session, &MemberRef::new("lior")).await,
            };
            assert!(result.is_ok());
            for role in Role::ALL {
                assert_eq!(facade.cache().read(role), None, "step {} left {} cached", step, role);
            }
        }

        let actions: Vec<Action> = endpoint.calls().iter().map(|c| c.action).collect();
        assert_eq!(
            actions,
            vec![
                Action::AddTask,
                Action::RemoveTask,
                Action::UpdateTask,
                Action::EditTask,
                Action::PostResponse,
                Action::AddMember,
                Action::RemoveMember
            ]
        );
        assert!(endpoint.calls().iter().all(|c| c.credential.as_deref() == Some("tok-user")));
    }

    #[tokio::test]
    async fn test_add_task_sends_canonical_options() {
        let (facade, endpoint, _clock) = facade();
        endpoint.push_reply(json!({"success": true}));

        let task = NewTask::new("Cleanup", "2025-09-02").with_options(json!("Yes, No"));
        facade.add_task(&SessionContext::guest(), &task).await.unwrap();

        let call = &endpoint.calls()[0];
        assert_eq!(call.credential, None);
        assert_eq!(
            call.body["options"],
            json!(r#"[{"text":"Yes","requireNote":false},{"text":"No","requireNote":false}]"#)
        );
    }

    #[tokio::test]
    async fn test_login_sets_session_and_invalidates() {
        let (facade, endpoint, _clock) = facade();
        let mut session = SessionContext::guest();
        facade.cache().write(Role::Guest, &json!({"tasks": []}));

        endpoint.push_reply(json!({
            "success": true,
            "token": "jwt",
            "role": "admin",
            "displayName": "Dana K"
        }));
        facade.login(&mut session, "dana", "pw").await.unwrap();

        assert_eq!(session.token(), Some("jwt"));
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.username.as_deref(), Some("dana"));
        assert_eq!(session.display_name.as_deref(), Some("Dana K"));
        assert_eq!(endpoint.calls()[0].credential, None);
        assert_eq!(facade.cache().read(Role::Guest), None);
    }

    #[tokio::test]
    async fn test_login_defaults_role_to_user() {
        let (facade, endpoint, _clock) = facade();
        let mut session = SessionContext::guest();

        endpoint.push_reply(json!({"success": true, "token": "jwt", "fullName": "Avi B"}));
        facade.login(&mut session, "avi", "pw").await.unwrap();
        assert_eq!(session.role, Role::User);
        assert_eq!(session.display_name.as_deref(), Some("Avi B"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let (facade, endpoint, _clock) = facade();
        let mut session = SessionContext::guest();

        endpoint.push_reply(json!({"success": false, "error": "Invalid password"}));
        let err = facade.login(&mut session, "dana", "bad").await.unwrap_err();
        assert!(matches!(err, DataError::LoginFailed(ref m) if m == "Invalid password"));
        assert_eq!(session, SessionContext::guest());
    }

    #[tokio::test]
    async fn test_me_without_token_makes_no_call() {
        let (facade, endpoint, _clock) = facade();
        let mut session = SessionContext::guest();

        let response = facade.me(&mut session).await.unwrap();
        assert_eq!(response, json!({"success": false, "error": "no token"}));
        assert_eq!(endpoint.call_count(), 0);
    }

    #[tokio::test]
    async fn test_me_rejected_clears_session() {
        let (facade, endpoint, _clock) = facade();
        let mut session = user_session();
        facade.cache().write(Role::User, &json!({"tasks": []}));

        endpoint.push_reply(json!({"success": false, "error": "Invalid token"}));
        facade.me(&mut session).await.unwrap();
        assert_eq!(session, SessionContext::guest());
        assert_eq!(facade.cache().read(Role::User), None);
    }

    #[tokio::test]
    async fn test_me_refreshes_identity() {
        let (facade, endpoint, _clock) = facade();
        let mut session = user_session();

        endpoint.push_reply(json!({"success": true, "role": "admin", "username": "avi", "displayName": "Avi B"}));
        facade.me(&mut session).await.unwrap();
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.display_name.as_deref(), Some("Avi B"));
        assert_eq!(session.token(), Some("tok-user"));
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_unreachable() {
        let (facade, endpoint, _clock) = facade();
        let mut session = user_session();
        for role in Role::ALL {
            facade.cache().write(role, &json!({"tasks": []}));
        }

        endpoint.push_error(ApiError::Network("offline".to_string()));
        facade.logout(&mut session).await;

        assert_eq!(session, SessionContext::guest());
        for role in Role::ALL {
            assert_eq!(facade.cache().read(role), None);
        }
        assert_eq!(endpoint.calls()[0].action, Action::Logout);
        assert_eq!(endpoint.calls()[0].credential.as_deref(), Some("tok-user"));
    }
}
