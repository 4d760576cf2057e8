use std::fmt;

use futures::future::BoxFuture;
use serde_json::Value;

use super::ApiError;

/// Actions understood by the remote data endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Login,
    Me,
    Logout,
    GetInitData,
    AddTask,
    RemoveTask,
    UpdateTask,
    /// Older servers only know this name for `UpdateTask`
    EditTask,
    PostResponse,
    AddMember,
    RemoveMember,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Me => "me",
            Action::Logout => "logout",
            Action::GetInitData => "getInitData",
            Action::AddTask => "addTask",
            Action::RemoveTask => "removeTask",
            Action::UpdateTask => "updateTask",
            Action::EditTask => "editTask",
            Action::PostResponse => "postResponse",
            Action::AddMember => "addMember",
            Action::RemoveMember => "removeMember",
        }
    }

    /// Actions that change server data and therefore invalidate cached init data.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Action::AddTask
                | Action::RemoveTask
                | Action::UpdateTask
                | Action::EditTask
                | Action::PostResponse
                | Action::AddMember
                | Action::RemoveMember
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `call(action, body, credential) -> JSON`.
///
/// Implementations attach `credential` when present and never interpret it.
/// A response with an `error` field is still `Ok`; only transport-level
/// failures are `Err`.
pub trait RemoteEndpoint: Send + Sync {
    fn call<'a>(
        &'a self,
        action: Action,
        body: Value,
        credential: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ApiError>>;
}

impl<T: RemoteEndpoint + ?Sized> RemoteEndpoint for std::sync::Arc<T> {
    fn call<'a>(
        &'a self,
        action: Action,
        body: Value,
        credential: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        (**self).call(action, body, credential)
    }
}
