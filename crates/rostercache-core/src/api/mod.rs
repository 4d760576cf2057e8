//! Client side of the remote data endpoint.
//!
//! The endpoint accepts an action name plus a JSON body and answers with a
//! JSON object. `RemoteEndpoint` is the seam the facade talks to; `ApiClient`
//! is the reqwest implementation used against the real server.
//!
//! The session token travels in the body's `token` field.

pub mod client;
pub mod endpoint;
pub mod error;

pub use client::ApiClient;
pub use endpoint::{Action, RemoteEndpoint};
pub use error::ApiError;
