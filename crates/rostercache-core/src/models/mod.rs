//! Wire types and payload helpers for the remote data endpoint.
//!
//! This module contains:
//! - Task option normalization (`options`)
//! - Helpers over the aggregate init payload (`init_data`)
//! - Request bodies for task, response and member mutations

pub mod init_data;
pub mod member;
pub mod options;
pub mod task;

pub use init_data::{normalize_tasks, OPTIONS_KEYS};
pub use member::{MemberRef, NewMember};
pub use options::{normalize_options, parse_options, TaskOption};
pub use task::{NewTask, ResponseSubmission, TaskRef, TaskUpdate};
