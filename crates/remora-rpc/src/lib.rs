//! Remora RPC - exports the user service over the Remora TCP listener.
//!
//! The binary in `main.rs` is a thin CLI over [`exporter::export_user_service`]
//! and [`exporter::RunningExporter::serve_admin`].

pub mod admin;
pub mod exporter;
pub mod user_service;

pub use admin::AdminHandle;
pub use exporter::{export_user_service, ExportConfig, RunningExporter};
pub use user_service::{
    InMemoryUserService, User, UserService, UserServiceClient, UserServiceError,
};
