//! The user service: contract, in-memory implementation and remote proxy.
//!
//! Remote method names keep the exported camelCase names (`findById`,
//! `findAll`, `create`, `deleteById`); the Rust trait uses snake_case.

use async_trait::async_trait;
use remora_core::{
    MethodSignature, RemoteClient, RemotingError, ServiceBinding, ServiceDescriptor,
    ServiceError, ValueType,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

pub const FIND_BY_ID: &str = "findById";
pub const FIND_ALL: &str = "findAll";
pub const CREATE: &str = "create";
pub const DELETE_BY_ID: &str = "deleteById";

pub const CONTRACT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error("User not found: {id}")]
    NotFound { id: i64 },

    #[error("Invalid user: {message}")]
    InvalidUser { message: String },

    #[error(transparent)]
    Remote(#[from] RemotingError),
}

impl From<UserServiceError> for ServiceError {
    fn from(err: UserServiceError) -> Self {
        match &err {
            UserServiceError::NotFound { id } => ServiceError::new(err.to_string())
                .with_data(json!({ "error": "not_found", "id": id })),
            UserServiceError::InvalidUser { message } => ServiceError::new(err.to_string())
                .with_data(json!({ "error": "invalid_user", "message": message })),
            UserServiceError::Remote(_) => ServiceError::new(err.to_string()),
        }
    }
}

impl UserServiceError {
    /// Recover the service error carried by an application failure.
    fn from_remote(err: RemotingError) -> Self {
        if let RemotingError::Application {
            data: Some(data), ..
        } = &err
        {
            match data.get("error").and_then(|v| v.as_str()) {
                Some("not_found") => {
                    if let Some(id) = data.get("id").and_then(|v| v.as_i64()) {
                        return UserServiceError::NotFound { id };
                    }
                }
                Some("invalid_user") => {
                    let message = data
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    return UserServiceError::InvalidUser { message };
                }
                _ => {}
            }
        }
        UserServiceError::Remote(err)
    }
}

pub type UserResult<T> = std::result::Result<T, UserServiceError>;

/// User lookup and creation operations.
#[async_trait]
pub trait UserService: Send + Sync {
    async fn find_by_id(&self, id: i64) -> UserResult<User>;

    /// All users ordered by id.
    async fn find_all(&self) -> UserResult<Vec<User>>;

    async fn create(&self, name: String, email: String) -> UserResult<User>;

    /// Whether a user was removed.
    async fn delete_by_id(&self, id: i64) -> UserResult<bool>;
}

/// Users kept in memory; ids are assigned sequentially from 1.
#[derive(Debug, Default)]
pub struct InMemoryUserService {
    state: RwLock<UserTable>,
}

#[derive(Debug, Default)]
struct UserTable {
    users: BTreeMap<i64, User>,
    last_id: i64,
}

impl InMemoryUserService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given users. Later ids continue after the largest one.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users: BTreeMap<i64, User> = users.into_iter().map(|u| (u.id, u)).collect();
        let last_id = users.keys().next_back().copied().unwrap_or(0);
        Self {
            state: RwLock::new(UserTable { users, last_id }),
        }
    }
}

fn validate(name: &str, email: &str) -> UserResult<()> {
    if name.trim().is_empty() {
        return Err(UserServiceError::InvalidUser {
            message: "name must not be empty".to_string(),
        });
    }
    if !email.contains('@') {
        return Err(UserServiceError::InvalidUser {
            message: format!("email {:?} is not an address", email),
        });
    }
    Ok(())
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn find_by_id(&self, id: i64) -> UserResult<User> {
        self.state
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(UserServiceError::NotFound { id })
    }

    async fn find_all(&self) -> UserResult<Vec<User>> {
        Ok(self.state.read().await.users.values().cloned().collect())
    }

    async fn create(&self, name: String, email: String) -> UserResult<User> {
        validate(&name, &email)?;

        let mut state = self.state.write().await;
        state.last_id += 1;
        let user = User {
            id: state.last_id,
            name,
            email,
        };
        state.users.insert(user.id, user.clone());
        debug!("Created user {} ({})", user.id, user.email);
        Ok(user)
    }

    async fn delete_by_id(&self, id: i64) -> UserResult<bool> {
        Ok(self.state.write().await.users.remove(&id).is_some())
    }
}

/// Contract exported under `service_name`.
pub fn user_service_descriptor(service_name: &str) -> remora_core::Result<ServiceDescriptor> {
    let user = || ValueType::object("User");

    ServiceDescriptor::builder(service_name)
        .version(CONTRACT_VERSION)
        .method(
            MethodSignature::new(FIND_BY_ID)
                .param("id", ValueType::Int)
                .returns(user()),
        )
        .method(MethodSignature::new(FIND_ALL).returns(ValueType::list(user())))
        .method(
            MethodSignature::new(CREATE)
                .param("name", ValueType::String)
                .param("email", ValueType::String)
                .returns(user()),
        )
        .method(
            MethodSignature::new(DELETE_BY_ID)
                .param("id", ValueType::Int)
                .returns(ValueType::Bool),
        )
        .build()
}

/// Method table for any `UserService` implementation.
pub fn user_service_binding<S: UserService + 'static>(service: Arc<S>) -> ServiceBinding {
    ServiceBinding::builder(service)
        .method(FIND_BY_ID, |svc: Arc<S>, (id,): (i64,)| async move {
            svc.find_by_id(id).await.map_err(ServiceError::from)
        })
        .method(FIND_ALL, |svc: Arc<S>, (): ()| async move {
            svc.find_all().await.map_err(ServiceError::from)
        })
        .method(
            CREATE,
            |svc: Arc<S>, (name, email): (String, String)| async move {
                svc.create(name, email).await.map_err(ServiceError::from)
            },
        )
        .method(DELETE_BY_ID, |svc: Arc<S>, (id,): (i64,)| async move {
            svc.delete_by_id(id).await.map_err(ServiceError::from)
        })
        .build()
}

/// Caller-side proxy: the same trait, served by a remote exporter.
pub struct UserServiceClient {
    client: RemoteClient,
    service_name: String,
}

impl UserServiceClient {
    pub fn new(client: RemoteClient, service_name: impl Into<String>) -> Self {
        Self {
            client,
            service_name: service_name.into(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<serde_json::Value>,
    ) -> UserResult<T> {
        self.client
            .call_as(&self.service_name, method, args)
            .await
            .map_err(UserServiceError::from_remote)
    }
}

#[async_trait]
impl UserService for UserServiceClient {
    async fn find_by_id(&self, id: i64) -> UserResult<User> {
        self.call(FIND_BY_ID, vec![json!(id)]).await
    }

    async fn find_all(&self) -> UserResult<Vec<User>> {
        self.call(FIND_ALL, vec![]).await
    }

    async fn create(&self, name: String, email: String) -> UserResult<User> {
        self.call(CREATE, vec![json!(name), json!(email)]).await
    }

    async fn delete_by_id(&self, id: i64) -> UserResult<bool> {
        self.call(DELETE_BY_ID, vec![json!(id)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> User {
        User {
            id: 42,
            name: "Ada".into(),
            email: "ada@example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_find_seeded_user() {
        let service = InMemoryUserService::with_users([ada()]);
        assert_eq!(service.find_by_id(42).await.unwrap(), ada());
        assert!(matches!(
            service.find_by_id(1).await,
            Err(UserServiceError::NotFound { id: 1 })
        ));
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids_after_seed() {
        let service = InMemoryUserService::with_users([ada()]);
        let grace = service
            .create("Grace".into(), "grace@example.com".into())
            .await
            .unwrap();
        let linus = service
            .create("Linus".into(), "linus@example.com".into())
            .await
            .unwrap();

        assert_eq!(grace.id, 43);
        assert_eq!(linus.id, 44);
        let ids: Vec<i64> = service.find_all().await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![42, 43, 44]);
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let service = InMemoryUserService::new();
        assert!(matches!(
            service.create(" ".into(), "x@example.com".into()).await,
            Err(UserServiceError::InvalidUser { .. })
        ));
        assert!(matches!(
            service.create("Bob".into(), "bob".into()).await,
            Err(UserServiceError::InvalidUser { .. })
        ));
        assert!(service.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let service = InMemoryUserService::with_users([ada()]);
        assert!(service.delete_by_id(42).await.unwrap());
        assert!(!service.delete_by_id(42).await.unwrap());
    }

    #[test]
    fn test_descriptor_matches_binding() {
        let descriptor = user_service_descriptor("userService").unwrap();
        let binding = user_service_binding(Arc::new(InMemoryUserService::new()));

        assert_eq!(descriptor.name(), "userService");
        assert_eq!(descriptor.version(), CONTRACT_VERSION);
        for method in descriptor.methods() {
            assert!(binding.handles(&method.name), "missing {}", method.name);
        }
        assert_eq!(binding.method_names().len(), descriptor.methods().len());
    }

    #[test]
    fn test_not_found_survives_the_wire() {
        let failure: ServiceError = UserServiceError::NotFound { id: 7 }.into();
        let remote = RemotingError::from(failure);
        assert!(matches!(
            UserServiceError::from_remote(remote),
            UserServiceError::NotFound { id: 7 }
        ));
    }
}
