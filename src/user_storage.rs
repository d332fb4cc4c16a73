use crate::user_models::{normalize_email, AuthToken, User};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

const USERS_FILE: &str = "users.json";
const TOKENS_FILE: &str = "tokens.json";

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("user with this email already exists")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fields a profile update may change. `None` leaves the stored value alone.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
}

pub struct UserStorage {
    data_dir: PathBuf,
    users: RwLock<Vec<User>>,
    tokens: RwLock<Vec<AuthToken>>,
}

impl UserStorage {
    pub fn new(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        let users = load_collection(&data_dir.join(USERS_FILE))?;
        let tokens = load_collection(&data_dir.join(TOKENS_FILE))?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            users: RwLock::new(users),
            tokens: RwLock::new(tokens),
        })
    }

    /// Stores a new user. The email is normalized (domain lowercased)
    /// before the uniqueness check so "a@X.com" and "a@x.com" collide.
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: String,
    ) -> Result<User, UserStoreError> {
        let email = normalize_email(email);
        let mut users = self.users.write().await;

        if users.iter().any(|u| u.email == email) {
            return Err(UserStoreError::DuplicateEmail);
        }

        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = User::new(id, email, name.to_string(), password_hash);
        users.push(user.clone());
        self.save_users(&users)?;
        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Option<User> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        users.iter().find(|u| u.email == email).cloned()
    }

    pub async fn get_user_by_id(&self, id: u64) -> Option<User> {
        let users = self.users.read().await;
        users.iter().find(|u| u.id == id).cloned()
    }

    pub async fn update_user(&self, id: u64, changes: UserChanges) -> Result<User, UserStoreError> {
        let mut users = self.users.write().await;

        if let Some(new_email) = &changes.email {
            let new_email = normalize_email(new_email);
            if users.iter().any(|u| u.id != id && u.email == new_email) {
                return Err(UserStoreError::DuplicateEmail);
            }
        }

        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .context("User disappeared during update")?;

        if let Some(email) = changes.email {
            user.email = normalize_email(&email);
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }

        let updated = user.clone();
        self.save_users(&users)?;
        Ok(updated)
    }

    /// Removes the user and every token issued to them. The caller is
    /// responsible for cascading to owned recipe data.
    pub async fn delete_user(&self, id: u64) -> Result<bool> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        let removed = users.len() < before;
        if removed {
            self.save_users(&users)?;
            let mut tokens = self.tokens.write().await;
            tokens.retain(|t| t.user_id != id);
            self.save_tokens(&tokens)?;
        }
        Ok(removed)
    }

    pub async fn issue_token(&self, user_id: u64) -> Result<AuthToken> {
        let mut tokens = self.tokens.write().await;
        let token = AuthToken::new(user_id);
        tokens.push(token.clone());
        self.save_tokens(&tokens)?;
        Ok(token)
    }

    pub async fn get_user_by_token(&self, token: &str) -> Option<User> {
        let user_id = {
            let tokens = self.tokens.read().await;
            tokens.iter().find(|t| t.token == token)?.user_id
        };
        self.get_user_by_id(user_id).await
    }

    fn save_users(&self, users: &[User]) -> Result<()> {
        save_collection(&self.data_dir.join(USERS_FILE), users)
    }

    fn save_tokens(&self, tokens: &[AuthToken]) -> Result<()> {
        save_collection(&self.data_dir.join(TOKENS_FILE), tokens)
    }
}

pub(crate) fn load_collection<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.exists() {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))
    } else {
        Ok(Vec::new())
    }
}

pub(crate) fn save_collection<T: serde::Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let json = serde_json::to_string_pretty(items).context("Failed to serialize collection")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
