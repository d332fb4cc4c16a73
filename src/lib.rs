pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod recipe_api;
pub mod storage;
pub mod user_api;
pub mod user_models;
pub mod user_storage;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::RecipeStorage;
use tower_http::cors::CorsLayer;
use user_storage::UserStorage;

pub struct AppState {
    pub users: UserStorage,
    pub recipes: RecipeStorage,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(data_dir: &Path) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            users: UserStorage::new(data_dir)?,
            recipes: RecipeStorage::new(data_dir)?,
            data_dir: data_dir.to_path_buf(),
        }))
    }

    /// Deletes an account and cascades to everything it owns: tokens,
    /// tags, ingredients, and recipes.
    pub async fn delete_account(&self, user_id: u64) -> anyhow::Result<bool> {
        let removed = self.users.delete_user(user_id).await?;
        if removed {
            self.recipes.remove_owned(user_id).await?;
        }
        Ok(removed)
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/user/create", post(user_api::create_user))
        .route("/api/user/token", post(user_api::create_token))
        .route(
            "/api/user/me",
            get(user_api::get_profile)
                .put(user_api::update_profile)
                .patch(user_api::patch_profile),
        )
        .route(
            "/api/recipe/tags",
            get(recipe_api::list_tags).post(recipe_api::create_tag),
        )
        .route(
            "/api/recipe/ingredients",
            get(recipe_api::list_ingredients).post(recipe_api::create_ingredient),
        )
        .route(
            "/api/recipe/recipes",
            get(recipe_api::list_recipes).post(recipe_api::create_recipe),
        )
        .route(
            "/api/recipe/recipes/:id",
            get(recipe_api::get_recipe)
                .put(recipe_api::put_recipe)
                .patch(recipe_api::patch_recipe)
                .delete(recipe_api::delete_recipe),
        )
        .route(
            "/api/recipe/recipes/:id/upload-image",
            post(recipe_api::upload_image),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
