use crate::auth::CurrentUser;
use crate::error::{ApiError, FieldErrors, JsonBody};
use crate::models::{
    NamedItemResponse, NameRequest, Recipe, RecipeDetail, RecipeImageResponse, RecipeListItem,
    RecipeRequest,
};
use crate::storage::RecipeChanges;
use crate::AppState;
use anyhow::Context;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::fs;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AttrListQuery {
    pub assigned_only: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecipeListQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

fn parse_assigned_only(query: &AttrListQuery) -> Result<bool, ApiError> {
    match query.assigned_only.as_deref() {
        None | Some("0") => Ok(false),
        Some("1") => Ok(true),
        Some(_) => Err(ApiError::field("assigned_only", "Must be 0 or 1.")),
    }
}

/// Parses a `tags=1,2,3` style parameter into ids.
fn parse_id_list(field: &str, raw: &Option<String>) -> Result<Vec<u64>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map_err(|_| {
                ApiError::field(field, "Enter a comma-separated list of integer ids.")
            })
        })
        .collect()
}

fn require_name(payload: &NameRequest) -> Result<&str, ApiError> {
    match payload.name.as_deref() {
        Some(name) if !name.trim().is_empty() => Ok(name),
        Some(_) => Err(ApiError::field("name", "This field may not be blank.")),
        None => Err(ApiError::missing_field("name")),
    }
}

pub async fn list_tags(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttrListQuery>,
) -> Result<Json<Vec<NamedItemResponse>>, ApiError> {
    let assigned_only = parse_assigned_only(&query)?;
    let tags = state.recipes.list_tags(user.id, assigned_only).await;
    Ok(Json(tags.iter().map(NamedItemResponse::from).collect()))
}

pub async fn create_tag(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<NameRequest>,
) -> Result<(StatusCode, Json<NamedItemResponse>), ApiError> {
    let name = require_name(&payload)?;
    let tag = state.recipes.create_tag(user.id, name).await?;
    Ok((StatusCode::CREATED, Json(NamedItemResponse::from(&tag))))
}

pub async fn list_ingredients(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AttrListQuery>,
) -> Result<Json<Vec<NamedItemResponse>>, ApiError> {
    let assigned_only = parse_assigned_only(&query)?;
    let ingredients = state.recipes.list_ingredients(user.id, assigned_only).await;
    Ok(Json(ingredients.iter().map(NamedItemResponse::from).collect()))
}

pub async fn create_ingredient(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<NameRequest>,
) -> Result<(StatusCode, Json<NamedItemResponse>), ApiError> {
    let name = require_name(&payload)?;
    let ingredient = state.recipes.create_ingredient(user.id, name).await?;
    Ok((StatusCode::CREATED, Json(NamedItemResponse::from(&ingredient))))
}

/// Rejects tag/ingredient ids that do not exist or belong to someone else.
async fn check_associations(
    state: &AppState,
    user_id: u64,
    payload: &RecipeRequest,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();

    if let Some(tags) = &payload.tags {
        for id in state.recipes.missing_tag_ids(user_id, tags).await {
            errors
                .entry("tags".to_string())
                .or_default()
                .push(format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }
    if let Some(ingredients) = &payload.ingredients {
        for id in state.recipes.missing_ingredient_ids(user_id, ingredients).await {
            errors
                .entry("ingredients".to_string())
                .or_default()
                .push(format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn require_recipe_fields(payload: &RecipeRequest) -> Result<(String, u32), ApiError> {
    let mut errors = FieldErrors::new();

    let title = match payload.title.as_deref() {
        Some(t) if !t.trim().is_empty() => Some(t.to_string()),
        Some(_) => {
            errors
                .entry("title".to_string())
                .or_default()
                .push("This field may not be blank.".to_string());
            None
        }
        None => {
            errors
                .entry("title".to_string())
                .or_default()
                .push("This field is required.".to_string());
            None
        }
    };
    if payload.time_minutes.is_none() {
        errors
            .entry("time_minutes".to_string())
            .or_default()
            .push("This field is required.".to_string());
    }
    if payload.price.is_none() {
        errors
            .entry("price".to_string())
            .or_default()
            .push("This field is required.".to_string());
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok((title.unwrap(), payload.time_minutes.unwrap()))
}

async fn to_detail(state: &AppState, recipe: &Recipe) -> RecipeDetail {
    let tags = state.recipes.get_tags_by_ids(&recipe.tags).await;
    let ingredients = state.recipes.get_ingredients_by_ids(&recipe.ingredients).await;
    RecipeDetail {
        id: recipe.id,
        title: recipe.title.clone(),
        time_minutes: recipe.time_minutes,
        price: recipe.price,
        link: recipe.link.clone(),
        image: recipe.image.clone(),
        tags: tags.iter().map(NamedItemResponse::from).collect(),
        ingredients: ingredients.iter().map(NamedItemResponse::from).collect(),
    }
}

pub async fn list_recipes(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecipeListQuery>,
) -> Result<Json<Vec<RecipeListItem>>, ApiError> {
    let tag_ids = parse_id_list("tags", &query.tags)?;
    let ingredient_ids = parse_id_list("ingredients", &query.ingredients)?;

    let recipes = state.recipes.list_recipes(user.id, &tag_ids, &ingredient_ids).await;
    Ok(Json(recipes.iter().map(Recipe::to_list_item).collect()))
}

pub async fn create_recipe(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<RecipeRequest>,
) -> Result<(StatusCode, Json<RecipeListItem>), ApiError> {
    let (title, time_minutes) = require_recipe_fields(&payload)?;
    check_associations(&state, user.id, &payload).await?;

    let recipe = state
        .recipes
        .create_recipe(
            user.id,
            title,
            time_minutes,
            payload.price.unwrap(),
            payload.link,
            payload.tags.unwrap_or_default(),
            payload.ingredients.unwrap_or_default(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(recipe.to_list_item())))
}

pub async fn get_recipe(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let recipe = state.recipes.get_recipe(user.id, id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(to_detail(&state, &recipe).await))
}

pub async fn put_recipe(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    JsonBody(payload): JsonBody<RecipeRequest>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let (title, time_minutes) = require_recipe_fields(&payload)?;
    check_associations(&state, user.id, &payload).await?;

    // full update: unsupplied optional fields reset
    let changes = RecipeChanges {
        title: Some(title),
        time_minutes: Some(time_minutes),
        price: payload.price,
        link: Some(payload.link),
        tags: Some(payload.tags.unwrap_or_default()),
        ingredients: Some(payload.ingredients.unwrap_or_default()),
    };

    let recipe = state
        .recipes
        .update_recipe(user.id, id, changes)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(to_detail(&state, &recipe).await))
}

pub async fn patch_recipe(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    JsonBody(payload): JsonBody<RecipeRequest>,
) -> Result<Json<RecipeDetail>, ApiError> {
    if let Some(title) = payload.title.as_deref() {
        if title.trim().is_empty() {
            return Err(ApiError::field("title", "This field may not be blank."));
        }
    }
    check_associations(&state, user.id, &payload).await?;

    let changes = RecipeChanges {
        title: payload.title,
        time_minutes: payload.time_minutes,
        price: payload.price,
        link: payload.link.map(Some),
        tags: payload.tags,
        ingredients: payload.ingredients,
    };

    let recipe = state
        .recipes
        .update_recipe(user.id, id, changes)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(to_detail(&state, &recipe).await))
}

pub async fn delete_recipe(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    if state.recipes.delete_recipe(user.id, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn upload_image(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    mut multipart: Multipart,
) -> Result<Json<RecipeImageResponse>, ApiError> {
    // 404 before reading the body so a foreign id never gets that far
    state.recipes.get_recipe(user.id, id).await.ok_or(ApiError::NotFound)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::field("image", "Invalid multipart payload."))?
    {
        if field.name() != Some("image") {
            continue;
        }

        // client filenames are untrusted; only an alphanumeric extension
        // may make it into the stored path
        let ext = field
            .file_name()
            .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "jpg".to_string());

        let data = field
            .bytes()
            .await
            .map_err(|_| ApiError::field("image", "Invalid multipart payload."))?;

        if image::load_from_memory(&data).is_err() {
            return Err(ApiError::field(
                "image",
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
            ));
        }

        let relative = format!("uploads/recipe/{}.{}", Uuid::new_v4(), ext);
        let path = state.data_dir.join(&relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create upload directory")?;
        }
        fs::write(&path, &data).context("Failed to store uploaded image")?;

        let recipe = state
            .recipes
            .set_recipe_image(user.id, id, relative)
            .await?
            .ok_or(ApiError::NotFound)?;

        tracing::info!(recipe_id = recipe.id, "image uploaded");

        return Ok(Json(RecipeImageResponse {
            id: recipe.id,
            image: recipe.image.unwrap_or_default(),
        }));
    }

    Err(ApiError::missing_field("image"))
}
