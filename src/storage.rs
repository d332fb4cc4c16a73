use crate::models::{Ingredient, Price, Recipe, Tag};
use crate::user_storage::{load_collection, save_collection};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const TAGS_FILE: &str = "tags.json";
const INGREDIENTS_FILE: &str = "ingredients.json";
const RECIPES_FILE: &str = "recipes.json";

/// Fields a recipe update may change. The outer `Option` distinguishes
/// "not supplied" from a supplied value; `link` nests another `Option`
/// so a full update can clear it.
#[derive(Debug, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<u32>,
    pub price: Option<Price>,
    pub link: Option<Option<String>>,
    pub tags: Option<Vec<u64>>,
    pub ingredients: Option<Vec<u64>>,
}

pub struct RecipeStorage {
    data_dir: PathBuf,
    tags: RwLock<Vec<Tag>>,
    ingredients: RwLock<Vec<Ingredient>>,
    recipes: RwLock<Vec<Recipe>>,
}

impl RecipeStorage {
    pub fn new(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        let tags = load_collection(&data_dir.join(TAGS_FILE))?;
        let ingredients = load_collection(&data_dir.join(INGREDIENTS_FILE))?;
        let recipes = load_collection(&data_dir.join(RECIPES_FILE))?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            tags: RwLock::new(tags),
            ingredients: RwLock::new(ingredients),
            recipes: RwLock::new(recipes),
        })
    }

    pub async fn create_tag(&self, user_id: u64, name: &str) -> Result<Tag> {
        let mut tags = self.tags.write().await;
        let id = tags.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let tag = Tag { id, name: name.to_string(), user_id };
        tags.push(tag.clone());
        self.save_tags(&tags)?;
        Ok(tag)
    }

    /// Caller's tags ordered by name descending. With `assigned_only`,
    /// restricted to tags referenced by at least one of the caller's
    /// recipes; each tag appears once regardless of how many recipes
    /// reference it.
    pub async fn list_tags(&self, user_id: u64, assigned_only: bool) -> Vec<Tag> {
        let tags = self.tags.read().await;
        let mut result: Vec<Tag> = if assigned_only {
            let recipes = self.recipes.read().await;
            tags.iter()
                .filter(|t| {
                    t.user_id == user_id
                        && recipes
                            .iter()
                            .any(|r| r.user_id == user_id && r.tags.contains(&t.id))
                })
                .cloned()
                .collect()
        } else {
            tags.iter().filter(|t| t.user_id == user_id).cloned().collect()
        };
        result.sort_by(|a, b| b.name.cmp(&a.name));
        result
    }

    /// Ids from `ids` that do not refer to a tag owned by `user_id`.
    pub async fn missing_tag_ids(&self, user_id: u64, ids: &[u64]) -> Vec<u64> {
        let tags = self.tags.read().await;
        ids.iter()
            .copied()
            .filter(|id| !tags.iter().any(|t| t.id == *id && t.user_id == user_id))
            .collect()
    }

    pub async fn create_ingredient(&self, user_id: u64, name: &str) -> Result<Ingredient> {
        let mut ingredients = self.ingredients.write().await;
        let id = ingredients.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let ingredient = Ingredient { id, name: name.to_string(), user_id };
        ingredients.push(ingredient.clone());
        self.save_ingredients(&ingredients)?;
        Ok(ingredient)
    }

    pub async fn list_ingredients(&self, user_id: u64, assigned_only: bool) -> Vec<Ingredient> {
        let ingredients = self.ingredients.read().await;
        let mut result: Vec<Ingredient> = if assigned_only {
            let recipes = self.recipes.read().await;
            ingredients
                .iter()
                .filter(|i| {
                    i.user_id == user_id
                        && recipes
                            .iter()
                            .any(|r| r.user_id == user_id && r.ingredients.contains(&i.id))
                })
                .cloned()
                .collect()
        } else {
            ingredients.iter().filter(|i| i.user_id == user_id).cloned().collect()
        };
        result.sort_by(|a, b| b.name.cmp(&a.name));
        result
    }

    pub async fn missing_ingredient_ids(&self, user_id: u64, ids: &[u64]) -> Vec<u64> {
        let ingredients = self.ingredients.read().await;
        ids.iter()
            .copied()
            .filter(|id| !ingredients.iter().any(|i| i.id == *id && i.user_id == user_id))
            .collect()
    }

    pub async fn get_tags_by_ids(&self, ids: &[u64]) -> Vec<Tag> {
        let tags = self.tags.read().await;
        ids.iter()
            .filter_map(|id| tags.iter().find(|t| t.id == *id).cloned())
            .collect()
    }

    pub async fn get_ingredients_by_ids(&self, ids: &[u64]) -> Vec<Ingredient> {
        let ingredients = self.ingredients.read().await;
        ids.iter()
            .filter_map(|id| ingredients.iter().find(|i| i.id == *id).cloned())
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_recipe(
        &self,
        user_id: u64,
        title: String,
        time_minutes: u32,
        price: Price,
        link: Option<String>,
        tags: Vec<u64>,
        ingredients: Vec<u64>,
    ) -> Result<Recipe> {
        let mut recipes = self.recipes.write().await;
        let id = recipes.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let recipe = Recipe {
            id,
            user_id,
            title,
            time_minutes,
            price,
            link,
            image: None,
            tags: dedup(tags),
            ingredients: dedup(ingredients),
        };
        recipes.push(recipe.clone());
        self.save_recipes(&recipes)?;
        Ok(recipe)
    }

    /// Caller's recipes, newest first. Non-empty `tag_ids` keeps recipes
    /// carrying at least one of the given tags; `ingredient_ids` likewise;
    /// both given means both must hold.
    pub async fn list_recipes(
        &self,
        user_id: u64,
        tag_ids: &[u64],
        ingredient_ids: &[u64],
    ) -> Vec<Recipe> {
        let recipes = self.recipes.read().await;
        let mut result: Vec<Recipe> = recipes
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| tag_ids.is_empty() || r.tags.iter().any(|t| tag_ids.contains(t)))
            .filter(|r| {
                ingredient_ids.is_empty()
                    || r.ingredients.iter().any(|i| ingredient_ids.contains(i))
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| b.id.cmp(&a.id));
        result
    }

    pub async fn get_recipe(&self, user_id: u64, id: u64) -> Option<Recipe> {
        let recipes = self.recipes.read().await;
        recipes.iter().find(|r| r.id == id && r.user_id == user_id).cloned()
    }

    /// Applies the supplied changes; a supplied tag/ingredient list
    /// replaces the association set. `None` when the recipe does not
    /// exist or belongs to someone else.
    pub async fn update_recipe(
        &self,
        user_id: u64,
        id: u64,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>> {
        let mut recipes = self.recipes.write().await;

        let Some(recipe) = recipes.iter_mut().find(|r| r.id == id && r.user_id == user_id)
        else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            recipe.title = title;
        }
        if let Some(time_minutes) = changes.time_minutes {
            recipe.time_minutes = time_minutes;
        }
        if let Some(price) = changes.price {
            recipe.price = price;
        }
        if let Some(link) = changes.link {
            recipe.link = link;
        }
        if let Some(tags) = changes.tags {
            recipe.tags = dedup(tags);
        }
        if let Some(ingredients) = changes.ingredients {
            recipe.ingredients = dedup(ingredients);
        }

        let updated = recipe.clone();
        self.save_recipes(&recipes)?;
        Ok(Some(updated))
    }

    pub async fn set_recipe_image(
        &self,
        user_id: u64,
        id: u64,
        image: String,
    ) -> Result<Option<Recipe>> {
        let mut recipes = self.recipes.write().await;

        let Some(recipe) = recipes.iter_mut().find(|r| r.id == id && r.user_id == user_id)
        else {
            return Ok(None);
        };

        recipe.image = Some(image);
        let updated = recipe.clone();
        self.save_recipes(&recipes)?;
        Ok(Some(updated))
    }

    pub async fn delete_recipe(&self, user_id: u64, id: u64) -> Result<bool> {
        let mut recipes = self.recipes.write().await;
        let before = recipes.len();
        recipes.retain(|r| !(r.id == id && r.user_id == user_id));
        let removed = recipes.len() < before;
        if removed {
            self.save_recipes(&recipes)?;
        }
        Ok(removed)
    }

    /// Cascade half of user deletion: drops every tag, ingredient, and
    /// recipe the user owns.
    pub async fn remove_owned(&self, user_id: u64) -> Result<()> {
        let mut tags = self.tags.write().await;
        tags.retain(|t| t.user_id != user_id);
        self.save_tags(&tags)?;

        let mut ingredients = self.ingredients.write().await;
        ingredients.retain(|i| i.user_id != user_id);
        self.save_ingredients(&ingredients)?;

        let mut recipes = self.recipes.write().await;
        recipes.retain(|r| r.user_id != user_id);
        self.save_recipes(&recipes)?;

        Ok(())
    }

    fn save_tags(&self, tags: &[Tag]) -> Result<()> {
        save_collection(&self.data_dir.join(TAGS_FILE), tags)
    }

    fn save_ingredients(&self, ingredients: &[Ingredient]) -> Result<()> {
        save_collection(&self.data_dir.join(INGREDIENTS_FILE), ingredients)
    }

    fn save_recipes(&self, recipes: &[Recipe]) -> Result<()> {
        save_collection(&self.data_dir.join(RECIPES_FILE), recipes)
    }
}

fn dedup(ids: Vec<u64>) -> Vec<u64> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}
