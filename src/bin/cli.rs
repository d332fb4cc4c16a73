use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SESSION_FILE: &str = ".session";

fn api_url() -> String {
    std::env::var("RECIPE_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

#[derive(Parser)]
#[command(name = "recipe")]
#[command(about = "A CLI client for the recipe API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new account")]
    Register {
        #[arg(short, long, help = "Email address")]
        email: String,

        #[arg(short, long, help = "Password (at least 5 characters)")]
        password: String,

        #[arg(short, long, help = "Display name")]
        name: String,
    },

    #[command(about = "Log in and store the API token")]
    Login {
        #[arg(short, long, help = "Email address")]
        email: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "Forget the stored API token")]
    Logout,

    #[command(about = "Show the logged-in profile")]
    Whoami,

    #[command(about = "Update the logged-in profile")]
    UpdateMe {
        #[arg(short, long, help = "New email address")]
        email: Option<String>,

        #[arg(short, long, help = "New display name")]
        name: Option<String>,

        #[arg(short, long, help = "New password")]
        password: Option<String>,
    },

    #[command(about = "List your tags")]
    Tags {
        #[arg(long, help = "Only tags assigned to at least one recipe")]
        assigned_only: bool,
    },

    #[command(about = "Create a tag")]
    TagCreate {
        #[arg(short, long, help = "Tag name")]
        name: String,
    },

    #[command(about = "List your ingredients")]
    Ingredients {
        #[arg(long, help = "Only ingredients assigned to at least one recipe")]
        assigned_only: bool,
    },

    #[command(about = "Create an ingredient")]
    IngredientCreate {
        #[arg(short, long, help = "Ingredient name")]
        name: String,
    },

    #[command(about = "List your recipes")]
    Recipes {
        #[arg(long, help = "Filter by tag ids (comma-separated)")]
        tags: Option<String>,

        #[arg(long, help = "Filter by ingredient ids (comma-separated)")]
        ingredients: Option<String>,
    },

    #[command(about = "Create a recipe")]
    RecipeCreate {
        #[arg(short, long, help = "Recipe title")]
        title: String,

        #[arg(short = 'm', long, help = "Cooking time in minutes")]
        time_minutes: u32,

        #[arg(short, long, help = "Price, e.g. 5.00")]
        price: String,

        #[arg(short, long, help = "Optional link")]
        link: Option<String>,

        #[arg(long, help = "Tag ids to attach (comma-separated)")]
        tags: Option<String>,

        #[arg(long, help = "Ingredient ids to attach (comma-separated)")]
        ingredients: Option<String>,
    },

    #[command(about = "Show one recipe in detail")]
    RecipeShow {
        #[arg(short, long, help = "Recipe id")]
        id: u64,
    },

    #[command(about = "Delete a recipe")]
    RecipeDelete {
        #[arg(short, long, help = "Recipe id")]
        id: u64,
    },

    #[command(about = "Upload an image for a recipe")]
    UploadImage {
        #[arg(short, long, help = "Recipe id")]
        id: u64,

        #[arg(short, long, help = "Path to the image file")]
        file: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    token: String,
    email: String,
}

impl Session {
    fn save(&self) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(SESSION_FILE, json)?;
        Ok(())
    }

    fn load() -> Option<Self> {
        if Path::new(SESSION_FILE).exists() {
            let data = fs::read_to_string(SESSION_FILE).ok()?;
            serde_json::from_str(&data).ok()
        } else {
            None
        }
    }

    fn clear() -> Result<()> {
        if Path::new(SESSION_FILE).exists() {
            fs::remove_file(SESSION_FILE)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    email: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct NamedItem {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecipeListItem {
    id: u64,
    title: String,
    time_minutes: u32,
    price: String,
    link: Option<String>,
    tags: Vec<u64>,
    ingredients: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct RecipeDetail {
    id: u64,
    title: String,
    time_minutes: u32,
    price: String,
    link: Option<String>,
    image: Option<String>,
    tags: Vec<NamedItem>,
    ingredients: Vec<NamedItem>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    id: u64,
    image: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(cli.command).await {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Register { email, password, name } => register(email, password, name).await,
        Commands::Login { email, password } => login(email, password).await,
        Commands::Logout => logout(),
        Commands::Whoami => whoami().await,
        Commands::UpdateMe { email, name, password } => update_me(email, name, password).await,
        Commands::Tags { assigned_only } => list_named("tags", assigned_only).await,
        Commands::TagCreate { name } => create_named("tags", name).await,
        Commands::Ingredients { assigned_only } => list_named("ingredients", assigned_only).await,
        Commands::IngredientCreate { name } => create_named("ingredients", name).await,
        Commands::Recipes { tags, ingredients } => list_recipes(tags, ingredients).await,
        Commands::RecipeCreate { title, time_minutes, price, link, tags, ingredients } => {
            create_recipe(title, time_minutes, price, link, tags, ingredients).await
        }
        Commands::RecipeShow { id } => show_recipe(id).await,
        Commands::RecipeDelete { id } => delete_recipe(id).await,
        Commands::UploadImage { id, file } => upload_image(id, file).await,
    }
}

fn require_login() -> Result<Session> {
    Session::load().ok_or_else(|| {
        anyhow::anyhow!("You must be logged in. Use: recipe login -e <email> -p <password>")
    })
}

async fn fail_with_body(response: reqwest::Response, what: &str) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::anyhow!("Failed to {} ({}): {}", what, status, body)
}

async fn register(email: String, password: String, name: String) -> Result<()> {
    let client = reqwest::Client::new();
    let payload = serde_json::json!({ "email": email, "password": password, "name": name });

    let response = client
        .post(format!("{}/api/user/create", api_url()))
        .json(&payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "register").await);
    }

    let profile: Profile = response.json().await?;
    println!("✅ Account created successfully!");
    println!("📧 Email: {}", profile.email);
    println!("👤 Name: {}", profile.name);
    println!("\n💡 Log in with: recipe login -e {} -p <password>", profile.email);
    Ok(())
}

async fn login(email: String, password: String) -> Result<()> {
    let client = reqwest::Client::new();
    let payload = serde_json::json!({ "email": email, "password": password });

    let response = client
        .post(format!("{}/api/user/token", api_url()))
        .json(&payload)
        .send()
        .await?;

    if !response.status().is_success() {
        bail!("Invalid email or password");
    }

    let token: TokenResponse = response.json().await?;
    Session { token: token.token, email: email.clone() }.save()?;

    println!("✅ Login successful!");
    println!("👤 Welcome back, {}!", email);
    Ok(())
}

fn logout() -> Result<()> {
    Session::clear()?;
    println!("✅ Logged out successfully!");
    Ok(())
}

async fn whoami() -> Result<()> {
    let session = require_login()?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/user/me", api_url()))
        .bearer_auth(&session.token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "fetch profile").await);
    }

    let profile: Profile = response.json().await?;
    println!("👤 Logged in as: {}", profile.name);
    println!("📧 Email: {}", profile.email);
    Ok(())
}

async fn update_me(email: Option<String>, name: Option<String>, password: Option<String>) -> Result<()> {
    if email.is_none() && name.is_none() && password.is_none() {
        bail!("Nothing to update. Pass --email, --name, or --password.");
    }

    let session = require_login()?;
    let client = reqwest::Client::new();

    let mut payload = serde_json::Map::new();
    if let Some(email) = email {
        payload.insert("email".to_string(), email.into());
    }
    if let Some(name) = name {
        payload.insert("name".to_string(), name.into());
    }
    if let Some(password) = password {
        payload.insert("password".to_string(), password.into());
    }

    let response = client
        .patch(format!("{}/api/user/me", api_url()))
        .bearer_auth(&session.token)
        .json(&payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "update profile").await);
    }

    let profile: Profile = response.json().await?;
    println!("✅ Profile updated!");
    println!("👤 Name: {}", profile.name);
    println!("📧 Email: {}", profile.email);
    Ok(())
}

async fn list_named(resource: &str, assigned_only: bool) -> Result<()> {
    let session = require_login()?;
    let client = reqwest::Client::new();

    let mut request = client
        .get(format!("{}/api/recipe/{}", api_url(), resource))
        .bearer_auth(&session.token);
    if assigned_only {
        request = request.query(&[("assigned_only", "1")]);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(fail_with_body(response, "fetch list").await);
    }

    let items: Vec<NamedItem> = response.json().await?;
    if items.is_empty() {
        println!("📭 No {} found.", resource);
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(Row::new(vec![Cell::new("ID"), Cell::new("Name")]));
    for item in items {
        table.add_row(Row::new(vec![
            Cell::new(&item.id.to_string()),
            Cell::new(&item.name),
        ]));
    }
    table.printstd();
    Ok(())
}

async fn create_named(resource: &str, name: String) -> Result<()> {
    let session = require_login()?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/recipe/{}", api_url(), resource))
        .bearer_auth(&session.token)
        .json(&serde_json::json!({ "name": name }))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "create").await);
    }

    let item: NamedItem = response.json().await?;
    println!("✅ Created {} '{}' (id {})", resource.trim_end_matches('s'), item.name, item.id);
    Ok(())
}

async fn list_recipes(tags: Option<String>, ingredients: Option<String>) -> Result<()> {
    let session = require_login()?;
    let client = reqwest::Client::new();

    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(tags) = tags {
        query.push(("tags", tags));
    }
    if let Some(ingredients) = ingredients {
        query.push(("ingredients", ingredients));
    }

    let response = client
        .get(format!("{}/api/recipe/recipes", api_url()))
        .bearer_auth(&session.token)
        .query(&query)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "fetch recipes").await);
    }

    let recipes: Vec<RecipeListItem> = response.json().await?;
    if recipes.is_empty() {
        println!("📭 No recipes found.");
        println!("💡 Use 'recipe recipe-create' to add one");
        return Ok(());
    }

    println!("\n🍲 Your recipes ({})\n", recipes.len());

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Title"),
        Cell::new("Minutes"),
        Cell::new("Price"),
        Cell::new("Tags"),
        Cell::new("Ingredients"),
        Cell::new("Link"),
    ]));

    for recipe in recipes {
        let tags = join_ids(&recipe.tags);
        let ingredients = join_ids(&recipe.ingredients);
        table.add_row(Row::new(vec![
            Cell::new(&recipe.id.to_string()),
            Cell::new(&recipe.title),
            Cell::new(&recipe.time_minutes.to_string()),
            Cell::new(&recipe.price),
            Cell::new(&tags),
            Cell::new(&ingredients),
            Cell::new(recipe.link.as_deref().unwrap_or("-")),
        ]));
    }
    table.printstd();
    println!();
    Ok(())
}

fn join_ids(ids: &[u64]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
    }
}

fn parse_ids(raw: Option<String>) -> Result<Vec<u64>> {
    let Some(raw) = raw else { return Ok(Vec::new()) };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().context("Ids must be comma-separated integers"))
        .collect()
}

async fn create_recipe(
    title: String,
    time_minutes: u32,
    price: String,
    link: Option<String>,
    tags: Option<String>,
    ingredients: Option<String>,
) -> Result<()> {
    let session = require_login()?;
    let client = reqwest::Client::new();

    let payload = serde_json::json!({
        "title": title,
        "time_minutes": time_minutes,
        "price": price,
        "link": link,
        "tags": parse_ids(tags)?,
        "ingredients": parse_ids(ingredients)?,
    });

    let response = client
        .post(format!("{}/api/recipe/recipes", api_url()))
        .bearer_auth(&session.token)
        .json(&payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "create recipe").await);
    }

    let recipe: RecipeListItem = response.json().await?;
    println!("✅ Recipe created successfully!");
    println!("🍲 Title: {}", recipe.title);
    println!("🆔 ID: {}", recipe.id);
    println!("⏱️  Time: {} minutes", recipe.time_minutes);
    println!("💰 Price: {}", recipe.price);
    Ok(())
}

async fn show_recipe(id: u64) -> Result<()> {
    let session = require_login()?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/recipe/recipes/{}", api_url(), id))
        .bearer_auth(&session.token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "fetch recipe").await);
    }

    let recipe: RecipeDetail = response.json().await?;
    println!("🍲 {} (id {})", recipe.title, recipe.id);
    println!("⏱️  Time: {} minutes", recipe.time_minutes);
    println!("💰 Price: {}", recipe.price);
    if let Some(link) = &recipe.link {
        println!("🔗 Link: {}", link);
    }
    if let Some(image) = &recipe.image {
        println!("🖼️  Image: {}", image);
    }
    if !recipe.tags.is_empty() {
        let names: Vec<&str> = recipe.tags.iter().map(|t| t.name.as_str()).collect();
        println!("🏷️  Tags: {}", names.join(", "));
    }
    if !recipe.ingredients.is_empty() {
        let names: Vec<&str> = recipe.ingredients.iter().map(|i| i.name.as_str()).collect();
        println!("🧂 Ingredients: {}", names.join(", "));
    }
    Ok(())
}

async fn delete_recipe(id: u64) -> Result<()> {
    let session = require_login()?;
    let client = reqwest::Client::new();

    let response = client
        .delete(format!("{}/api/recipe/recipes/{}", api_url(), id))
        .bearer_auth(&session.token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "delete recipe").await);
    }

    println!("✅ Recipe {} deleted", id);
    Ok(())
}

async fn upload_image(id: u64, file: String) -> Result<()> {
    let session = require_login()?;

    if !Path::new(&file).exists() {
        bail!("File not found: {}", file);
    }

    let filename = Path::new(&file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image.jpg")
        .to_string();
    let data = fs::read(&file).context("Failed to read image file")?;

    let part = reqwest::multipart::Part::bytes(data).file_name(filename);
    let form = reqwest::multipart::Form::new().part("image", part);

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/recipe/recipes/{}/upload-image", api_url(), id))
        .bearer_auth(&session.token)
        .multipart(form)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(fail_with_body(response, "upload image").await);
    }

    let result: ImageResponse = response.json().await?;
    println!("✅ Image uploaded!");
    println!("🆔 Recipe: {}", result.id);
    println!("🖼️  Stored at: {}", result.image);
    Ok(())
}
