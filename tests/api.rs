use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use recipe_api::{app, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApi {
    _dir: TempDir,
    state: std::sync::Arc<AppState>,
    router: Router,
}

impl TestApi {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(dir.path()).unwrap();
        Self { _dir: dir, state: state.clone(), router: app(state) }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, email: &str, password: &str, name: &str) -> Value {
        let (status, body) = self
            .request(
                "POST",
                "/api/user/create",
                None,
                Some(json!({ "email": email, "password": password, "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/user/token",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn user(&self, email: &str) -> String {
        self.register(email, "password123", "Test User").await;
        self.login(email, "password123").await
    }

    async fn create_named(&self, token: &str, resource: &str, name: &str) -> u64 {
        let (status, body) = self
            .request(
                "POST",
                &format!("/api/recipe/{resource}"),
                Some(token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create {resource} failed: {body}");
        body["id"].as_u64().unwrap()
    }

    async fn create_recipe(&self, token: &str, payload: Value) -> u64 {
        let (status, body) = self
            .request("POST", "/api/recipe/recipes", Some(token), Some(payload))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create recipe failed: {body}");
        body["id"].as_u64().unwrap()
    }
}

fn recipe_payload(title: &str) -> Value {
    json!({ "title": title, "time_minutes": 30, "price": "5.00" })
}

// --- user API ---

#[tokio::test]
async fn register_then_login_returns_token() {
    let api = TestApi::new();
    let body = api.register("test@example.com", "password123", "Test name").await;
    assert_eq!(body["email"], "test@example.com");
    assert_eq!(body["name"], "Test name");
    assert!(body.get("password").is_none());
    assert!(body.get("password_hash").is_none());

    let token = api.login("test@example.com", "password123").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn register_normalizes_email_domain() {
    let api = TestApi::new();
    let body = api.register("test@exAMPLe.com", "password123", "Test name").await;
    assert_eq!(body["email"], "test@example.com");

    // token endpoint sees the same normalization
    let token = api.login("test@EXAMPLE.com", "password123").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn register_duplicate_email_fails() {
    let api = TestApi::new();
    api.register("test@example.com", "password123", "First").await;

    let (status, body) = api
        .request(
            "POST",
            "/api/user/create",
            None,
            Some(json!({ "email": "test@example.com", "password": "password123", "name": "Second" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"][0].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn register_validates_fields() {
    let api = TestApi::new();

    let (status, body) = api
        .request(
            "POST",
            "/api/user/create",
            None,
            Some(json!({ "email": "test@example.com", "password": "pw", "name": "Test" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["password"][0].as_str().unwrap().contains("at least 5"));

    let (status, body) = api
        .request(
            "POST",
            "/api/user/create",
            None,
            Some(json!({ "email": "not-an-email", "password": "password123", "name": "Test" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["email"][0], "Enter a valid email address.");

    let (status, body) = api
        .request("POST", "/api/user/create", None, Some(json!({ "email": "a@b.com" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["password"][0], "This field is required.");
    assert_eq!(body["name"][0], "This field is required.");

    // short password must not have created the account
    let (status, _) = api
        .request(
            "POST",
            "/api/user/token",
            None,
            Some(json!({ "email": "test@example.com", "password": "pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_rejects_bad_and_missing_credentials() {
    let api = TestApi::new();
    api.register("test@example.com", "password123", "Test").await;

    let (status, body) = api
        .request(
            "POST",
            "/api/user/token",
            None,
            Some(json!({ "email": "test@example.com", "password": "wrongpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["non_field_errors"][0].as_str().unwrap().contains("Unable to authenticate"));

    let (status, _) = api
        .request(
            "POST",
            "/api/user/token",
            None,
            Some(json!({ "email": "missing@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = api
        .request("POST", "/api/user/token", None, Some(json!({ "email": "test@example.com" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["password"][0], "This field is required.");
}

#[tokio::test]
async fn profile_requires_token_and_rejects_post() {
    let api = TestApi::new();

    let (status, _) = api.request("GET", "/api/user/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = api.request("GET", "/api/user/me", Some("bogus-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = api
        .request("POST", "/api/user/me", None, Some(json!({ "name": "X" })))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn profile_roundtrip_and_password_change() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;

    let (status, body) = api.request("GET", "/api/user/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "email": "test@example.com", "name": "Test User" }));

    let (status, body) = api
        .request(
            "PATCH",
            "/api/user/me",
            Some(&token),
            Some(json!({ "name": "New Name", "password": "newpassword" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "New Name");
    assert!(body.get("password").is_none());

    // old password no longer works, new one does
    let (status, _) = api
        .request(
            "POST",
            "/api/user/token",
            None,
            Some(json!({ "email": "test@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    api.login("test@example.com", "newpassword").await;
}

#[tokio::test]
async fn profile_put_requires_email_and_name() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;

    let (status, body) = api
        .request("PUT", "/api/user/me", Some(&token), Some(json!({ "name": "Only Name" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["email"][0], "This field is required.");

    let (status, body) = api
        .request(
            "PUT",
            "/api/user/me",
            Some(&token),
            Some(json!({ "email": "renamed@example.com", "name": "Renamed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "email": "renamed@example.com", "name": "Renamed" }));
}

// --- tags & ingredients ---

#[tokio::test]
async fn tags_require_authentication() {
    let api = TestApi::new();
    let (status, _) = api.request("GET", "/api/recipe/tags", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = api
        .request("POST", "/api/recipe/tags", None, Some(json!({ "name": "Vegan" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tags_listed_by_name_descending() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    api.create_named(&token, "tags", "Dessert").await;
    api.create_named(&token, "tags", "Vegan").await;

    let (status, body) = api.request("GET", "/api/recipe/tags", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> =
        body.as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Vegan", "Dessert"]);
}

#[tokio::test]
async fn tags_limited_to_owner_even_with_same_name() {
    let api = TestApi::new();
    let token_a = api.user("a@example.com").await;
    let token_b = api.user("b@example.com").await;

    api.create_named(&token_a, "tags", "Vegan").await;
    api.create_named(&token_b, "tags", "Vegan").await;

    let (_, body) = api.request("GET", "/api/recipe/tags", Some(&token_a), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn tag_create_rejects_blank_name() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;

    let (status, body) = api
        .request("POST", "/api/recipe/tags", Some(&token), Some(json!({ "name": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["name"][0], "This field may not be blank.");

    let (status, _) = api
        .request("POST", "/api/recipe/tags", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assigned_only_tags_are_restricted_and_unique() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let breakfast = api.create_named(&token, "tags", "breakfast").await;
    api.create_named(&token, "tags", "lunch").await;

    // two recipes referencing the same tag must not duplicate it
    let mut payload = recipe_payload("pancakes");
    payload["tags"] = json!([breakfast]);
    api.create_recipe(&token, payload).await;
    let mut payload = recipe_payload("jam on toast");
    payload["tags"] = json!([breakfast]);
    api.create_recipe(&token, payload).await;

    let (status, body) = api
        .request("GET", "/api/recipe/tags?assigned_only=1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"].as_u64().unwrap(), breakfast);

    let (status, _) = api
        .request("GET", "/api/recipe/tags?assigned_only=2", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assigned_only_ingredients_are_restricted() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let tofu = api.create_named(&token, "ingredients", "tofu").await;
    api.create_named(&token, "ingredients", "salt").await;

    let mut payload = recipe_payload("tofu curry");
    payload["ingredients"] = json!([tofu]);
    api.create_recipe(&token, payload).await;

    let (status, body) = api
        .request("GET", "/api/recipe/ingredients?assigned_only=1", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "tofu");
}

// --- recipes ---

#[tokio::test]
async fn recipes_limited_to_owner() {
    let api = TestApi::new();
    let token_a = api.user("a@example.com").await;
    let token_b = api.user("b@example.com").await;

    let mine = api.create_recipe(&token_a, recipe_payload("mine")).await;
    api.create_recipe(&token_b, recipe_payload("theirs")).await;

    let (status, body) = api.request("GET", "/api/recipe/recipes", Some(&token_a), None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"].as_u64().unwrap(), mine);

    // direct retrieval of a foreign recipe is absence, not forbidden
    let (status, _) = api
        .request("GET", &format!("/api/recipe/recipes/{mine}"), Some(&token_b), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recipe_create_validates_required_fields() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;

    let (status, body) = api
        .request("POST", "/api/recipe/recipes", Some(&token), Some(json!({ "title": "No price" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["price"][0], "This field is required.");
    assert_eq!(body["time_minutes"][0], "This field is required.");
}

#[tokio::test]
async fn recipe_create_rejects_malformed_price_with_field_error() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;

    // over-precise price is a 400 field error, not a bare 422
    let (status, body) = api
        .request(
            "POST",
            "/api/recipe/recipes",
            Some(&token),
            Some(json!({ "title": "Fudge", "time_minutes": 30, "price": "5.255" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["price"][0].as_str().unwrap().contains("2 decimal places"));

    // absurdly large prices must fail validation, numeric or string form
    let (status, body) = api
        .request(
            "POST",
            "/api/recipe/recipes",
            Some(&token),
            Some(json!({ "title": "Fudge", "time_minutes": 30, "price": 9223372036854775807i64 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["price"][0].as_str().unwrap().contains("5 digits"));

    let (status, body) = api
        .request(
            "POST",
            "/api/recipe/recipes",
            Some(&token),
            Some(json!({ "title": "Fudge", "time_minutes": 30, "price": "9223372036854775807" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["price"][0].as_str().unwrap().contains("5 digits"));

    // wrong field type surfaces the same way
    let (status, body) = api
        .request(
            "POST",
            "/api/recipe/recipes",
            Some(&token),
            Some(json!({ "title": "Fudge", "time_minutes": "abc", "price": "5.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("time_minutes").is_some());
}

#[tokio::test]
async fn recipe_create_rejects_foreign_tag_ids() {
    let api = TestApi::new();
    let token_a = api.user("a@example.com").await;
    let token_b = api.user("b@example.com").await;
    let foreign = api.create_named(&token_b, "tags", "not yours").await;

    let mut payload = recipe_payload("sneaky");
    payload["tags"] = json!([foreign]);
    let (status, body) = api
        .request("POST", "/api/recipe/recipes", Some(&token_a), Some(payload))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["tags"][0].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn recipe_detail_nests_tags_and_ingredients() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let tag = api.create_named(&token, "tags", "Dessert").await;
    let ingredient = api.create_named(&token, "ingredients", "Sugar").await;

    let mut payload = recipe_payload("Cheese cake");
    payload["tags"] = json!([tag]);
    payload["ingredients"] = json!([ingredient]);
    payload["link"] = json!("https://example.com/cake");
    let id = api.create_recipe(&token, payload).await;

    // list representation carries bare ids
    let (_, list) = api.request("GET", "/api/recipe/recipes", Some(&token), None).await;
    assert_eq!(list[0]["tags"], json!([tag]));
    assert_eq!(list[0]["price"], "5.00");

    // detail representation nests full objects
    let (status, detail) = api
        .request("GET", &format!("/api/recipe/recipes/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["tags"], json!([{ "id": tag, "name": "Dessert" }]));
    assert_eq!(detail["ingredients"], json!([{ "id": ingredient, "name": "Sugar" }]));
    assert_eq!(detail["link"], "https://example.com/cake");
    assert_eq!(detail["time_minutes"], 30);
}

#[tokio::test]
async fn recipe_filtering_by_tags_and_ingredients() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let vegan = api.create_named(&token, "tags", "vegan").await;
    let dessert = api.create_named(&token, "tags", "dessert").await;
    let tofu = api.create_named(&token, "ingredients", "tofu").await;

    let mut curry = recipe_payload("curry");
    curry["tags"] = json!([vegan]);
    curry["ingredients"] = json!([tofu]);
    let curry_id = api.create_recipe(&token, curry).await;

    let mut cake = recipe_payload("cake");
    cake["tags"] = json!([dessert]);
    let cake_id = api.create_recipe(&token, cake).await;

    api.create_recipe(&token, recipe_payload("plain stew")).await;

    // OR within the tag id list
    let (status, body) = api
        .request(
            "GET",
            &format!("/api/recipe/recipes?tags={vegan},{dessert}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<u64> =
        body.as_array().unwrap().iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![cake_id, curry_id]); // newest first

    // AND across the two filter kinds
    let (_, body) = api
        .request(
            "GET",
            &format!("/api/recipe/recipes?tags={vegan},{dessert}&ingredients={tofu}"),
            Some(&token),
            None,
        )
        .await;
    let ids: Vec<u64> =
        body.as_array().unwrap().iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![curry_id]);

    let (status, _) = api
        .request("GET", "/api/recipe/recipes?tags=abc", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recipe_patch_replaces_tag_set() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let old_tag = api.create_named(&token, "tags", "old").await;
    let new_tag = api.create_named(&token, "tags", "new").await;

    let mut payload = recipe_payload("dish");
    payload["tags"] = json!([old_tag]);
    let id = api.create_recipe(&token, payload).await;

    let (status, body) = api
        .request(
            "PATCH",
            &format!("/api/recipe/recipes/{id}"),
            Some(&token),
            Some(json!({ "title": "New title", "tags": [new_tag] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "New title");
    assert_eq!(body["tags"], json!([{ "id": new_tag, "name": "new" }]));
    // untouched fields survive a partial update
    assert_eq!(body["time_minutes"], 30);
    assert_eq!(body["price"], "5.00");
}

#[tokio::test]
async fn recipe_put_is_a_full_update() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let tag = api.create_named(&token, "tags", "kept out").await;

    let mut payload = recipe_payload("dish");
    payload["tags"] = json!([tag]);
    payload["link"] = json!("https://example.com");
    let id = api.create_recipe(&token, payload).await;

    // PUT without tags/link clears both
    let (status, body) = api
        .request(
            "PUT",
            &format!("/api/recipe/recipes/{id}"),
            Some(&token),
            Some(json!({ "title": "Replaced", "time_minutes": 5, "price": "1.50" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Replaced");
    assert_eq!(body["price"], "1.50");
    assert_eq!(body["tags"], json!([]));
    assert_eq!(body["link"], Value::Null);

    // PUT missing required fields is a 400
    let (status, _) = api
        .request(
            "PUT",
            &format!("/api/recipe/recipes/{id}"),
            Some(&token),
            Some(json!({ "title": "No price" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recipe_delete() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let id = api.create_recipe(&token, recipe_payload("doomed")).await;

    let (status, _) = api
        .request("DELETE", &format!("/api/recipe/recipes/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = api
        .request("GET", &format!("/api/recipe/recipes/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_account_cascades_to_owned_records() {
    let api = TestApi::new();
    let token_a = api.user("a@example.com").await;
    let token_b = api.user("b@example.com").await;
    api.create_named(&token_a, "tags", "mine").await;
    api.create_named(&token_a, "ingredients", "salt").await;
    api.create_recipe(&token_a, recipe_payload("mine")).await;
    let kept = api.create_recipe(&token_b, recipe_payload("theirs")).await;

    let user_a = api.state.users.get_user_by_email("a@example.com").await.unwrap();
    assert!(api.state.delete_account(user_a.id).await.unwrap());

    // the token is revoked and everything owned is gone
    let (status, _) = api.request("GET", "/api/user/me", Some(&token_a), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(api.state.recipes.list_tags(user_a.id, false).await.is_empty());
    assert!(api.state.recipes.list_ingredients(user_a.id, false).await.is_empty());
    assert!(api.state.recipes.list_recipes(user_a.id, &[], &[]).await.is_empty());

    // the other account is untouched
    let (_, body) = api.request("GET", "/api/recipe/recipes", Some(&token_b), None).await;
    assert_eq!(body[0]["id"].as_u64().unwrap(), kept);
}

// --- image upload ---

fn jpeg_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(10, 10));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

fn multipart_body(boundary: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn upload(api: &TestApi, token: &str, id: u64, filename: &str, data: &[u8]) -> (StatusCode, Value) {
    let boundary = "testboundary";
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/recipe/recipes/{id}/upload-image"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(multipart_body(boundary, filename, data)))
        .unwrap();

    let response = api.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn upload_image_stores_and_references_file() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let id = api.create_recipe(&token, recipe_payload("photogenic")).await;

    let (status, body) = upload(&api, &token, id, "photo.jpg", &jpeg_bytes()).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {body}");
    assert_eq!(body["id"].as_u64().unwrap(), id);
    let image = body["image"].as_str().unwrap();
    assert!(image.starts_with("uploads/recipe/"));
    assert!(image.ends_with(".jpg"));

    // stored on disk and visible on the detail view
    assert!(api._dir.path().join(image).exists());
    let (_, detail) = api
        .request("GET", &format!("/api/recipe/recipes/{id}"), Some(&token), None)
        .await;
    assert_eq!(detail["image"].as_str().unwrap(), image);
}

#[tokio::test]
async fn upload_rejects_non_image_payload() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let id = api.create_recipe(&token, recipe_payload("plain")).await;

    let (status, body) = upload(&api, &token, id, "notimage.jpg", b"just some text").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["image"][0].as_str().unwrap().contains("valid image"));
}

#[tokio::test]
async fn upload_sanitizes_filename_extension() {
    let api = TestApi::new();
    let token = api.user("test@example.com").await;
    let id = api.create_recipe(&token, recipe_payload("tricky")).await;

    // a path-shaped extension must not make it into the stored location
    let (status, body) = upload(&api, &token, id, "photo./etc/passwd", &jpeg_bytes()).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {body}");
    let image = body["image"].as_str().unwrap();
    assert!(image.starts_with("uploads/recipe/"));
    assert!(image.ends_with(".jpg"));
    assert_eq!(image.matches('/').count(), 2);
    assert!(api._dir.path().join(image).exists());

    // a filename with no extension falls back the same way
    let (status, body) = upload(&api, &token, id, "photo", &jpeg_bytes()).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {body}");
    assert!(body["image"].as_str().unwrap().ends_with(".jpg"));
}

#[tokio::test]
async fn upload_to_foreign_recipe_is_not_found() {
    let api = TestApi::new();
    let token_a = api.user("a@example.com").await;
    let token_b = api.user("b@example.com").await;
    let id = api.create_recipe(&token_a, recipe_payload("private")).await;

    let (status, _) = upload(&api, &token_b, id, "photo.jpg", &jpeg_bytes()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
