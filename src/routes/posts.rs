use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::accounts::AccountRepository;
use crate::error::{AppError, AppResult};
use crate::extractors::Json;
use crate::posts::{NewPost, PostRepository};
use crate::routes::require;
use crate::social::SocialGraphRepository;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-post", post(create_post))
        .route("/get-post", post(get_post))
        .route("/delete-post/{post_id}", delete(delete_post))
        .route("/search-posts", post(search_posts))
        .route("/like-post", post(like_post))
        .route("/unlike-post", post(unlike_post))
        .route("/add-comment", post(add_comment))
        .route("/get-home-posts/{username}", get(home_posts))
        .route("/get-explore-posts", get(explore_posts))
}

// -- Request types --

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatePostRequest {
    pub username: String,
    pub item_title: String,
    pub artist_name: String,
    pub review: String,
    pub rating: Option<i64>,
    pub item_cover: String,
}

impl CreatePostRequest {
    fn validate(&self) -> AppResult<u8> {
        require(
            &[
                &self.username,
                &self.item_title,
                &self.artist_name,
                &self.review,
                &self.item_cover,
            ],
            "All fields are required",
        )?;

        match self.rating {
            Some(rating @ 1..=5) => Ok(rating as u8),
            Some(_) => Err(AppError::Validation(
                "Rating must be between 1 and 5".into(),
            )),
            None => Err(AppError::Validation("All fields are required".into())),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PostIdRequest {
    pub post_id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LikeRequest {
    pub post_id: String,
    pub username: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentRequest {
    pub post_id: String,
    pub username: String,
    pub text: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub query: String,
    pub current_user: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ExploreQuery {
    pub username: Option<String>,
}

// -- Handlers --

/// POST /create-post
pub async fn create_post(
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<Response> {
    let rating = req.validate()?;

    if state.accounts().get(&req.username).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }

    let post = state
        .posts()
        .create(&NewPost {
            username: req.username,
            item_title: req.item_title,
            artist_name: req.artist_name,
            review: req.review,
            rating,
            item_cover: req.item_cover,
        })
        .await?;

    tracing::info!("Post {} created by {}", post.id, post.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Post created successfully", "post": post })),
    )
        .into_response())
}

/// POST /get-post
pub async fn get_post(
    State(state): State<AppState>,
    Json(req): Json<PostIdRequest>,
) -> AppResult<Response> {
    require(&[&req.post_id], "Post ID is required")?;

    let post = state
        .posts()
        .get(&req.post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))?;

    Ok(Json(json!({ "message": "Post retrieved successfully", "post": post })).into_response())
}

/// DELETE /delete-post/{post_id}
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<Response> {
    state.posts().delete(&post_id).await?;
    tracing::info!("Post {} deleted", post_id);

    Ok(Json(json!({ "message": "Post deleted successfully" })).into_response())
}

/// POST /search-posts
/// Matches title, artist or author; the searcher's own posts are left out.
pub async fn search_posts(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> AppResult<Response> {
    require(&[&req.query], "Search query is required")?;

    let posts = state
        .posts()
        .search(req.query.trim(), req.current_user.as_deref())
        .await?;

    Ok(Json(json!({ "message": "Posts retrieved successfully", "posts": posts })).into_response())
}

/// POST /like-post
pub async fn like_post(
    State(state): State<AppState>,
    Json(req): Json<LikeRequest>,
) -> AppResult<Response> {
    require(&[&req.post_id, &req.username], "Post ID and username are required")?;

    let likes = state
        .posts()
        .set_like(&req.post_id, &req.username, true)
        .await?;

    Ok(Json(json!({ "message": "Post liked successfully", "likes": likes })).into_response())
}

/// POST /unlike-post
pub async fn unlike_post(
    State(state): State<AppState>,
    Json(req): Json<LikeRequest>,
) -> AppResult<Response> {
    require(&[&req.post_id, &req.username], "Post ID and username are required")?;

    let likes = state
        .posts()
        .set_like(&req.post_id, &req.username, false)
        .await?;

    Ok(Json(json!({ "message": "Post unliked successfully", "likes": likes })).into_response())
}

/// POST /add-comment
pub async fn add_comment(
    State(state): State<AppState>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Response> {
    require(
        &[&req.post_id, &req.username, &req.text],
        "Post ID, username, and comment text are required",
    )?;

    let comment = state
        .posts()
        .append_comment(&req.post_id, &req.username, &req.text)
        .await?;

    Ok(Json(json!({ "message": "Comment added successfully", "comment": comment })).into_response())
}

/// GET /get-home-posts/{username}
/// Posts from everyone the user currently follows
pub async fn home_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let following = state.social().following(&username).await?;
    let posts = state.posts().list_by_authors(&following).await?;

    let message = if posts.is_empty() {
        "There are no posts available"
    } else {
        "Home posts retrieved successfully"
    };

    Ok(Json(json!({ "message": message, "posts": posts })).into_response())
}

/// GET /get-explore-posts?username=
/// Posts from public accounts the user does not already follow
pub async fn explore_posts(
    State(state): State<AppState>,
    Query(query): Query<ExploreQuery>,
) -> AppResult<Response> {
    let mut excluded = Vec::new();
    if let Some(username) = query.username.filter(|u| !u.trim().is_empty()) {
        excluded = state.social().following(&username).await?;
        excluded.push(username);
    }

    let authors = state.accounts().public_usernames(&excluded).await?;
    let posts = state.posts().list_by_authors(&authors).await?;

    Ok(Json(json!({ "message": "Explore posts retrieved successfully", "posts": posts }))
        .into_response())
}
