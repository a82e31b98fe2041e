use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::accounts::{AccountRepository, NewAccount, ProfileUpdate};
use crate::db::models::Privacy;
use crate::error::{AppError, AppResult};
use crate::extractors::Json;
use crate::posts::PostRepository;
use crate::routes::require;
use crate::social::{FollowEdge, FollowState, SocialGraphRepository};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/get-user-data", post(get_user_data))
        .route("/update-profile", put(update_profile))
        .route("/get-user-profile", post(get_user_profile))
        .route("/search-users", post(search_users))
}

// -- Request/Response types --

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub description: Option<String>,
    pub privacy: Option<Privacy>,
    pub avatar: Option<String>,
}

impl SignupRequest {
    fn validate(&self) -> AppResult<()> {
        require(
            &[&self.username, &self.password],
            "Username and password are required",
        )?;
        if self.username.trim() != self.username {
            return Err(AppError::Validation(
                "Username cannot start or end with whitespace".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub privacy: Option<Privacy>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRequest {
    pub logged_in_user: String,
    pub viewed_user: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    pub query: String,
    pub current_user: Option<String>,
}

/// Public face of a profile, with relationship counts in place of lists
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub username: String,
    pub avatar: String,
    pub description: String,
    pub privacy: Privacy,
    pub followers: usize,
    pub following: usize,
}

// -- Handlers --

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<Response> {
    req.validate()?;

    let account = NewAccount {
        username: req.username,
        password: req.password,
        description: req.description.unwrap_or_default(),
        privacy: req.privacy.unwrap_or_default(),
        avatar: req.avatar.unwrap_or_default(),
    };
    state.accounts().create(&account).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    )
        .into_response())
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    require(
        &[&req.username, &req.password],
        "Username and password are required",
    )?;

    let user = state.accounts().verify(&req.username, &req.password).await?;
    tracing::debug!("Login for {}", user.username);

    Ok(Json(json!({ "message": "Login successful", "user": user })).into_response())
}

/// POST /get-user-data
/// The owner's own view: full post list plus relationship counts
pub async fn get_user_data(
    State(state): State<AppState>,
    Json(req): Json<UsernameRequest>,
) -> AppResult<Response> {
    require(&[&req.username], "Username is required")?;

    let user = state
        .accounts()
        .get(&req.username)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let posts = state.posts().list_by_author(&user.username).await?;
    let social = state.social();
    let followers_count = social.followers(&user.username).await?.len();
    let following_count = social.following(&user.username).await?.len();

    Ok(Json(json!({
        "message": "User data retrieved successfully",
        "postCount": posts.len(),
        "user": user,
        "posts": posts,
        "followersCount": followers_count,
        "followingCount": following_count,
    }))
    .into_response())
}

/// PUT /update-profile
pub async fn update_profile(
    State(state): State<AppState>,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Response> {
    require(&[&req.username], "Username is required")?;

    let update = ProfileUpdate {
        description: req.description,
        privacy: req.privacy,
        avatar: req.avatar,
    };
    let user = state
        .accounts()
        .update(&req.username, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    tracing::info!("Updated profile for {}", user.username);

    Ok(Json(json!({ "message": "Profile updated successfully", "user": user })).into_response())
}

/// POST /get-user-profile
/// Posts of a private account are only visible to its followers and itself.
pub async fn get_user_profile(
    State(state): State<AppState>,
    Json(req): Json<ProfileRequest>,
) -> AppResult<Response> {
    require(
        &[&req.logged_in_user, &req.viewed_user],
        "Both logged-in user and viewed user are required",
    )?;

    let user = state
        .accounts()
        .get(&req.viewed_user)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let social = state.social();
    let followers = social.followers(&user.username).await?.len();
    let following = social.following(&user.username).await?.len();

    let is_self = req.logged_in_user == req.viewed_user;
    let relationship = if is_self {
        FollowState::None
    } else {
        social
            .state(&FollowEdge::new(&req.logged_in_user, &req.viewed_user))
            .await?
    };
    let is_following = relationship == FollowState::Following;
    let follow_requested = relationship == FollowState::Pending;

    let posts = if user.privacy.is_public() || is_following || is_self {
        state.posts().list_by_author(&user.username).await?
    } else {
        Vec::new()
    };

    let profile = ProfileView {
        username: user.username,
        avatar: user.avatar,
        description: user.description,
        privacy: user.privacy,
        followers,
        following,
    };

    Ok(Json(json!({
        "message": "User profile retrieved successfully",
        "postCount": posts.len(),
        "user": profile,
        "posts": posts,
        "isFollowing": is_following,
        "followRequested": follow_requested,
    }))
    .into_response())
}

/// POST /search-users
pub async fn search_users(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> AppResult<Response> {
    require(&[&req.query], "Search query is required")?;

    let users = state
        .accounts()
        .search(req.query.trim(), req.current_user.as_deref())
        .await?;

    Ok(Json(json!({ "message": "Users retrieved successfully", "users": users })).into_response())
}
