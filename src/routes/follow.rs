// Follow graph handlers - every route is one event fed to the state machine
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::accounts::AccountRepository;
use crate::error::{AppError, AppResult};
use crate::extractors::Json;
use crate::routes::require;
use crate::social::{FollowEdge, FollowEvent, FollowState, SocialGraphRepository};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/follow-user", post(follow_user))
        .route("/unfollow-user", post(unfollow_user))
        .route("/cancel-follow-request", post(cancel_follow_request))
        .route("/accept-follow-request", post(accept_follow_request))
        .route("/decline-follow-request", post(decline_follow_request))
        .route("/get-followers", post(get_followers))
        .route("/get-following", post(get_following))
        .route("/remove-following", post(remove_following))
        .route("/remove-follower", post(remove_follower))
}

// -- Request types --

/// Viewer acting on the profile they are looking at
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerRequest {
    pub logged_in_user: String,
    pub viewed_user: String,
    /// Client's idea of the target's privacy. Only logged when it disagrees
    /// with the stored account.
    pub is_public: Option<bool>,
}

impl ViewerRequest {
    fn validate(&self) -> AppResult<FollowEdge> {
        require(
            &[&self.logged_in_user, &self.viewed_user],
            "Both logged-in user and viewed user are required",
        )?;
        Ok(FollowEdge::new(&self.logged_in_user, &self.viewed_user))
    }
}

/// Target resolving a request sent by `from_user`
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestDecision {
    pub current_user: String,
    pub from_user: String,
}

impl RequestDecision {
    fn validate(&self) -> AppResult<FollowEdge> {
        require(
            &[&self.current_user, &self.from_user],
            "Both currentUser and fromUser are required",
        )?;
        Ok(FollowEdge::new(&self.from_user, &self.current_user))
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveRequest {
    pub username: String,
    pub remove_user: String,
}

impl RemoveRequest {
    fn validate(&self) -> AppResult<()> {
        require(
            &[&self.username, &self.remove_user],
            "Both username and removeUser are required",
        )
    }
}

// -- Handlers --

/// POST /follow-user
/// Public targets are followed at once, private ones get a request.
pub async fn follow_user(
    State(state): State<AppState>,
    Json(req): Json<ViewerRequest>,
) -> AppResult<Response> {
    let edge = req.validate()?;

    let accounts = state.accounts();
    if accounts.get(edge.follower.as_str()).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }
    let target = accounts
        .get(edge.target.as_str())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if let Some(is_public) = req.is_public {
        if is_public != target.privacy.is_public() {
            tracing::debug!(
                "Stale privacy from client for {}: using stored {}",
                target.username,
                target.privacy
            );
        }
    }

    let transition = state
        .social()
        .transition(
            &edge,
            FollowEvent::Request {
                privacy: target.privacy,
            },
        )
        .await?;

    let body = match transition.to {
        FollowState::Pending => json!({
            "message": "Follow request sent",
            "followStatus": "request_sent",
        }),
        _ => json!({
            "message": "Successfully followed the user",
            "followStatus": "following",
        }),
    };

    Ok(Json(body).into_response())
}

/// POST /unfollow-user
pub async fn unfollow_user(
    State(state): State<AppState>,
    Json(req): Json<ViewerRequest>,
) -> AppResult<Response> {
    let edge = req.validate()?;
    state.social().transition(&edge, FollowEvent::Unfollow).await?;

    Ok(Json(json!({ "message": "Successfully unfollowed user" })).into_response())
}

/// POST /cancel-follow-request
pub async fn cancel_follow_request(
    State(state): State<AppState>,
    Json(req): Json<ViewerRequest>,
) -> AppResult<Response> {
    let edge = req.validate()?;
    state.social().transition(&edge, FollowEvent::Cancel).await?;

    Ok(Json(json!({ "message": "Follow request canceled" })).into_response())
}

/// POST /accept-follow-request
pub async fn accept_follow_request(
    State(state): State<AppState>,
    Json(req): Json<RequestDecision>,
) -> AppResult<Response> {
    let edge = req.validate()?;
    state.social().transition(&edge, FollowEvent::Accept).await?;

    Ok(Json(json!({ "message": "Follow request accepted" })).into_response())
}

/// POST /decline-follow-request
pub async fn decline_follow_request(
    State(state): State<AppState>,
    Json(req): Json<RequestDecision>,
) -> AppResult<Response> {
    let edge = req.validate()?;
    state.social().transition(&edge, FollowEvent::Decline).await?;

    Ok(Json(json!({ "message": "Follow request declined" })).into_response())
}

/// POST /get-followers
pub async fn get_followers(
    State(state): State<AppState>,
    Json(req): Json<UsernameRequest>,
) -> AppResult<Response> {
    require(&[&req.username], "Username is required")?;
    let followers = state.social().followers(&req.username).await?;

    Ok(Json(json!({
        "message": "Followers retrieved successfully",
        "followers": followers,
    }))
    .into_response())
}

/// POST /get-following
pub async fn get_following(
    State(state): State<AppState>,
    Json(req): Json<UsernameRequest>,
) -> AppResult<Response> {
    require(&[&req.username], "Username is required")?;
    let following = state.social().following(&req.username).await?;

    Ok(Json(json!({
        "message": "Following retrieved successfully",
        "following": following,
    }))
    .into_response())
}

/// POST /remove-following
/// `username` stops following `removeUser`
pub async fn remove_following(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> AppResult<Response> {
    req.validate()?;
    let edge = FollowEdge::new(&req.username, &req.remove_user);
    state.social().transition(&edge, FollowEvent::Unfollow).await?;

    Ok(Json(json!({ "message": "User successfully unfollowed" })).into_response())
}

/// POST /remove-follower
/// `removeUser` is dropped from the followers of `username`
pub async fn remove_follower(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> AppResult<Response> {
    req.validate()?;
    let edge = FollowEdge::new(&req.remove_user, &req.username);
    state.social().transition(&edge, FollowEvent::Unfollow).await?;

    Ok(Json(json!({ "message": "User successfully removed from followers" })).into_response())
}
