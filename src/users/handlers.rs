use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    extract::{JsonBody, PathParam, QueryParams},
    state::AppState,
    users::dto::{
        ConfirmVerificationRequest, CreateUserRequest, GetUserQuery, LinkGoogleRequest,
        LookupQuery, Pagination, PublicUser, UpdateUserRequest, VerificationIssued,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route("/users/lookup", get(lookup_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/users/:id/restore", post(restore_user))
        .route("/users/:id/verification", post(issue_verification))
        .route("/users/:id/verification/confirm", post(confirm_verification))
        .route("/users/:id/google", put(link_google))
}

fn public(user: crate::users::model::User) -> Json<PublicUser> {
    Json(PublicUser::from_user(user, OffsetDateTime::now_utc()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> AppResult<(StatusCode, [(HeaderName, String); 1], Json<PublicUser>)> {
    let user = state.users.create(&payload).await?;
    let location = format!("/api/v1/users/{}", user.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], public(user)))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    QueryParams(p): QueryParams<Pagination>,
) -> AppResult<Json<Vec<PublicUser>>> {
    let now = OffsetDateTime::now_utc();
    let users = state.users.list_active(p.limit, p.offset).await?;
    Ok(Json(
        users
            .into_iter()
            .map(|u| PublicUser::from_user(u, now))
            .collect(),
    ))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    QueryParams(q): QueryParams<GetUserQuery>,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.get(id, q.include_deleted).await?;
    Ok(public(user))
}

#[instrument(skip(state))]
pub async fn lookup_user(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<LookupQuery>,
) -> AppResult<Json<PublicUser>> {
    let found = match (q.email.as_deref(), q.google_id.as_deref()) {
        (Some(email), None) => state.users.find_by_email(email).await?,
        (None, Some(google_id)) => state.users.find_by_google_id(google_id).await?,
        _ => {
            return Err(AppError::validation(
                "query",
                "provide exactly one of email or google_id",
            ))
        }
    };
    found.map(public).ok_or(AppError::NotFound)
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.update_profile(id, &payload).await?;
    Ok(public(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.soft_delete(id).await?;
    Ok(public(user))
}

#[instrument(skip(state))]
pub async fn restore_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.restore(id).await?;
    Ok(public(user))
}

#[instrument(skip(state))]
pub async fn issue_verification(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<(StatusCode, Json<VerificationIssued>)> {
    let (user, expires_at) = state.users.issue_verification(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(VerificationIssued {
            user_id: user.id,
            expires_at,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn confirm_verification(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<ConfirmVerificationRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.confirm_verification(id, &payload.token).await?;
    Ok(public(user))
}

#[instrument(skip(state, payload))]
pub async fn link_google(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<LinkGoogleRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = state
        .users
        .link_google_identity(id, &payload.google_id)
        .await?;
    Ok(public(user))
}
