use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use roster_shared::{groups, session, users, AppState};
use std::env;
use std::sync::Arc;

/// Main Lambda handler - routes requests to the group and user services
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header(
                "Access-Control-Allow-Methods",
                "GET,POST,PUT,PATCH,DELETE,OPTIONS",
            )
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type,Authorization,X-Session-Id",
            )
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "roster".to_string());
    let body = event.body();
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Groups routes
    if path.starts_with("/groups") {
        return match (method, parts.as_slice()) {
            // GET /groups?page&size - paged list with collection total
            (&Method::GET, ["groups"]) => {
                let (page, size) = page_params(&event);
                groups::list_groups(&state.dynamo_client, &table_name, page, size).await
            }
            // GET /groups/{id} - get group
            (&Method::GET, ["groups", group_id]) => {
                groups::get_group(&state.dynamo_client, &table_name, group_id).await
            }
            // POST /groups - create group
            (&Method::POST, ["groups"]) => {
                groups::create_group(&state.dynamo_client, &table_name, body).await
            }
            // PATCH /groups/{id} - rename group
            (&Method::PATCH, ["groups", group_id]) => {
                groups::update_group(&state.dynamo_client, &table_name, group_id, body).await
            }
            // DELETE /groups/{id} - delete group
            (&Method::DELETE, ["groups", group_id]) => {
                groups::delete_group(&state.dynamo_client, &table_name, group_id).await
            }
            _ => not_found(),
        };
    }

    // Users routes; mutations are gated by the acting session
    if path.starts_with("/users") {
        let acting = session::resolve(&state.dynamo_client, &table_name, &event).await?;

        return match (method, parts.as_slice()) {
            // GET /users?page&size&groupId - paged list, optionally
            // filtered to a group's members
            (&Method::GET, ["users"]) => {
                let (page, size) = page_params(&event);
                let group_id = event
                    .query_string_parameters_ref()
                    .and_then(|params| params.first("groupId"))
                    .map(|s| s.to_string());
                users::list_users(
                    &state.dynamo_client,
                    &table_name,
                    page,
                    size,
                    group_id.as_deref(),
                )
                .await
            }
            // GET /users/{id} - get user
            (&Method::GET, ["users", user_id]) => {
                users::get_user(&state.dynamo_client, &table_name, user_id).await
            }
            // POST /users - create user
            (&Method::POST, ["users"]) => {
                users::create_user(
                    &state.dynamo_client,
                    state.notifier.as_ref(),
                    &table_name,
                    &acting,
                    body,
                )
                .await
            }
            // PATCH /users/{id} - patch user fields
            (&Method::PATCH, ["users", user_id]) => {
                users::update_user(
                    &state.dynamo_client,
                    state.notifier.as_ref(),
                    &table_name,
                    &acting,
                    user_id,
                    body,
                )
                .await
            }
            // PUT /users/{id} - add group membership
            (&Method::PUT, ["users", user_id]) => {
                users::add_group_to_user(
                    &state.dynamo_client,
                    state.notifier.as_ref(),
                    &table_name,
                    user_id,
                    body,
                )
                .await
            }
            // DELETE /users/{id} - delete user
            (&Method::DELETE, ["users", user_id]) => {
                users::delete_user(
                    &state.dynamo_client,
                    state.notifier.as_ref(),
                    &table_name,
                    user_id,
                )
                .await
            }
            // DELETE /users/{id}/groups - remove group membership
            (&Method::DELETE, ["users", user_id, "groups"]) => {
                users::remove_group_from_user(
                    &state.dynamo_client,
                    state.notifier.as_ref(),
                    &table_name,
                    user_id,
                    body,
                )
                .await
            }
            _ => not_found(),
        };
    }

    tracing::warn!("No route matched - Method: {} Path: {}", method, path);
    not_found()
}

fn page_params(event: &Request) -> (usize, usize) {
    let page = event
        .query_string_parameters_ref()
        .and_then(|params| params.first("page"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let size = event
        .query_string_parameters_ref()
        .and_then(|params| params.first("size"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    (page, size)
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"message": "Not found"}).to_string().into())
        .map_err(Box::new)?)
}
