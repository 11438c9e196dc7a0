use lambda_http::{http::StatusCode, Body, Error, Request, RequestExt, Response};
use std::{env, sync::Arc};

use super::connections::{remove_connection, save_connection};
use crate::AppState;

/// Handle websocket lifecycle events ($connect, $disconnect)
pub async fn handle_websocket_event(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "roster".to_string());

    let connection_id = event
        .headers()
        .get("connectionid")
        .or_else(|| event.headers().get("connectionId"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let route_key = event
        .headers()
        .get("routekey")
        .or_else(|| event.headers().get("routeKey"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or(event.uri().path());

    tracing::info!("WebSocket event: {} for connection: {}", route_key, connection_id);

    match route_key {
        "$connect" => {
            let user_id = event
                .query_string_parameters_ref()
                .and_then(|params| params.first("user_id"))
                .map(|s| s.to_string());

            save_connection(
                &state.dynamo_client,
                &table_name,
                &connection_id,
                user_id.as_deref(),
            )
            .await?;

            Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Body::Empty)
                .map_err(Box::new)?)
        }
        "$disconnect" => {
            remove_connection(&state.dynamo_client, &table_name, &connection_id).await?;

            Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Body::Empty)
                .map_err(Box::new)?)
        }
        _ => {
            tracing::warn!("Unknown WebSocket route: {}", route_key);
            Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Body::Empty)
                .map_err(Box::new)?)
        }
    }
}
