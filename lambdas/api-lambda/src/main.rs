use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{run, service_fn, tracing, Error, Request};
use roster_shared::notify::{NoopNotifier, Notifier, WebSocketNotifier};
use roster_shared::AppState;
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    // Initialize AWS clients once at startup
    let config = aws_config::load_from_env().await;
    let dynamo_client = DynamoClient::new(&config);
    let table_name = std::env::var("TABLE_NAME").unwrap_or_else(|_| "roster".to_string());

    // Change pings go out over the websocket API when an endpoint is
    // configured; otherwise mutations are silent
    let notifier: Arc<dyn Notifier> = match std::env::var("WS_API_ENDPOINT") {
        Ok(endpoint) => {
            let api_config = aws_sdk_apigatewaymanagement::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Arc::new(WebSocketNotifier::new(
                dynamo_client.clone(),
                ApiGatewayManagementClient::from_conf(api_config),
                table_name,
            ))
        }
        Err(_) => Arc::new(NoopNotifier),
    };

    let state = AppState::new(dynamo_client, notifier);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move {
            // Websocket lifecycle events arrive with a route key header;
            // everything else is plain HTTP
            let is_websocket = event.headers().contains_key("routekey")
                || event.headers().contains_key("routeKey");

            if is_websocket {
                roster_shared::sockets::handle_websocket_event(event, state).await
            } else {
                http_handler::function_handler(event, state).await
            }
        }
    }))
    .await
}
