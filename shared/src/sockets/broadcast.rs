use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::Error;

use super::connections::get_all_connections;
use super::messages::PingMessage;

/// Push a message to every registered connection. Stale connections are
/// logged and skipped; delivery is best-effort.
pub async fn broadcast_to_all(
    dynamo_client: &DynamoClient,
    api_gateway_client: &ApiGatewayManagementClient,
    table_name: &str,
    message: &PingMessage,
) -> Result<(), Error> {
    let connections = get_all_connections(dynamo_client, table_name).await?;
    let message_json = serde_json::to_string(message)?;

    tracing::info!("Broadcasting ping to {} connections", connections.len());

    for connection in connections {
        let result = api_gateway_client
            .post_to_connection()
            .connection_id(&connection.connection_id)
            .data(message_json.as_bytes().to_vec().into())
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(
                "Failed to send to connection {}: {}. Connection may be stale.",
                connection.connection_id,
                e
            );
        }
    }

    Ok(())
}
