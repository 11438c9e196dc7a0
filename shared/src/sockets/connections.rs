use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::Error;
use serde::{Deserialize, Serialize};

/// Websocket connection registered in the store
#[derive(Debug, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: String,
    pub user_id: Option<String>,
    pub connected_at: String,
}

/// Register a connection on $connect
pub async fn save_connection(
    client: &DynamoClient,
    table_name: &str,
    connection_id: &str,
    user_id: Option<&str>,
) -> Result<(), Error> {
    let now = chrono::Utc::now().to_rfc3339();
    let pk = format!("CONNECTION#{}", connection_id);

    let mut put = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk.clone()))
        .item("SK", AttributeValue::S(pk))
        .item("entity_type", AttributeValue::S("connection".to_string()))
        .item("connection_id", AttributeValue::S(connection_id.to_string()))
        .item("connected_at", AttributeValue::S(now));

    if let Some(user_id) = user_id {
        put = put.item("user_id", AttributeValue::S(user_id.to_string()));
    }

    put.send().await?;

    tracing::info!("Connection registered: {}", connection_id);
    Ok(())
}

/// Drop a connection on $disconnect
pub async fn remove_connection(
    client: &DynamoClient,
    table_name: &str,
    connection_id: &str,
) -> Result<(), Error> {
    let pk = format!("CONNECTION#{}", connection_id);

    client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    tracing::info!("Connection dropped: {}", connection_id);
    Ok(())
}

/// All currently registered connections
pub async fn get_all_connections(
    client: &DynamoClient,
    table_name: &str,
) -> Result<Vec<Connection>, Error> {
    let result = client
        .scan()
        .table_name(table_name)
        .filter_expression("entity_type = :type")
        .expression_attribute_values(":type", AttributeValue::S("connection".to_string()))
        .send()
        .await?;

    let mut connections = Vec::new();
    for item in result.items() {
        if let Some(connection_id) = item.get("connection_id").and_then(|v| v.as_s().ok()) {
            connections.push(Connection {
                connection_id: connection_id.clone(),
                user_id: item
                    .get("user_id")
                    .and_then(|v| v.as_s().ok())
                    .map(|s| s.to_string()),
                connected_at: item
                    .get("connected_at")
                    .and_then(|v| v.as_s().ok())
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            });
        }
    }

    Ok(connections)
}
