use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, Select};
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

use crate::error::{json_response, ApiError};
use crate::ids;
use crate::types::{required_message, required_params, Group, GroupRequest};

fn group_from_item(item: &HashMap<String, AttributeValue>) -> Group {
    Group {
        id: item
            .get("PK")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| s.strip_prefix("GROUP#"))
            .unwrap_or_default()
            .to_string(),
        name: item
            .get("name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        created: item
            .get("created")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    }
}

async fn count_groups(client: &DynamoClient, table_name: &str) -> Result<i32, Error> {
    let result = client
        .scan()
        .table_name(table_name)
        .select(Select::Count)
        .filter_expression("entity_type = :type")
        .expression_attribute_values(":type", AttributeValue::S("group".to_string()))
        .send()
        .await?;
    Ok(result.count())
}

async fn find_group_by_name(
    client: &DynamoClient,
    table_name: &str,
    name: &str,
) -> Result<Option<Group>, Error> {
    let result = client
        .scan()
        .table_name(table_name)
        .filter_expression("entity_type = :type AND #name = :name")
        .expression_attribute_names("#name", "name")
        .expression_attribute_values(":type", AttributeValue::S("group".to_string()))
        .expression_attribute_values(":name", AttributeValue::S(name.to_string()))
        .send()
        .await?;

    Ok(result.items().first().map(group_from_item))
}

/// List groups, one page at a time, with the collection-wide total
pub async fn list_groups(
    client: &DynamoClient,
    table_name: &str,
    page: usize,
    size: usize,
) -> Result<Response<Body>, Error> {
    let result = client
        .scan()
        .table_name(table_name)
        .filter_expression("entity_type = :type")
        .expression_attribute_values(":type", AttributeValue::S("group".to_string()))
        .send()
        .await?;

    // An absent item set is the failure; an empty page is a valid response
    let Some(items) = result.items else {
        return ApiError::NotFound("Database is empty".to_string()).into_response();
    };

    let skip = (page * size).saturating_sub(size);
    let list: Vec<Group> = items.iter().skip(skip).take(size).map(group_from_item).collect();

    let total_size = count_groups(client, table_name).await?;

    json_response(
        StatusCode::OK,
        &serde_json::json!({"totalSize": total_size, "list": list}),
    )
}

/// Get a group by id
pub async fn get_group(
    client: &DynamoClient,
    table_name: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    if let Err(err) = ids::parse_group_id(group_id) {
        return err.into_response();
    }
    let pk = format!("GROUP#{}", group_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    match result.item() {
        Some(item) => json_response(StatusCode::OK, &group_from_item(item)),
        None => ApiError::NotFound("Group not found".to_string()).into_response(),
    }
}

/// Create a group with a globally unique name
pub async fn create_group(
    client: &DynamoClient,
    table_name: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let raw: serde_json::Value = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);

    let offending = required_params(&raw, &["name"]);
    if !offending.is_empty() {
        return ApiError::Validation(required_message(&offending)).into_response();
    }

    let req: GroupRequest = serde_json::from_value(raw)?;
    let name = req.name.unwrap_or_default();

    if find_group_by_name(client, table_name, &name).await?.is_some() {
        return ApiError::Conflict("Group with this name already exist".to_string())
            .into_response();
    }

    let group = Group {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        created: chrono::Utc::now().to_rfc3339(),
    };

    let pk = format!("GROUP#{}", group.id);
    client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk.clone()))
        .item("SK", AttributeValue::S(pk))
        .item("entity_type", AttributeValue::S("group".to_string()))
        .item("name", AttributeValue::S(group.name.clone()))
        .item("created", AttributeValue::S(group.created.clone()))
        .send()
        .await?;

    tracing::info!("Group created: {} ({})", group.name, group.id);

    json_response(
        StatusCode::OK,
        &serde_json::json!({"group": group, "message": "Create group success"}),
    )
}

/// Delete a group. No cascade: users keep whatever membership entries they had
pub async fn delete_group(
    client: &DynamoClient,
    table_name: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    if let Err(err) = ids::parse_group_id(group_id) {
        return err.into_response();
    }
    let pk = format!("GROUP#{}", group_id);

    let result = client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .condition_expression("attribute_exists(PK)")
        .send()
        .await;

    match result {
        Ok(_) => {
            tracing::info!("Group deleted: {}", group_id);
            json_response(StatusCode::OK, &serde_json::json!({"message": "Delete success"}))
        }
        Err(err) => {
            if err
                .as_service_error()
                .map(|e| e.is_conditional_check_failed_exception())
                .unwrap_or(false)
            {
                return ApiError::NotFound("Group not found".to_string()).into_response();
            }
            Err(err.into())
        }
    }
}

/// Rename a group
pub async fn update_group(
    client: &DynamoClient,
    table_name: &str,
    group_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    if let Err(err) = ids::parse_group_id(group_id) {
        return err.into_response();
    }

    let req: GroupRequest = serde_json::from_slice(body).unwrap_or_default();
    let name = req.name.unwrap_or_default();
    let pk = format!("GROUP#{}", group_id);

    if name.is_empty() {
        // Empty patch: report against the current document
        let result = client
            .get_item()
            .table_name(table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .send()
            .await?;
        return if result.item().is_some() {
            ApiError::BadRequest("Not modified".to_string()).into_response()
        } else {
            ApiError::NotFound("Group not found".to_string()).into_response()
        };
    }

    let result = client
        .update_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .update_expression("SET #name = :name")
        .condition_expression("attribute_exists(PK)")
        .expression_attribute_names("#name", "name")
        .expression_attribute_values(":name", AttributeValue::S(name.clone()))
        .return_values(ReturnValue::AllOld)
        .send()
        .await;

    match result {
        Ok(output) => {
            let old_name = output
                .attributes()
                .and_then(|a| a.get("name"))
                .and_then(|v| v.as_s().ok());
            if old_name == Some(&name) {
                return ApiError::BadRequest("Not modified".to_string()).into_response();
            }
            tracing::info!("Group updated: {}", group_id);
            json_response(
                StatusCode::OK,
                &serde_json::json!({"message": "Group update success"}),
            )
        }
        Err(err) => {
            if err
                .as_service_error()
                .map(|e| e.is_conditional_check_failed_exception())
                .unwrap_or(false)
            {
                return ApiError::NotFound("Group not found".to_string()).into_response();
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::config::BehaviorVersion;

    // Client with no endpoint; tests only exercise paths that fail before
    // any request is dispatched
    fn offline_client() -> DynamoClient {
        DynamoClient::from_conf(
            aws_sdk_dynamodb::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .build(),
        )
    }

    async fn body_of(response: Response<Body>) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn get_rejects_malformed_id_before_any_round_trip() {
        let response = get_group(&offline_client(), "roster", "not-an-id")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_of(response).await["message"], "Incorrect group id");
    }

    #[tokio::test]
    async fn delete_rejects_malformed_id_before_any_round_trip() {
        let response = delete_group(&offline_client(), "roster", "42")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_rejects_malformed_id_before_any_round_trip() {
        let response = update_group(&offline_client(), "roster", "42", b"{\"name\":\"eng\"}")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_enumerates_missing_name() {
        let response = create_group(&offline_client(), "roster", b"{}").await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body_of(response).await["message"], "Field: 'name' - required!");
    }

    #[tokio::test]
    async fn create_treats_empty_name_as_missing() {
        let response = create_group(&offline_client(), "roster", b"{\"name\":\"\"}")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body_of(response).await["message"], "Field: 'name' - required!");
    }
}
