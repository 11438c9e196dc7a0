use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, Select};
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{http::StatusCode, Body, Error, Response};
use std::collections::HashMap;

use crate::error::{json_response, ApiError};
use crate::ids;
use crate::notify::{ChangeEvent, Notifier};
use crate::session::Session;
use crate::types::{
    required_message, required_params, CreateUserRequest, MembershipRequest, Permission,
    UpdateUserRequest, User,
};

fn user_from_item(item: &HashMap<String, AttributeValue>) -> User {
    User {
        id: item
            .get("PK")
            .and_then(|v| v.as_s().ok())
            .and_then(|s| s.strip_prefix("USER#"))
            .unwrap_or_default()
            .to_string(),
        email: item
            .get("email")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        phone: item
            .get("phone")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        first_name: item
            .get("first_name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()),
        last_name: item
            .get("last_name")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string()),
        permission: item
            .get("permission")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
        groups: item
            .get("groups")
            .and_then(|v| v.as_ss().ok())
            .cloned()
            .unwrap_or_default(),
        created: item
            .get("created")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    }
}

async fn count_users(client: &DynamoClient, table_name: &str) -> Result<i32, Error> {
    let result = client
        .scan()
        .table_name(table_name)
        .select(Select::Count)
        .filter_expression("entity_type = :type")
        .expression_attribute_values(":type", AttributeValue::S("user".to_string()))
        .send()
        .await?;
    Ok(result.count())
}

// Uniqueness is a logical OR: a new user may collide on email alone or on
// phone alone
async fn contact_taken(
    client: &DynamoClient,
    table_name: &str,
    email: &str,
    phone: &str,
) -> Result<bool, Error> {
    let result = client
        .scan()
        .table_name(table_name)
        .select(Select::Count)
        .filter_expression("entity_type = :type AND (email = :email OR phone = :phone)")
        .expression_attribute_values(":type", AttributeValue::S("user".to_string()))
        .expression_attribute_values(":email", AttributeValue::S(email.to_string()))
        .expression_attribute_values(":phone", AttributeValue::S(phone.to_string()))
        .send()
        .await?;
    Ok(result.count() > 0)
}

async fn group_exists(
    client: &DynamoClient,
    table_name: &str,
    group_id: &str,
) -> Result<bool, Error> {
    let pk = format!("GROUP#{}", group_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;
    Ok(result.item().is_some())
}

/// List users. With a `groupId` filter the page is returned as a plain
/// array; without one the response carries the collection total keyed by
/// page number
pub async fn list_users(
    client: &DynamoClient,
    table_name: &str,
    page: usize,
    size: usize,
    group_id: Option<&str>,
) -> Result<Response<Body>, Error> {
    let skip = (page * size).saturating_sub(size);

    if let Some(group_id) = group_id {
        if let Err(err) = ids::parse_group_id(group_id) {
            return err.into_response();
        }

        let result = client
            .scan()
            .table_name(table_name)
            .filter_expression("entity_type = :type AND contains(#groups, :gid)")
            .expression_attribute_names("#groups", "groups")
            .expression_attribute_values(":type", AttributeValue::S("user".to_string()))
            .expression_attribute_values(":gid", AttributeValue::S(group_id.to_string()))
            .send()
            .await?;

        let Some(items) = result.items else {
            return ApiError::NotFound("Database is empty".to_string()).into_response();
        };

        let members: Vec<User> = items.iter().skip(skip).take(size).map(user_from_item).collect();
        return json_response(StatusCode::OK, &members);
    }

    let result = client
        .scan()
        .table_name(table_name)
        .filter_expression("entity_type = :type")
        .expression_attribute_values(":type", AttributeValue::S("user".to_string()))
        .send()
        .await?;

    let Some(items) = result.items else {
        return ApiError::NotFound("Database is empty".to_string()).into_response();
    };

    let users: Vec<User> = items.iter().skip(skip).take(size).map(user_from_item).collect();
    let total_size = count_users(client, table_name).await?;

    let mut body = serde_json::Map::new();
    body.insert("totalSize".to_string(), serde_json::json!(total_size));
    body.insert(page.to_string(), serde_json::to_value(&users)?);

    json_response(StatusCode::OK, &serde_json::Value::Object(body))
}

/// Get a user by id
pub async fn get_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    if let Err(err) = ids::parse_user_id(user_id) {
        return err.into_response();
    }
    let pk = format!("USER#{}", user_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    match result.item() {
        Some(item) => json_response(StatusCode::OK, &user_from_item(item)),
        None => ApiError::NotFound("User not found".to_string()).into_response(),
    }
}

/// Create a user. Validation, the moderator gate, the permission check and
/// the contact-uniqueness check all run before the single write
pub async fn create_user(
    client: &DynamoClient,
    notifier: &dyn Notifier,
    table_name: &str,
    session: &Session,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let raw: serde_json::Value = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);

    let offending = required_params(&raw, &["email", "phone", "permission"]);
    if !offending.is_empty() {
        return ApiError::Validation(required_message(&offending)).into_response();
    }

    let req: CreateUserRequest = serde_json::from_value(raw)?;
    let email = req.email.unwrap_or_default();
    let phone = req.phone.unwrap_or_default();
    let permission = req.permission.unwrap_or_default();

    if session.is_moderator() && permission != "user" {
        return ApiError::Forbidden(
            "Moderator can create user only with \"user\" permission".to_string(),
        )
        .into_response();
    }

    if permission.parse::<Permission>().is_err() {
        return ApiError::BadRequest("permission type does not exist".to_string()).into_response();
    }

    if contact_taken(client, table_name, &email, &phone).await? {
        return ApiError::Conflict("User with this email or phone already exist".to_string())
            .into_response();
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        phone,
        first_name: req.first_name,
        last_name: req.last_name,
        permission,
        groups: req.groups.unwrap_or_default(),
        created: chrono::Utc::now().to_rfc3339(),
    };

    let pk = format!("USER#{}", user.id);
    let mut put = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(pk.clone()))
        .item("SK", AttributeValue::S(pk))
        .item("entity_type", AttributeValue::S("user".to_string()))
        .item("email", AttributeValue::S(user.email.clone()))
        .item("phone", AttributeValue::S(user.phone.clone()))
        .item("permission", AttributeValue::S(user.permission.clone()))
        .item("created", AttributeValue::S(user.created.clone()));

    if let Some(first_name) = &user.first_name {
        put = put.item("first_name", AttributeValue::S(first_name.clone()));
    }
    if let Some(last_name) = &user.last_name {
        put = put.item("last_name", AttributeValue::S(last_name.clone()));
    }
    // A string set may not be empty; absent attribute means no memberships
    if !user.groups.is_empty() {
        put = put.item("groups", AttributeValue::Ss(user.groups.clone()));
    }

    put.send().await?;

    tracing::info!("User created: {}", user.id);
    notifier.notify(ChangeEvent::users());

    json_response(
        StatusCode::OK,
        &serde_json::json!({"user": user, "session": session, "message": "register"}),
    )
}

/// Patch a user. The moderator gate and the permission check apply only when
/// the patch carries a permission
pub async fn update_user(
    client: &DynamoClient,
    notifier: &dyn Notifier,
    table_name: &str,
    session: &Session,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    if let Err(err) = ids::parse_user_id(user_id) {
        return err.into_response();
    }

    let req: UpdateUserRequest = serde_json::from_slice(body)?;

    if let Some(permission) = req.permission.as_deref().filter(|p| !p.is_empty()) {
        if session.is_moderator() && permission != "user" {
            return ApiError::Forbidden(
                "Moderator can create user only with \"user\" permission".to_string(),
            )
            .into_response();
        }
        if permission.parse::<Permission>().is_err() {
            return ApiError::BadRequest("permission type does not exist".to_string())
                .into_response();
        }
    }

    let mut update_expr = vec![];
    let mut expr_names = HashMap::new();
    let mut patched: Vec<(&str, String)> = vec![];

    if let Some(first_name) = req.first_name.filter(|v| !v.is_empty()) {
        update_expr.push("first_name = :first_name");
        patched.push(("first_name", first_name));
    }
    if let Some(last_name) = req.last_name.filter(|v| !v.is_empty()) {
        update_expr.push("last_name = :last_name");
        patched.push(("last_name", last_name));
    }
    if let Some(email) = req.email.filter(|v| !v.is_empty()) {
        update_expr.push("email = :email");
        patched.push(("email", email));
    }
    if let Some(phone) = req.phone.filter(|v| !v.is_empty()) {
        update_expr.push("phone = :phone");
        patched.push(("phone", phone));
    }
    if let Some(permission) = req.permission.filter(|v| !v.is_empty()) {
        update_expr.push("#permission = :permission");
        expr_names.insert("#permission".to_string(), "permission".to_string());
        patched.push(("permission", permission));
    }

    let pk = format!("USER#{}", user_id);

    if update_expr.is_empty() {
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
            ApiError::NotFound("User not found".to_string()).into_response()
        };
    }

    let mut builder = client
        .update_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .update_expression(format!("SET {}", update_expr.join(", ")))
        .condition_expression("attribute_exists(PK)")
        .return_values(ReturnValue::AllOld);

    for (k, v) in expr_names {
        builder = builder.expression_attribute_names(k, v);
    }
    for (attr, value) in &patched {
        builder = builder
            .expression_attribute_values(format!(":{}", attr), AttributeValue::S(value.clone()));
    }

    let result = builder.send().await;

    match result {
        Ok(output) => {
            let mut attributes = output.attributes.unwrap_or_default();

            let modified = patched.iter().any(|(attr, value)| {
                attributes.get(*attr).and_then(|v| v.as_s().ok()).map(|s| s.as_str())
                    != Some(value.as_str())
            });
            if !modified {
                return ApiError::BadRequest("Not modified".to_string()).into_response();
            }

            for (attr, value) in patched {
                attributes.insert(attr.to_string(), AttributeValue::S(value));
            }
            let user = user_from_item(&attributes);

            tracing::info!("User updated: {}", user_id);
            notifier.notify(ChangeEvent::users());

            json_response(
                StatusCode::OK,
                &serde_json::json!({"result": user, "message": "User update success"}),
            )
        }
        Err(err) => {
            if err
                .as_service_error()
                .map(|e| e.is_conditional_check_failed_exception())
                .unwrap_or(false)
            {
                return ApiError::NotFound("User not found".to_string()).into_response();
            }
            Err(err.into())
        }
    }
}

/// Delete a user
pub async fn delete_user(
    client: &DynamoClient,
    notifier: &dyn Notifier,
    table_name: &str,
    user_id: &str,
) -> Result<Response<Body>, Error> {
    if let Err(err) = ids::parse_user_id(user_id) {
        return err.into_response();
    }
    let pk = format!("USER#{}", user_id);

    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk.clone()))
        .send()
        .await?;

    if result.item().is_none() {
        return ApiError::NotFound("User not found".to_string()).into_response();
    }

    client
        .delete_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    tracing::info!("User deleted: {}", user_id);
    notifier.notify(ChangeEvent::users());

    json_response(StatusCode::OK, &serde_json::json!({"message": "Delete success"}))
}

/// Add a group to a user's membership set. The duplicate check and the
/// append are one conditional write, so concurrent adds of the same pair
/// cannot both land
pub async fn add_group_to_user(
    client: &DynamoClient,
    notifier: &dyn Notifier,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: MembershipRequest = serde_json::from_slice(body).unwrap_or_default();
    let group_id = req.group_id.unwrap_or_default();

    if ids::parse_id(user_id, "Incorrect id").is_err()
        || ids::parse_id(&group_id, "Incorrect id").is_err()
    {
        return ApiError::InvalidArgument("Incorrect id".to_string()).into_response();
    }

    let user_pk = format!("USER#{}", user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(user_pk.clone()))
        .key("SK", AttributeValue::S(user_pk.clone()))
        .send()
        .await?;
    if result.item().is_none() {
        return ApiError::InvalidArgument("User does not exist".to_string()).into_response();
    }

    if !group_exists(client, table_name, &group_id).await? {
        return ApiError::Forbidden("Group does not exist".to_string()).into_response();
    }

    let result = client
        .update_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(user_pk.clone()))
        .key("SK", AttributeValue::S(user_pk))
        .update_expression("ADD #groups :group")
        .condition_expression("NOT contains(#groups, :gid)")
        .expression_attribute_names("#groups", "groups")
        .expression_attribute_values(":group", AttributeValue::Ss(vec![group_id.clone()]))
        .expression_attribute_values(":gid", AttributeValue::S(group_id.clone()))
        .return_values(ReturnValue::AllNew)
        .send()
        .await;

    match result {
        Ok(output) => {
            let groups = output
                .attributes()
                .and_then(|a| a.get("groups"))
                .and_then(|v| v.as_ss().ok())
                .cloned()
                .unwrap_or_default();

            tracing::info!("Group {} added to user {}", group_id, user_id);
            notifier.notify(ChangeEvent::users());

            json_response(
                StatusCode::OK,
                &serde_json::json!({"groups": groups, "userId": user_id, "message": "Add success"}),
            )
        }
        Err(err) => {
            if err
                .as_service_error()
                .map(|e| e.is_conditional_check_failed_exception())
                .unwrap_or(false)
            {
                return ApiError::Forbidden("Group already exist".to_string()).into_response();
            }
            Err(err.into())
        }
    }
}

/// Remove a group from a user's membership set, symmetric to the add
pub async fn remove_group_from_user(
    client: &DynamoClient,
    notifier: &dyn Notifier,
    table_name: &str,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let req: MembershipRequest = serde_json::from_slice(body).unwrap_or_default();
    let group_id = req.group_id.unwrap_or_default();

    if ids::parse_id(user_id, "Incorrect id").is_err()
        || ids::parse_id(&group_id, "Incorrect id").is_err()
    {
        return ApiError::InvalidArgument("Incorrect id".to_string()).into_response();
    }

    let user_pk = format!("USER#{}", user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(user_pk.clone()))
        .key("SK", AttributeValue::S(user_pk.clone()))
        .send()
        .await?;
    if result.item().is_none() {
        return ApiError::InvalidArgument("User does not exist".to_string()).into_response();
    }

    if !group_exists(client, table_name, &group_id).await? {
        return ApiError::Forbidden("Group does not exist".to_string()).into_response();
    }

    let result = client
        .update_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(user_pk.clone()))
        .key("SK", AttributeValue::S(user_pk))
        .update_expression("DELETE #groups :group")
        .condition_expression("contains(#groups, :gid)")
        .expression_attribute_names("#groups", "groups")
        .expression_attribute_values(":group", AttributeValue::Ss(vec![group_id.clone()]))
        .expression_attribute_values(":gid", AttributeValue::S(group_id.clone()))
        .return_values(ReturnValue::AllNew)
        .send()
        .await;

    match result {
        Ok(output) => {
            let groups = output
                .attributes()
                .and_then(|a| a.get("groups"))
                .and_then(|v| v.as_ss().ok())
                .cloned()
                .unwrap_or_default();

            tracing::info!("Group {} removed from user {}", group_id, user_id);
            notifier.notify(ChangeEvent::users());

            json_response(
                StatusCode::OK,
                &serde_json::json!({"groups": groups, "userId": user_id, "message": "Delete success"}),
            )
        }
        Err(err) => {
            if err
                .as_service_error()
                .map(|e| e.is_conditional_check_failed_exception())
                .unwrap_or(false)
            {
                return ApiError::Forbidden("Group does not exist in user list".to_string())
                    .into_response();
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use crate::session::SessionUser;
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

    fn moderator_session() -> Session {
        Session {
            id: Some("test-session".to_string()),
            user: Some(SessionUser {
                user_id: "mod-1".to_string(),
                permission: "moderator".to_string(),
            }),
        }
    }

    async fn body_of(response: Response<Body>) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn get_rejects_malformed_id_before_any_round_trip() {
        let response = get_user(&offline_client(), "roster", "nope").await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_of(response).await["message"], "Incorrect user id");
    }

    #[tokio::test]
    async fn create_enumerates_all_missing_fields_jointly() {
        let response = create_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &Session::default(),
            b"{}",
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            body_of(response).await["message"],
            "Fields: 'email', 'phone', 'permission' - required!"
        );
    }

    #[tokio::test]
    async fn create_flags_empty_groups_array() {
        let body = serde_json::json!({
            "email": "a@b.c",
            "phone": "123",
            "permission": "user",
            "groups": []
        });
        let response = create_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &Session::default(),
            body.to_string().as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            body_of(response).await["message"],
            "Field: 'groups' - required!"
        );
    }

    #[tokio::test]
    async fn moderator_cannot_create_administrator() {
        let body = serde_json::json!({
            "email": "a@b.c",
            "phone": "123",
            "permission": "administrator"
        });
        let response = create_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &moderator_session(),
            body.to_string().as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_of(response).await["message"],
            "Moderator can create user only with \"user\" permission"
        );
    }

    #[tokio::test]
    async fn unknown_permission_tier_is_rejected_for_any_caller() {
        let body = serde_json::json!({
            "email": "a@b.c",
            "phone": "123",
            "permission": "superadmin"
        });
        let response = create_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &Session::default(),
            body.to_string().as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_of(response).await["message"],
            "permission type does not exist"
        );
    }

    #[tokio::test]
    async fn update_gate_applies_only_when_permission_is_patched() {
        // Moderator patching a permission upward is rejected before any
        // store round trip
        let body = serde_json::json!({"permission": "administrator"});
        let response = update_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &moderator_session(),
            &uuid::Uuid::new_v4().to_string(),
            body.to_string().as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_rejects_unknown_permission_tier() {
        let body = serde_json::json!({"permission": "root"});
        let response = update_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &Session::default(),
            &uuid::Uuid::new_v4().to_string(),
            body.to_string().as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn membership_mutations_reject_malformed_ids() {
        let valid = uuid::Uuid::new_v4().to_string();
        let body = serde_json::json!({"groupId": "not-an-id"});

        let response = add_group_to_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &valid,
            body.to_string().as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_of(response).await["message"], "Incorrect id");

        let response = remove_group_from_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            "not-an-id",
            serde_json::json!({"groupId": valid}).to_string().as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn membership_mutations_require_a_group_id() {
        let valid = uuid::Uuid::new_v4().to_string();
        let response = add_group_to_user(
            &offline_client(),
            &NoopNotifier,
            "roster",
            &valid,
            b"{}",
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_rejects_malformed_group_filter() {
        let response = list_users(&offline_client(), "roster", 1, 20, Some("bogus"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_of(response).await["message"], "Incorrect group id");
    }
}
