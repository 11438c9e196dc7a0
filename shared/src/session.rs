use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{Error, Request};
use serde::Serialize;

/// Acting session for the current request. Requests without a resolvable
/// session run as anonymous; the moderator gate then does not apply.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: String,
    pub permission: String,
}

impl Session {
    pub fn is_moderator(&self) -> bool {
        self.user
            .as_ref()
            .map(|u| u.permission == "moderator")
            .unwrap_or(false)
    }
}

/// Session id comes from the `X-Session-Id` header, or the `sid` cookie
fn session_id(event: &Request) -> Option<String> {
    event
        .headers()
        .get("X-Session-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| {
            event
                .headers()
                .get("Cookie")
                .and_then(|v| v.to_str().ok())
                .and_then(cookie_value)
        })
}

fn cookie_value(cookies: &str) -> Option<String> {
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == "sid").then(|| value.to_string())
    })
}

/// Resolve the acting session: look up the session document, then load the
/// referenced user for its permission
pub async fn resolve(
    client: &DynamoClient,
    table_name: &str,
    event: &Request,
) -> Result<Session, Error> {
    let Some(sid) = session_id(event) else {
        return Ok(Session::default());
    };

    let pk = format!("SESSION#{}", sid);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(pk))
        .send()
        .await?;

    let user_id = result
        .item()
        .and_then(|item| item.get("user_id"))
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string());

    let Some(user_id) = user_id else {
        tracing::warn!("Session {} has no resolvable user", sid);
        return Ok(Session {
            id: Some(sid),
            user: None,
        });
    };

    let user_pk = format!("USER#{}", user_id);
    let result = client
        .get_item()
        .table_name(table_name)
        .key("PK", AttributeValue::S(user_pk.clone()))
        .key("SK", AttributeValue::S(user_pk))
        .send()
        .await?;

    let user = result.item().map(|item| SessionUser {
        user_id: user_id.clone(),
        permission: item
            .get("permission")
            .and_then(|v| v.as_s().ok())
            .map(|s| s.to_string())
            .unwrap_or_default(),
    });

    Ok(Session {
        id: Some(sid),
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_http::Body;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request {
        let mut builder = lambda_http::http::Request::builder().uri("/users");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::Empty).unwrap()
    }

    #[test]
    fn session_id_prefers_the_header() {
        let event = request_with_headers(&[("X-Session-Id", "abc"), ("Cookie", "sid=def")]);
        assert_eq!(session_id(&event), Some("abc".to_string()));
    }

    #[test]
    fn session_id_falls_back_to_the_cookie() {
        let event = request_with_headers(&[("Cookie", "theme=dark; sid=def; lang=en")]);
        assert_eq!(session_id(&event), Some("def".to_string()));
    }

    #[test]
    fn missing_session_is_anonymous() {
        let event = request_with_headers(&[]);
        assert_eq!(session_id(&event), None);
        assert!(!Session::default().is_moderator());
    }

    #[test]
    fn moderator_check_reads_the_session_user() {
        let session = Session {
            id: Some("s".to_string()),
            user: Some(SessionUser {
                user_id: "u".to_string(),
                permission: "moderator".to_string(),
            }),
        };
        assert!(session.is_moderator());
    }
}
