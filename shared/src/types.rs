use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Authorization tiers a user can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Administrator,
    Moderator,
    User,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Administrator => "administrator",
            Permission::Moderator => "moderator",
            Permission::User => "user",
        }
    }
}

impl FromStr for Permission {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" => Ok(Permission::Administrator),
            "moderator" => Ok(Permission::Moderator),
            "user" => Ok(Permission::User),
            _ => Err(()),
        }
    }
}

// ========== USER ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub permission: String, // administrator | moderator | user
    pub groups: Vec<String>,
    pub created: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub permission: Option<String>,
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub permission: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    pub group_id: Option<String>,
}

// ========== GROUP ==========
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub created: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupRequest {
    pub name: Option<String>,
}

/// Loose falsy check applied to incoming body fields: null, false, zero,
/// the empty string, the empty array.
pub fn is_falsy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(_) => false,
    }
}

/// Collect every falsy submitted field plus every required field the body
/// omits, so one validation error can name them all.
pub fn required_params(body: &serde_json::Value, required: &[&str]) -> Vec<String> {
    let mut offending = Vec::new();

    if let serde_json::Value::Object(map) = body {
        for (key, value) in map {
            if is_falsy(value) {
                offending.push(key.clone());
            }
        }
        for key in required {
            if !map.contains_key(*key) {
                offending.push((*key).to_string());
            }
        }
    } else {
        offending.extend(required.iter().map(|k| (*k).to_string()));
    }

    offending
}

pub fn required_message(fields: &[String]) -> String {
    let label = if fields.len() > 1 { "Fields:" } else { "Field:" };
    format!("{} '{}' - required!", label, fields.join("', '"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_parses_known_tiers() {
        assert_eq!(
            "administrator".parse::<Permission>(),
            Ok(Permission::Administrator)
        );
        assert_eq!("moderator".parse::<Permission>(), Ok(Permission::Moderator));
        assert_eq!("user".parse::<Permission>(), Ok(Permission::User));
        assert!("superadmin".parse::<Permission>().is_err());
        assert!("Administrator".parse::<Permission>().is_err());
    }

    #[test]
    fn falsy_covers_the_loose_javascript_notion() {
        assert!(is_falsy(&serde_json::json!(null)));
        assert!(is_falsy(&serde_json::json!(false)));
        assert!(is_falsy(&serde_json::json!(0)));
        assert!(is_falsy(&serde_json::json!("")));
        assert!(is_falsy(&serde_json::json!([])));
        assert!(!is_falsy(&serde_json::json!("x")));
        assert!(!is_falsy(&serde_json::json!(["a"])));
        assert!(!is_falsy(&serde_json::json!(1)));
    }

    #[test]
    fn required_params_enumerates_missing_and_falsy() {
        let body = serde_json::json!({"email": "", "phone": "123"});
        let offending = required_params(&body, &["email", "phone", "permission"]);
        assert_eq!(offending, vec!["email", "permission"]);
    }

    #[test]
    fn required_message_formats_singular_and_plural() {
        assert_eq!(
            required_message(&["name".to_string()]),
            "Field: 'name' - required!"
        );
        assert_eq!(
            required_message(&["email".to_string(), "phone".to_string()]),
            "Fields: 'email', 'phone' - required!"
        );
    }
}
