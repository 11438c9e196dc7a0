use uuid::Uuid;

use crate::error::ApiError;

/// Validate a caller-supplied identifier before any store round trip is
/// issued. The message becomes the error body verbatim.
pub fn parse_id(raw: &str, message: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidArgument(message.to_string()))
}

pub fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    parse_id(raw, "Incorrect user id")
}

pub fn parse_group_id(raw: &str) -> Result<Uuid, ApiError> {
    parse_id(raw, "Incorrect group id")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_generated_identifiers() {
        let id = Uuid::new_v4().to_string();
        assert!(parse_id(&id, "Incorrect id").is_ok());
    }

    #[test]
    fn rejects_malformed_identifiers() {
        for bad in ["", "123", "not-a-uuid", "zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz"] {
            let err = parse_id(bad, "Incorrect id").unwrap_err();
            assert!(matches!(err, ApiError::InvalidArgument(_)));
        }
    }

    #[test]
    fn error_message_names_the_entity() {
        assert_eq!(
            parse_user_id("nope").unwrap_err().to_string(),
            "Incorrect user id"
        );
        assert_eq!(
            parse_group_id("nope").unwrap_err().to_string(),
            "Incorrect group id"
        );
    }
}
