use serde::Serialize;

/// Message pushed to every subscriber after a user mutation. Consumers treat
/// it as an invalidation hint and refetch.
#[derive(Debug, Serialize)]
pub struct PingMessage {
    pub r#type: String,
    pub payload: String,
}

impl PingMessage {
    pub fn new(payload: &str) -> Self {
        Self {
            r#type: "ping".to_string(),
            payload: payload.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_the_wire_shape() {
        let message = PingMessage::new("users");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ping", "payload": "users"}));
    }
}
