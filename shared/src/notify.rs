use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;
use aws_sdk_dynamodb::Client as DynamoClient;

use crate::sockets::broadcast::broadcast_to_all;
use crate::sockets::messages::PingMessage;

/// Signal emitted after a successful user mutation.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub payload: &'static str,
}

impl ChangeEvent {
    pub fn users() -> Self {
        Self { payload: "users" }
    }
}

/// Port for realtime change notification. Emission is fire-and-forget and
/// never blocks or fails the request that triggered it.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: ChangeEvent);
}

/// Used in tests and when no websocket endpoint is configured.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: ChangeEvent) {}
}

/// Pushes a ping to every registered websocket connection.
pub struct WebSocketNotifier {
    dynamo_client: DynamoClient,
    api_gateway_client: ApiGatewayManagementClient,
    table_name: String,
}

impl WebSocketNotifier {
    pub fn new(
        dynamo_client: DynamoClient,
        api_gateway_client: ApiGatewayManagementClient,
        table_name: String,
    ) -> Self {
        Self {
            dynamo_client,
            api_gateway_client,
            table_name,
        }
    }
}

impl Notifier for WebSocketNotifier {
    fn notify(&self, event: ChangeEvent) {
        let dynamo_client = self.dynamo_client.clone();
        let api_gateway_client = self.api_gateway_client.clone();
        let table_name = self.table_name.clone();

        tokio::spawn(async move {
            let message = PingMessage::new(event.payload);
            if let Err(e) =
                broadcast_to_all(&dynamo_client, &api_gateway_client, &table_name, &message).await
            {
                tracing::warn!("Change broadcast failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_event_names_the_users_collection() {
        assert_eq!(ChangeEvent::users().payload, "users");
    }

    #[test]
    fn noop_notifier_swallows_events() {
        NoopNotifier.notify(ChangeEvent::users());
    }
}
