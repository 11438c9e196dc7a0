pub mod types;
pub mod error;
pub mod ids;
pub mod groups;
pub mod users;
pub mod session;
pub mod notify;
pub mod sockets;

use aws_sdk_dynamodb::Client as DynamoClient;
use std::sync::Arc;

use crate::notify::Notifier;

/// Shared application state
pub struct AppState {
    pub dynamo_client: DynamoClient,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(dynamo_client: DynamoClient, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new(Self {
            dynamo_client,
            notifier,
        })
    }
}
