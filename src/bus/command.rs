//! Command bus: exactly one handler per command type.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// A request to change one aggregate.
pub trait Command: Send + Sync {
    /// Routing key, e.g. `"player.create"`.
    fn command_type(&self) -> &'static str;

    /// The aggregate the command targets.
    fn aggregate_id(&self) -> Uuid;

    fn as_any(&self) -> &dyn Any;
}

/// Handles one or more command types.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: &dyn Command) -> Result<()>;
}

/// Routes commands to their single registered handler.
#[derive(Default)]
pub struct CommandBus {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a command type. A second registration for
    /// the same type is a wiring bug and is rejected.
    pub async fn register_handler(
        &self,
        command_type: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(command_type) {
            return Err(CoreError::HandlerAlreadyRegistered(command_type.to_string()));
        }
        handlers.insert(command_type.to_string(), handler);
        Ok(())
    }

    /// Dispatch a command and wait for the handler to finish.
    pub async fn send(&self, command: &dyn Command) -> Result<()> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers
                .get(command.command_type())
                .cloned()
                .ok_or_else(|| CoreError::HandlerNotFound(command.command_type().to_string()))?
        };

        debug!(
            command.command_type = command.command_type(),
            command.aggregate_id = %command.aggregate_id(),
            "dispatching command"
        );
        handler.handle(command).await
    }

    /// Dispatch without waiting. The returned channel resolves with the
    /// handler's outcome.
    pub async fn send_async(
        &self,
        command: Box<dyn Command>,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers
                .get(command.command_type())
                .cloned()
                .ok_or_else(|| CoreError::HandlerNotFound(command.command_type().to_string()))?
        };

        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = handler.handle(command.as_ref()).await;
            let _ = tx.send(result);
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping {
        aggregate_id: Uuid,
    }

    impl Command for Ping {
        fn command_type(&self) -> &'static str {
            "test.ping"
        }

        fn aggregate_id(&self) -> Uuid {
            self.aggregate_id
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandHandler for CountingHandler {
        async fn handle(&self, _command: &dyn Command) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_routes_to_registered_handler() {
        let bus = CommandBus::new();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        bus.register_handler("test.ping", handler.clone())
            .await
            .unwrap();

        bus.send(&Ping {
            aggregate_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_without_handler_fails() {
        let bus = CommandBus::new();
        let err = bus
            .send(&Ping {
                aggregate_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::HandlerNotFound(t) if t == "test.ping"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let bus = CommandBus::new();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        bus.register_handler("test.ping", handler.clone())
            .await
            .unwrap();
        let err = bus
            .register_handler("test.ping", handler)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::HandlerAlreadyRegistered(_)));
    }

    #[tokio::test]
    async fn test_send_async_resolves_with_handler_outcome() {
        let bus = CommandBus::new();
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        bus.register_handler("test.ping", handler.clone())
            .await
            .unwrap();

        let rx = bus
            .send_async(Box::new(Ping {
                aggregate_id: Uuid::new_v4(),
            }))
            .await
            .unwrap();
        rx.await.unwrap().unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
