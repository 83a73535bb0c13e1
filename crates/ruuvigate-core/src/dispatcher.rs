//! Remote command listeners.
//!
//! One [`CommandDispatcher`] runs per supported command. It waits on its
//! [`CommandChannel`] for the next invocation, runs the handler against the
//! registry and sends the response back. The wait for the next invocation
//! is the only point where cancellation is observed, so a request that has
//! been received is always answered.
//!
//! A channel that closes underneath a running listener means the hub
//! connection is gone. The listener reports that through the shutdown
//! handle, which stops the gateway so a supervisor can restart it.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{CommandRequest, CommandResponse, DeviceCommand};
use crate::registry::DeviceRegistry;
use crate::shutdown::ShutdownHandle;

/// Inbound side of a remote command, bound to one command name.
pub trait CommandChannel: Send + Sync + 'static {
    /// Wait for the next invocation. `None` means the channel is gone.
    ///
    /// Must be cancel-safe: dropping the future loses no request.
    fn next(&mut self) -> impl Future<Output = Option<CommandRequest>> + Send;

    /// Answer the invocation identified by `request_id`.
    fn respond(
        &self,
        request_id: &str,
        response: &CommandResponse,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Long-running listener for one command.
pub struct CommandDispatcher<C> {
    command: DeviceCommand,
    channel: C,
    registry: Arc<DeviceRegistry>,
    shutdown: ShutdownHandle,
}

impl<C: CommandChannel> CommandDispatcher<C> {
    pub fn new(
        command: DeviceCommand,
        channel: C,
        registry: Arc<DeviceRegistry>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            command,
            channel,
            registry,
            shutdown,
        }
    }

    /// Serve invocations until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(command = %self.command, "command listener started");

        loop {
            let request = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                request = self.channel.next() => request,
            };

            let Some(request) = request else {
                if !cancel.is_cancelled() {
                    warn!(command = %self.command, "command channel closed");
                    self.shutdown
                        .disconnected(format!("command channel for {} closed", self.command));
                }
                break;
            };
            self.handle(request).await;
        }

        debug!(command = %self.command, "command listener stopped");
    }

    async fn handle(&self, request: CommandRequest) {
        debug!(command = %self.command, request_id = %request.request_id, "command received");

        let outcome = self.command.execute(&request.payload, &self.registry).await;
        let (response, fatal) = match outcome {
            Ok(response) => (response, None),
            Err(e) => {
                let response = CommandResponse::rejected(format!("Failed to update RuuviTags: {e}"));
                (response, Some(e))
            }
        };

        if let Err(e) = self.channel.respond(&request.request_id, &response).await {
            warn!(
                command = %self.command,
                request_id = %request.request_id,
                error = %e,
                "failed to send command response"
            );
        } else {
            debug!(command = %self.command, status = response.status(), "command response sent");
        }

        if let Some(e) = fatal {
            self.shutdown.fail(e.to_string());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::shutdown::ShutdownCoordinator;

    const WAIT: Duration = Duration::from_secs(5);

    /// In-memory channel: requests go in through `tx`, responses come out
    /// through `responses`. The first `fail_sends` responses fail.
    struct MemoryChannel {
        rx: mpsc::UnboundedReceiver<CommandRequest>,
        responses: mpsc::UnboundedSender<(String, CommandResponse)>,
        fail_sends: Arc<AtomicUsize>,
    }

    impl CommandChannel for MemoryChannel {
        async fn next(&mut self) -> Option<CommandRequest> {
            self.rx.recv().await
        }

        async fn respond(&self, request_id: &str, response: &CommandResponse) -> Result<(), CoreError> {
            if self
                .fail_sends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CoreError::ChannelClosed);
            }
            self.responses
                .send((request_id.to_owned(), response.clone()))
                .map_err(|_| CoreError::ChannelClosed)
        }
    }

    struct Harness {
        _dir: TempDir,
        registry: Arc<DeviceRegistry>,
        requests: mpsc::UnboundedSender<CommandRequest>,
        responses: mpsc::UnboundedReceiver<(String, CommandResponse)>,
        channel: Option<MemoryChannel>,
        fail_sends: Arc<AtomicUsize>,
    }

    async fn harness(contents: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruuvitags");
        std::fs::write(&path, contents).unwrap();
        let registry = Arc::new(DeviceRegistry::open(&path).await.unwrap());
        let (requests, rx) = mpsc::unbounded_channel();
        let (tx, responses) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicUsize::new(0));
        Harness {
            _dir: dir,
            registry,
            requests,
            responses,
            channel: Some(MemoryChannel {
                rx,
                responses: tx,
                fail_sends: Arc::clone(&fail_sends),
            }),
            fail_sends,
        }
    }

    fn request(id: &str, command: DeviceCommand, payload: Value) -> CommandRequest {
        CommandRequest {
            request_id: id.into(),
            command: command.name().into(),
            payload,
        }
    }

    #[tokio::test]
    async fn serves_requests_in_order() {
        let mut h = harness("").await;
        let mut coordinator = ShutdownCoordinator::new();
        let dispatcher = CommandDispatcher::new(
            DeviceCommand::Add,
            h.channel.take().unwrap(),
            Arc::clone(&h.registry),
            coordinator.handle(),
        );
        coordinator.spawn("add", move |cancel| dispatcher.run(cancel));

        h.requests
            .send(request("1", DeviceCommand::Add, json!("12:34:56:78:90:AB")))
            .unwrap();
        h.requests
            .send(request("2", DeviceCommand::Add, json!("12:34:56:78:90:AB")))
            .unwrap();
        h.requests
            .send(request("3", DeviceCommand::Add, json!("bogus")))
            .unwrap();

        let mut got = Vec::new();
        for _ in 0..3 {
            let (id, resp) = tokio::time::timeout(WAIT, h.responses.recv())
                .await
                .unwrap()
                .unwrap();
            got.push((id, resp.status(), resp.data));
        }
        assert_eq!(
            got,
            vec![
                ("1".to_string(), 200, json!("RuuviTag 12:34:56:78:90:AB added")),
                ("2".to_string(), 400, json!("RuuviTag 12:34:56:78:90:AB already exists")),
                ("3".to_string(), 400, json!("Not a valid MAC address")),
            ]
        );
        assert_eq!(h.registry.len().await, 1);

        let reason = coordinator.run_until(async { "test".to_string() }).await;
        assert!(matches!(reason, crate::shutdown::ShutdownReason::Signal(_)));
    }

    #[tokio::test]
    async fn cancellation_while_waiting_sends_nothing() {
        let mut h = harness("").await;
        let coordinator = ShutdownCoordinator::new();
        let cancel = coordinator.child_token();
        let dispatcher = CommandDispatcher::new(
            DeviceCommand::List,
            h.channel.take().unwrap(),
            Arc::clone(&h.registry),
            coordinator.handle(),
        );
        let task = tokio::spawn(dispatcher.run(cancel.clone()));

        tokio::task::yield_now().await;
        cancel.cancel();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

        // The channel is dropped with the dispatcher; no response was queued.
        assert!(h.responses.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_failure_does_not_stop_the_listener() {
        let mut h = harness("AA:AA:AA:AA:AA:AA\n").await;
        h.fail_sends.store(1, Ordering::SeqCst);
        let coordinator = ShutdownCoordinator::new();
        let cancel = coordinator.child_token();
        let dispatcher = CommandDispatcher::new(
            DeviceCommand::List,
            h.channel.take().unwrap(),
            Arc::clone(&h.registry),
            coordinator.handle(),
        );
        let task = tokio::spawn(dispatcher.run(cancel.clone()));

        h.requests.send(request("lost", DeviceCommand::List, Value::Null)).unwrap();
        h.requests.send(request("kept", DeviceCommand::List, Value::Null)).unwrap();

        let (id, resp) = tokio::time::timeout(WAIT, h.responses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, "kept");
        assert_eq!(resp.data, json!(["AA:AA:AA:AA:AA:AA"]));

        cancel.cancel();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_channel_stops_the_gateway() {
        let mut h = harness("").await;
        let mut coordinator = ShutdownCoordinator::new();
        let dispatcher = CommandDispatcher::new(
            DeviceCommand::Remove,
            h.channel.take().unwrap(),
            Arc::clone(&h.registry),
            coordinator.handle(),
        );
        coordinator.spawn("poll", |cancel| async move { cancel.cancelled().await });
        coordinator.spawn("remove", move |cancel| dispatcher.run(cancel));
        drop(h.requests);

        let reason = tokio::time::timeout(WAIT, coordinator.run_until(std::future::pending()))
            .await
            .unwrap();
        assert!(
            matches!(
                reason,
                crate::shutdown::ShutdownReason::Disconnected(ref msg) if msg.contains("RemoveRuuviTag")
            ),
            "got {reason:?}"
        );
    }

    #[tokio::test]
    async fn persistence_failure_is_answered_then_escalated() {
        let mut h = harness("").await;
        let mut coordinator = ShutdownCoordinator::new();
        let handle = coordinator.handle();
        let dispatcher = CommandDispatcher::new(
            DeviceCommand::Add,
            h.channel.take().unwrap(),
            Arc::clone(&h.registry),
            coordinator.handle(),
        );
        coordinator.spawn("add", move |cancel| dispatcher.run(cancel));

        // Replace the store with a directory so the rename fails.
        let path = h.registry.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        h.requests
            .send(request("1", DeviceCommand::Add, json!("12:34:56:78:90:AB")))
            .unwrap();
        let (_, resp) = tokio::time::timeout(WAIT, h.responses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(h.registry.is_empty().await);

        let reason = tokio::time::timeout(WAIT, coordinator.run_until(std::future::pending()))
            .await
            .unwrap();
        assert!(handle.is_shutting_down());
        assert!(
            matches!(reason, crate::shutdown::ShutdownReason::Fatal(ref msg) if msg.contains("persist")),
            "got {reason:?}"
        );
    }
}
