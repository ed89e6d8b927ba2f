//! Actor system utilities
//!
//! Long-lived services run as async tasks that process commands from a
//! bounded mailbox. Work that may block (script evaluation, engine mutation)
//! is pushed onto the blocking pool with an upper bound on its duration.

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

/// Trait for actor messages - all commands sent to actors must implement this
pub trait ActorMessage: Send + 'static {}

/// Generic actor handle that can send commands to an actor
pub struct ActorHandle<C: ActorMessage> {
    sender: mpsc::Sender<C>,
}

// Manual Clone implementation that doesn't require C: Clone
impl<C: ActorMessage> Clone for ActorHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C: ActorMessage> ActorHandle<C> {
    /// Create a new actor handle from a sender
    pub fn new(sender: mpsc::Sender<C>) -> Self {
        Self { sender }
    }

    /// Send a command to the actor
    pub async fn send(&self, cmd: C) -> ActorResult<()> {
        self.sender.send(cmd).await?;
        Ok(())
    }

    /// Send a command carrying a reply channel and wait for the answer
    pub async fn request<R, F>(&self, make: F) -> ActorResult<R>
    where
        R: Send + 'static,
        F: FnOnce(oneshot::Sender<R>) -> C,
    {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        Ok(rx.await?)
    }

    /// Check if the actor is still alive (channel not closed)
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl<C: ActorMessage> fmt::Debug for ActorHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("is_alive", &self.is_alive())
            .finish()
    }
}

/// Spawn an actor task and return its handle
pub fn spawn_actor<C, F, Fut>(buffer_size: usize, actor_fn: F) -> ActorHandle<C>
where
    C: ActorMessage,
    F: FnOnce(mpsc::Receiver<C>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer_size);
    tokio::spawn(actor_fn(rx));
    ActorHandle::new(tx)
}

/// Run a blocking closure on the blocking pool, bounded by `timeout`.
///
/// On timeout the closure keeps running to completion in the background; its
/// result is discarded. Callers must not let such a closure commit anything
/// they report as failed.
pub async fn run_blocking<T, F>(timeout: Duration, work: F) -> ActorResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined_result(joined),
        Err(_) => Err(ActorError::Timeout),
    }
}

/// Run a blocking closure on the blocking pool and wait for it to finish.
pub async fn run_blocking_to_completion<T, F>(work: F) -> ActorResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    joined_result(tokio::task::spawn_blocking(work).await)
}

fn joined_result<T>(joined: Result<T, tokio::task::JoinError>) -> ActorResult<T> {
    match joined {
        Ok(value) => Ok(value),
        Err(join_err) if join_err.is_panic() => Err(ActorError::Panicked),
        Err(join_err) => Err(ActorError::OperationFailed(join_err.to_string())),
    }
}

/// Result type for actor operations with timeout
pub type ActorResult<T> = Result<T, ActorError>;

/// Errors that can occur in actor operations
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Actor channel closed")]
    ChannelClosed,

    #[error("Operation timed out")]
    Timeout,

    #[error("Actor panicked")]
    Panicked,

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl From<oneshot::error::RecvError> for ActorError {
    fn from(_: oneshot::error::RecvError) -> Self {
        ActorError::ChannelClosed
    }
}

impl<T> From<mpsc::error::SendError<T>> for ActorError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        ActorError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct PingCommand {
        reply: oneshot::Sender<String>,
    }

    impl ActorMessage for PingCommand {}

    #[tokio::test]
    async fn test_actor_request_reply() {
        let handle = spawn_actor(10, |mut rx: mpsc::Receiver<PingCommand>| async move {
            while let Some(cmd) = rx.recv().await {
                let _ = cmd.reply.send("pong".to_string());
            }
        });

        assert!(handle.is_alive());

        let response = handle.request(|reply| PingCommand { reply }).await.unwrap();
        assert_eq!(response, "pong");
    }

    #[tokio::test]
    async fn test_closed_actor_reports_channel_closed() {
        let handle = spawn_actor(1, |rx: mpsc::Receiver<PingCommand>| async move {
            drop(rx);
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = handle.request(|reply| PingCommand { reply }).await.unwrap_err();
        assert!(matches!(err, ActorError::ChannelClosed));
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_run_blocking_times_out() {
        let result = run_blocking(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(200));
            1
        })
        .await;
        assert!(matches!(result, Err(ActorError::Timeout)));

        let value = run_blocking(Duration::from_secs(1), || 2).await.unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_run_blocking_to_completion() {
        let value = run_blocking_to_completion(|| {
            std::thread::sleep(Duration::from_millis(30));
            3
        })
        .await
        .unwrap();
        assert_eq!(value, 3);

        let result: ActorResult<()> = run_blocking_to_completion(|| panic!("apply failed")).await;
        assert!(matches!(result, Err(ActorError::Panicked)));
    }

    #[tokio::test]
    async fn test_run_blocking_reports_panic() {
        let result: ActorResult<()> =
            run_blocking(Duration::from_secs(1), || panic!("evaluation blew up")).await;
        assert!(matches!(result, Err(ActorError::Panicked)));
    }
}
