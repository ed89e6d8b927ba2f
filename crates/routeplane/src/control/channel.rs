//! Control channel actor
//!
//! Owns the control-channel processor and serves it from a bounded mailbox.
//! Each message is resolved on the blocking pool under the evaluation
//! timeout; the resulting engine operation runs only if resolution finished
//! in time, so a timed-out `configure` never reaches the engine. A message whose `payload-classifier` is `code` first passes
//! through the route-config processor, so raw topology source can be sent
//! straight to the channel. Failures are logged and reported to requesters;
//! the actor always moves on to the next message.

use std::sync::Arc;
use std::time::Duration;

use routeplane_sdk::{Body, Exchange, Message, Processor};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::processor::{ControlAction, ControlChannelProcessor, SignalOutcome};
use super::route_config::RouteConfigProcessor;
use super::termination::TerminationChannel;
use super::ControlError;
use crate::bootstrap::RouteScriptLoader;
use crate::engine::ManagedEngine;
use crate::environment;
use crate::runtime::actor::{
    run_blocking, run_blocking_to_completion, spawn_actor, ActorHandle, ActorMessage,
};
use crate::topology::builder::RouteDefinitionBuilder;
use crate::topology::configurator::RouteConfigurator;

type Reply = oneshot::Sender<Result<SignalOutcome, ControlError>>;

/// Commands accepted by the control channel actor
pub enum ControlCommand {
    /// Fire and forget
    Deliver(Message),
    /// Process and reply with the outcome
    Request { message: Message, reply: Reply },
}

impl ActorMessage for ControlCommand {}

/// Actor tuning
#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    pub buffer: usize,
    pub eval_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            buffer: 64,
            eval_timeout: Duration::from_secs(10),
        }
    }
}

struct Worker {
    processor: Arc<ControlChannelProcessor>,
    route_config: Arc<RouteConfigProcessor>,
    termination: TerminationChannel,
    eval_timeout: Duration,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<ControlCommand>) {
        tracing::info!("Control channel started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                ControlCommand::Deliver(message) => {
                    let _ = self.handle(message).await;
                }
                ControlCommand::Request { message, reply } => {
                    let result = self.handle(message).await;
                    let _ = reply.send(result);
                }
            }
        }
        tracing::info!("Control channel stopped");
    }

    async fn handle(&self, message: Message) -> Result<SignalOutcome, ControlError> {
        let exchange_id = Uuid::new_v4();
        let classified = message
            .header_str(environment::PAYLOAD_CLASSIFIER)
            .is_some_and(|c| c.trim().eq_ignore_ascii_case(environment::CODE_CLASSIFIER));

        let processor = Arc::clone(&self.processor);
        let route_config = Arc::clone(&self.route_config);
        let resolver = Arc::clone(&processor);
        let resolve = move || -> Result<ControlAction, ControlError> {
            let message = if classified {
                let mut exchange = Exchange::new(exchange_id.to_string(), message);
                route_config.process(&mut exchange)?;
                exchange.into_out()
            } else {
                message
            };
            resolver.resolve(&message)
        };

        let result = match run_blocking(self.eval_timeout, resolve).await {
            Ok(Ok(action)) => run_blocking_to_completion(move || processor.apply(action))
                .await
                .unwrap_or_else(|e| Err(ControlError::Actor(e))),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ControlError::Actor(e)),
        };

        match &result {
            Ok(SignalOutcome::Terminate) => self.termination.signal(),
            Ok(outcome) => {
                tracing::debug!(exchange_id = %exchange_id, outcome = ?outcome, "Control message processed")
            }
            Err(e) => {
                tracing::error!(exchange_id = %exchange_id, error = %e, "Control message failed")
            }
        }
        result
    }
}

/// Handle to the running control channel.
#[derive(Clone)]
pub struct ControlChannel {
    handle: ActorHandle<ControlCommand>,
    processor: Arc<ControlChannelProcessor>,
    engine: Arc<dyn ManagedEngine>,
    termination: TerminationChannel,
    eval_timeout: Duration,
}

impl ControlChannel {
    /// Build the processor and spawn the actor. Must be called inside a
    /// tokio runtime.
    pub fn spawn(
        engine: Arc<dyn ManagedEngine>,
        configurator: RouteConfigurator,
        termination: TerminationChannel,
        settings: ChannelSettings,
    ) -> Result<Self, ControlError> {
        let processor = Arc::new(ControlChannelProcessor::new(
            Some(Arc::clone(&engine)),
            Some(configurator.clone()),
        )?);
        let worker = Worker {
            processor: Arc::clone(&processor),
            route_config: Arc::new(RouteConfigProcessor::new(configurator)),
            termination: termination.clone(),
            eval_timeout: settings.eval_timeout,
        };
        let handle = spawn_actor(settings.buffer.max(1), move |rx| worker.run(rx));

        Ok(Self {
            handle,
            processor,
            engine,
            termination,
            eval_timeout: settings.eval_timeout,
        })
    }

    /// Queue a message without waiting for it to be processed.
    pub async fn deliver(&self, message: Message) -> Result<(), ControlError> {
        self.handle.send(ControlCommand::Deliver(message)).await?;
        Ok(())
    }

    /// Queue a message and wait for its outcome.
    pub async fn request(&self, message: Message) -> Result<SignalOutcome, ControlError> {
        self.handle
            .request(|reply| ControlCommand::Request { message, reply })
            .await?
    }

    /// Send a `configure` message carrying a pre-built builder.
    pub async fn configure(
        &self,
        builder: RouteDefinitionBuilder,
    ) -> Result<SignalOutcome, ControlError> {
        let message = Message::with_body(Body::object(builder))
            .header_value(environment::SIGNAL, environment::SIG_CONFIGURE);
        self.request(message).await
    }

    pub async fn send_shutdown_signal(&self) -> Result<(), ControlError> {
        self.deliver(Message::new().header_value(environment::SIGNAL, environment::SIG_TERMINATE))
            .await
    }

    /// Wait for termination; returns whether it happened within `timeout`.
    pub async fn wait_shutdown(&self, timeout: Duration) -> bool {
        self.termination.wait_timeout(timeout).await
    }

    pub async fn send_shutdown_signal_and_wait(
        &self,
        timeout: Duration,
    ) -> Result<bool, ControlError> {
        self.send_shutdown_signal().await?;
        Ok(self.wait_shutdown(timeout).await)
    }

    /// Evaluate a script from a loader and add its routes to the engine
    /// directly, bypassing the signal protocol. Only evaluation is bounded
    /// by the timeout; nothing is added if it expires.
    pub async fn load(&self, loader: RouteScriptLoader) -> Result<usize, ControlError> {
        let engine = Arc::clone(&self.engine);
        let source = loader.source().to_string();
        let definition = run_blocking(self.eval_timeout, move || -> Result<_, ControlError> {
            Ok(loader.load()?.configure()?)
        })
        .await??;
        let added = run_blocking_to_completion(move || engine.add_routes(definition)).await??;
        tracing::info!(source = %source, routes = added, "Loaded route script");
        Ok(added)
    }

    /// Start the engine.
    pub fn activate(&self) -> Result<(), ControlError> {
        self.engine.start()?;
        Ok(())
    }

    pub fn processor(&self) -> Arc<ControlChannelProcessor> {
        Arc::clone(&self.processor)
    }

    pub fn termination(&self) -> &TerminationChannel {
        &self.termination
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("handle", &self.handle)
            .field("terminated", &self.termination.is_terminated())
            .finish()
    }
}
