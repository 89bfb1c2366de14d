//! Emitter implementation

use crate::event::{Event, EventContract};
use crate::listener::{Invocation, Listener, ListenerError, ListenerResult};
use crate::registry::{Lifetime, Registry};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

type Aggregate = BoxFuture<'static, Vec<ListenerResult>>;

/// How a listener sequence decides between tracked and untracked async dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// The first listener of the sequence decides for the whole sequence.
    ///
    /// If it is async, sync listeners still run inline during `emit` while
    /// every async body runs later on the spawned task, so a sync listener
    /// registered after the first one runs before it.
    ///
    /// If it is synchronous, later async listeners are started (their future
    /// is created and spawned) but their completion is not tracked: a one-shot
    /// sequence is cleared before they finish and their failures are only
    /// logged.
    #[default]
    FirstListener,

    /// Every async listener joins the tracked aggregate regardless of position
    PerListener,
}

/// Emitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Dispatch mode selection
    pub dispatch: DispatchPolicy,

    /// Enable registration and emission logging
    pub enable_logging: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchPolicy::FirstListener,
            enable_logging: true,
        }
    }
}

/// Emitter errors
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    #[error("Can't remove a listener. Event \"{0}\" doesn't exist.")]
    UnknownEvent(&'static str),

    #[error("Listener for event \"{event}\" failed: {source}")]
    ListenerFailed {
        event: &'static str,
        #[source]
        source: ListenerError,
    },

    #[error("Event \"{0}\" has async listeners but no Tokio runtime is running")]
    NoRuntime(&'static str),
}

/// Subscriber-facing half of an emitter.
///
/// Anyone holding a `Subscriber` can register, remove and count listeners,
/// but cannot dispatch. Clones share the same registries.
///
/// A listener that captures a `Subscriber` clone keeps the registries alive
/// through its own registration. Such a cycle is only broken by removing the
/// listener with [`Subscriber::off`] or by
/// [`Subscriber::remove_all_listeners`]; dropping the [`Emitter`] is not enough.
pub struct Subscriber<C: EventContract> {
    registry: Arc<Registry>,
    config: Arc<EmitterConfig>,
    _contract: PhantomData<fn() -> C>,
}

impl<C: EventContract> Subscriber<C> {
    /// Bind a listener that fires on every emission
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let listener = downloads.on(Data, Listener::from_fn(|data: &DataPayload| {
    ///     println!("{}", data.first);
    ///     Ok(())
    /// }));
    /// ```
    pub fn on<E: Event<C>>(
        &self,
        event: E,
        listener: Listener<E::Payload>,
    ) -> Listener<E::Payload> {
        self.register(event, Lifetime::Persistent, listener)
    }

    /// Bind a listener for the next emission only.
    ///
    /// The whole one-shot sequence of the event is dropped after that
    /// emission settles.
    pub fn once<E: Event<C>>(
        &self,
        event: E,
        listener: Listener<E::Payload>,
    ) -> Listener<E::Payload> {
        self.register(event, Lifetime::OneShot, listener)
    }

    fn register<E: Event<C>>(
        &self,
        _event: E,
        lifetime: Lifetime,
        listener: Listener<E::Payload>,
    ) -> Listener<E::Payload> {
        self.registry.push(TypeId::of::<E>(), lifetime, listener.clone());

        if self.config.enable_logging {
            debug!(
                event = E::NAME,
                kind = ?listener.kind(),
                ?lifetime,
                "Registered listener"
            );
        }

        listener
    }

    /// Remove every registration of `listener` for an event.
    ///
    /// Fails with [`EmitterError::UnknownEvent`] when neither registry holds
    /// an entry for the event. An entry emptied by an earlier `off` still
    /// counts as present. Removing a listener that is not registered is a
    /// no-op.
    pub fn off<E: Event<C>>(
        &self,
        _event: E,
        listener: &Listener<E::Payload>,
    ) -> Result<bool, EmitterError> {
        let key = TypeId::of::<E>();

        if !self.registry.is_known(key) {
            return Err(EmitterError::UnknownEvent(E::NAME));
        }

        self.registry.remove(key, listener);

        if self.config.enable_logging {
            debug!(event = E::NAME, "Removed listener");
        }

        Ok(true)
    }

    /// Remove all listeners of every event
    pub fn remove_all_listeners(&self) {
        self.registry.clear();

        if self.config.enable_logging {
            debug!("Removed all listeners");
        }
    }

    /// Get persistent plus one-shot listener count for an event
    pub fn listeners_count<E: Event<C>>(&self, _event: E) -> usize {
        let key = TypeId::of::<E>();
        self.registry.len::<E::Payload>(key, Lifetime::Persistent)
            + self.registry.len::<E::Payload>(key, Lifetime::OneShot)
    }
}

impl<C: EventContract> Clone for Subscriber<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            _contract: PhantomData,
        }
    }
}

/// Owner half of an emitter.
///
/// Only code holding the `Emitter` can call [`Emitter::emit`]. Keep it in a
/// private field of the owning type and expose [`Emitter::subscriber`] (or
/// deref to it) so callers can subscribe without being able to dispatch.
///
/// # Examples
///
/// ```rust,ignore
/// pub struct Download {
///     events: Emitter<DownloadEvents>,
/// }
///
/// impl Download {
///     pub fn events(&self) -> &Subscriber<DownloadEvents> {
///         self.events.subscriber()
///     }
///
///     fn on_chunk(&self, chunk: DataPayload) -> Result<(), EmitterError> {
///         self.events.emit(Data, chunk)
///     }
/// }
/// ```
pub struct Emitter<C: EventContract> {
    subscriber: Subscriber<C>,
}

impl<C: EventContract> Emitter<C> {
    /// Create new emitter
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    /// Create emitter with custom config
    pub fn with_config(config: EmitterConfig) -> Self {
        Self {
            subscriber: Subscriber {
                registry: Arc::new(Registry::new()),
                config: Arc::new(config),
                _contract: PhantomData,
            },
        }
    }

    /// Get the subscribe-only handle.
    ///
    /// Listeners capturing a clone of it form a reference cycle with the
    /// registries; see [`Subscriber`].
    pub fn subscriber(&self) -> &Subscriber<C> {
        &self.subscriber
    }

    /// Get the configuration
    pub fn config(&self) -> &EmitterConfig {
        &self.subscriber.config
    }

    /// Dispatch `data` to every listener of `event`.
    ///
    /// Both sequences are snapshotted when the call starts; persistent
    /// listeners are dispatched first, then one-shot listeners. Synchronous
    /// listeners run before this returns and the first failure aborts the pass.
    ///
    /// An async listener counts as started once its future has been created.
    /// Its body only runs when the task spawned on the current Tokio runtime
    /// polls it, so registration order holds for the synchronous part of a
    /// pass only: a sync listener registered after an async one runs first.
    /// The outcome of tracked async listeners never reaches the caller. The
    /// one-shot sequence is cleared once its dispatch settles, whether it
    /// failed or not.
    ///
    /// When any snapshotted listener is async and no Tokio runtime is
    /// running, [`EmitterError::NoRuntime`] is returned before any listener
    /// is invoked.
    pub fn emit<E: Event<C>>(&self, _event: E, data: E::Payload) -> Result<(), EmitterError> {
        let key = TypeId::of::<E>();
        let registry = &self.subscriber.registry;
        let logging = self.config().enable_logging;

        let persistent = registry.snapshot::<E::Payload>(key, Lifetime::Persistent);
        let one_shot = registry.snapshot::<E::Payload>(key, Lifetime::OneShot);

        if persistent.is_empty() && one_shot.is_empty() {
            if logging {
                trace!(event = E::NAME, "No listeners registered");
            }
            return Ok(());
        }

        let runtime = if persistent.iter().chain(&one_shot).any(Listener::is_async) {
            let handle = Handle::try_current().map_err(|_| EmitterError::NoRuntime(E::NAME))?;
            Some(handle)
        } else {
            None
        };
        let runtime = runtime.as_ref();

        let emission = Uuid::new_v4();
        let data = Arc::new(data);

        if !persistent.is_empty() {
            if logging {
                debug!(
                    event = E::NAME,
                    %emission,
                    listeners = persistent.len(),
                    "Emitting event"
                );
            }

            if let Some(aggregate) = self.dispatch(E::NAME, emission, runtime, &persistent, &data)? {
                spawn(runtime, E::NAME, async move {
                    report(E::NAME, emission, aggregate.await);
                })?;
            }
        }

        if one_shot.is_empty() {
            return Ok(());
        }

        if logging {
            debug!(
                event = E::NAME,
                %emission,
                listeners = one_shot.len(),
                "Emitting event to one-shot listeners"
            );
        }

        match self.dispatch(E::NAME, emission, runtime, &one_shot, &data) {
            Ok(Some(aggregate)) => {
                let shared = Arc::clone(registry);
                spawn(runtime, E::NAME, async move {
                    report(E::NAME, emission, aggregate.await);
                    shared.clear_one_shot(key);
                    if logging {
                        trace!(event = E::NAME, %emission, "Cleared one-shot listeners");
                    }
                })
            }
            outcome => {
                registry.clear_one_shot(key);
                if logging {
                    trace!(event = E::NAME, %emission, "Cleared one-shot listeners");
                }
                outcome.map(|_| ())
            }
        }
    }

    /// Invoke every listener of a snapshot in order.
    ///
    /// Returns the tracked aggregate when the sequence dispatches in async
    /// mode and at least one listener is pending.
    fn dispatch<P: Send + Sync + 'static>(
        &self,
        event: &'static str,
        emission: Uuid,
        runtime: Option<&Handle>,
        sequence: &[Listener<P>],
        data: &Arc<P>,
    ) -> Result<Option<Aggregate>, EmitterError> {
        let tracked = match self.config().dispatch {
            DispatchPolicy::FirstListener => sequence.first().is_some_and(Listener::is_async),
            DispatchPolicy::PerListener => true,
        };

        let mut pending = Vec::new();

        for listener in sequence {
            match listener.invoke(data) {
                Invocation::Completed(Ok(())) => {}
                Invocation::Completed(Err(source)) => {
                    error!(event, %emission, "Listener failed: {}", source);
                    // Already started listeners keep running untracked
                    if !pending.is_empty() {
                        spawn(runtime, event, async move {
                            report(event, emission, join_all(pending).await);
                        })?;
                    }
                    return Err(EmitterError::ListenerFailed { event, source });
                }
                Invocation::Pending(future) if tracked => pending.push(future),
                Invocation::Pending(future) => {
                    spawn(runtime, event, async move {
                        if let Err(e) = future.await {
                            warn!(event, %emission, "Untracked listener failed: {}", e);
                        }
                    })?;
                }
            }
        }

        if pending.is_empty() {
            return Ok(None);
        }

        Ok(Some(join_all(pending).boxed()))
    }
}

/// Spawn on the runtime resolved when the emission started
fn spawn<F>(runtime: Option<&Handle>, event: &'static str, task: F) -> Result<(), EmitterError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = runtime.ok_or(EmitterError::NoRuntime(event))?;
    handle.spawn(task);
    Ok(())
}

/// Log failures of a settled aggregate; they are not surfaced to the emitter
fn report(event: &'static str, emission: Uuid, results: Vec<ListenerResult>) {
    for e in results.into_iter().filter_map(Result::err) {
        error!(event, %emission, "Listener failed: {}", e);
    }
}

impl<C: EventContract> Default for Emitter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: EventContract> Deref for Emitter<C> {
    type Target = Subscriber<C>;

    fn deref(&self) -> &Self::Target {
        &self.subscriber
    }
}

/// Emitter builder
pub struct EmitterBuilder {
    config: EmitterConfig,
}

impl EmitterBuilder {
    /// Create new emitter builder
    pub fn new() -> Self {
        Self {
            config: EmitterConfig::default(),
        }
    }

    /// Set dispatch policy
    pub fn dispatch(mut self, policy: DispatchPolicy) -> Self {
        self.config.dispatch = policy;
        self
    }

    /// Enable/disable logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Build the emitter
    pub fn build<C: EventContract>(self) -> Emitter<C> {
        Emitter::with_config(self.config)
    }
}

impl Default for EmitterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
