//! Strongly typed event emitter
//!
//! Listeners subscribe to events declared in a static contract; only the
//! owner of the [`Emitter`] can dispatch them.
//!
//! ## Features
//!
//! - **Typed contracts** - Event names and payload types are checked at compile time
//! - **Owner-only dispatch** - [`Subscriber`] can listen, only [`Emitter`] can emit
//! - **One-shot listeners** - Sequences cleared after the next emission settles
//! - **Sync and async listeners** - Async listeners run on the ambient Tokio runtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use typed_emitter::*;
//!
//! #[derive(Debug)]
//! pub struct DataPayload {
//!     pub first: String,
//!     pub second: String,
//! }
//!
//! event_contract! {
//!     pub DownloadEvents {
//!         Data => DataPayload,
//!         Finished => (),
//!     }
//! }
//!
//! pub struct Download {
//!     events: Emitter<DownloadEvents>,
//! }
//!
//! impl Download {
//!     pub fn events(&self) -> &Subscriber<DownloadEvents> {
//!         self.events.subscriber()
//!     }
//!
//!     fn finish(&self) -> Result<(), EmitterError> {
//!         self.events.emit(Finished, ())
//!     }
//! }
//!
//! let download = Download { events: Emitter::new() };
//!
//! let listener = download.events().on(Data, Listener::from_fn(|data: &DataPayload| {
//!     println!("{} {}", data.first, data.second);
//!     Ok(())
//! }));
//!
//! download.events().once(Finished, Listener::from_async(|_: Arc<()>| async move {
//!     println!("done");
//!     Ok(())
//! }));
//!
//! download.events().off(Data, &listener)?;
//! ```
//!
//! ## Dispatch
//!
//! With the default [`DispatchPolicy::FirstListener`] the first listener of a
//! sequence decides how the sequence is dispatched. When it is synchronous,
//! async listeners later in the same sequence are started but not tracked.
//!
//! ```rust,ignore
//! let emitter = EmitterBuilder::new()
//!     .dispatch(DispatchPolicy::PerListener) // track every async listener
//!     .enable_logging(false)
//!     .build::<DownloadEvents>();
//! ```

pub mod emitter;
pub mod event;
pub mod listener;
mod registry;

pub use emitter::{DispatchPolicy, Emitter, EmitterBuilder, EmitterConfig, EmitterError, Subscriber};
pub use event::{Event, EventContract};
pub use listener::{Listener, ListenerError, ListenerKind, ListenerResult};

/// Prelude for common imports
pub mod prelude {
    pub use crate::event_contract;
    pub use crate::{
        DispatchPolicy, Emitter, EmitterBuilder, EmitterConfig, EmitterError, Event,
        EventContract, Listener, ListenerError, Subscriber,
    };
}
