//! Event contract definitions

use std::fmt::Debug;

/// Marker for a statically declared set of events.
///
/// A contract is usually a zero-sized type declared with [`event_contract!`](crate::event_contract).
/// It never exists at runtime in any meaningful way; it only ties event names
/// to one emitter so names from another contract are rejected at compile time.
pub trait EventContract: Send + Sync + 'static {}

/// An event name belonging to contract `C`.
///
/// Each event is a unit type carrying its display name and the payload type
/// its listeners receive.
pub trait Event<C: EventContract>: Copy + Debug + Send + Sync + 'static {
    /// Name used in logs and errors
    const NAME: &'static str;

    /// Data handed to every listener of this event
    type Payload: Send + Sync + 'static;
}

/// Declare an event contract and its events.
///
/// # Examples
///
/// ```rust,ignore
/// use typed_emitter::event_contract;
///
/// #[derive(Debug)]
/// pub struct DataPayload {
///     pub first: String,
///     pub second: String,
/// }
///
/// event_contract! {
///     /// Events raised by a download task
///     pub DownloadEvents {
///         Data => DataPayload,
///         Finished => (),
///     }
/// }
/// ```
#[macro_export]
macro_rules! event_contract {
    (
        $(#[$meta:meta])*
        $vis:vis $contract:ident {
            $(
                $(#[$event_meta:meta])*
                $event:ident => $payload:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $contract;

        impl $crate::EventContract for $contract {}

        $(
            $(#[$event_meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
            $vis struct $event;

            impl $crate::Event<$contract> for $event {
                const NAME: &'static str = stringify!($event);
                type Payload = $payload;
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::TypeId;

    #[derive(Debug)]
    #[allow(dead_code)]
    struct Progress {
        percent: u8,
    }

    crate::event_contract! {
        TestEvents {
            Started => (),
            /// Progress update
            Advanced => Progress,
        }
    }

    fn name_of<E: Event<TestEvents>>(_event: E) -> &'static str {
        E::NAME
    }

    #[test]
    fn test_event_names() {
        assert_eq!(name_of(Started), "Started");
        assert_eq!(name_of(Advanced), "Advanced");
    }

    #[test]
    fn test_event_payload_types() {
        assert_eq!(
            TypeId::of::<<Advanced as Event<TestEvents>>::Payload>(),
            TypeId::of::<Progress>()
        );
        assert_eq!(
            TypeId::of::<<Started as Event<TestEvents>>::Payload>(),
            TypeId::of::<()>()
        );
    }
}
