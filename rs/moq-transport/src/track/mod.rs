//! Per-track handles for publishing and consuming objects.
//!
//! A [SendTrack] opens a new unidirectional stream per object, or sends a datagram.
//! A [ReceiveTrack] is fed by the session's data loop, one [ObjectReader] per object, in the order the streams
//! were accepted.

mod object;
mod receive;
mod send;

pub use object::*;
pub use receive::*;
pub use send::*;

use crate::Error;

/// Delivered by the session to a receive track.
pub(crate) enum TrackEvent {
	Object(ObjectReader),

	/// No more objects: SubscribeDone, SubscribeError after the fact, or the session closed.
	Done(Result<(), Error>),
}
