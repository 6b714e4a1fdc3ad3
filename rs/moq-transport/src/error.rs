use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{coding, message::Versions};

/// A transport error that can be shared between tasks.
pub trait SendSyncError: std::error::Error + Send + Sync {}

impl<T: std::error::Error + Send + Sync> SendSyncError for T {}

/// The application error code carried when a session is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
	NoError = 0x0,
	Generic = 0x1,
	Unauthorized = 0x2,
	ProtocolViolation = 0x3,
	DuplicateTrackId = 0x4,
	ParameterLengthMismatch = 0x5,
	SessionTerminated = 0x6,
}

/// A list of possible errors that can occur during the session.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	#[error("transport error: {0}")]
	Transport(Arc<dyn SendSyncError>),

	#[error("decode error: {0}")]
	Decode(#[from] coding::DecodeError),

	#[error("unsupported versions: client={0:?} server={1:?}")]
	Version(Versions, Versions),

	#[error("session closed")]
	Closed,

	#[error("cancelled")]
	Cancel,

	#[error("stream reset: code={0}")]
	Reset(u32),

	#[error("rejected: code={code} reason={reason}")]
	Rejected { code: u64, reason: String },

	#[error("duplicate")]
	Duplicate,

	#[error("not found")]
	NotFound,

	#[error("unknown track id: {0}")]
	UnknownTrack(u64),

	#[error("role does not permit this operation")]
	InvalidRole,

	#[error("protocol violation: {0}")]
	ProtocolViolation(&'static str),

	#[error("unexpected message")]
	UnexpectedMessage,

	#[error("going away")]
	GoAway,
}

impl Error {
	/// The session termination code for this error.
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Closed | Self::Cancel | Self::GoAway => ErrorCode::NoError,
			Self::Transport(_) | Self::Reset(_) | Self::Rejected { .. } | Self::NotFound | Self::UnknownTrack(_) => {
				ErrorCode::Generic
			}
			Self::Decode(coding::DecodeError::WrongSize) => ErrorCode::ParameterLengthMismatch,
			Self::Decode(_) | Self::InvalidRole | Self::ProtocolViolation(_) | Self::UnexpectedMessage => {
				ErrorCode::ProtocolViolation
			}
			Self::Duplicate => ErrorCode::DuplicateTrackId,
			Self::Version(..) => ErrorCode::SessionTerminated,
		}
	}

	/// An integer code that is sent over the wire.
	pub fn to_code(&self) -> u32 {
		match self {
			// Stream resets keep the peer's code.
			Self::Reset(code) => *code,
			_ => self.code().into(),
		}
	}

	/// Whether the error means the session is gone, rather than a single request failing.
	pub fn is_closed(&self) -> bool {
		matches!(self, Self::Closed | Self::Transport(_))
	}
}

impl From<coding::BoundsExceeded> for Error {
	fn from(_: coding::BoundsExceeded) -> Self {
		Self::Decode(coding::DecodeError::BoundsExceeded)
	}
}
