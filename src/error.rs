use thiserror::Error;

/// Errors returned by store writes and token registration.
///
/// Lookups never fail: a missing, expired, reclaimed, or mistyped entry is
/// reported as `None`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
	#[error("operation not supported: {0}")]
	NotSupported(&'static str),

	#[error("store has a size limit, so every entry must specify a size")]
	SizeRequired,

	#[error("invalid entry option `{option}`: {reason}")]
	InvalidOption {
		option: &'static str,
		reason: &'static str,
	},
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
