//! Strongly typed identifiers for external connections and provider configurations.
//!
//! Both identifiers travel verbatim in the `Connection-Id` and `Provider-Config-Key`
//! headers, so they are restricted to visible ASCII without whitespace.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates `value` and wraps it.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				let value = value.into();

				check_header_safe($kind, &value)?;

				Ok(Self(value))
			}

			/// Borrowed string view.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

def_id! { ConnectionId, "Identifier of one authorized external connection.", "Connection" }
def_id! { ProviderConfigKey, "Provider configuration a connection uses.", "ProviderConfigKey" }

/// Longest identifier accepted, in bytes.
pub const IDENTIFIER_MAX_LEN: usize = 255;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Which identifier failed.
		kind: &'static str,
	},
	/// The identifier contains whitespace, a control character, or non-ASCII text.
	#[error("{kind} identifier contains {character:?}, which cannot be sent in a header.")]
	NotHeaderSafe {
		/// Which identifier failed.
		kind: &'static str,
		/// First offending character.
		character: char,
	},
	/// The identifier is longer than [`IDENTIFIER_MAX_LEN`] bytes.
	#[error("{kind} identifier is {len} bytes, the limit is {max}.")]
	TooLong {
		/// Which identifier failed.
		kind: &'static str,
		/// Actual length in bytes.
		len: usize,
		/// Permitted length in bytes.
		max: usize,
	},
}

fn check_header_safe(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
	if value.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if let Some(character) = value.chars().find(|c| !c.is_ascii_graphic()) {
		return Err(IdentifierError::NotHeaderSafe { kind, character });
	}
	if value.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, len: value.len(), max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
