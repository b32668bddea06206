//! Transport addresses.
//!
//! A logical context name becomes an address by prefixing a scheme:
//!
//! | scheme      | transport                         |
//! |-------------|-----------------------------------|
//! | `inproc://` | same process, channel based       |
//! | `ipc://`    | Unix domain socket at the path    |
//! | `tcp://`    | TCP stream, `host:port`           |
//!
//! Names that already carry a known scheme are parsed as-is.

use std::fmt;

use crate::error::{IpcError, Result};

/// Transport scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    /// Same-process transport.
    #[default]
    Inproc,
    /// Cross-process local transport (Unix domain socket).
    Ipc,
    /// Networked transport.
    Tcp,
}

impl Scheme {
    /// URL prefix for this scheme.
    pub fn prefix(&self) -> &'static str {
        match self {
            Scheme::Inproc => "inproc://",
            Scheme::Ipc => "ipc://",
            Scheme::Tcp => "tcp://",
        }
    }

    const ALL: [Scheme; 3] = [Scheme::Inproc, Scheme::Ipc, Scheme::Tcp];
}

/// A resolved transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    scheme: Scheme,
    target: String,
}

impl Address {
    /// Resolve a logical name under the given scheme.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name (or the part after an explicit
    /// scheme) is empty.
    pub fn resolve(name: &str, scheme: Scheme) -> Result<Self> {
        for known in Scheme::ALL {
            if let Some(target) = name.strip_prefix(known.prefix()) {
                return Self::new(known, target);
            }
        }
        Self::new(scheme, name)
    }

    fn new(scheme: Scheme, target: &str) -> Result<Self> {
        if target.is_empty() {
            return Err(IpcError::InvalidArgument("empty name".to_string()));
        }
        Ok(Self {
            scheme,
            target: target.to_string(),
        })
    }

    /// Scheme of this address.
    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Scheme-specific part: inproc name, socket path, or `host:port`.
    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.scheme.prefix(), self.target)
    }
}
