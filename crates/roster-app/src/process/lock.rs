//! Single-instance detection through an exclusively bound loopback port.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};

use thiserror::Error;
use tracing::{debug, info};

use super::PROCESS_TARGET;

/// Errors raised while acquiring the instance lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the port.
    #[error("another instance is already running (lock port {port} is bound): {source}")]
    DuplicateInstance {
        /// Port that could not be bound.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },
    /// Binding failed for a reason other than an existing owner.
    #[error("failed to bind lock port {port}: {source}")]
    Bind {
        /// Port that could not be bound.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },
}

impl LockError {
    /// Port the failed acquisition targeted.
    #[must_use]
    pub const fn port(&self) -> u16 {
        match self {
            Self::DuplicateInstance { port, .. } | Self::Bind { port, .. } => *port,
        }
    }
}

/// Entry point for acquiring the instance lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingletonLock;

impl SingletonLock {
    /// Binds `127.0.0.1:port` once, without retrying.
    ///
    /// Port `0` binds an ephemeral port; [`LockHandle::port`] then reports the
    /// port actually held.
    pub fn acquire(port: u16) -> Result<LockHandle, LockError> {
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(address).map_err(|source| {
            if source.kind() == io::ErrorKind::AddrInUse {
                LockError::DuplicateInstance { port, source }
            } else {
                LockError::Bind { port, source }
            }
        })?;
        let bound = listener
            .local_addr()
            .map(|local| local.port())
            .unwrap_or(port);
        info!(
            target: PROCESS_TARGET,
            port = bound,
            "acquired instance lock"
        );
        Ok(LockHandle {
            port: bound,
            listener: Some(listener),
        })
    }
}

/// Exclusive ownership of the lock port. Released on drop.
#[derive(Debug)]
pub struct LockHandle {
    port: u16,
    listener: Option<TcpListener>,
}

impl LockHandle {
    /// Port held by this handle.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` while the port is still bound.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.listener.is_some()
    }

    /// Unbinds the port. Later calls are no-ops.
    ///
    /// Returns `true` when this call performed the release.
    pub fn release(&mut self) -> bool {
        match self.listener.take() {
            Some(listener) => {
                drop(listener);
                info!(
                    target: PROCESS_TARGET,
                    port = self.port,
                    "released instance lock"
                );
                true
            }
            None => {
                debug!(
                    target: PROCESS_TARGET,
                    port = self.port,
                    "instance lock already released"
                );
                false
            }
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.is_bound() {
            debug!(
                target: PROCESS_TARGET,
                port = self.port,
                "releasing instance lock on drop"
            );
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn second_acquire_on_held_port_is_duplicate() {
        let first = SingletonLock::acquire(0).expect("ephemeral bind should succeed");
        let error = SingletonLock::acquire(first.port()).expect_err("port is held");
        match error {
            LockError::DuplicateInstance { port, .. } => assert_eq!(port, first.port()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[rstest]
    fn port_can_be_reacquired_after_release() {
        let mut first = SingletonLock::acquire(0).expect("ephemeral bind should succeed");
        let port = first.port();
        assert!(first.release());
        assert!(!first.is_bound());
        let second = SingletonLock::acquire(port).expect("released port should bind again");
        assert_eq!(second.port(), port);
    }

    #[rstest]
    fn release_is_idempotent() {
        let mut handle = SingletonLock::acquire(0).expect("ephemeral bind should succeed");
        assert!(handle.release());
        assert!(!handle.release());
        assert!(!handle.release());
    }

    #[rstest]
    fn dropping_the_handle_releases_the_port() {
        let port = {
            let handle = SingletonLock::acquire(0).expect("ephemeral bind should succeed");
            handle.port()
        };
        let again = SingletonLock::acquire(port).expect("dropped handle should free the port");
        assert_eq!(again.port(), port);
    }
}
