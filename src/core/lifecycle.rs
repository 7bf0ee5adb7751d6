//! Listener lifecycle.
//!
//! ```text
//! Unstarted ──bind ok──▶ Listening ──signal──▶ ShuttingDown ──▶ Terminated
//!     └────────bind error──────────────────────────────────────────▲
//! ```
//!
//! Each transition happens at most once; repeated signals are no-ops.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::TcpListener;

const LISTEN_BACKLOG: i32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Unstarted = 0,
    Listening = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Unstarted,
            1 => LifecycleState::Listening,
            2 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Terminated,
        }
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Unstarted as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }

    pub fn mark_listening(&self) -> Result<(), LifecycleError> {
        self.transition(LifecycleState::Unstarted, LifecycleState::Listening)
            .map_err(|from| LifecycleError::InvalidTransition {
                from,
                to: LifecycleState::Listening,
            })
    }

    /// Accepts a lifecycle that is already Listening; anything past it is an error.
    pub fn ensure_listening(&self) -> Result<(), LifecycleError> {
        match self.transition(LifecycleState::Unstarted, LifecycleState::Listening) {
            Ok(()) | Err(LifecycleState::Listening) => Ok(()),
            Err(from) => Err(LifecycleError::InvalidTransition {
                from,
                to: LifecycleState::Listening,
            }),
        }
    }

    /// Returns true only for the call that moved Listening to ShuttingDown.
    pub fn begin_shutdown(&self) -> bool {
        match self.transition(LifecycleState::Listening, LifecycleState::ShuttingDown) {
            Ok(()) => {
                tracing::info!("Shutting down");
                true
            }
            Err(state) => {
                tracing::debug!(?state, "Shutdown already handled");
                false
            }
        }
    }

    /// Final transition, from ShuttingDown or from a failed start.
    pub fn mark_terminated(&self) -> bool {
        self.transition(LifecycleState::ShuttingDown, LifecycleState::Terminated)
            .or_else(|_| self.transition(LifecycleState::Unstarted, LifecycleState::Terminated))
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind a listener; the IPv6 wildcard also accepts IPv4-mapped peers.
pub fn bind_dual_stack(addr: SocketAddr) -> Result<TcpListener, LifecycleError> {
    let bind = || -> io::Result<TcpListener> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        if addr.is_ipv6() && addr.ip().is_unspecified() {
            socket.set_only_v6(false)?;
        }
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        TcpListener::from_std(socket.into())
    };
    bind().map_err(|source| LifecycleError::Bind { addr, source })
}
