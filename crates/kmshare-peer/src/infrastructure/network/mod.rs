//! Network infrastructure: the TCP session transport and UDP discovery.
//!
//! Both services follow the same worker shape: blocking sockets on
//! dedicated threads, poll timeouts of at most one second so a cleared
//! `running` flag is observed promptly, and channels (or registered
//! callbacks) toward the application layer.  Discovery is independently
//! owned and outlives any session.

pub mod discovery;
pub mod transport;

/// Returns `true` for OS timeout / would-block errors that should be retried.
pub(crate) fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
