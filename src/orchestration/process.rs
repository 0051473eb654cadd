//! Child process plumbing: pipe readers and termination.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::{dlog_debug, dlog_warn};

use super::interpreter::{InterpreterEvent, StreamOrigin};

/// How long a terminated process gets to exit before SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_millis(2000);

const READ_BUF_SIZE: usize = 8192;

/// Read a pipe to EOF, forwarding UTF-8 text chunks in order.
///
/// Multi-byte sequences split across reads are held back until complete;
/// invalid bytes are replaced.
pub async fn forward_pipe<R>(
    mut pipe: R,
    origin: StreamOrigin,
    tx: mpsc::UnboundedSender<InterpreterEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let n = match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                dlog_debug!("{:?} pipe read error: {}", origin, e);
                break;
            }
        };
        carry.extend_from_slice(&buf[..n]);
        let text = take_utf8_prefix(&mut carry);
        if !text.is_empty() && tx.send(InterpreterEvent { origin, text }).is_err() {
            return;
        }
    }

    if !carry.is_empty() {
        let text = String::from_utf8_lossy(&carry).into_owned();
        let _ = tx.send(InterpreterEvent { origin, text });
    }
}

/// Split off the longest decodable prefix of `bytes`, leaving an
/// incomplete trailing sequence (at most 3 bytes) in place.
fn take_utf8_prefix(bytes: &mut Vec<u8>) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => {
            let text = s.to_string();
            bytes.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let rest = bytes.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(bytes).into_owned();
            *bytes = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            bytes.clear();
            text
        }
    }
}

/// Terminate a child: SIGTERM to its process group, then SIGKILL if it
/// has not exited within `grace`. Always reaps the child.
pub async fn terminate(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };

    #[cfg(unix)]
    signal_group(pid, libc::SIGTERM);
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if timeout(grace, child.wait()).await.is_err() {
        dlog_warn!("pid {} ignored SIGTERM for {:?}, killing", pid, grace);
        #[cfg(unix)]
        signal_group(pid, libc::SIGKILL);
        let _ = child.kill().await;
    }
}

/// SIGKILL whatever is left in the process group of an already reaped
/// child, such as a backgrounded grandchild still holding a pipe.
///
/// Only the group is signalled: the leader is gone and its pid may have
/// been reused.
pub fn kill_stragglers(pid: u32) {
    #[cfg(unix)]
    // SAFETY: kill(2) has no memory-safety preconditions.
    let _ = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let pid = pid as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let group_ok = unsafe { libc::kill(-pid, signal) } == 0;
    if !group_ok {
        // SAFETY: as above.
        unsafe {
            libc::kill(pid, signal);
        }
    }
}
