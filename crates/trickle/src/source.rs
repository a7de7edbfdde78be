//! Input source classification.
//!
//! A regular file has a fixed size and no arrival rate of its own; a pipe,
//! socket, or terminal is live. Classification happens once at startup.

use std::fmt;
use std::io;
use std::os::fd::RawFd;

use crate::error::PacerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Regular file: seekable, instantly available.
    Regular,
    /// Pipe, socket, tty, or device producing bytes at its own pace.
    Live,
}

impl SourceKind {
    /// Classify an open file descriptor.
    pub fn detect(fd: RawFd) -> Result<Self, PacerError> {
        if is_regular(fd).map_err(PacerError::SourceKind)? {
            Ok(SourceKind::Regular)
        } else {
            Ok(SourceKind::Live)
        }
    }

    /// Classify standard input.
    pub fn stdin() -> Result<Self, PacerError> {
        Self::detect(libc::STDIN_FILENO)
    }

    pub fn is_regular(self) -> bool {
        self == SourceKind::Regular
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Regular => f.write_str("regular"),
            SourceKind::Live => f.write_str("live"),
        }
    }
}

/// `fstat` the descriptor and report whether it is a regular file.
pub fn is_regular(fd: RawFd) -> io::Result<bool> {
    // SAFETY: fstat only writes into the zeroed stat buffer we own.
    unsafe {
        let mut st: libc::stat = std::mem::zeroed();
        if libc::fstat(fd, &mut st) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((st.st_mode & libc::S_IFMT) == libc::S_IFREG)
    }
}
