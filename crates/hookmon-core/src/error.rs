use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Internal failures of the monitor.
///
/// None of these ever reach the monitored program: hooks log them and carry
/// on with the real call.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("reading configuration {}", path.display())]
    ConfigRead {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
    #[error("no event endpoint configured")]
    NoEndpoint,
    #[error("event channel busy for more than {0:?}")]
    LockTimeout(Duration),
    #[error("opening event endpoint {}", path.display())]
    EndpointOpen {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
    #[error("writing event endpoint")]
    EndpointWrite(#[source] io::Error),
    #[error("resolving path of descriptor {fd}")]
    Descriptor {
        #[source]
        source: io::Error,
        fd: i32,
    },
    #[error("replicating {} into {}", from.display(), to.display())]
    Replicate {
        #[source]
        source: io::Error,
        from: PathBuf,
        to: PathBuf,
    },
    #[error(transparent)]
    Errno(#[from] nix::errno::Errno),
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn replicate_error_names_both_paths() {
        let err = HookError::Replicate {
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            from: PathBuf::from("/tmp/a.txt"),
            to: PathBuf::from("/results/a.txt"),
        };
        assert_eq!(err.to_string(), "replicating /tmp/a.txt into /results/a.txt");
        assert!(err.source().is_some());
    }

    #[test]
    fn errno_is_transparent() {
        let err = HookError::from(nix::errno::Errno::ENXIO);
        assert_eq!(err.to_string(), nix::errno::Errno::ENXIO.to_string());
    }
}
