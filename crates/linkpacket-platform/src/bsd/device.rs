//! Capture device acquisition

use std::io;
use std::path::{Path, PathBuf};

use linkpacket_core::{Error, Result};
use tracing::debug;

/// Number of `/dev/bpfN` nodes tried before giving up
pub const DEVICE_COUNT: usize = 256;

/// Path of the `n`th capture device
pub fn device_path(n: usize) -> PathBuf {
    PathBuf::from(format!("/dev/bpf{n}"))
}

fn is_busy(err: &io::Error) -> bool {
    // EBUSY is 16 on every BSD
    err.raw_os_error() == Some(16)
}

/// Open the first free device among `count` candidates
///
/// A busy device is skipped; any other failure ends the scan.
///
/// # Errors
/// The first non-busy open error, or [`Error::ResourceExhausted`] when
/// every device is busy.
pub fn scan<T, F>(count: usize, mut open: F) -> Result<(T, PathBuf)>
where
    F: FnMut(&Path) -> io::Result<T>,
{
    for n in 0..count {
        let path = device_path(n);
        match open(&path) {
            Ok(device) => {
                debug!(path = %path.display(), "Acquired capture device");
                return Ok((device, path));
            }
            Err(e) if is_busy(&e) => {
                debug!(path = %path.display(), "Capture device busy");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::ResourceExhausted(format!(
        "all {count} capture devices are busy"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> io::Error {
        io::Error::from_raw_os_error(16)
    }

    #[test]
    fn test_skips_busy_devices() {
        let (dev, path) = scan(256, |p| {
            if p == Path::new("/dev/bpf3") {
                Ok(3)
            } else {
                Err(busy())
            }
        })
        .unwrap();
        assert_eq!(dev, 3);
        assert_eq!(path, Path::new("/dev/bpf3"));
    }

    #[test]
    fn test_other_error_aborts() {
        let mut tried = 0;
        let err = scan::<(), _>(256, |_| {
            tried += 1;
            if tried == 2 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                Err(busy())
            }
        })
        .unwrap_err();
        assert_eq!(tried, 2);
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn test_all_busy_exhausted() {
        let mut tried = 0;
        let err = scan::<(), _>(DEVICE_COUNT, |_| {
            tried += 1;
            Err(busy())
        })
        .unwrap_err();
        assert_eq!(tried, DEVICE_COUNT);
        assert!(matches!(err, Error::ResourceExhausted(_)));
    }
}
