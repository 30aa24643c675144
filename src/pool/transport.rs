//! One-shot result channel between a worker and the pool.
//!
//! Each job gets an anonymous temporary file that is already unlinked when
//! the pool forks, so it is reachable only through the inherited descriptor.
//! The worker writes one MessagePack-encoded [`Outcome`] and exits; the pool
//! reads it back after the exit. An empty file means the worker never wrote
//! anything.
//!
//! MessagePack keeps floats bit-exact, so NaN and infinities survive the
//! trip. Structs are written with field names so the encoding stays
//! self-describing.

use super::outcome::Outcome;
use crate::error::TransportError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory filesystem preferred for transports when present.
const SHM_DIR: &str = "/dev/shm";

/// Pick the directory transports are created in.
///
/// An explicit directory wins; otherwise `/dev/shm` when the host has it,
/// falling back to the system temp directory.
pub fn transport_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    let shm = Path::new(SHM_DIR);
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Unlinked temporary file carrying one job's result.
#[derive(Debug)]
pub struct Transport {
    file: File,
}

impl Transport {
    /// Create a private, already-unlinked file in `dir`.
    pub fn open_in(dir: &Path) -> io::Result<Self> {
        let file = tempfile::tempfile_in(dir)?;
        Ok(Self { file })
    }

    /// Worker side: encode `outcome` into the file and flush it.
    pub fn write_result<T: Serialize>(&self, outcome: &Outcome<T>) -> io::Result<()> {
        let mut writer = BufWriter::new(&self.file);
        rmp_serde::encode::write_named(&mut writer, outcome).map_err(io::Error::other)?;
        writer.flush()
    }

    /// Pool side: read the outcome written by worker `pid`.
    ///
    /// Consumes the transport, so the descriptor is closed on every path.
    pub fn read_result<T: DeserializeOwned>(self, pid: i32) -> Result<Outcome<T>, TransportError> {
        let mut file = self.file;
        let io_err = |e: io::Error| TransportError::Io {
            pid,
            source: Arc::new(e),
        };

        let len = file.metadata().map_err(io_err)?.len();
        if len == 0 {
            return Err(TransportError::Empty { pid });
        }

        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        rmp_serde::decode::from_read(BufReader::new(&file)).map_err(|e| TransportError::Corrupt {
            pid,
            source: Arc::new(e),
        })
    }
}

impl AsFd for Transport {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Transport {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_transport_dir_prefers_configured() {
        let dir = tempdir().unwrap();
        assert_eq!(transport_dir(Some(dir.path())), dir.path());
    }

    #[test]
    fn test_transport_dir_default_exists() {
        assert!(transport_dir(None).is_dir());
    }

    #[test]
    fn test_transport_is_unlinked() {
        let dir = tempdir().unwrap();
        let _transport = Transport::open_in(dir.path()).unwrap();
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let transport = Transport::open_in(dir.path()).unwrap();
        transport
            .write_result(&Outcome::Value(vec![1, 2, 3]))
            .unwrap();

        let outcome: Outcome<Vec<i32>> = transport.read_result(1).unwrap();
        assert_eq!(outcome, Outcome::Value(vec![1, 2, 3]));
    }

    #[test]
    fn test_worker_error_survives_transport() {
        let dir = tempdir().unwrap();
        let transport = Transport::open_in(dir.path()).unwrap();
        transport
            .write_result(&Outcome::<()>::WorkerError(vec!["foo".into()]))
            .unwrap();

        let outcome: Outcome<()> = transport.read_result(1).unwrap();
        assert_eq!(outcome, Outcome::WorkerError(vec!["foo".into()]));
    }

    #[test]
    fn test_empty_transport_is_abnormal_exit() {
        let dir = tempdir().unwrap();
        let transport = Transport::open_in(dir.path()).unwrap();
        let err = transport.read_result::<i32>(99).unwrap_err();
        assert!(matches!(err, TransportError::Empty { pid: 99 }));
    }

    #[test]
    fn test_non_finite_floats_survive_transport() {
        let dir = tempdir().unwrap();
        let transport = Transport::open_in(dir.path()).unwrap();
        transport
            .write_result(&Outcome::Value(vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY]))
            .unwrap();

        match transport.read_result::<Vec<f64>>(1).unwrap() {
            Outcome::Value(values) => {
                assert!(values[0].is_nan());
                assert_eq!(values[1], f64::INFINITY);
                assert_eq!(values[2], f64::NEG_INFINITY);
            }
            other => panic!("Expected Value, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_transport_is_corrupt() {
        let dir = tempdir().unwrap();
        let transport = Transport::open_in(dir.path()).unwrap();
        let encoded = rmp_serde::to_vec_named(&Outcome::Value("a long enough string")).unwrap();
        (&transport.file)
            .write_all(&encoded[..encoded.len() / 2])
            .unwrap();

        let err = transport.read_result::<i32>(5).unwrap_err();
        assert!(matches!(err, TransportError::Corrupt { pid: 5, .. }));
    }
}
