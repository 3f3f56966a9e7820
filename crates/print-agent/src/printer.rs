//! Where rendered bytes go: a raw TCP port, a device/spool file, or memory.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const TCP_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Jobs a `memory` printer keeps; older ones are dropped.
pub const MEMORY_JOB_LIMIT: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("unsupported printer target: {0}")]
    Unsupported(String),

    #[error("empty {0} target")]
    Empty(&'static str),
}

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("printer {target} unreachable: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {target} failed: {source}")]
    Write {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("printer {0} timed out")]
    Timeout(String),

    #[error("in-memory printer is unavailable")]
    Poisoned,
}

/// Parsed `PRINTER_TARGET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterTarget {
    /// `tcp://host:port`, usually port 9100.
    Tcp(String),
    /// `file:<path>`, e.g. `/dev/usb/lp0`.
    File(PathBuf),
    /// Keeps the last [`MEMORY_JOB_LIMIT`] jobs; nothing is printed.
    Memory,
}

impl FromStr for PrinterTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("memory") {
            return Ok(Self::Memory);
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(TargetError::Empty("tcp"));
            }
            return Ok(Self::Tcp(addr.to_string()));
        }
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(TargetError::Empty("file"));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        Err(TargetError::Unsupported(s.to_string()))
    }
}

impl fmt::Display for PrinterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// A configured printer. Cloning shares the in-memory job log.
#[derive(Debug, Clone)]
pub struct Printer {
    target: PrinterTarget,
    jobs: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl Printer {
    pub fn new(target: PrinterTarget) -> Self {
        Self {
            target,
            jobs: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn target(&self) -> &PrinterTarget {
        &self.target
    }

    /// Jobs captured by a `memory` printer, oldest first.
    pub fn jobs(&self) -> Vec<Vec<u8>> {
        self.jobs
            .lock()
            .map(|j| j.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn write(&self, bytes: &[u8]) -> Result<(), PrinterError> {
        match &self.target {
            PrinterTarget::Tcp(addr) => write_tcp(addr, bytes).await,
            PrinterTarget::File(path) => write_file(path, bytes).await,
            PrinterTarget::Memory => {
                let mut jobs = self.jobs.lock().map_err(|_| PrinterError::Poisoned)?;
                if jobs.len() == MEMORY_JOB_LIMIT {
                    jobs.pop_front();
                }
                jobs.push_back(bytes.to_vec());
                Ok(())
            }
        }
    }
}

async fn write_tcp(addr: &str, bytes: &[u8]) -> Result<(), PrinterError> {
    let target = format!("tcp://{addr}");
    let mut stream = tokio::time::timeout(TCP_CONNECT_TIMEOUT, tokio::net::TcpStream::connect(addr))
        .await
        .map_err(|_| PrinterError::Timeout(target.clone()))?
        .map_err(|source| PrinterError::Connect {
            target: target.clone(),
            source,
        })?;

    let write = async {
        stream.write_all(bytes).await?;
        stream.flush().await?;
        stream.shutdown().await
    };
    tokio::time::timeout(TCP_WRITE_TIMEOUT, write)
        .await
        .map_err(|_| PrinterError::Timeout(target.clone()))?
        .map_err(|source| PrinterError::Write { target, source })
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PrinterError> {
    let target = format!("file:{}", path.display());
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| PrinterError::Connect {
            target: target.clone(),
            source,
        })?;
    file.write_all(bytes).await.map_err(|source| PrinterError::Write {
        target: target.clone(),
        source,
    })?;
    file.flush().await.map_err(|source| PrinterError::Write { target, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets() {
        assert_eq!("memory".parse::<PrinterTarget>().unwrap(), PrinterTarget::Memory);
        assert_eq!(
            "tcp://10.0.0.7:9100".parse::<PrinterTarget>().unwrap(),
            PrinterTarget::Tcp("10.0.0.7:9100".into())
        );
        assert_eq!(
            "file:/dev/usb/lp0".parse::<PrinterTarget>().unwrap(),
            PrinterTarget::File(PathBuf::from("/dev/usb/lp0"))
        );
        assert_eq!(
            "usb://printer".parse::<PrinterTarget>().unwrap_err(),
            TargetError::Unsupported("usb://printer".into())
        );
        assert_eq!("tcp://".parse::<PrinterTarget>().unwrap_err(), TargetError::Empty("tcp"));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["memory", "tcp://printer.local:9100", "file:/tmp/spool.bin"] {
            assert_eq!(raw.parse::<PrinterTarget>().unwrap().to_string(), raw);
        }
    }

    #[tokio::test]
    async fn memory_printer_keeps_jobs() {
        let printer = Printer::new(PrinterTarget::Memory);
        printer.write(b"one").await.unwrap();
        printer.clone().write(b"two").await.unwrap();
        assert_eq!(printer.jobs(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn memory_printer_keeps_only_recent_jobs() {
        let printer = Printer::new(PrinterTarget::Memory);
        for n in 0..MEMORY_JOB_LIMIT + 3 {
            printer.write(n.to_string().as_bytes()).await.unwrap();
        }
        let jobs = printer.jobs();
        assert_eq!(jobs.len(), MEMORY_JOB_LIMIT);
        assert_eq!(jobs[0], b"3".to_vec());
        assert_eq!(jobs.last().unwrap(), &(MEMORY_JOB_LIMIT + 2).to_string().into_bytes());
    }

    #[tokio::test]
    async fn tcp_printer_receives_raw_bytes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let printer = Printer::new(PrinterTarget::Tcp(addr.to_string()));
        printer.write(&[0x1B, 0x40, b'h', b'i']).await.unwrap();
        assert_eq!(reader.await.unwrap(), vec![0x1B, 0x40, b'h', b'i']);
    }

    #[tokio::test]
    async fn unreachable_tcp_printer_fails() {
        // Bind then drop so the port is closed.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let printer = Printer::new(PrinterTarget::Tcp(addr.to_string()));
        assert!(printer.write(b"x").await.is_err());
    }
}
