//! Input reader: Dedicated thread moving raw input bytes into a channel.
//!
//! The frame loop never blocks on the terminal. This thread does the
//! blocking reads and forwards each batch through a crossbeam channel; the
//! engine drains the channel between frames and feeds the bytes to the
//! [`InputDecoder`](super::InputDecoder).

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handle to the reader thread.
#[derive(Debug)]
pub struct InputReader {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl InputReader {
    /// Spawn a reader over stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn() -> io::Result<(Self, Receiver<Vec<u8>>)> {
        Self::spawn_with(io::stdin())
    }

    /// Spawn a reader over any byte source.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn_with<R: Read + Send + 'static>(source: R) -> io::Result<(Self, Receiver<Vec<u8>>)> {
        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("tessera-input".to_string())
            .spawn(move || Self::read_loop(source, &flag, &tx))?;
        Ok((
            Self {
                handle: Some(handle),
                running,
            },
            rx,
        ))
    }

    fn read_loop<R: Read>(mut source: R, running: &AtomicBool, tx: &Sender<Vec<u8>>) {
        let mut buf = [0u8; 1024];
        while running.load(Ordering::Relaxed) {
            match source.read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("input closed");
                    break;
                }
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!(error = %e, "input read failed");
                    break;
                }
            }
        }
        running.store(false, Ordering::Relaxed);
    }

    /// Whether the thread is still reading.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Ask the thread to stop.
    ///
    /// A thread blocked in `read` exits after its next read returns; it is
    /// detached rather than joined so shutdown never hangs on the terminal.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_forwards_bytes_then_stops_at_eof() {
        let (reader, rx) = InputReader::spawn_with(io::Cursor::new(b"hello".to_vec())).unwrap();
        let mut received = Vec::new();
        while let Ok(bytes) = rx.recv_timeout(Duration::from_secs(1)) {
            received.extend(bytes);
        }
        assert_eq!(received, b"hello");
        assert!(!reader.is_running());
    }
}
