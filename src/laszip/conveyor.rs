//! Moves the output of a child process to the caller without blocking the child.
//!
//! A child process that reads its stdin and writes its stdout at the same time
//! stops when its stdout pipe is full. If the caller is still busy writing
//! stdin at that point, neither side makes progress.
//! The [`PipeConveyor`] drains the pipe in a background thread into an
//! unbounded channel, so the child can always write.
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};

const READ_SIZE: usize = 64 * 1024;

/// Reads what the background thread collected, in order.
pub(crate) struct PipeConveyor {
    receiver: Receiver<io::Result<Vec<u8>>>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    current: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl PipeConveyor {
    pub(crate) fn new<P>(mut pipe: P, thread_name: &str) -> io::Result<Self>
    where
        P: Read + Send + 'static,
    {
        let (sender, receiver) = unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_clone = Arc::clone(&cancelled);

        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let mut buffer = vec![0u8; READ_SIZE];
                while !cancelled_clone.load(Ordering::Relaxed) {
                    match pipe.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => {
                            if sender.send(Ok(buffer[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            let _ = sender.send(Err(e));
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            receiver,
            cancelled,
            handle: Some(handle),
            current: vec![],
            consumed: 0,
            eof: false,
        })
    }

    /// Asks the background thread to stop.
    ///
    /// A thread blocked on a read only sees it once the read returns,
    /// that is, once the process on the other side is gone.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Read for PipeConveyor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.consumed == self.current.len() {
            if self.eof {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(data)) => {
                    self.current = data;
                    self.consumed = 0;
                }
                Ok(Err(e)) => {
                    self.eof = true;
                    return Err(e);
                }
                // the thread is done and everything it sent was received
                Err(_) => {
                    self.eof = true;
                    return Ok(0);
                }
            }
        }
        let available = &self.current[self.consumed..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consumed += n;
        Ok(n)
    }
}

impl Drop for PipeConveyor {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("The pipe conveyor thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_conveys_everything_in_order() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut conveyor = PipeConveyor::new(Cursor::new(data.clone()), "test-conveyor").unwrap();
        let mut received = vec![];
        conveyor.read_to_end(&mut received).unwrap();
        assert_eq!(received, data);
        let mut buf = [0u8; 4];
        assert_eq!(conveyor.read(&mut buf).unwrap(), 0);
    }

    struct FailingPipe;

    impl Read for FailingPipe {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_forwards_errors() {
        let mut conveyor = PipeConveyor::new(FailingPipe, "test-conveyor").unwrap();
        let mut buf = [0u8; 4];
        let err = conveyor.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
