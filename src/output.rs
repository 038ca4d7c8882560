//! Capturing job output.
//!
//! Both pipes of a job are drained while it runs so that a check printing a
//! lot of text never blocks on a full pipe.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Lines captured from one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Capture buffer shared between the draining task and the job's owner.
///
/// Lines are appended as soon as they are read, so whatever a job wrote
/// before it was terminated or abandoned can still be taken out.
#[derive(Debug, Clone, Default)]
pub struct SharedCapture(Arc<Mutex<Captured>>);

impl SharedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the lines captured so far out of the buffer.
    pub fn take(&self) -> Captured {
        std::mem::take(&mut *self.lock())
    }
}

/// Reads both streams to EOF concurrently into `into`.
pub async fn capture<O, E>(stdout: Option<O>, stderr: Option<E>, into: SharedCapture)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    join(
        async {
            if let Some(stream) = stdout {
                collect_lines(stream, |line| into.lock().stdout.push(line)).await;
            }
        },
        async {
            if let Some(stream) = stderr {
                collect_lines(stream, |line| into.lock().stderr.push(line)).await;
            }
        },
    )
    .await;
}

/// Splits a stream into lines ending at `\r` or `\n`.
///
/// Invalid UTF-8 is replaced with U+FFFD. A read error ends the capture with
/// whatever was collected so far.
pub async fn collect_lines<B, F>(stream: B, mut push: F)
where
    B: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if read_until2(&mut reader, b'\r', b'\n', &mut buf).await.is_err() {
            break;
        }
        // An empty buffer means that EOF was reached.
        if buf.is_empty() {
            break;
        }
        let line = match buf.last() {
            Some(b'\r') | Some(b'\n') => &buf[..buf.len() - 1],
            _ => &buf[..],
        };
        push(String::from_utf8_lossy(line).into_owned());
    }
}

/// Like `read_until`, but stops at whichever of two delimiters comes first.
/// The delimiter is kept in `buf`.
async fn read_until2<B: AsyncRead + Unpin>(
    reader: &mut BufReader<B>,
    delimiter1: u8,
    delimiter2: u8,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if let Some(i) = memchr::memchr2(delimiter1, delimiter2, available) {
                buf.extend_from_slice(&available[..=i]);
                (true, i + 1)
            } else {
                buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if done || used == 0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lines(input: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        collect_lines(input, |line| lines.push(line)).await;
        lines
    }

    #[tokio::test]
    async fn test_lines_split_on_either_delimiter() {
        let lines = lines(b"OK - 12.5 GB/s\nprogress 10%\rprogress 20%\nlast").await;
        assert_eq!(
            lines,
            vec!["OK - 12.5 GB/s", "progress 10%", "progress 20%", "last"]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let lines = lines(b"bad \xff byte\n").await;
        assert_eq!(lines, vec!["bad \u{FFFD} byte"]);
    }

    #[tokio::test]
    async fn test_capture_reads_both_streams() {
        let shared = SharedCapture::new();
        capture(Some(&b"out\n"[..]), Some(&b"err1\nerr2\n"[..]), shared.clone()).await;
        let captured = shared.take();
        assert_eq!(captured.stdout, vec!["out"]);
        assert_eq!(captured.stderr, vec!["err1", "err2"]);
        assert_eq!(shared.take(), Captured::default());

        let empty = SharedCapture::new();
        capture(None::<&[u8]>, None::<&[u8]>, empty.clone()).await;
        assert_eq!(empty.take(), Captured::default());
    }

    #[tokio::test]
    async fn test_lines_are_visible_before_eof() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let shared = SharedCapture::new();
        let task = tokio::spawn(capture(Some(reader), None::<&'static [u8]>, shared.clone()));

        tokio::io::AsyncWriteExt::write_all(&mut writer, b"partial\n").await.unwrap();
        for _ in 0..100 {
            if !shared.lock().stdout.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        task.abort();
        assert_eq!(shared.take().stdout, vec!["partial"]);
    }
}
