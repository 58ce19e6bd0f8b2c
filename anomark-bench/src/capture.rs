//! Scoped diagnostic-output capture.
//!
//! Wraps an operation in a scope that redirects the active `tracing`
//! dispatcher into an in-memory buffer. On success the buffer is discarded
//! and the caller's output stream stays clean; on failure the buffered text
//! becomes the message of the returned error, with the original cause
//! chained underneath. The previous dispatcher is restored when the scope
//! ends, on both paths.

use std::io;
use std::sync::{Arc, Mutex};

use tracing::Level;

use crate::error::BenchError;

/// Runs `operation` with its diagnostic output redirected into a buffer.
pub fn captured<T, F>(operation: F) -> Result<T, BenchError>
where
    F: FnOnce() -> Result<T, BenchError>,
{
    let buffer: Arc<Mutex<Vec<u8>>> = Arc::default();
    let writer = BufferWriter(Arc::clone(&buffer));
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_target(true)
        .with_max_level(Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();

    match tracing::subscriber::with_default(subscriber, operation) {
        Ok(value) => Ok(value),
        Err(source) => {
            let log = match buffer.lock() {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => String::from("<captured output unavailable>"),
            };
            Err(BenchError::Captured {
                log,
                source: Box::new(source),
            })
        }
    }
}

#[derive(Clone)]
struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|_| io::Error::other("capture buffer poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_returns_the_value_and_discards_output() {
        let result = captured(|| {
            tracing::info!("noise that should vanish");
            Ok(17)
        });
        assert_eq!(result.unwrap(), 17);
    }

    #[test]
    fn failure_message_contains_every_captured_line() {
        let result: Result<(), BenchError> = captured(|| {
            tracing::info!("first diagnostic line");
            tracing::warn!("second diagnostic line");
            Err(BenchError::config("inner failure"))
        });
        let err = result.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("first diagnostic line"), "{message}");
        assert!(message.contains("second diagnostic line"), "{message}");

        let source = std::error::Error::source(&err).expect("cause preserved");
        assert!(source.to_string().contains("inner failure"));
    }

    #[test]
    fn previous_dispatcher_is_restored_after_the_scope() {
        // Nest captures: output emitted after the inner scope must land in
        // the outer buffer, and output inside the inner scope must not.
        let result: Result<(), BenchError> = captured(|| {
            let inner = captured(|| {
                tracing::info!("hidden inner line");
                Ok(())
            });
            assert!(inner.is_ok());
            tracing::info!("visible outer line");
            Err(BenchError::config("force outer capture"))
        });
        let message = result.unwrap_err().to_string();
        assert!(message.contains("visible outer line"), "{message}");
        assert!(!message.contains("hidden inner line"), "{message}");
    }
}
