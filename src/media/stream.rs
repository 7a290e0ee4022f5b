use super::types::ExtractError;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{info, warn};

/// Media bytes as they arrive from an extractor.
pub type ByteStream = BoxStream<'static, Result<Bytes, ExtractError>>;

/// Deferred stream that is only opened when the primary one breaks.
pub type StreamFuture = BoxFuture<'static, Result<ByteStream, ExtractError>>;

enum State {
    Primary {
        stream: ByteStream,
        fallback: StreamFuture,
        sent: u64,
    },
    Fallback {
        stream: ByteStream,
        skip: u64,
    },
    Done,
}

/// Yields `primary` until it fails, then switches to `fallback` exactly once.
///
/// The fallback must produce the same bytes from the start of the file. The
/// bytes the primary already delivered are skipped, so the output resumes at
/// the offset where the primary broke. An error from the fallback, or a
/// fallback that ends before reaching that offset, ends the stream.
pub fn with_fallback(primary: ByteStream, fallback: StreamFuture) -> ByteStream {
    let initial = State::Primary {
        stream: primary,
        fallback,
        sent: 0,
    };

    stream::unfold(initial, |mut state| async move {
        loop {
            state = match state {
                State::Primary {
                    mut stream,
                    fallback,
                    sent,
                } => match stream.next().await {
                    Some(Ok(chunk)) => {
                        let sent = sent + chunk.len() as u64;
                        let next = State::Primary {
                            stream,
                            fallback,
                            sent,
                        };
                        return Some((Ok(chunk), next));
                    }
                    Some(Err(e)) => {
                        warn!("Primary stream failed after {} bytes: {}", sent, e);
                        drop(stream);
                        match fallback.await {
                            Ok(next) => {
                                info!("Resuming download from fallback at byte {}", sent);
                                State::Fallback {
                                    stream: next,
                                    skip: sent,
                                }
                            }
                            Err(e) => return Some((Err(e), State::Done)),
                        }
                    }
                    None => return None,
                },
                State::Fallback { mut stream, skip } => match stream.next().await {
                    Some(Ok(chunk)) if (chunk.len() as u64) <= skip => State::Fallback {
                        stream,
                        skip: skip - chunk.len() as u64,
                    },
                    Some(Ok(chunk)) => {
                        let chunk = chunk.slice(skip as usize..);
                        return Some((Ok(chunk), State::Fallback { stream, skip: 0 }));
                    }
                    Some(Err(e)) => return Some((Err(e), State::Done)),
                    None if skip > 0 => {
                        let message =
                            format!("fallback ended {} bytes before the resume offset", skip);
                        return Some((Err(ExtractError::Stream(message)), State::Done));
                    }
                    None => return None,
                },
                State::Done => return None,
            };
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn chunks(items: Vec<Result<&'static str, &'static str>>) -> ByteStream {
        stream::iter(items.into_iter().map(|item| {
            item.map(|s| Bytes::from_static(s.as_bytes()))
                .map_err(|e| ExtractError::Stream(e.to_string()))
        }))
        .boxed()
    }

    async fn collect(stream: ByteStream) -> (Vec<u8>, Option<String>) {
        let mut data = Vec::new();
        let mut error = None;
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(e) => error = Some(e.to_string()),
            }
        }
        (data, error)
    }

    #[tokio::test]
    async fn test_primary_success_never_opens_fallback() {
        let opened = Arc::new(AtomicBool::new(false));
        let flag = opened.clone();
        let fallback: StreamFuture = async move {
            flag.store(true, Ordering::SeqCst);
            Ok(chunks(vec![Ok("fallback")]))
        }
        .boxed();

        let primary = chunks(vec![Ok("ab"), Ok("cd")]);
        let (data, error) = collect(with_fallback(primary, fallback)).await;
        assert_eq!(data, b"abcd");
        assert!(error.is_none());
        assert!(!opened.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_switches_to_fallback_once() {
        let primary = chunks(vec![Ok("ab"), Err("reset"), Ok("never")]);
        let fallback: StreamFuture = async { Ok(chunks(vec![Ok("abcdef")])) }.boxed();

        let (data, error) = collect(with_fallback(primary, fallback)).await;
        assert_eq!(data, b"abcdef");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_resume_offset_spans_fallback_chunks() {
        let primary = chunks(vec![Ok("abc"), Ok("de"), Err("reset")]);
        let fallback: StreamFuture =
            async { Ok(chunks(vec![Ok("ab"), Ok(""), Ok("cdef"), Ok("g")])) }.boxed();

        let (data, error) = collect(with_fallback(primary, fallback)).await;
        assert_eq!(data, b"abcdefg");
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_short_fallback_is_an_error() {
        let primary = chunks(vec![Ok("abcd"), Err("reset")]);
        let fallback: StreamFuture = async { Ok(chunks(vec![Ok("ab")])) }.boxed();

        let (data, error) = collect(with_fallback(primary, fallback)).await;
        assert_eq!(data, b"abcd");
        assert!(error.unwrap().contains("2 bytes before the resume offset"));
    }

    #[tokio::test]
    async fn test_fallback_failure_is_terminal() {
        let primary = chunks(vec![Err("reset")]);
        let fallback: StreamFuture =
            async { Ok(chunks(vec![Ok("x"), Err("broken pipe"), Ok("y")])) }.boxed();

        let (data, error) = collect(with_fallback(primary, fallback)).await;
        assert_eq!(data, b"x");
        assert_eq!(error.as_deref(), Some("stream failed: broken pipe"));
    }

    #[tokio::test]
    async fn test_fallback_open_error_is_yielded() {
        let primary = chunks(vec![Err("reset")]);
        let fallback: StreamFuture = async { Err(ExtractError::Busy) }.boxed();

        let (data, error) = collect(with_fallback(primary, fallback)).await;
        assert!(data.is_empty());
        assert_eq!(error.as_deref(), Some("too many extraction processes running"));
    }
}
