//! Streaming support for envelope responses
//!
//! The backend writes one JSON envelope, `[meta, payload]`, over a chunked
//! response body. Chunks are decoded to text here, appended to a
//! [`StreamBuffer`], and once the body ends the buffer is strictly parsed by
//! [`finalize`].

use crate::{
    error::{Error, Result},
    models::ThreadId,
};
use futures::{Stream, StreamExt as FuturesStreamExt};
use reqwest::Response;
use serde_json::Value;
use std::fmt::Display;

/// Parse a streaming response into a stream of text chunks
pub fn parse_stream(response: Response) -> impl Stream<Item = Result<String>> {
    decode_chunks(response.bytes_stream())
}

/// Decode a stream of byte chunks into UTF-8 text chunks.
///
/// A multi-byte character split across chunks is emitted whole with the
/// later chunk. The first transport error ends the stream.
pub fn decode_chunks<S, B, E>(stream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    futures::stream::unfold(
        (Box::pin(stream), Utf8Decoder::new(), false),
        |(mut stream, mut decoder, done)| async move {
            if done {
                return None;
            }
            loop {
                match FuturesStreamExt::next(&mut stream).await {
                    Some(Ok(chunk)) => {
                        let text = decoder.decode(chunk.as_ref());
                        if text.is_empty() {
                            continue;
                        }
                        return Some((Ok(text), (stream, decoder, false)));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(Error::Streaming(format!("Stream error: {}", e))),
                            (stream, decoder, true),
                        ));
                    }
                    None => {
                        // Stream ended, flush a dangling partial character
                        return decoder
                            .finish()
                            .map(|tail| (Ok(tail), (stream, decoder, true)));
                    }
                }
            }
        },
    )
}

/// Incremental UTF-8 decoder.
///
/// Invalid sequences decode to U+FFFD; an incomplete sequence at the end
/// of a chunk is held back until the next one.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk of bytes
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(
                        &self.pending[start..start + valid],
                    ));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += valid + len;
                        }
                        None => {
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush at end of input; a held-back partial sequence becomes U+FFFD
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(char::REPLACEMENT_CHARACTER.to_string())
    }
}

/// All text received so far for one request.
///
/// Created empty at request start and only ever grows.
#[derive(Debug, Default, Clone)]
pub struct StreamBuffer {
    text: String,
    chunks: usize,
}

impl StreamBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text chunk; an empty chunk is a no-op
    pub fn append(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    /// The accumulated text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Accumulated length in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of non-empty chunks appended
    pub fn chunks(&self) -> usize {
        self.chunks
    }
}

/// Result of strictly parsing a finished buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    /// Thread id from the envelope's metadata
    pub thread_id: ThreadId,
    /// The complete envelope
    pub envelope: Value,
}

/// Strictly parse a finished buffer and extract the thread id.
///
/// Any syntax error fails with [`Error::Json`]; an envelope that is not a
/// `[meta, payload]` pair or has no `thread_id` fails with
/// [`Error::InvalidResponse`].
pub fn finalize(buffer: &StreamBuffer) -> Result<Finalized> {
    let envelope: Value = serde_json::from_str(buffer.as_str())?;

    let items = envelope
        .as_array()
        .filter(|items| items.len() >= 2)
        .ok_or_else(|| {
            Error::InvalidResponse("expected a [meta, payload] envelope".to_string())
        })?;

    let thread_id = items[0]
        .get("thread_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(ThreadId::new)
        .ok_or_else(|| Error::InvalidResponse("envelope has no thread_id".to_string()))?;

    Ok(Finalized {
        thread_id,
        envelope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};

    fn buffer_of(chunks: &[&str]) -> StreamBuffer {
        let mut buffer = StreamBuffer::new();
        for chunk in chunks {
            buffer.append(chunk);
        }
        buffer
    }

    #[test]
    fn test_buffer_preserves_order_across_split_tokens() {
        let buffer = buffer_of(&["[{\"thr", "", "ead_id\":\"t", "1\"}"]);
        assert_eq!(buffer.as_str(), "[{\"thread_id\":\"t1\"}");
        assert_eq!(buffer.chunks(), 3);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_decoder_holds_back_split_character() {
        let bytes = "brûlée".as_bytes();
        let mut decoder = Utf8Decoder::new();
        // 'û' is two bytes starting at index 2
        assert_eq!(decoder.decode(&bytes[..3]), "br");
        assert_eq!(decoder.decode(&bytes[3..]), "ûlée");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"c\xe2\x82"), "c");
        assert_eq!(decoder.finish(), Some("\u{FFFD}".to_string()));
    }

    #[tokio::test]
    async fn test_decode_chunks_rejoins_characters() {
        let bytes = "[\"😀\"]".as_bytes().to_vec();
        let parts: Vec<std::result::Result<Vec<u8>, String>> =
            bytes.chunks(1).map(|b| Ok(b.to_vec())).collect();

        let texts: Vec<String> = decode_chunks(stream::iter(parts))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(texts.concat(), "[\"😀\"]");
        assert!(texts.iter().all(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn test_decode_chunks_stops_after_error() {
        let parts: Vec<std::result::Result<&[u8], &str>> =
            vec![Ok(&b"[1"[..]), Err("connection reset"), Ok(&b"]"[..])];

        let results: Vec<Result<String>> = decode_chunks(stream::iter(parts)).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "[1");
        assert!(matches!(&results[1], Err(Error::Streaming(msg)) if msg.contains("connection reset")));
    }

    #[test]
    fn test_finalize_extracts_thread_id() {
        let buffer = buffer_of(&[
            "[{\"thread_id\": \"t1\"},",
            "{\"type\":\"RecipeResponse\",\"response\":{\"name\":\"Tea\"}}]",
        ]);
        let finalized = finalize(&buffer).unwrap();
        assert_eq!(finalized.thread_id, ThreadId::new("t1"));
        assert_eq!(finalized.envelope[1]["response"]["name"], "Tea");
    }

    #[test]
    fn test_finalize_is_strict() {
        let dangling = buffer_of(&["[{\"thread_id\":\"t1\"},{\"type\":\"RecipeResponse\"},"]);
        assert!(matches!(finalize(&dangling), Err(Error::Json(_))));

        assert!(matches!(finalize(&StreamBuffer::new()), Err(Error::Json(_))));
    }

    #[test]
    fn test_finalize_requires_envelope_shape() {
        let single = buffer_of(&["[{\"thread_id\":\"t1\"}]"]);
        assert!(matches!(finalize(&single), Err(Error::InvalidResponse(_))));

        let no_thread = buffer_of(&["[{}, {\"type\":\"ConversationalResponse\"}]"]);
        assert!(matches!(finalize(&no_thread), Err(Error::InvalidResponse(_))));

        let object = buffer_of(&["{\"thread_id\":\"t1\"}"]);
        assert!(matches!(finalize(&object), Err(Error::InvalidResponse(_))));
    }
}
