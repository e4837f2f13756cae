use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use super::validator::XmlValidator;
use crate::error::ExchangeResult;

/// Passes chunks through unchanged while feeding each one to an
/// [`XmlValidator`].
///
/// A validation failure is yielded in place of the offending chunk, so the
/// consumer (an object-store upload) fails before it can commit.
pub struct XmlValidatingStream<S> {
    inner: S,
    validator: XmlValidator,
    done: bool,
}

impl<S> XmlValidatingStream<S> {
    pub fn new(inner: S, validator: XmlValidator) -> Self {
        Self {
            inner,
            validator,
            done: false,
        }
    }
}

impl<S> Stream for XmlValidatingStream<S>
where
    S: Stream<Item = ExchangeResult<Bytes>> + Unpin,
{
    type Item = ExchangeResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        let next = std::task::ready!(Pin::new(&mut self.inner).poll_next(cx));
        let this = &mut *self;
        match next {
            Some(Ok(chunk)) => match this.validator.write(&chunk) {
                Ok(()) => Poll::Ready(Some(Ok(chunk))),
                Err(e) => {
                    this.done = true;
                    Poll::Ready(Some(Err(e)))
                }
            },
            Some(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.done = true;
                match this.validator.close() {
                    Ok(()) => Poll::Ready(None),
                    Err(e) => Poll::Ready(Some(Err(e))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeError;
    use futures_util::{stream, StreamExt};
    use uuid::Uuid;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = ExchangeResult<Bytes>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn drain<S>(mut stream: S) -> (Vec<Bytes>, Option<ExchangeError>)
    where
        S: Stream<Item = ExchangeResult<Bytes>> + Unpin,
    {
        let mut passed = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => passed.push(chunk),
                Err(e) => return (passed, Some(e)),
            }
        }
        (passed, None)
    }

    #[tokio::test]
    async fn test_valid_document_passes_through_unchanged() {
        let parts = ["<note>", "<to>Tove</to>", "</note>"];
        let len = parts.iter().map(|p| p.len() as u64).sum();
        let validator = XmlValidator::new(Uuid::new_v4(), "BP1", Some(len));

        let (passed, err) = drain(XmlValidatingStream::new(chunks(&parts), validator)).await;

        assert!(err.is_none());
        let joined: Vec<u8> = passed.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(joined, b"<note><to>Tove</to></note>");
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_replaced_by_error() {
        let parts = ["<note>", "<bad</note>", "<never/>"];
        let validator = XmlValidator::new(Uuid::new_v4(), "BP1", Some(100));

        let (passed, err) = drain(XmlValidatingStream::new(chunks(&parts), validator)).await;

        assert_eq!(passed.len(), 1);
        assert!(matches!(err, Some(ExchangeError::MalformedXml { .. })));
    }

    #[tokio::test]
    async fn test_incomplete_document_fails_on_last_chunk() {
        let parts = ["<no", "te/"];
        let validator = XmlValidator::new(Uuid::new_v4(), "BP1", Some(6));

        let (passed, err) = drain(XmlValidatingStream::new(chunks(&parts), validator)).await;

        assert_eq!(passed.len(), 1);
        assert!(matches!(err, Some(ExchangeError::IncompleteXml { .. })));
    }

    #[tokio::test]
    async fn test_truncated_transfer_fails_at_end_of_stream() {
        let parts = ["<note/>"];
        let validator = XmlValidator::new(Uuid::new_v4(), "BP1", Some(50));

        let (passed, err) = drain(XmlValidatingStream::new(chunks(&parts), validator)).await;

        assert_eq!(passed.len(), 1);
        assert!(matches!(err, Some(ExchangeError::IncompleteXml { .. })));
    }
}
