use uuid::Uuid;

use super::tokenizer::{DocumentState, XmlSyntaxError, XmlTokenizer};
use crate::error::{ExchangeError, ExchangeResult};

/// Checks a payload for XML well-formedness while it is being written.
///
/// With a known content length the document must end exactly when the last
/// declared byte arrives. Without one, only syntax errors are reported and
/// the caller decides what an early end means.
#[derive(Debug)]
pub struct XmlValidator {
    tokenizer: XmlTokenizer,
    message_id: Uuid,
    bp_id: String,
    content_length: Option<u64>,
    bytes_processed: u64,
    completed: bool,
}

impl XmlValidator {
    pub fn new(message_id: Uuid, bp_id: impl Into<String>, content_length: Option<u64>) -> Self {
        Self {
            tokenizer: XmlTokenizer::new(),
            message_id,
            bp_id: bp_id.into(),
            content_length,
            bytes_processed: 0,
            completed: false,
        }
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// True once the declared length was reached
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn write(&mut self, data: &[u8]) -> ExchangeResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        if self.completed {
            return Err(self.malformed("content continues past the declared length"));
        }

        let (data, overflow) = match self.content_length {
            Some(limit) if self.bytes_processed + data.len() as u64 > limit => {
                (&data[..(limit - self.bytes_processed) as usize], true)
            }
            _ => (data, false),
        };

        self.tokenizer
            .feed(data)
            .map_err(|e| self.syntax_error(e))?;
        self.bytes_processed += data.len() as u64;

        if overflow {
            return Err(self.malformed("content continues past the declared length"));
        }

        if let Some(limit) = self.content_length {
            if self.bytes_processed >= limit {
                self.completed = true;
                return match self.tokenizer.finish() {
                    DocumentState::Ended => Ok(()),
                    DocumentState::Incomplete => Err(self.incomplete()),
                };
            }
        }
        Ok(())
    }

    /// Signal end of input from the producer side.
    ///
    /// Fails only when a declared length was not reached, which means the
    /// transfer was cut short.
    pub fn close(&mut self) -> ExchangeResult<()> {
        if self.completed {
            return Ok(());
        }
        let state = self.tokenizer.finish();
        match self.content_length {
            Some(_) => Err(self.incomplete()),
            None => {
                if state == DocumentState::Incomplete {
                    tracing::debug!(
                        message_id = %self.message_id,
                        bp_id = %self.bp_id,
                        bytes_processed = self.bytes_processed,
                        "Input closed before the document ended, length was not declared"
                    );
                }
                Ok(())
            }
        }
    }

    fn syntax_error(&self, err: XmlSyntaxError) -> ExchangeError {
        self.malformed(err.to_string())
    }

    fn malformed(&self, reason: impl Into<String>) -> ExchangeError {
        ExchangeError::MalformedXml {
            message_id: self.message_id,
            bp_id: self.bp_id.clone(),
            reason: reason.into(),
        }
    }

    fn incomplete(&self) -> ExchangeError {
        ExchangeError::IncompleteXml {
            message_id: self.message_id,
            bp_id: self.bp_id.clone(),
        }
    }
}
