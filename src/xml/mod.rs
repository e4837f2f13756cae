//! Streaming XML well-formedness validation for message payloads.

pub mod stream;
pub mod tokenizer;
pub mod validator;

pub use stream::XmlValidatingStream;
pub use tokenizer::{DocumentState, XmlSyntaxError, XmlTokenizer};
pub use validator::XmlValidator;
