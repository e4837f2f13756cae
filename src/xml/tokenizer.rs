//! Push-based XML well-formedness checker.
//!
//! The tokenizer is fed raw bytes in arbitrary chunks and keeps just enough
//! state (current lexical state, open element stack, partial names) to
//! reject a document as soon as it stops being well-formed. It never builds
//! a tree and never resolves external entities or DTDs.

use thiserror::Error;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const CDATA_KEYWORD: &[u8] = b"CDATA[";
const DOCTYPE_KEYWORD: &[u8] = b"DOCTYPE";
const PREDEFINED_ENTITIES: [&[u8]; 5] = [b"lt", b"gt", b"amp", b"apos", b"quot"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} (at byte {position})")]
pub struct XmlSyntaxError {
    pub position: u64,
    pub reason: String,
}

/// Result of signalling end of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// The root element was closed and nothing but misc content followed
    Ended,
    /// Input stopped before the document was complete
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefContext {
    Text,
    Attribute(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Prolog,
    Misc,
    Content,
    ContentBracket,
    ContentBracketBracket,
    Lt,
    StartTagName,
    InTag,
    AttrName,
    AfterAttrName,
    BeforeAttrValue,
    AttrValue(u8),
    AfterAttrValue,
    EmptyTagSlash,
    EndTagStart,
    EndTagName,
    EndTagWs,
    PiTarget,
    PiBody,
    PiQuestion,
    Bang,
    CommentOpen,
    Comment,
    CommentDash,
    CommentDashDash,
    CdataOpen(usize),
    Cdata,
    CdataBracket,
    CdataBracketBracket,
    DoctypeKeyword(usize),
    Doctype,
    DoctypeQuoted(u8),
    DoctypeSubset,
    DoctypeSubsetQuoted(u8),
    DoctypeAfterSubset,
    Reference(RefContext),
    EntityName(RefContext),
    CharRefStart(RefContext),
    CharRefDigits { ctx: RefContext, hex: bool, digits: u32 },
}

/// Progress through a multi-byte UTF-8 sequence
#[derive(Debug, Clone, Copy, Default)]
struct Utf8Sequence {
    /// Continuation bytes still expected
    pending: u8,
    lower: u8,
    upper: u8,
    code_point: u32,
}

#[derive(Debug)]
pub struct XmlTokenizer {
    state: State,
    position: u64,
    bom_len: u64,
    open_elements: Vec<Vec<u8>>,
    name: Vec<u8>,
    attr_name: Vec<u8>,
    attrs: Vec<Vec<u8>>,
    entity: Vec<u8>,
    char_ref_value: u32,
    pi_start: u64,
    utf8: Utf8Sequence,
    root_closed: bool,
    doctype_seen: bool,
    input_ended: bool,
}

impl Default for XmlTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlTokenizer {
    pub fn new() -> Self {
        Self {
            state: State::Prolog,
            position: 0,
            bom_len: 0,
            open_elements: Vec::new(),
            name: Vec::new(),
            attr_name: Vec::new(),
            attrs: Vec::new(),
            entity: Vec::new(),
            char_ref_value: 0,
            pi_start: 0,
            utf8: Utf8Sequence::default(),
            root_closed: false,
            doctype_seen: false,
            input_ended: false,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Current element nesting depth
    pub fn depth(&self) -> usize {
        self.open_elements.len()
    }

    /// Feed the next chunk of the document.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), XmlSyntaxError> {
        if self.input_ended && !chunk.is_empty() {
            return Err(self.error("data received after end of input"));
        }
        for &byte in chunk {
            self.feed_byte(byte)?;
            self.position += 1;
        }
        Ok(())
    }

    /// Signal that no more input will follow.
    pub fn finish(&mut self) -> DocumentState {
        self.input_ended = true;
        if self.root_closed && self.state == State::Misc && self.utf8.pending == 0 {
            DocumentState::Ended
        } else {
            DocumentState::Incomplete
        }
    }

    fn feed_byte(&mut self, b: u8) -> Result<(), XmlSyntaxError> {
        if b < 0x20 && !is_whitespace(b) {
            return Err(self.error(format!("illegal character 0x{:02x}", b)));
        }
        self.check_utf8(b)?;

        // Byte-order mark is only skipped at the very start.
        if self.state == State::Prolog
            && self.position < 3
            && self.position == self.bom_len
            && b == UTF8_BOM[self.position as usize]
        {
            self.bom_len += 1;
            return Ok(());
        }

        self.state = match self.state {
            State::Prolog => match b {
                b'<' => State::Lt,
                _ if is_whitespace(b) => State::Prolog,
                _ => return Err(self.error("content is not allowed in prolog")),
            },
            State::Misc => match b {
                b'<' => State::Lt,
                _ if is_whitespace(b) => State::Misc,
                _ => return Err(self.error("content is not allowed after the root element")),
            },
            State::Content => self.content(b),
            State::ContentBracket => match b {
                b']' => State::ContentBracketBracket,
                _ => self.content(b),
            },
            State::ContentBracketBracket => match b {
                b'>' => return Err(self.error("']]>' is not allowed in character data")),
                b']' => State::ContentBracketBracket,
                _ => self.content(b),
            },
            State::Lt => match b {
                b'/' => {
                    if self.open_elements.is_empty() {
                        return Err(self.error("end tag without matching start tag"));
                    }
                    self.name.clear();
                    State::EndTagStart
                }
                b'?' => {
                    self.pi_start = self.position - 1;
                    self.name.clear();
                    State::PiTarget
                }
                b'!' => State::Bang,
                _ if is_name_start(b) => {
                    if self.open_elements.is_empty() && self.root_closed {
                        return Err(self.error("only one root element is allowed"));
                    }
                    self.name.clear();
                    self.name.push(b);
                    self.attrs.clear();
                    State::StartTagName
                }
                _ => return Err(self.error("invalid character after '<'")),
            },
            State::StartTagName => match b {
                b'>' => self.open_element(),
                b'/' => State::EmptyTagSlash,
                _ if is_whitespace(b) => State::InTag,
                _ if is_name_char(b) => {
                    self.name.push(b);
                    State::StartTagName
                }
                _ => return Err(self.error("invalid character in element name")),
            },
            State::InTag => match b {
                b'>' => self.open_element(),
                b'/' => State::EmptyTagSlash,
                _ if is_whitespace(b) => State::InTag,
                _ if is_name_start(b) => {
                    self.attr_name.clear();
                    self.attr_name.push(b);
                    State::AttrName
                }
                _ => return Err(self.error("invalid character in start tag")),
            },
            State::AttrName => match b {
                b'=' => {
                    self.register_attribute()?;
                    State::BeforeAttrValue
                }
                _ if is_whitespace(b) => State::AfterAttrName,
                _ if is_name_char(b) => {
                    self.attr_name.push(b);
                    State::AttrName
                }
                _ => return Err(self.error("invalid character in attribute name")),
            },
            State::AfterAttrName => match b {
                b'=' => {
                    self.register_attribute()?;
                    State::BeforeAttrValue
                }
                _ if is_whitespace(b) => State::AfterAttrName,
                _ => return Err(self.error("attribute name must be followed by '='")),
            },
            State::BeforeAttrValue => match b {
                b'"' | b'\'' => State::AttrValue(b),
                _ if is_whitespace(b) => State::BeforeAttrValue,
                _ => return Err(self.error("attribute value must be quoted")),
            },
            State::AttrValue(quote) => match b {
                _ if b == quote => State::AfterAttrValue,
                b'<' => return Err(self.error("'<' is not allowed in attribute values")),
                b'&' => State::Reference(RefContext::Attribute(quote)),
                _ => State::AttrValue(quote),
            },
            State::AfterAttrValue => match b {
                b'>' => self.open_element(),
                b'/' => State::EmptyTagSlash,
                _ if is_whitespace(b) => State::InTag,
                _ => return Err(self.error("attributes must be separated by whitespace")),
            },
            State::EmptyTagSlash => match b {
                b'>' => self.empty_element(),
                _ => return Err(self.error("expected '>' after '/' in empty element tag")),
            },
            State::EndTagStart => match b {
                _ if is_name_start(b) => {
                    self.name.push(b);
                    State::EndTagName
                }
                _ => return Err(self.error("invalid character in end tag")),
            },
            State::EndTagName => match b {
                b'>' => self.close_element()?,
                _ if is_whitespace(b) => State::EndTagWs,
                _ if is_name_char(b) => {
                    self.name.push(b);
                    State::EndTagName
                }
                _ => return Err(self.error("invalid character in end tag")),
            },
            State::EndTagWs => match b {
                b'>' => self.close_element()?,
                _ if is_whitespace(b) => State::EndTagWs,
                _ => return Err(self.error("end tag must end with '>'")),
            },
            State::PiTarget => match b {
                b'?' => {
                    self.check_pi_target()?;
                    State::PiQuestion
                }
                _ if is_whitespace(b) => {
                    self.check_pi_target()?;
                    State::PiBody
                }
                _ if self.name.is_empty() && is_name_start(b) => {
                    self.name.push(b);
                    State::PiTarget
                }
                _ if !self.name.is_empty() && is_name_char(b) => {
                    self.name.push(b);
                    State::PiTarget
                }
                _ => return Err(self.error("invalid processing instruction target")),
            },
            State::PiBody => match b {
                b'?' => State::PiQuestion,
                _ => State::PiBody,
            },
            State::PiQuestion => match b {
                b'>' => self.resume_state(),
                b'?' => State::PiQuestion,
                _ => State::PiBody,
            },
            State::Bang => match b {
                b'-' => State::CommentOpen,
                b'[' => {
                    if self.open_elements.is_empty() {
                        return Err(self.error("CDATA section outside the root element"));
                    }
                    State::CdataOpen(0)
                }
                b'D' => {
                    if self.doctype_seen || self.root_closed || !self.open_elements.is_empty() {
                        return Err(self.error("DOCTYPE is only allowed once, before the root element"));
                    }
                    State::DoctypeKeyword(1)
                }
                _ => return Err(self.error("invalid markup declaration")),
            },
            State::CommentOpen => match b {
                b'-' => State::Comment,
                _ => return Err(self.error("comment must start with '<!--'")),
            },
            State::Comment => match b {
                b'-' => State::CommentDash,
                _ => State::Comment,
            },
            State::CommentDash => match b {
                b'-' => State::CommentDashDash,
                _ => State::Comment,
            },
            State::CommentDashDash => match b {
                b'>' => self.resume_state(),
                _ => return Err(self.error("'--' is not allowed inside a comment")),
            },
            State::CdataOpen(matched) => {
                if b != CDATA_KEYWORD[matched] {
                    return Err(self.error("malformed CDATA section start"));
                }
                if matched + 1 == CDATA_KEYWORD.len() {
                    State::Cdata
                } else {
                    State::CdataOpen(matched + 1)
                }
            }
            State::Cdata => match b {
                b']' => State::CdataBracket,
                _ => State::Cdata,
            },
            State::CdataBracket => match b {
                b']' => State::CdataBracketBracket,
                _ => State::Cdata,
            },
            State::CdataBracketBracket => match b {
                b'>' => State::Content,
                b']' => State::CdataBracketBracket,
                _ => State::Cdata,
            },
            State::DoctypeKeyword(matched) => {
                if matched == DOCTYPE_KEYWORD.len() {
                    if !is_whitespace(b) {
                        return Err(self.error("whitespace required after DOCTYPE"));
                    }
                    self.doctype_seen = true;
                    State::Doctype
                } else if b == DOCTYPE_KEYWORD[matched] {
                    State::DoctypeKeyword(matched + 1)
                } else {
                    return Err(self.error("invalid markup declaration"));
                }
            }
            State::Doctype => match b {
                b'"' | b'\'' => State::DoctypeQuoted(b),
                b'[' => State::DoctypeSubset,
                b'>' => State::Prolog,
                b'<' => return Err(self.error("unexpected '<' in DOCTYPE")),
                _ => State::Doctype,
            },
            State::DoctypeQuoted(quote) => {
                if b == quote {
                    State::Doctype
                } else {
                    State::DoctypeQuoted(quote)
                }
            }
            State::DoctypeSubset => match b {
                b'"' | b'\'' => State::DoctypeSubsetQuoted(b),
                b']' => State::DoctypeAfterSubset,
                _ => State::DoctypeSubset,
            },
            State::DoctypeSubsetQuoted(quote) => {
                if b == quote {
                    State::DoctypeSubset
                } else {
                    State::DoctypeSubsetQuoted(quote)
                }
            }
            State::DoctypeAfterSubset => match b {
                b'>' => State::Prolog,
                _ if is_whitespace(b) => State::DoctypeAfterSubset,
                _ => return Err(self.error("DOCTYPE must end with '>' after internal subset")),
            },
            State::Reference(ctx) => match b {
                b'#' => {
                    self.char_ref_value = 0;
                    State::CharRefStart(ctx)
                }
                _ if is_name_start(b) => {
                    self.entity.clear();
                    self.entity.push(b);
                    State::EntityName(ctx)
                }
                _ => return Err(self.error("'&' must start an entity or character reference")),
            },
            State::EntityName(ctx) => match b {
                b';' => {
                    self.check_entity()?;
                    ctx.resume()
                }
                _ if is_name_char(b) => {
                    self.entity.push(b);
                    State::EntityName(ctx)
                }
                _ => return Err(self.error("entity reference must end with ';'")),
            },
            State::CharRefStart(ctx) => match b {
                b'x' => State::CharRefDigits { ctx, hex: true, digits: 0 },
                b'0'..=b'9' => {
                    self.push_char_ref_digit(b, false)?;
                    State::CharRefDigits { ctx, hex: false, digits: 1 }
                }
                _ => return Err(self.error("invalid character reference")),
            },
            State::CharRefDigits { ctx, hex, digits } => match b {
                b';' if digits > 0 => {
                    self.check_char_ref()?;
                    ctx.resume()
                }
                _ => {
                    self.push_char_ref_digit(b, hex)?;
                    State::CharRefDigits { ctx, hex, digits: digits + 1 }
                }
            },
        };
        Ok(())
    }

    fn content(&self, b: u8) -> State {
        match b {
            b'<' => State::Lt,
            b'&' => State::Reference(RefContext::Text),
            b']' => State::ContentBracket,
            _ => State::Content,
        }
    }

    /// Rejects byte sequences that are not UTF-8, including overlong forms,
    /// surrogates and the noncharacters U+FFFE and U+FFFF.
    fn check_utf8(&mut self, b: u8) -> Result<(), XmlSyntaxError> {
        if self.utf8.pending == 0 {
            let (pending, lower, upper, bits) = match b {
                0x00..=0x7F => return Ok(()),
                0xC2..=0xDF => (1, 0x80, 0xBF, b & 0x1F),
                0xE0 => (2, 0xA0, 0xBF, b & 0x0F),
                0xED => (2, 0x80, 0x9F, b & 0x0F),
                0xE1..=0xEF => (2, 0x80, 0xBF, b & 0x0F),
                0xF0 => (3, 0x90, 0xBF, b & 0x07),
                0xF1..=0xF3 => (3, 0x80, 0xBF, b & 0x07),
                0xF4 => (3, 0x80, 0x8F, b & 0x07),
                _ => return Err(self.error(format!("invalid UTF-8 start byte 0x{:02x}", b))),
            };
            self.utf8 = Utf8Sequence {
                pending,
                lower,
                upper,
                code_point: u32::from(bits),
            };
            return Ok(());
        }

        if b < self.utf8.lower || b > self.utf8.upper {
            return Err(self.error(format!("invalid UTF-8 continuation byte 0x{:02x}", b)));
        }
        self.utf8.code_point = (self.utf8.code_point << 6) | u32::from(b & 0x3F);
        self.utf8.pending -= 1;
        self.utf8.lower = 0x80;
        self.utf8.upper = 0xBF;
        if self.utf8.pending == 0 && matches!(self.utf8.code_point, 0xFFFE | 0xFFFF) {
            return Err(self.error(format!(
                "illegal character U+{:04X}",
                self.utf8.code_point
            )));
        }
        Ok(())
    }

    fn open_element(&mut self) -> State {
        self.open_elements.push(std::mem::take(&mut self.name));
        State::Content
    }

    fn empty_element(&mut self) -> State {
        if self.open_elements.is_empty() {
            self.root_closed = true;
            State::Misc
        } else {
            State::Content
        }
    }

    fn close_element(&mut self) -> Result<State, XmlSyntaxError> {
        match self.open_elements.pop() {
            Some(open) if open == self.name => {}
            Some(open) => {
                return Err(self.error(format!(
                    "end tag '</{}>' does not match start tag '<{}>'",
                    String::from_utf8_lossy(&self.name),
                    String::from_utf8_lossy(&open)
                )));
            }
            None => return Err(self.error("end tag without matching start tag")),
        }
        if self.open_elements.is_empty() {
            self.root_closed = true;
            Ok(State::Misc)
        } else {
            Ok(State::Content)
        }
    }

    fn resume_state(&self) -> State {
        if !self.open_elements.is_empty() {
            State::Content
        } else if self.root_closed {
            State::Misc
        } else {
            State::Prolog
        }
    }

    fn register_attribute(&mut self) -> Result<(), XmlSyntaxError> {
        if self.attrs.iter().any(|a| a == &self.attr_name) {
            return Err(self.error(format!(
                "duplicate attribute '{}'",
                String::from_utf8_lossy(&self.attr_name)
            )));
        }
        self.attrs.push(std::mem::take(&mut self.attr_name));
        Ok(())
    }

    fn check_pi_target(&self) -> Result<(), XmlSyntaxError> {
        if self.name.is_empty() {
            return Err(self.error("processing instruction without target"));
        }
        if self.name.eq_ignore_ascii_case(b"xml")
            && (self.name != b"xml" || self.pi_start != self.bom_len)
        {
            return Err(self.error("XML declaration is only allowed at the start of the document"));
        }
        Ok(())
    }

    fn check_entity(&self) -> Result<(), XmlSyntaxError> {
        // Entities declared in a DTD cannot be checked without reading it.
        if self.doctype_seen || PREDEFINED_ENTITIES.contains(&self.entity.as_slice()) {
            Ok(())
        } else {
            Err(self.error(format!(
                "undeclared entity '{}'",
                String::from_utf8_lossy(&self.entity)
            )))
        }
    }

    fn push_char_ref_digit(&mut self, b: u8, hex: bool) -> Result<(), XmlSyntaxError> {
        let digit = match (b as char).to_digit(if hex { 16 } else { 10 }) {
            Some(d) => d,
            None => return Err(self.error("invalid digit in character reference")),
        };
        self.char_ref_value = self
            .char_ref_value
            .saturating_mul(if hex { 16 } else { 10 })
            .saturating_add(digit);
        Ok(())
    }

    fn check_char_ref(&self) -> Result<(), XmlSyntaxError> {
        let valid = match char::from_u32(self.char_ref_value) {
            Some(c) => {
                let v = c as u32;
                v >= 0x20 || v == 0x9 || v == 0xA || v == 0xD
            }
            None => false,
        };
        if valid {
            Ok(())
        } else {
            Err(self.error("character reference to an illegal character"))
        }
    }

    fn error(&self, reason: impl Into<String>) -> XmlSyntaxError {
        XmlSyntaxError {
            position: self.position,
            reason: reason.into(),
        }
    }
}

impl RefContext {
    fn resume(self) -> State {
        match self {
            RefContext::Text => State::Content,
            RefContext::Attribute(quote) => State::AttrValue(quote),
        }
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':' || b >= 0x80
}

fn is_name_char(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit() || b == b'-' || b == b'.'
}
