use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::PageError;

pub const DEFAULT_ENDPOINT: &str = "https://collections.chattlibrary.org/s/obits/oai";
pub const DEFAULT_METADATA_PREFIX: &str = "oai_dcterms";

const ROOT_ELEMENT: &[u8] = b"OAI-PMH";
const METADATA_ELEMENT: &[u8] = b"metadata";
const RESUMPTION_TOKEN_ELEMENT: &[u8] = b"resumptionToken";
const ERROR_ELEMENT: &[u8] = b"error";
const NO_RECORDS_MATCH: &str = "noRecordsMatch";

#[derive(Debug, Clone)]
pub struct OaiConfig {
    pub endpoint: String,
    pub metadata_prefix: String,
    pub timeout_seconds: u64,
}

/// Output columns, in CSV order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Publisher,
    Date,
    Type,
    Audience,
    Abstract,
    IsPartOf,
    Identifier,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Title,
        Field::Publisher,
        Field::Date,
        Field::Type,
        Field::Audience,
        Field::Abstract,
        Field::IsPartOf,
        Field::Identifier,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Publisher => "publisher",
            Field::Date => "date",
            Field::Type => "type",
            Field::Audience => "audience",
            Field::Abstract => "abstract",
            Field::IsPartOf => "isPartOf",
            Field::Identifier => "identifier",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Maps a qualified element name inside a metadata block to an output column.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub element: &'static str,
    pub field: Field,
}

pub const DCTERMS_FIELDS: &[FieldMapping] = &[
    FieldMapping {
        element: "dcterms:title",
        field: Field::Title,
    },
    FieldMapping {
        element: "dcterms:publisher",
        field: Field::Publisher,
    },
    FieldMapping {
        element: "dcterms:date",
        field: Field::Date,
    },
    FieldMapping {
        element: "dcterms:type",
        field: Field::Type,
    },
    FieldMapping {
        element: "dcterms:audience",
        field: Field::Audience,
    },
    FieldMapping {
        element: "dcterms:abstract",
        field: Field::Abstract,
    },
    FieldMapping {
        element: "dcterms:isPartOf",
        field: Field::IsPartOf,
    },
    FieldMapping {
        element: "dcterms:identifier",
        field: Field::Identifier,
    },
];

/// One harvested metadata entry. A value is `None` when the block lacked the element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: [Option<String>; 8],
}

impl Record {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values[field.index()].as_deref()
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        self.values[field.index()] = value;
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = Option<&str>> {
        Field::ALL.iter().map(|field| self.get(*field))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResponse {
    pub records: Vec<Record>,
    pub resumption_token: Option<String>,
}

/// Elements of one `<metadata>` block in document order, keyed by qualified name,
/// each carrying all text found beneath it.
#[derive(Debug, Default)]
struct MetadataBlock {
    elements: Vec<(String, String)>,
    open: Vec<usize>,
}

impl MetadataBlock {
    fn open(&mut self, name: String) {
        self.open.push(self.elements.len());
        self.elements.push((name, String::new()));
    }

    fn empty(&mut self, name: String) {
        self.elements.push((name, String::new()));
    }

    /// Returns false when the closing tag belongs to the block itself.
    fn close(&mut self) -> bool {
        self.open.pop().is_some()
    }

    fn push_text(&mut self, text: &str) {
        for index in &self.open {
            self.elements[*index].1.push_str(text);
        }
    }

    fn find(&self, element: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|(name, _)| name == element)
            .map(|(_, text)| text.as_str())
    }

    fn into_record(self, fields: &[FieldMapping]) -> Record {
        let mut record = Record::default();
        for mapping in fields {
            record.set(mapping.field, self.find(mapping.element).map(str::to_string));
        }
        record
    }
}

#[derive(Debug)]
struct OaiErrorCapture {
    code: String,
    message: String,
}

/// Which element, outside of a metadata block, is currently collecting text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Token,
    Error,
}

#[derive(Debug, Default)]
struct ListRecordsState {
    records: Vec<Record>,
    block: Option<MetadataBlock>,
    token: Option<String>,
    oai_error: Option<OaiErrorCapture>,
    capture: Option<Capture>,
}

impl ListRecordsState {
    fn push_text(&mut self, text: &str) {
        if let Some(block) = self.block.as_mut() {
            block.push_text(text);
            return;
        }
        match self.capture {
            Some(Capture::Token) => {
                if let Some(token) = self.token.as_mut() {
                    token.push_str(text);
                }
            }
            Some(Capture::Error) => {
                if let Some(error) = self.oai_error.as_mut() {
                    error.message.push_str(text);
                }
            }
            None => {}
        }
    }
}

/// Parse one `ListRecords` response body.
///
/// A blank body or an OAI-PMH `noRecordsMatch` error yields an empty page. Any other
/// OAI-PMH error, malformed XML, or a document whose root is not `OAI-PMH` is a
/// [`PageError::ParseFailed`]. An empty `resumptionToken` element means the list is
/// complete and is reported as no token.
pub fn parse_list_records(
    body: &[u8],
    fields: &[FieldMapping],
) -> Result<PageResponse, PageError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PageResponse::default());
    }

    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut state = ListRecordsState::default();
    let mut depth = 0usize;
    let mut root_seen = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_failed(format!("malformed XML: {e}")))?;

        match event {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    check_root(&e)?;
                    root_seen = true;
                } else if let Some(block) = state.block.as_mut() {
                    block.open(qualified_name(&e)?);
                } else {
                    match e.local_name().as_ref() {
                        METADATA_ELEMENT => state.block = Some(MetadataBlock::default()),
                        RESUMPTION_TOKEN_ELEMENT => {
                            state.capture = Some(Capture::Token);
                            state.token = Some(String::new());
                        }
                        ERROR_ELEMENT => {
                            state.capture = Some(Capture::Error);
                            state.oai_error = Some(error_capture(&e)?);
                        }
                        _ => state.capture = None,
                    }
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    check_root(&e)?;
                    root_seen = true;
                } else if let Some(block) = state.block.as_mut() {
                    block.empty(qualified_name(&e)?);
                } else {
                    match e.local_name().as_ref() {
                        METADATA_ELEMENT => state
                            .records
                            .push(MetadataBlock::default().into_record(fields)),
                        ERROR_ELEMENT => state.oai_error = Some(error_capture(&e)?),
                        _ => {}
                    }
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match state.block.as_mut().map(MetadataBlock::close) {
                    Some(true) => {}
                    Some(false) => {
                        if let Some(finished) = state.block.take() {
                            state.records.push(finished.into_record(fields));
                        }
                    }
                    None => state.capture = None,
                }
            }
            Event::Text(text) => state.push_text(&decode_text(&text)?),
            Event::CData(text) => state.push_text(&decode_utf8(&text)?),
            Event::GeneralRef(reference) => {
                let reference = format!("&{};", decode_utf8(&reference)?);
                state.push_text(&decode_text(reference.as_bytes())?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(parse_failed("missing OAI-PMH root element"));
    }
    if depth != 0 || state.block.is_some() {
        return Err(parse_failed("unexpected end of document"));
    }

    if let Some(error) = state.oai_error {
        if error.code == NO_RECORDS_MATCH {
            return Ok(PageResponse::default());
        }
        return Err(parse_failed(format!(
            "OAI-PMH error {}: {}",
            error.code,
            error.message.trim()
        )));
    }

    Ok(PageResponse {
        records: state.records,
        resumption_token: state
            .token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty()),
    })
}

fn check_root(e: &BytesStart<'_>) -> Result<(), PageError> {
    if e.local_name().as_ref() == ROOT_ELEMENT {
        Ok(())
    } else {
        Err(parse_failed(format!(
            "unexpected root element <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        )))
    }
}

fn qualified_name(e: &BytesStart<'_>) -> Result<String, PageError> {
    decode_utf8(e.name().as_ref()).map(Cow::into_owned)
}

fn error_capture(e: &BytesStart<'_>) -> Result<OaiErrorCapture, PageError> {
    let code = match e
        .try_get_attribute("code")
        .map_err(|err| parse_failed(format!("bad error attribute: {err}")))?
    {
        Some(attr) => decode_utf8(&attr.value)?.into_owned(),
        None => String::new(),
    };
    Ok(OaiErrorCapture {
        code,
        message: String::new(),
    })
}

fn decode_utf8(bytes: &[u8]) -> Result<Cow<'_, str>, PageError> {
    std::str::from_utf8(bytes)
        .map(Cow::Borrowed)
        .map_err(|e| parse_failed(format!("invalid UTF-8: {e}")))
}

fn decode_text(bytes: &[u8]) -> Result<String, PageError> {
    let raw = decode_utf8(bytes)?;
    quick_xml::escape::unescape(&raw)
        .map(Cow::into_owned)
        .map_err(|e| parse_failed(format!("bad escape: {e}")))
}

fn parse_failed(message: impl Into<String>) -> PageError {
    PageError::ParseFailed(message.into())
}
