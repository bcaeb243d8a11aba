use chrono::NaiveDate;

/// Cheap first-phase view of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub uid: u32,
    /// Bare sender address, empty when the From header is missing.
    pub sender: String,
    pub subject: String,
    /// Calendar day from the Date header, as written by the sender.
    pub date: Option<NaiveDate>,
}

/// An attachment extracted from a fully fetched message.
#[derive(Debug, Clone)]
pub struct AttachmentBlob {
    /// Sanitized file name, safe to join onto a directory.
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    /// `size` parameter of Content-Disposition, when the sender declared one.
    pub declared_size: Option<u64>,
}

impl AttachmentBlob {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Second-phase message: headers plus raw body and attachments.
#[derive(Debug, Clone)]
pub struct FullMessage {
    pub header: HeaderRecord,
    pub raw: Vec<u8>,
    pub attachments: Vec<AttachmentBlob>,
}

/// A message at either fetch phase.
#[derive(Debug, Clone)]
pub enum FetchedMessage {
    HeaderOnly(HeaderRecord),
    Full(FullMessage),
}

impl FetchedMessage {
    pub fn header(&self) -> &HeaderRecord {
        match self {
            FetchedMessage::HeaderOnly(header) => header,
            FetchedMessage::Full(full) => &full.header,
        }
    }

    pub fn uid(&self) -> u32 {
        self.header().uid
    }

    pub fn is_full(&self) -> bool {
        matches!(self, FetchedMessage::Full(_))
    }
}
