//! MIME parsing of fetched headers and messages.

use chrono::NaiveDate;
use log::debug;
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use super::message::{AttachmentBlob, FullMessage, HeaderRecord};
use super::{EmailError, Result};

/// Parses a raw header block from the first fetch phase.
pub fn parse_header_record(uid: u32, raw: &[u8]) -> Result<HeaderRecord> {
    let message = MessageParser::default()
        .parse_headers(raw)
        .ok_or(EmailError::HeaderParse(uid))?;

    Ok(header_from_message(uid, &message))
}

/// Parses a complete message and extracts its attachments.
pub fn parse_full_message(header: HeaderRecord, raw: Vec<u8>) -> Result<FullMessage> {
    let uid = header.uid;
    let attachments = {
        let message = MessageParser::default()
            .parse(raw.as_slice())
            .ok_or(EmailError::MessageParse(uid))?;

        message
            .parts
            .iter()
            .filter(|part| is_attachment(part))
            .filter_map(extract_attachment)
            .collect::<Vec<_>>()
    };

    debug!(
        "Extracted {} attachments from email UID={}",
        attachments.len(),
        uid
    );

    Ok(FullMessage {
        header,
        raw,
        attachments,
    })
}

fn header_from_message(uid: u32, message: &Message) -> HeaderRecord {
    let sender = message
        .from()
        .and_then(|addr| addr.first())
        .and_then(|addr| addr.address())
        .map(|addr| addr.trim().to_string())
        .unwrap_or_default();

    let date = message
        .date()
        .and_then(|d| NaiveDate::from_ymd_opt(d.year as i32, d.month as u32, d.day as u32));

    HeaderRecord {
        uid,
        sender,
        subject: message.subject().unwrap_or_default().to_string(),
        date,
    }
}

/// Parts with an attachment disposition, or named non-text parts.
fn is_attachment(part: &MessagePart) -> bool {
    if let Some(disposition) = part.content_disposition() {
        if disposition.ctype().eq_ignore_ascii_case("attachment") {
            return true;
        }
    }

    if part.attachment_name().is_none() {
        return false;
    }

    match part.content_type() {
        Some(ct) => !matches!(ct.ctype(), "text" | "multipart" | "message"),
        None => false,
    }
}

fn extract_attachment(part: &MessagePart) -> Option<AttachmentBlob> {
    let data = match &part.body {
        PartType::Binary(data) | PartType::InlineBinary(data) => data.to_vec(),
        PartType::Text(text) => text.as_bytes().to_vec(),
        PartType::Html(html) => html.as_bytes().to_vec(),
        _ => return None,
    };

    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let filename = match part.attachment_name() {
        Some(name) if !name.trim().is_empty() => sanitize_filename(name),
        _ => {
            let extension = mime_guess::get_mime_extensions_str(&content_type)
                .and_then(|exts| exts.first())
                .copied()
                .unwrap_or("bin");
            format!("attachment.{}", extension)
        }
    };

    let declared_size = part
        .content_disposition()
        .and_then(|d| d.attribute("size"))
        .and_then(|size| size.trim().parse().ok());

    Some(AttachmentBlob {
        filename,
        content_type,
        data,
        declared_size,
    })
}

/// Reduces an attachment name to a safe single path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._- ]` becomes
/// `_`, and leading or trailing dots and spaces are trimmed.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');

    if cleaned.len() > 255 {
        let ext_start = cleaned.rfind('.').unwrap_or(cleaned.len());
        let ext = &cleaned[ext_start..];
        let ext = if ext.len() > 50 { "" } else { ext };
        let mut end = 255 - ext.len();
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{}", &cleaned[..end], ext)
    } else if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}
