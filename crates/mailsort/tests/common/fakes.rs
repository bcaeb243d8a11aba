//! In-memory stand-ins for mail servers and the disk-space probe.

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use mailsort::storage::SpaceProbe;
use mailsort::transport::{
    MailSender, MailboxSession, OutgoingMessage, Result as TransportResult, TransportError,
};

/// Mailbox that serves canned messages and records every call.
///
/// Entries are `(uid, raw message)`. A uid may appear more than once to model
/// a server reporting the same message twice.
#[derive(Default)]
pub struct FakeMailbox {
    pub messages: Vec<(u32, Vec<u8>)>,
    pub selected: Option<String>,
    pub header_fetches: Vec<Vec<u32>>,
    pub body_fetches: Vec<u32>,
    pub archived: Vec<(u32, String)>,
    pub fail_archive: bool,
    pub fail_fetch: Vec<u32>,
}

impl FakeMailbox {
    pub fn new(messages: Vec<(u32, Vec<u8>)>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MailboxSession for FakeMailbox {
    async fn select(&mut self, mailbox: &str) -> TransportResult<u32> {
        self.selected = Some(mailbox.to_string());
        Ok(self.messages.len() as u32)
    }

    async fn search_since(&mut self, _since: NaiveDate) -> TransportResult<Vec<u32>> {
        let mut uids: Vec<u32> = self.messages.iter().map(|(uid, _)| *uid).collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    async fn fetch_headers(&mut self, uids: &[u32]) -> TransportResult<Vec<(u32, Vec<u8>)>> {
        self.header_fetches.push(uids.to_vec());
        Ok(self
            .messages
            .iter()
            .filter(|(uid, _)| uids.contains(uid))
            .map(|(uid, raw)| {
                let end = raw
                    .windows(4)
                    .position(|w| w == b"\r\n\r\n")
                    .map(|pos| pos + 4)
                    .unwrap_or(raw.len());
                (*uid, raw[..end].to_vec())
            })
            .collect())
    }

    async fn fetch_message(&mut self, uid: u32) -> TransportResult<Vec<u8>> {
        self.body_fetches.push(uid);
        if self.fail_fetch.contains(&uid) {
            return Err(TransportError::Transient("connection reset".to_string()));
        }
        self.messages
            .iter()
            .find(|(u, _)| *u == uid)
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| TransportError::Permanent(format!("no message {}", uid)))
    }

    async fn archive(&mut self, uid: u32, folder: &str) -> TransportResult<()> {
        if self.fail_archive {
            return Err(TransportError::Permanent("MOVE rejected".to_string()));
        }
        self.archived.push((uid, folder.to_string()));
        Ok(())
    }

    async fn logout(&mut self) -> TransportResult<()> {
        self.selected = None;
        Ok(())
    }
}

/// SMTP stand-in that keeps every delivered message.
#[derive(Default)]
pub struct FakeSender {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub fail_transient: AtomicBool,
    pub fail_auth: AtomicBool,
    /// Fails only messages whose subject contains this text.
    pub fail_subject: Mutex<Option<String>>,
}

impl FakeSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_subject(&self, needle: &str) {
        *self.fail_subject.lock().unwrap() = Some(needle.to_string());
    }
}

#[async_trait]
impl MailSender for FakeSender {
    async fn send(&self, message: &OutgoingMessage) -> TransportResult<()> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(TransportError::AuthenticationFailed(
                "535 authentication failed".to_string(),
            ));
        }
        if self.fail_transient.load(Ordering::SeqCst) {
            return Err(TransportError::Transient("451 try again".to_string()));
        }
        if let Some(needle) = self.fail_subject.lock().unwrap().as_deref() {
            if message.subject.contains(needle) {
                return Err(TransportError::Permanent("552 message rejected".to_string()));
            }
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Disk-space probe reporting an adjustable amount of free space.
pub struct FakeSpace(pub AtomicU64);

impl FakeSpace {
    pub fn new(bytes: u64) -> Self {
        Self(AtomicU64::new(bytes))
    }
}

impl SpaceProbe for FakeSpace {
    fn available(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

impl SpaceProbe for &FakeSpace {
    fn available(&self, path: &Path) -> io::Result<u64> {
        (**self).available(path)
    }
}
