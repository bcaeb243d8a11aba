//! IMAP session for the ingestion pipeline.

use std::collections::HashSet;

use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::config::ImapConfig;
use crate::secrets::{CredentialVault, SecretBackend};

use super::retry::{with_retry, Attempts};
use super::{Result, TransportError};

/// Type alias for the underlying async stream (using async-std compatible TcpStream).
type AsyncTcpStream = async_io::Async<std::net::TcpStream>;

/// Type alias for the TLS stream used by the IMAP session.
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// Mailbox operations the ingestion pipeline relies on.
///
/// Uids are only meaningful within the currently selected mailbox.
#[async_trait]
pub trait MailboxSession: Send {
    /// Selects `mailbox` read-write and returns its message count.
    async fn select(&mut self, mailbox: &str) -> Result<u32>;

    /// Uids of messages with an internal date on or after `since`.
    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>>;

    /// Raw header blocks for `uids`, without setting `\Seen`.
    async fn fetch_headers(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>>;

    /// Complete RFC 822 message, without setting `\Seen`.
    async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>>;

    /// Moves the message to `folder`, creating the folder on first use.
    async fn archive(&mut self, uid: u32, folder: &str) -> Result<()>;

    async fn logout(&mut self) -> Result<()>;
}

/// Formats a date the way IMAP SEARCH expects it (`05-Jan-2024`).
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

fn classify(e: async_imap::error::Error) -> TransportError {
    use async_imap::error::Error;

    match e {
        Error::Io(e) => TransportError::Transient(e.to_string()),
        Error::ConnectionLost => TransportError::Transient("connection lost".to_string()),
        other => TransportError::Permanent(other.to_string()),
    }
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Authenticated IMAP session over implicit TLS.
///
/// Read-only commands (SELECT, SEARCH, FETCH) that fail transiently are
/// retried on a fresh connection, up to the configured attempt count.
/// Archive moves are not retried.
pub struct ImapSession {
    session: Option<Session<TlsStream>>,
    config: ImapConfig,
    password: SecretString,
    supports_move: bool,
    known_folders: HashSet<String>,
    selected: Option<String>,
}

impl ImapSession {
    /// Resolves the password from `vault`, then connects and logs in with retry.
    ///
    /// A legacy plaintext credential is re-stored encrypted once login succeeds.
    pub async fn open<B: SecretBackend>(
        config: &ImapConfig,
        vault: &CredentialVault<B>,
    ) -> crate::Result<Self> {
        let password = vault.resolve(&config.user)?;
        let session = Self::connect(config, &password).await?;

        if let Err(e) = vault.migrate_legacy(&config.user) {
            warn!("Could not migrate credential for {}: {}", config.user, e);
        }

        Ok(session)
    }

    pub async fn connect(config: &ImapConfig, password: &SecretString) -> Result<Self> {
        let policy = config.retry_policy();
        let mut session = with_retry(&policy, "IMAP login", || login(config, password)).await?;

        let supports_move = match session.capabilities().await {
            Ok(caps) => caps.has_str("MOVE"),
            Err(e) => {
                debug!("CAPABILITY failed, assuming no MOVE support: {}", e);
                false
            }
        };
        debug!("Server MOVE support: {}", supports_move);

        Ok(Self {
            session: Some(session),
            config: config.clone(),
            password: SecretString::from(password.expose_secret()),
            supports_move,
            known_folders: HashSet::new(),
            selected: None,
        })
    }

    fn session(&mut self) -> Result<&mut Session<TlsStream>> {
        self.session.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Replaces the connection and re-selects the current mailbox.
    async fn reconnect(&mut self) -> Result<()> {
        self.session = None;
        let policy = self.config.retry_policy();
        let (config, password) = (&self.config, &self.password);
        let session = with_retry(&policy, "IMAP login", || login(config, password)).await?;
        info!("Reconnected to IMAP server");
        self.session = Some(session);

        if let Some(mailbox) = self.selected.clone() {
            select_mailbox(self.session()?, &mailbox).await?;
        }
        Ok(())
    }

    async fn ensure_folder(&mut self, folder: &str) -> Result<()> {
        if self.known_folders.contains(folder) {
            return Ok(());
        }
        let session = self.session()?;
        match session.create(folder).await {
            Ok(()) => info!("Created mailbox folder {}", folder),
            // Most servers answer NO when the folder already exists.
            Err(e) => debug!("CREATE {} not applied: {}", folder, e),
        }
        self.known_folders.insert(folder.to_string());
        Ok(())
    }
}

async fn login(config: &ImapConfig, password: &SecretString) -> Result<Session<TlsStream>> {
    let addr = format!("{}:{}", config.server, config.port);
    info!("Connecting to IMAP server at {}", addr);

    // Establish TCP connection using std::net and wrap with async-io
    let std_stream = std::net::TcpStream::connect(&addr)
        .map_err(|e| TransportError::Transient(format!("connect to {}: {}", addr, e)))?;
    std_stream
        .set_nonblocking(true)
        .map_err(|e| TransportError::Transient(e.to_string()))?;
    let tcp_stream =
        async_io::Async::new(std_stream).map_err(|e| TransportError::Transient(e.to_string()))?;

    let tls = TlsConnector::new().danger_accept_invalid_certs(config.accept_invalid_certs);
    let tls_stream = tls
        .connect(&config.server, tcp_stream)
        .await
        .map_err(|e| TransportError::Transient(format!("TLS handshake: {}", e)))?;

    let client = async_imap::Client::new(tls_stream);

    let session = client
        .login(&config.user, password.expose_secret())
        .await
        .map_err(|(e, _)| match e {
            async_imap::error::Error::Io(_) | async_imap::error::Error::ConnectionLost => {
                classify(e)
            }
            other => TransportError::AuthenticationFailed(other.to_string()),
        })?;

    info!("Authenticated to IMAP server as {}", config.user);
    Ok(session)
}

async fn select_mailbox(session: &mut Session<TlsStream>, mailbox: &str) -> Result<u32> {
    let selected = session.select(mailbox).await.map_err(|e| match e {
        async_imap::error::Error::No(_) => TransportError::FolderNotFound(mailbox.to_string()),
        other => classify(other),
    })?;
    Ok(selected.exists)
}

async fn search_uids(session: &mut Session<TlsStream>, query: &str) -> Result<Vec<u32>> {
    let uids = session.uid_search(query).await.map_err(classify)?;
    let mut uid_list: Vec<u32> = uids.into_iter().collect();
    uid_list.sort_unstable();
    Ok(uid_list)
}

async fn fetch_header_blocks(
    session: &mut Session<TlsStream>,
    uids: &[u32],
) -> Result<Vec<(u32, Vec<u8>)>> {
    // RFC822.HEADER is the non-marking equivalent of BODY.PEEK[HEADER].
    let fetches: Vec<_> = session
        .uid_fetch(uid_set(uids), "(UID RFC822.HEADER)")
        .await
        .map_err(classify)?
        .try_collect()
        .await
        .map_err(classify)?;

    let mut headers = Vec::with_capacity(fetches.len());
    for fetch in fetches {
        match (fetch.uid, fetch.header()) {
            (Some(uid), Some(header)) => headers.push((uid, header.to_vec())),
            _ => warn!("Header fetch response without UID or header"),
        }
    }
    headers.sort_by_key(|(uid, _)| *uid);
    Ok(headers)
}

async fn fetch_body(session: &mut Session<TlsStream>, uid: u32) -> Result<Vec<u8>> {
    let fetches: Vec<_> = session
        .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
        .await
        .map_err(classify)?
        .try_collect()
        .await
        .map_err(classify)?;

    fetches
        .iter()
        .find(|f| f.uid == Some(uid))
        .or_else(|| fetches.first())
        .and_then(|f| f.body())
        .map(|body| body.to_vec())
        .ok_or_else(|| TransportError::Permanent(format!("Message with UID {} not found", uid)))
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let mut attempts = Attempts::new(self.config.retry_policy(), "IMAP SELECT");
        let exists = loop {
            let result = select_mailbox(self.session()?, mailbox).await;
            match result {
                Ok(exists) => break exists,
                Err(e) => {
                    attempts.retry_after(e).await?;
                    self.reconnect().await?;
                }
            }
        };
        debug!("Selected {} ({} messages)", mailbox, exists);
        self.selected = Some(mailbox.to_string());
        Ok(exists)
    }

    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        let query = format!("SINCE {}", imap_date(since));
        debug!("Searching with query: {}", query);

        let mut attempts = Attempts::new(self.config.retry_policy(), "IMAP SEARCH");
        let uids = loop {
            let result = search_uids(self.session()?, &query).await;
            match result {
                Ok(uids) => break uids,
                Err(e) => {
                    attempts.retry_after(e).await?;
                    self.reconnect().await?;
                }
            }
        };
        debug!("Found {} messages since {}", uids.len(), since);
        Ok(uids)
    }

    async fn fetch_headers(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempts = Attempts::new(self.config.retry_policy(), "IMAP header FETCH");
        loop {
            let result = fetch_header_blocks(self.session()?, uids).await;
            match result {
                Ok(headers) => return Ok(headers),
                Err(e) => {
                    attempts.retry_after(e).await?;
                    self.reconnect().await?;
                }
            }
        }
    }

    async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>> {
        debug!("Fetching message with UID {}", uid);

        let mut attempts = Attempts::new(self.config.retry_policy(), "IMAP body FETCH");
        loop {
            let result = fetch_body(self.session()?, uid).await;
            match result {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempts.retry_after(e).await?;
                    self.reconnect().await?;
                }
            }
        }
    }

    async fn archive(&mut self, uid: u32, folder: &str) -> Result<()> {
        self.ensure_folder(folder).await?;

        let supports_move = self.supports_move;
        let session = self.session()?;
        let set = uid.to_string();

        if supports_move {
            session.uid_mv(&set, folder).await.map_err(classify)?;
        } else {
            session.uid_copy(&set, folder).await.map_err(classify)?;
            let _: Vec<_> = session
                .uid_store(&set, "+FLAGS.SILENT (\\Deleted)")
                .await
                .map_err(classify)?
                .try_collect()
                .await
                .map_err(classify)?;
            let _: Vec<_> = session
                .expunge()
                .await
                .map_err(classify)?
                .try_collect()
                .await
                .map_err(classify)?;
        }

        debug!("Archived UID {} to {}", uid, folder);
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            info!("Disconnecting from IMAP server");
            session.logout().await.map_err(classify)?;
        }
        self.selected = None;
        Ok(())
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapSession dropped without logout - session will be closed");
        }
    }
}
