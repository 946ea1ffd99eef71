use lettre::{
    AsyncFileTransport, AsyncTransport, Message, Tokio1Executor,
    address::AddressError,
    message::{
        Body, Mailbox,
        header::{ContentTransferEncoding, ContentType},
    },
    transport::file,
};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::info;

pub const FROM_ADDRESS: &str = "webmaster@localhost";

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid mail address: {0}")]
    Address(#[from] AddressError),
    #[error("The message body could not be encoded")]
    Body,
    #[error("Building the message failed: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("Creating the outbox directory failed: {0}")]
    Directory(#[from] std::io::Error),
    #[error("Writing the message failed: {0}")]
    Transport(#[from] file::Error),
}

/// Mail sink that writes every outgoing message to its own `.eml` file.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Outbox {
    dir: PathBuf,
}

impl Outbox {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Delivers `email` and returns the id of the stored message.
    pub async fn send(&self, email: &Email) -> Result<String, MailError> {
        // Always quoted-printable, so stored messages stay 7-bit and links survive line wrapping.
        let body = Body::new_with_encoding(
            email.body.clone(),
            ContentTransferEncoding::QuotedPrintable,
        )
        .map_err(|_| MailError::Body)?;

        let message = Message::builder()
            .from(FROM_ADDRESS.parse::<Mailbox>()?)
            .to(email.to.parse::<Mailbox>()?)
            .subject(&email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        fs::create_dir_all(&self.dir).await?;
        let transport = AsyncFileTransport::<Tokio1Executor>::new(&self.dir);
        let id = transport.send(message).await?;

        info!(to = %email.to, subject = %email.subject, %id, "Sent mail");
        Ok(id)
    }

    /// Every stored message as raw RFC 5322 text, in no particular order.
    #[cfg(test)]
    pub async fn sent(&self) -> std::io::Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let mut messages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|extension| extension == "eml") {
                messages.push(fs::read_to_string(entry.path()).await?);
            }
        }
        Ok(messages)
    }
}
