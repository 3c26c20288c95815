//! File Platform
//!
//! A chat platform without a network: events arrive as JSON lines on stdin
//! (or a file), directory listings come from a TOML file that is re-read on
//! every refresh, and everything the bot sends is written to stdout as one
//! JSON object per line.

use anyhow::{Context, Result};
use async_trait::async_trait;
use relaybot_core::channel::{
    BotIdentity, ChannelRef, DirectMessageInfo, DirectorySource, EventSource, FileMeta,
    MessageRecord, OutboundPayload, RawEvent, Responder,
};
use relaybot_core::UserRef;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::directory::DirectoryFile;

/// How long to wait for further lines once a batch has started
const BATCH_LINGER: Duration = Duration::from_millis(5);

type EventLines = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// One line written to the output
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputRecord<'a> {
    Post(&'a OutboundPayload),
    Reaction {
        channel: &'a str,
        ts: &'a str,
        name: &'a str,
    },
}

pub struct FilePlatform {
    directory_path: PathBuf,
    events: Mutex<Option<EventLines>>,
    output: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    batch_size: usize,
}

impl FilePlatform {
    pub fn new(
        directory_path: impl Into<PathBuf>,
        events: Box<dyn AsyncRead + Send + Unpin>,
        output: Box<dyn AsyncWrite + Send + Unpin>,
        batch_size: usize,
    ) -> Self {
        Self {
            directory_path: directory_path.into(),
            events: Mutex::new(Some(BufReader::new(events).lines())),
            output: Mutex::new(output),
            batch_size: batch_size.max(1),
        }
    }

    /// Events from `events_file` (stdin when `None`), output to stdout
    pub async fn stdio(
        directory_path: impl Into<PathBuf>,
        events_file: Option<&Path>,
        batch_size: usize,
    ) -> Result<Self> {
        let events: Box<dyn AsyncRead + Send + Unpin> = match events_file {
            Some(path) => Box::new(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open events file {}", path.display()))?,
            ),
            None => Box::new(tokio::io::stdin()),
        };
        Ok(Self::new(
            directory_path,
            events,
            Box::new(tokio::io::stdout()),
            batch_size,
        ))
    }

    /// Output only, for processes that never read events
    pub fn output_only(directory_path: impl Into<PathBuf>) -> Self {
        Self::new(
            directory_path,
            Box::new(tokio::io::empty()),
            Box::new(tokio::io::stdout()),
            1,
        )
    }

    async fn directory(&self) -> Result<DirectoryFile> {
        DirectoryFile::read(&self.directory_path).await
    }

    async fn write_record(&self, record: &OutputRecord<'_>) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut output = self.output.lock().await;
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
        Ok(())
    }
}

fn parse_event(line: &str) -> Option<RawEvent> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Skipping malformed event line: {}", e);
            None
        }
    }
}

#[async_trait]
impl EventSource for FilePlatform {
    async fn poll_events(&self) -> Result<Option<Vec<RawEvent>>> {
        let mut guard = self.events.lock().await;
        let Some(lines) = guard.as_mut() else {
            return Ok(None);
        };

        let mut batch = Vec::new();
        let mut closed = false;

        // Wait for the first line, then take whatever follows without blocking
        match lines.next_line().await? {
            Some(line) => batch.extend(parse_event(&line)),
            None => closed = true,
        }
        while !closed && batch.len() < self.batch_size {
            match tokio::time::timeout(BATCH_LINGER, lines.next_line()).await {
                Ok(Ok(Some(line))) => batch.extend(parse_event(&line)),
                Ok(Ok(None)) => closed = true,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        if closed {
            *guard = None;
            if batch.is_empty() {
                return Ok(None);
            }
        }
        debug!(count = batch.len(), "Read events");
        Ok(Some(batch))
    }
}

#[async_trait]
impl DirectorySource for FilePlatform {
    async fn bot_identity(&self) -> Result<BotIdentity> {
        Ok(self.directory().await?.bot)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelRef>> {
        Ok(self.directory().await?.channels)
    }

    async fn list_direct_messages(&self) -> Result<Vec<DirectMessageInfo>> {
        Ok(self.directory().await?.direct_messages)
    }

    async fn list_users(&self) -> Result<Vec<UserRef>> {
        Ok(self.directory().await?.users)
    }

    async fn fetch_message(&self, channel_id: &str, ts: &str) -> Result<Option<MessageRecord>> {
        Ok(self.directory().await?.message(channel_id, ts))
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Option<FileMeta>> {
        Ok(self.directory().await?.file(file_id))
    }
}

#[async_trait]
impl Responder for FilePlatform {
    async fn post(&self, payload: &OutboundPayload) -> Result<()> {
        self.write_record(&OutputRecord::Post(payload)).await
    }

    async fn add_reaction(&self, channel_id: &str, ts: &str, name: &str) -> Result<()> {
        self.write_record(&OutputRecord::Reaction {
            channel: channel_id,
            ts,
            name,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIRECTORY: &str = r#"
        [bot]
        user_id = "UBOT"

        [[channels]]
        id = "C1"
        name = "general"

        [[users]]
        id = "U1"
        name = "alice"
    "#;

    fn setup(events: &str) -> (TempDir, FilePlatform, tokio::io::DuplexStream) {
        let temp_dir = tempfile::tempdir().unwrap();
        let directory = temp_dir.path().join("directory.toml");
        std::fs::write(&directory, DIRECTORY).unwrap();

        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let platform = FilePlatform::new(
            directory,
            Box::new(std::io::Cursor::new(events.as_bytes().to_vec())),
            Box::new(writer),
            10,
        );
        (temp_dir, platform, reader)
    }

    #[tokio::test]
    async fn test_reads_batch_then_closes() {
        let events = concat!(
            r#"{"type":"message","channel":"C1","user":"U1","text":"hi","ts":"1.0"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"type":"user_typing","channel":"C1"}"#,
            "\n",
        );
        let (_temp_dir, platform, _output) = setup(events);

        let batch = platform.poll_events().await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch[0], RawEvent::Message(_)));
        assert_eq!(batch[1], RawEvent::Unsupported);

        assert!(platform.poll_events().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_size_limits_reads() {
        let line = r#"{"type":"message","channel":"C1","user":"U1","text":"hi","ts":"1.0"}"#;
        let events = format!("{line}\n").repeat(15);
        let (_temp_dir, platform, _output) = setup(&events);

        assert_eq!(platform.poll_events().await.unwrap().unwrap().len(), 10);
        assert_eq!(platform.poll_events().await.unwrap().unwrap().len(), 5);
        assert!(platform.poll_events().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_is_reread() {
        let (temp_dir, platform, _output) = setup("");
        assert_eq!(platform.list_channels().await.unwrap().len(), 1);
        assert_eq!(platform.bot_identity().await.unwrap().user_id, "UBOT");

        let updated = format!("{DIRECTORY}\n[[channels]]\nid = \"C2\"\nname = \"ops\"\n");
        std::fs::write(temp_dir.path().join("directory.toml"), updated).unwrap();
        assert_eq!(platform.list_channels().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_posts_and_reactions_are_json_lines() {
        let (_temp_dir, platform, output) = setup("");
        platform
            .post(&OutboundPayload::new("C1", "hello").with_thread_ts(Some("5.0".into())))
            .await
            .unwrap();
        platform.add_reaction("C1", "5.0", "eyes").await.unwrap();

        let mut lines = BufReader::new(output).lines();
        let post: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(post["type"], "post");
        assert_eq!(post["channel"], "C1");
        assert_eq!(post["text"], "hello");
        assert_eq!(post["thread_ts"], "5.0");
        assert_eq!(post["method"], "chat.postMessage");

        let reaction: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reaction["type"], "reaction");
        assert_eq!(reaction["name"], "eyes");
    }
}
