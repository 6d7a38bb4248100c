//! Sequencing of the deck-then-image conversation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use deckbg_core::{cleanup_all, Error, SessionStore, UserId};
use deckbg_pptx::{check_deck_file_name, TransformEngine, TransformSummary};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::config::ServiceConfig;
use crate::messages;
use crate::transport::{FileRef, Transport};

/// Result of a deck upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckOutcome {
    /// The deck is stored and the user was asked for an image.
    Accepted,
    /// Not a `.pptx` by name; nothing was fetched.
    Rejected,
    /// Fetching the deck failed; no session points at it.
    Failed,
}

/// Result of an image upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    Delivered(TransformSummary),
    /// No deck was pending; nothing was fetched or written.
    NotReady,
    Failed,
}

type UserLocks = parking_lot::Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>;

/// Drives one [`Transport`] through the upload conversation.
///
/// Events for different users run concurrently. Events for the same user are
/// serialized, so a deck upload never races a transform in flight and a
/// second image only sees the session after the first one has finished.
pub struct Orchestrator<T> {
    config: ServiceConfig,
    transport: T,
    sessions: Arc<SessionStore>,
    engine: Arc<TransformEngine>,
    permits: Arc<Semaphore>,
    user_locks: UserLocks,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(config: ServiceConfig, transport: T) -> Self {
        Self::with_sessions(config, transport, Arc::new(SessionStore::new()))
    }

    /// Build an orchestrator around an existing session store.
    pub fn with_sessions(config: ServiceConfig, transport: T, sessions: Arc<SessionStore>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_transforms.max(1)));
        Self {
            config,
            transport,
            sessions,
            engine: Arc::new(TransformEngine::new()),
            permits,
            user_locks: UserLocks::default(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub async fn start(&self, user: UserId) {
        self.reply(user, messages::GREETING).await;
    }

    /// A document arrived. Store it as the user's pending deck.
    pub async fn deck_received(&self, user: UserId, file_name: &str, file: &FileRef) -> DeckOutcome {
        if let Err(e) = check_deck_file_name(file_name) {
            log_error(user, &e);
            self.reply(user, messages::WRONG_FORMAT).await;
            return DeckOutcome::Rejected;
        }

        let lease = UserLease::acquire(&self.user_locks, user);
        let _guard = lease.lock.lock().await;

        let deck_path = self.config.deck_path(user);
        if let Err(e) = self.transport.download(user, file, &deck_path).await {
            log::error!("User {}: downloading deck {} failed: {:#}", user, file, e);
            if self
                .sessions
                .get(user)
                .is_some_and(|s| s.pending_deck_path == deck_path)
            {
                self.sessions.clear(user);
            }
            cleanup_all([&deck_path]);
            self.reply(user, messages::FAILED).await;
            return DeckOutcome::Failed;
        }

        if let Some(displaced) = self.sessions.put(user, &deck_path) {
            if displaced.pending_deck_path != deck_path {
                log::debug!(
                    "User {}: dropping displaced deck {}",
                    user,
                    displaced.pending_deck_path.display()
                );
                cleanup_all([&displaced.pending_deck_path]);
            }
        }

        log::info!("User {}: received deck {}", user, file_name);
        self.reply(user, &messages::deck_accepted(file_name)).await;
        DeckOutcome::Accepted
    }

    /// An image arrived. Rebuild the pending deck over it and deliver the
    /// result.
    ///
    /// Whatever happens after the session is consumed, the deck, the image
    /// and the output are removed and the session is cleared before this
    /// returns.
    pub async fn image_received(&self, user: UserId, file: &FileRef) -> ImageOutcome {
        let lease = UserLease::acquire(&self.user_locks, user);
        let _guard = lease.lock.lock().await;

        let deck_path = match self.sessions.try_consume(user) {
            Ok(path) => path,
            Err(e) => {
                log_error(user, &e);
                self.reply(user, messages::SEND_DECK_FIRST).await;
                return ImageOutcome::NotReady;
            }
        };

        let status = match self.transport.send_status(user, messages::PROCESSING).await {
            Ok(status) => Some(status),
            Err(e) => {
                log::warn!("User {}: sending status failed: {:#}", user, e);
                None
            }
        };

        let image_path = self.config.image_path(user);
        let output_path = self.config.output_path(user);

        let outcome = match self.render(user, file, &deck_path, &image_path, &output_path).await {
            Ok(summary) => {
                match self
                    .transport
                    .send_document(user, &output_path, messages::DONE_CAPTION)
                    .await
                {
                    Ok(()) => {
                        log::info!("User {}: delivered {} slides", user, summary.slides);
                        ImageOutcome::Delivered(summary)
                    }
                    Err(e) => {
                        log::error!("User {}: delivering deck failed: {:#}", user, e);
                        self.reply(user, messages::FAILED).await;
                        ImageOutcome::Failed
                    }
                }
            }
            Err(e) => {
                match e.downcast_ref::<Error>() {
                    Some(error) => log_error(user, error),
                    None => log::error!("User {}: {:#}", user, e),
                }
                self.reply(user, messages::FAILED).await;
                ImageOutcome::Failed
            }
        };

        let report = cleanup_all([&deck_path, &image_path, &output_path]);
        if !report.is_clean() {
            log::warn!(
                "User {}: {} artifact(s) left behind",
                user,
                report.warnings.len()
            );
        }
        self.sessions.clear(user);

        if let Some(status) = status {
            if let Err(e) = self.transport.delete_status(user, status).await {
                log::warn!("User {}: removing status message failed: {:#}", user, e);
            }
        }

        outcome
    }

    async fn render(
        &self,
        user: UserId,
        file: &FileRef,
        deck_path: &Path,
        image_path: &Path,
        output_path: &Path,
    ) -> anyhow::Result<TransformSummary> {
        self.transport
            .download(user, file, image_path)
            .await
            .with_context(|| format!("downloading image {}", file))?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .context("transform pool is closed")?;
        let engine = Arc::clone(&self.engine);
        let (deck, image, output) = (
            deck_path.to_path_buf(),
            image_path.to_path_buf(),
            output_path.to_path_buf(),
        );

        let summary = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.run(&deck, &image, &output)
        })
        .await
        .map_err(|e| anyhow::anyhow!("transform task join failed: {e}"))??;

        Ok(summary)
    }

    async fn reply(&self, user: UserId, text: &str) {
        if let Err(e) = self.transport.send_text(user, text).await {
            log::warn!("User {}: sending reply failed: {:#}", user, e);
        }
    }
}

/// Log at error level, unless the user simply sent the wrong thing.
fn log_error(user: UserId, error: &Error) {
    if error.is_user_facing() {
        log::info!("User {}: {}", user, error);
    } else {
        log::error!("User {}: {}", user, error);
    }
}

/// A handle on one user's lock. The map entry goes away with the last
/// handle, so idle users cost nothing.
struct UserLease<'a> {
    locks: &'a UserLocks,
    user: UserId,
    lock: Arc<AsyncMutex<()>>,
}

impl<'a> UserLease<'a> {
    fn acquire(locks: &'a UserLocks, user: UserId) -> Self {
        let lock = Arc::clone(locks.lock().entry(user).or_default());
        Self { locks, user, lock }
    }
}

impl Drop for UserLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // The map and this lease are the only holders left.
        let idle = locks
            .get(&self.user)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
        if idle {
            locks.remove(&self.user);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StatusHandle;
    use deckbg_core::{Deck, FontSize, Geometry, Paragraph, ShapeKind};
    use deckbg_pptx::{PptxParser, PptxWriter};
    use std::io::Cursor;
    use std::path::PathBuf;

    const USER: UserId = UserId(42);
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(UserId, String),
        Status(UserId, String),
        StatusDeleted(UserId, StatusHandle),
        Document(UserId, String),
    }

    #[derive(Default)]
    struct RecordingTransport {
        files: parking_lot::Mutex<HashMap<FileRef, Vec<u8>>>,
        sent: parking_lot::Mutex<Vec<Sent>>,
        downloads: parking_lot::Mutex<Vec<FileRef>>,
        documents: parking_lot::Mutex<Vec<Vec<u8>>>,
        fail_delete_status: bool,
    }

    impl RecordingTransport {
        fn with_file(self, name: &str, data: &[u8]) -> Self {
            self.files.lock().insert(FileRef(name.to_string()), data.to_vec());
            self
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text(_, text) => Some(text),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn download(&self, _user: UserId, file: &FileRef, dest: &Path) -> anyhow::Result<()> {
            self.downloads.lock().push(file.clone());
            let data = self
                .files
                .lock()
                .get(file)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such file: {file}"))?;
            tokio::fs::write(dest, data).await?;
            Ok(())
        }

        async fn send_text(&self, user: UserId, text: &str) -> anyhow::Result<()> {
            self.sent.lock().push(Sent::Text(user, text.to_string()));
            Ok(())
        }

        async fn send_status(&self, user: UserId, text: &str) -> anyhow::Result<StatusHandle> {
            let mut sent = self.sent.lock();
            sent.push(Sent::Status(user, text.to_string()));
            Ok(StatusHandle(sent.len() as u64))
        }

        async fn delete_status(&self, user: UserId, status: StatusHandle) -> anyhow::Result<()> {
            if self.fail_delete_status {
                anyhow::bail!("status message is gone");
            }
            self.sent.lock().push(Sent::StatusDeleted(user, status));
            Ok(())
        }

        async fn send_document(
            &self,
            user: UserId,
            path: &Path,
            caption: &str,
        ) -> anyhow::Result<()> {
            let data = tokio::fs::read(path).await?;
            self.documents.lock().push(data);
            self.sent
                .lock()
                .push(Sent::Document(user, caption.to_string()));
            Ok(())
        }
    }

    fn hello_deck() -> Vec<u8> {
        let mut deck = Deck::default();
        let frame = deck
            .add_slide()
            .add_text_box(Geometry::new(100, 100, 200, 50));
        frame.clear();
        frame.paragraphs.push(
            Paragraph::new("Hello")
                .with_size(FontSize::from_points(24))
                .with_bold(true),
        );
        deck.add_slide();

        PptxWriter::new()
            .write(&deck, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner()
    }

    fn transport() -> RecordingTransport {
        RecordingTransport::default()
            .with_file("deck", &hello_deck())
            .with_file("photo", JPEG)
            .with_file("broken", b"not a zip archive")
    }

    fn setup(transport: RecordingTransport) -> (tempfile::TempDir, Orchestrator<RecordingTransport>) {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::new(dir.path()).with_max_concurrent_transforms(2);
        (dir, Orchestrator::new(config, transport))
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    fn deck(name: &str) -> FileRef {
        FileRef(name.to_string())
    }

    #[tokio::test]
    async fn test_start_greets() {
        let (_dir, orchestrator) = setup(transport());

        orchestrator.start(USER).await;

        assert_eq!(orchestrator.transport().texts(), vec![messages::GREETING]);
    }

    #[tokio::test]
    async fn test_wrong_format_fetches_nothing() {
        let (dir, orchestrator) = setup(transport());

        let outcome = orchestrator
            .deck_received(USER, "slides.key", &deck("deck"))
            .await;

        assert_eq!(outcome, DeckOutcome::Rejected);
        assert!(orchestrator.transport().downloads.lock().is_empty());
        assert!(orchestrator.sessions().is_empty());
        assert!(files_in(dir.path()).is_empty());
        assert_eq!(orchestrator.transport().texts(), vec![messages::WRONG_FORMAT]);
    }

    #[tokio::test]
    async fn test_image_without_deck_is_not_ready() {
        let (dir, orchestrator) = setup(transport());

        let outcome = orchestrator.image_received(USER, &deck("photo")).await;

        assert_eq!(outcome, ImageOutcome::NotReady);
        assert!(orchestrator.transport().downloads.lock().is_empty());
        assert!(files_in(dir.path()).is_empty());
        assert_eq!(
            orchestrator.transport().sent(),
            vec![Sent::Text(USER, messages::SEND_DECK_FIRST.to_string())]
        );
    }

    #[tokio::test]
    async fn test_deck_then_image_delivers_rebuilt_deck() {
        let (dir, orchestrator) = setup(transport());

        let outcome = orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;
        assert_eq!(outcome, DeckOutcome::Accepted);
        assert!(orchestrator.sessions().contains(USER));
        assert!(orchestrator.config().deck_path(USER).exists());

        let outcome = orchestrator.image_received(USER, &deck("photo")).await;
        let ImageOutcome::Delivered(summary) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!(summary.slides, 2);
        assert_eq!(summary.text_boxes, 1);

        let sent = orchestrator.transport().sent();
        assert_eq!(
            sent[0],
            Sent::Text(USER, messages::deck_accepted("hello.pptx"))
        );
        assert_eq!(sent[1], Sent::Status(USER, messages::PROCESSING.to_string()));
        assert_eq!(
            sent[2],
            Sent::Document(USER, messages::DONE_CAPTION.to_string())
        );
        assert!(matches!(sent[3], Sent::StatusDeleted(USER, _)));
        assert_eq!(sent.len(), 4);

        let documents = orchestrator.transport().documents.lock().clone();
        let output = PptxParser::new()
            .parse(Cursor::new(documents[0].clone()))
            .unwrap();
        assert_eq!(output.slides.len(), 2);
        assert_eq!(output.slides[0].shapes[0].kind, ShapeKind::Picture);
        assert_eq!(
            output.slides[0].shapes[1].geometry,
            Geometry::new(100, 100, 200, 50)
        );
        assert_eq!(output.slides[1].shapes.len(), 1);

        assert!(files_in(dir.path()).is_empty());
        assert!(orchestrator.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_deck_fails_and_cleans_up() {
        let (dir, orchestrator) = setup(transport());

        orchestrator
            .deck_received(USER, "broken.pptx", &deck("broken"))
            .await;
        let outcome = orchestrator.image_received(USER, &deck("photo")).await;

        assert_eq!(outcome, ImageOutcome::Failed);
        let texts = orchestrator.transport().texts();
        assert_eq!(texts.last().map(String::as_str), Some(messages::FAILED));
        assert!(orchestrator.transport().documents.lock().is_empty());
        assert!(matches!(
            orchestrator.transport().sent().last(),
            Some(Sent::StatusDeleted(USER, _))
        ));
        assert!(files_in(dir.path()).is_empty());
        assert!(orchestrator.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_fails_and_cleans_up() {
        let (dir, orchestrator) = setup(transport());

        orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;
        let outcome = orchestrator.image_received(USER, &deck("lost")).await;

        assert_eq!(outcome, ImageOutcome::Failed);
        assert!(files_in(dir.path()).is_empty());
        assert!(orchestrator.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_session_is_single_use() {
        let (_dir, orchestrator) = setup(transport());

        orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;
        orchestrator.image_received(USER, &deck("photo")).await;
        let outcome = orchestrator.image_received(USER, &deck("photo")).await;

        assert_eq!(outcome, ImageOutcome::NotReady);
    }

    #[tokio::test]
    async fn test_status_removal_failure_is_not_fatal() {
        let transport = RecordingTransport {
            fail_delete_status: true,
            ..Default::default()
        }
        .with_file("deck", &hello_deck())
        .with_file("photo", JPEG);
        let (dir, orchestrator) = setup(transport);

        orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;
        let outcome = orchestrator.image_received(USER, &deck("photo")).await;

        assert!(matches!(outcome, ImageOutcome::Delivered(_)));
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_new_deck_removes_displaced_deck() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("stale.pptx");
        std::fs::write(&stale, b"old").unwrap();

        let sessions = Arc::new(SessionStore::new());
        sessions.put(USER, &stale);
        let orchestrator =
            Orchestrator::with_sessions(ServiceConfig::new(dir.path()), transport(), sessions);

        orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;

        assert!(!stale.exists());
        assert_eq!(
            orchestrator.sessions().get(USER).map(|s| s.pending_deck_path),
            Some(orchestrator.config().deck_path(USER))
        );
    }

    #[tokio::test]
    async fn test_concurrent_images_for_one_user_are_serialized() {
        let (dir, orchestrator) = setup(transport());

        orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;
        let photo = deck("photo");
        let (first, second) = tokio::join!(
            orchestrator.image_received(USER, &photo),
            orchestrator.image_received(USER, &photo),
        );

        let outcomes = [first, second];
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, ImageOutcome::Delivered(_)))
                .count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == ImageOutcome::NotReady)
                .count(),
            1
        );
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_deck_waits_for_transform_in_flight() {
        let mut long = Deck::default();
        for n in 0..200 {
            long.add_slide()
                .add_text_box(Geometry::new(n, n, 100, 100))
                .add_paragraph(format!("slide {n}"));
        }
        let long = PptxWriter::new()
            .write(&long, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let (dir, orchestrator) = setup(transport().with_file("long", &long));

        orchestrator
            .deck_received(USER, "long.pptx", &deck("long"))
            .await;
        let photo = deck("photo");
        let hello = deck("deck");
        let (image, upload) = tokio::join!(
            orchestrator.image_received(USER, &photo),
            orchestrator.deck_received(USER, "hello.pptx", &hello),
        );

        let ImageOutcome::Delivered(summary) = image else {
            panic!("unexpected outcome: {image:?}");
        };
        assert_eq!(summary.slides, 200);
        assert_eq!(upload, DeckOutcome::Accepted);
        assert!(orchestrator.sessions().contains(USER));

        let deck_path = orchestrator.config().deck_path(USER);
        assert_eq!(files_in(dir.path()), vec![deck_path.clone()]);
        let uploaded = orchestrator.transport().files.lock()[&deck("deck")].clone();
        assert_eq!(std::fs::read(deck_path).unwrap(), uploaded);
    }

    #[tokio::test]
    async fn test_user_locks_are_released() {
        let (_dir, orchestrator) = setup(transport());

        orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;
        assert!(orchestrator.user_locks.lock().is_empty());

        let photo = deck("photo");
        tokio::join!(
            orchestrator.image_received(USER, &photo),
            orchestrator.image_received(UserId(7), &photo),
            orchestrator.image_received(USER, &photo),
        );
        assert!(orchestrator.user_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_users_do_not_share_sessions() {
        let (_dir, orchestrator) = setup(transport());
        let other = UserId(7);

        orchestrator
            .deck_received(USER, "hello.pptx", &deck("deck"))
            .await;
        orchestrator
            .deck_received(other, "hello.pptx", &deck("deck"))
            .await;
        orchestrator.image_received(USER, &deck("photo")).await;

        assert!(!orchestrator.sessions().contains(USER));
        assert!(orchestrator.sessions().contains(other));
        assert!(orchestrator.config().deck_path(other).exists());
    }
}
