//! Voice-driven review loop.
//!
//! A background worker reads the current item out, waits for an answer and
//! feeds it into the same transition function as the web page. Speech
//! engines are collaborators behind traits; the console implementations
//! here log prompts and read typed answers from stdin.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use shoplist_core::VoiceIntents;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::session::{SessionId, SharedSession};

/// Turns a prompt into speech.
pub trait SpeechSynthesizer: Send {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Why no answer was heard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("could not understand the answer")]
    Unintelligible,
    #[error("speech recognition failed: {0}")]
    Service(String),
    /// The recogniser will not listen any more.
    #[error("speech input closed")]
    Closed,
}

/// Blocks until an answer has been heard and transcribed.
pub trait SpeechRecognizer: Send {
    fn listen(&mut self) -> Result<String, RecognitionError>;
}

/// Opens a synthesizer/recognizer pair for each worker.
pub trait VoiceBackend: Send + Sync {
    fn open(&self) -> Result<(Box<dyn SpeechSynthesizer>, Box<dyn SpeechRecognizer>)>;
}

/// Why the voice loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceExit {
    /// Every item has been reviewed.
    Finished,
    /// The recogniser closed.
    InputClosed,
}

/// Run the review by voice until the queue is empty or input closes.
///
/// Blocking: call from a dedicated thread. The session lock is held only
/// while reading the current item and while applying an answer, never
/// while speaking or listening.
pub fn run_voice_loop(
    id: &SessionId,
    session: &SharedSession,
    intents: &VoiceIntents,
    synthesizer: &mut dyn SpeechSynthesizer,
    recognizer: &mut dyn SpeechRecognizer,
) -> VoiceExit {
    let exit = loop {
        let (entry, revision) = {
            let guard = session.blocking_lock();
            match guard.review.current() {
                Some(entry) => (entry.clone(), guard.revision()),
                None => break VoiceExit::Finished,
            }
        };

        if let Err(e) = synthesizer.speak(&VoiceIntents::prompt(&entry)) {
            warn!("Failed to speak prompt for session {}: {:#}", id, e);
        }

        let utterance = match recognizer.listen() {
            Ok(utterance) => utterance,
            Err(RecognitionError::Closed) => break VoiceExit::InputClosed,
            Err(e) => {
                warn!("{} for session {}; asking again", e, id);
                continue;
            }
        };

        let event = intents.interpret(&utterance, &entry);
        let mut guard = session.blocking_lock();
        // The page may have moved on while we were listening.
        if guard.revision() != revision {
            info!(
                "Session {} moved past {} before the answer arrived; asking again",
                id, entry.name
            );
            continue;
        }
        guard.apply(id, event);
    };

    session.blocking_lock().voice_active = false;
    info!("Voice review for session {} stopped: {:?}", id, exit);
    exit
}

/// Start a voice worker for `session` unless one is already running.
///
/// Returns `None` if a worker is already active.
pub async fn spawn_voice_worker(
    id: SessionId,
    session: SharedSession,
    intents: VoiceIntents,
    backend: Arc<dyn VoiceBackend>,
) -> Result<Option<JoinHandle<VoiceExit>>> {
    {
        let mut guard = session.lock().await;
        if guard.voice_active {
            return Ok(None);
        }
        guard.voice_active = true;
    }

    let (mut synthesizer, mut recognizer) = match backend.open() {
        Ok(pair) => pair,
        Err(e) => {
            session.lock().await.voice_active = false;
            return Err(e);
        }
    };

    info!("Starting voice review for session {}", id);
    let handle = tokio::task::spawn_blocking(move || {
        run_voice_loop(
            &id,
            &session,
            &intents,
            synthesizer.as_mut(),
            recognizer.as_mut(),
        )
    });
    Ok(Some(handle))
}

/// Logs prompts instead of speaking them.
pub struct ConsoleSynthesizer;

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn speak(&mut self, text: &str) -> Result<()> {
        info!("Voice prompt: {}", text);
        Ok(())
    }
}

/// Reads one answer per line. A blank line counts as not understood.
pub struct LineRecognizer<R> {
    input: R,
}

impl<R: BufRead + Send> LineRecognizer<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead + Send> SpeechRecognizer for LineRecognizer<R> {
    fn listen(&mut self) -> Result<String, RecognitionError> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => Err(RecognitionError::Closed),
            Ok(_) if line.trim().is_empty() => Err(RecognitionError::Unintelligible),
            Ok(_) => Ok(line.trim().to_string()),
            Err(e) => Err(RecognitionError::Service(e.to_string())),
        }
    }
}

/// Console prompts with answers typed on the server's stdin.
///
/// There is one stdin per process, so only one session at a time may
/// review by console. Opening a second worker fails until the first stops.
#[derive(Default)]
pub struct ConsoleVoiceBackend {
    in_use: Arc<AtomicBool>,
}

impl ConsoleVoiceBackend {
    fn claim(&self) -> Result<ConsoleClaim> {
        if self
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            bail!("console voice input is already in use by another session");
        }
        Ok(ConsoleClaim(self.in_use.clone()))
    }
}

/// Releases the console when the worker's recognizer is dropped.
struct ConsoleClaim(Arc<AtomicBool>);

impl Drop for ConsoleClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ConsoleRecognizer<R> {
    lines: LineRecognizer<R>,
    _claim: ConsoleClaim,
}

impl<R: BufRead + Send> SpeechRecognizer for ConsoleRecognizer<R> {
    fn listen(&mut self) -> Result<String, RecognitionError> {
        self.lines.listen()
    }
}

impl VoiceBackend for ConsoleVoiceBackend {
    fn open(&self) -> Result<(Box<dyn SpeechSynthesizer>, Box<dyn SpeechRecognizer>)> {
        let claim = self.claim()?;
        Ok((
            Box::new(ConsoleSynthesizer),
            Box::new(ConsoleRecognizer {
                lines: LineRecognizer::new(std::io::BufReader::new(std::io::stdin())),
                _claim: claim,
            }),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::ClientSession;
    use shoplist_core::{AdvancePolicy, Catalog, CatalogEntry, Event, ReviewSession, Selection};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    /// Synthesizer that records what it was asked to say.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingSynthesizer {
        pub spoken: Arc<StdMutex<Vec<String>>>,
    }

    impl SpeechSynthesizer for RecordingSynthesizer {
        fn speak(&mut self, text: &str) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Recognizer that replays canned results, then closes.
    pub(crate) struct ScriptedRecognizer {
        answers: VecDeque<Result<String, RecognitionError>>,
    }

    impl ScriptedRecognizer {
        pub(crate) fn new(answers: Vec<Result<String, RecognitionError>>) -> Self {
            Self {
                answers: answers.into(),
            }
        }
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn listen(&mut self) -> Result<String, RecognitionError> {
            self.answers
                .pop_front()
                .unwrap_or(Err(RecognitionError::Closed))
        }
    }

    fn shared(policy: AdvancePolicy) -> SharedSession {
        let catalog = Catalog::new(vec![
            CatalogEntry::new("Milk", 2),
            CatalogEntry::new("Bread", 1),
        ]);
        let mut session = ClientSession::new(ReviewSession::new(catalog, policy));
        session.voice_active = true;
        Arc::new(Mutex::new(session))
    }

    #[test]
    fn test_voice_loop_runs_until_queue_empty() {
        let id = SessionId::generate();
        let session = shared(AdvancePolicy::Consume);
        let mut synthesizer = RecordingSynthesizer::default();
        let mut recognizer =
            ScriptedRecognizer::new(vec![Ok("yes".to_string()), Ok("no thanks".to_string())]);

        let exit = run_voice_loop(
            &id,
            &session,
            &VoiceIntents::default(),
            &mut synthesizer,
            &mut recognizer,
        );

        assert_eq!(exit, VoiceExit::Finished);
        let guard = session.blocking_lock();
        assert_eq!(guard.review.selections(), &[Selection::new("Milk", 1)]);
        assert!(guard.review.is_finished());
        assert!(!guard.voice_active);
        assert_eq!(synthesizer.spoken.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_recognition_failures_ask_again_without_change() {
        let id = SessionId::generate();
        let session = shared(AdvancePolicy::Consume);
        let mut synthesizer = RecordingSynthesizer::default();
        let mut recognizer = ScriptedRecognizer::new(vec![
            Err(RecognitionError::Unintelligible),
            Err(RecognitionError::Service("network down".to_string())),
            Ok("yep".to_string()),
        ]);

        let exit = run_voice_loop(
            &id,
            &session,
            &VoiceIntents::default(),
            &mut synthesizer,
            &mut recognizer,
        );

        assert_eq!(exit, VoiceExit::InputClosed);
        let spoken = synthesizer.spoken.lock().unwrap();
        // Milk asked three times, then Bread once before input closed.
        assert_eq!(spoken.len(), 4);
        assert!(spoken[0].contains("Milk"));
        assert!(spoken[2].contains("Milk"));
        assert!(spoken[3].contains("Bread"));
        let guard = session.blocking_lock();
        assert_eq!(guard.review.selections(), &[Selection::new("Milk", 1)]);
    }

    #[test]
    fn test_rotate_voice_loop_ends_when_input_closes() {
        let id = SessionId::generate();
        let session = shared(AdvancePolicy::Rotate);
        let mut synthesizer = RecordingSynthesizer::default();
        let mut recognizer = ScriptedRecognizer::new(vec![
            Ok("no".to_string()),
            Ok("no".to_string()),
            Ok("no".to_string()),
        ]);

        let exit = run_voice_loop(
            &id,
            &session,
            &VoiceIntents::default(),
            &mut synthesizer,
            &mut recognizer,
        );

        assert_eq!(exit, VoiceExit::InputClosed);
        let guard = session.blocking_lock();
        assert!(guard.review.selections().is_empty());
        assert_eq!(guard.review.current().map(|e| e.name.as_str()), Some("Bread"));
    }

    /// Recognizer that confirms the current item through the page while
    /// "listening", then answers yes.
    struct ClickWhileListening {
        id: SessionId,
        session: SharedSession,
        clicked: bool,
    }

    impl SpeechRecognizer for ClickWhileListening {
        fn listen(&mut self) -> Result<String, RecognitionError> {
            if self.clicked {
                return Err(RecognitionError::Closed);
            }
            self.clicked = true;
            self.session
                .blocking_lock()
                .apply(&self.id, Event::Confirm { quantity: Some(1) });
            Ok("yes".to_string())
        }
    }

    #[test]
    fn test_answer_discarded_when_page_acted_meanwhile() {
        // One item under rotate: the head is the same entry after the click.
        let id = SessionId::generate();
        let catalog = Catalog::new(vec![CatalogEntry::new("Milk", 2)]);
        let session: SharedSession = Arc::new(Mutex::new(ClientSession::new(
            ReviewSession::new(catalog, AdvancePolicy::Rotate),
        )));
        let mut synthesizer = RecordingSynthesizer::default();
        let mut recognizer = ClickWhileListening {
            id: id.clone(),
            session: session.clone(),
            clicked: false,
        };

        let exit = run_voice_loop(
            &id,
            &session,
            &VoiceIntents::default(),
            &mut synthesizer,
            &mut recognizer,
        );

        assert_eq!(exit, VoiceExit::InputClosed);
        let guard = session.blocking_lock();
        assert_eq!(guard.review.selections(), &[Selection::new("Milk", 1)]);
        // Asked again after the stale answer was dropped.
        assert_eq!(synthesizer.spoken.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_console_backend_allows_one_worker() {
        let backend = ConsoleVoiceBackend::default();

        let first = backend.open().unwrap();
        assert!(backend.open().is_err());

        drop(first);
        assert!(backend.open().is_ok());
    }

    #[test]
    fn test_line_recognizer() {
        let mut recognizer = LineRecognizer::new("yes please\n\n".as_bytes());

        assert_eq!(recognizer.listen(), Ok("yes please".to_string()));
        assert_eq!(recognizer.listen(), Err(RecognitionError::Unintelligible));
        assert_eq!(recognizer.listen(), Err(RecognitionError::Closed));
    }

    pub(crate) struct ScriptedBackend(pub Vec<&'static str>);

    impl VoiceBackend for ScriptedBackend {
        fn open(&self) -> Result<(Box<dyn SpeechSynthesizer>, Box<dyn SpeechRecognizer>)> {
            let answers = self.0.iter().map(|a| Ok(a.to_string())).collect();
            Ok((
                Box::new(RecordingSynthesizer::default()),
                Box::new(ScriptedRecognizer::new(answers)),
            ))
        }
    }

    #[tokio::test]
    async fn test_spawn_voice_worker_only_once() {
        let id = SessionId::generate();
        let session = shared(AdvancePolicy::Consume);
        session.lock().await.voice_active = false;
        let backend: Arc<dyn VoiceBackend> = Arc::new(ScriptedBackend(vec!["yes", "yes"]));

        let handle = spawn_voice_worker(
            id.clone(),
            session.clone(),
            VoiceIntents::default(),
            backend.clone(),
        )
        .await
        .unwrap()
        .expect("first worker should start");

        let exit = handle.await.unwrap();
        assert_eq!(exit, VoiceExit::Finished);
        assert_eq!(session.lock().await.review.selections().len(), 2);

        session.lock().await.voice_active = true;
        let second = spawn_voice_worker(id, session, VoiceIntents::default(), backend)
            .await
            .unwrap();
        assert!(second.is_none());
    }
}
