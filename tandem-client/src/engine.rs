//! The two-stream state machine feeding the local replica.
//!
//! The engine is the sole owner of the CRDT document. Terminal key events
//! and inbound wire frames are merged, unprioritized, into one update
//! stream; because only the engine task touches the replica, no lock is
//! needed around it.

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use crossterm::event::{Event, EventStream};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use tandem_crdt::{codec, CrdtError, Document};
use tandem_wire::{Message, OpKind, Operation};

use crate::editor::{classify, Editor, EditorEvent};

/// Save target when no `--file` was given.
const DEFAULT_SAVE_PATH: &str = "tandem-content.txt";

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Running,
    Exiting,
}

/// Owns the replica and merges both input streams.
pub struct Engine {
    doc: Document,
    editor: Editor,
    outgoing: mpsc::Sender<Message>,
    file: Option<PathBuf>,
    dump_state: bool,
    state: SessionState,
    inbound_open: bool,
}

impl Engine {
    pub fn new(
        doc: Document,
        editor: Editor,
        outgoing: mpsc::Sender<Message>,
        file: Option<PathBuf>,
        dump_state: bool,
    ) -> Self {
        Engine {
            doc,
            editor,
            outgoing,
            file,
            dump_state,
            state: SessionState::Connecting,
            inbound_open: true,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until quit or a fatal transport event.
    pub async fn run<S>(mut self, mut inbound: S) -> Result<(), Box<dyn Error>>
    where
        S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
    {
        let mut keys = EventStream::new();
        let mut out = io::stdout();

        self.state = SessionState::Running;
        self.redraw(&mut out)?;

        while self.state != SessionState::Exiting {
            tokio::select! {
                key = keys.next() => match key {
                    Some(Ok(Event::Key(key))) => {
                        for event in classify(&key) {
                            self.handle_editor_event(event).await;
                            if self.state == SessionState::Exiting {
                                break;
                            }
                        }
                    }
                    Some(Ok(Event::Resize(width, height))) => {
                        self.editor.set_size(width, height);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => log::error!("terminal event error: {err}"),
                    None => self.state = SessionState::Exiting,
                },
                frame = inbound.next(), if self.inbound_open => match frame {
                    Some(Ok(WsMessage::Text(raw))) => {
                        match Message::from_json(raw.as_str()) {
                            Ok(message) => self.handle_message(message).await,
                            Err(err) => log::warn!("undecodable frame: {err}"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        log::info!("server closed the connection");
                        self.inbound_open = false;
                        self.state = SessionState::Exiting;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        // Keep accepting local edits; the replica is intact.
                        log::error!("websocket read error: {err}");
                        self.inbound_open = false;
                        self.editor.set_status("lost connection!");
                    }
                },
            }
            self.redraw(&mut out)?;
        }
        Ok(())
    }

    fn redraw(&mut self, out: &mut impl Write) -> io::Result<()> {
        self.editor.draw(out)
    }

    /// Apply one classified key event: at most one CRDT call plus one
    /// outbound operation.
    pub async fn handle_editor_event(&mut self, event: EditorEvent) {
        match event {
            EditorEvent::Insert(ch) => self.local_insert(ch).await,
            EditorEvent::Delete => self.local_delete().await,
            EditorEvent::CursorMove(dx, dy) => self.editor.move_cursor(dx, dy),
            EditorEvent::Home => self.editor.set_cursor(0),
            EditorEvent::End => {
                let end = self.editor.len();
                self.editor.set_cursor(end);
            }
            EditorEvent::Save => self.save(),
            EditorEvent::Load => self.load().await,
            EditorEvent::Quit => self.state = SessionState::Exiting,
        }
        self.dump_document();
    }

    async fn local_insert(&mut self, ch: char) {
        self.editor.insert_char(ch);
        let position = self.editor.cursor();
        log::info!("local insert {ch:?} at position {position}");

        match self.doc.insert(position, ch) {
            Ok((character, text)) => {
                self.editor.set_text(&text);
                self.send(Message::Operation {
                    operation: Operation {
                        kind: OpKind::Insert,
                        position: position as u64,
                        character,
                    },
                })
                .await;
            }
            Err(err) => {
                // The key is swallowed; resync the view with the replica.
                log::error!("crdt insert rejected: {err}");
                let text = self.doc.content();
                self.editor.set_text(&text);
            }
        }
    }

    async fn local_delete(&mut self) {
        let position = self.editor.cursor();
        log::info!("local delete at position {position}");

        let (deleted, text) = self.doc.delete(position);
        // Step back before the clamp in set_text so the two adjustments
        // cannot stack at the end of the buffer.
        self.editor.move_cursor(-1, 0);
        self.editor.set_text(&text);
        if let Some(character) = deleted {
            self.send(Message::Operation {
                operation: Operation {
                    kind: OpKind::Delete,
                    position: position as u64,
                    character,
                },
            })
            .await;
        }
    }

    fn save(&mut self) {
        let path = self
            .file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_PATH));
        match codec::save(&path, &self.doc) {
            Ok(()) => {
                self.editor
                    .set_status(format!("Saved document to {}", path.display()));
            }
            Err(err) => {
                log::error!("failed to save to {}: {err}", path.display());
                self.editor
                    .set_status(format!("Failed to save to {}", path.display()));
            }
        }
    }

    async fn load(&mut self) {
        let Some(path) = self.file.clone() else {
            self.editor.set_status("No file to load!");
            return;
        };
        match codec::load(&path) {
            Ok(snapshot) => {
                self.doc.adopt(snapshot);
                let text = self.doc.content();
                self.editor.set_text(&text);
                self.editor.set_cursor(0);
                self.editor
                    .set_status(format!("Loaded {}", path.display()));
                // Share the loaded document with the session.
                let document = self.doc.clone();
                self.send(Message::DocSync { document, id: None }).await;
            }
            Err(err) => {
                log::error!("failed to load {}: {err}", path.display());
                self.editor
                    .set_status(format!("Failed to load {}", path.display()));
            }
        }
    }

    /// Apply one inbound frame to the replica and the view.
    pub async fn handle_message(&mut self, message: Message) {
        match message {
            Message::SiteId { text, .. } => match text.parse::<u64>() {
                Ok(site) => {
                    self.doc.set_site_id(site);
                    log::info!("assigned site id {site}");
                }
                Err(err) => log::error!("unusable site id {text:?}: {err}"),
            },
            Message::DocSync { document, .. } => {
                log::info!(
                    "document sync received ({} characters)",
                    document.length()
                );
                self.doc.adopt(document);
                let text = self.doc.content();
                self.editor.set_text(&text);
                self.editor.set_cursor(0);
            }
            Message::DocReq { id } => {
                log::info!("document requested for {id}");
                let document = self.doc.clone();
                self.send(Message::DocSync {
                    document,
                    id: Some(id),
                })
                .await;
            }
            Message::Operation { operation } => self.apply_remote(operation),
            Message::Users { text } => self.editor.set_users(text),
            Message::Join { username, .. } => {
                self.editor
                    .set_status(format!("{username} has joined the session!"));
            }
        }
        self.dump_document();
    }

    fn apply_remote(&mut self, operation: Operation) {
        match operation.kind {
            OpKind::Insert => {
                let prev = operation.character.prev_id.clone();
                let next = operation.character.next_id.clone();
                log::info!(
                    "remote insert {:?} near position {}",
                    operation.character.value,
                    operation.position
                );
                match self.doc.integrate_insert(operation.character, &prev, &next) {
                    Ok(()) => {}
                    Err(err @ CrdtError::MissingPrerequisite(_)) => {
                        // A later document sync reconciles.
                        log::warn!("dropping remote insert: {err}");
                    }
                    Err(err) => log::error!("remote insert failed: {err}"),
                }
            }
            OpKind::Delete => {
                log::info!("remote delete of {}", operation.character.id);
                self.doc.integrate_delete(&operation.character.id);
            }
        }
        let text = self.doc.content();
        self.editor.set_text(&text);
    }

    async fn send(&mut self, message: Message) {
        if self.outgoing.send(message).await.is_err() {
            self.editor.set_status("lost connection!");
        }
    }

    fn dump_document(&self) {
        if !self.dump_state {
            return;
        }
        log::trace!("--- document state ---");
        for (index, ch) in self.doc.characters().iter().enumerate() {
            log::trace!(
                "index: {index}  value: {:?}  id: {}  prev: {}  next: {}  visible: {}",
                ch.value,
                ch.id,
                ch.prev_id,
                ch.next_id,
                ch.visible
            );
        }
    }
}
