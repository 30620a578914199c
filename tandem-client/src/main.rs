//! Client entry point: flags, username, connection, then the engine.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use tandem_client::editor::Editor;
use tandem_client::engine::Engine;
use tandem_client::logging;
use tandem_crdt::{codec, Document};
use tandem_wire::Message;

/// How long the WebSocket handshake may take before giving up.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Frames buffered toward the writer task before senders block.
const OUTBOUND_CAPACITY: usize = 256;

/// Terminal client for tandem collaborative editing sessions.
#[derive(Parser, Debug)]
#[command(name = "tandem-client", version, about)]
struct Flags {
    /// Network address of the relay server.
    #[arg(short, long, default_value = "localhost:8080")]
    server: String,

    /// Connect over TLS (wss://).
    #[arg(long)]
    secure: bool,

    /// Prompt for a username instead of generating one.
    #[arg(long)]
    login: bool,

    /// File to load the document from and save it to.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Verbose logging, including full document state dumps.
    #[arg(long)]
    debug: bool,
}

fn main() {
    let flags = Flags::parse();
    if let Err(err) = run(flags) {
        eprintln!("tandem: {err}");
        process::exit(1);
    }
}

#[tokio::main]
async fn run(flags: Flags) -> Result<(), Box<dyn Error>> {
    logging::init(flags.debug)?;

    let username = if flags.login {
        prompt_username()?
    } else {
        random_username()
    };

    let scheme = if flags.secure { "wss" } else { "ws" };
    let url = format!("{scheme}://{}/", flags.server);
    log::info!("connecting to {url} as {username}");

    let (ws, _) = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .map_err(|_| format!("handshake with {url} timed out"))??;
    let (sink, inbound) = ws.split();

    let (outgoing, outgoing_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    tokio::spawn(write_outbound(sink, outgoing_rx));

    outgoing
        .send(Message::Join {
            username: username.clone(),
            text: "has joined the session.".into(),
        })
        .await?;

    let mut doc = Document::new();
    if let Some(path) = &flags.file {
        match codec::load(path) {
            Ok(loaded) => doc = loaded,
            Err(err) => log::error!("failed to load {}: {err}", path.display()),
        }
    }

    let _term = TerminalGuard::enter()?;
    let (width, height) = crossterm::terminal::size()?;
    let engine = Engine::new(
        doc,
        Editor::new(width, height),
        outgoing,
        flags.file,
        flags.debug,
    );
    engine.run(inbound).await
}

/// Forward queued messages onto the socket. Exits on the first write
/// error; the engine notices through its closed sender.
async fn write_outbound(
    mut sink: impl SinkExt<WsMessage> + Unpin,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let frame = match message.to_json() {
            Ok(json) => WsMessage::Text(json.into()),
            Err(err) => {
                log::error!("dropping unencodable frame: {err}");
                continue;
            }
        };
        if sink.send(frame).await.is_err() {
            log::error!("websocket write failed, stopping the writer");
            return;
        }
    }
    let _ = sink.close().await;
}

fn prompt_username() -> Result<String, Box<dyn Error>> {
    print!("Enter your name: ");
    io::stdout().flush()?;
    let mut name = String::new();
    io::stdin().lock().read_line(&mut name)?;
    let name = name.trim();
    if name.is_empty() {
        Ok(random_username())
    } else {
        Ok(name.to_string())
    }
}

const ADJECTIVES: &[&str] = &[
    "brisk", "calm", "deft", "eager", "fond", "keen", "mellow", "nimble", "quiet", "spry",
    "vivid", "wry",
];
const ANIMALS: &[&str] = &[
    "otter", "heron", "lynx", "marmot", "newt", "osprey", "pika", "stoat", "swift", "tern",
    "vole", "wren",
];

fn random_username() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let animal = ANIMALS[rng.random_range(0..ANIMALS.len())];
    format!("{adjective}-{animal}")
}

/// Raw-mode and alternate-screen guard; restores the terminal on drop,
/// including the error path.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, cursor::Show)?;
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}
