use colored::*;
use meshcall::client::{
    LinkState, RemoteStream, RoomView, SessionSnapshot, SessionState, TrackDescriptor,
};
use meshcall::PeerId;
use meshcall::model::ChatMessage;

/// Prints room activity to the terminal.
pub struct ConsoleView;

impl RoomView for ConsoleView {
    fn local_stream_ready(&self, tracks: &[TrackDescriptor]) {
        let parts: Vec<String> = tracks
            .iter()
            .map(|t| {
                let flag = if t.enabled { "on".green() } else { "off".red() };
                format!("{} {}", t.kind, flag)
            })
            .collect();
        println!("{} {}", "📷 local:".cyan(), parts.join(", "));
    }

    fn remote_stream_added(&self, stream: &RemoteStream) {
        let kinds: Vec<String> = stream.tracks.iter().map(|t| t.kind.to_string()).collect();
        println!(
            "{} {} ({})",
            "📡 receiving from".green(),
            stream.peer_id,
            kinds.join(", ")
        );
    }

    fn remote_stream_removed(&self, peer_id: &PeerId) {
        println!("{} {}", "👋 gone:".yellow(), peer_id);
    }

    fn chat_received(&self, message: &ChatMessage) {
        println!("{} {}", format!("[{}]", message.sender).as_str().bold(), message.text);
    }

    fn session_state_changed(&self, state: SessionState) {
        println!("{} {}", "•".dimmed(), state.to_string().as_str().dimmed());
    }
}

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Video,
    Audio,
    Screen,
    Status,
    Leave,
    Chat(String),
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => Input::Empty,
            "/video" => Input::Video,
            "/audio" => Input::Audio,
            "/screen" => Input::Screen,
            "/status" => Input::Status,
            "/leave" | "/quit" => Input::Leave,
            text => Input::Chat(text.to_owned()),
        }
    }
}

pub fn print_status(snapshot: &SessionSnapshot) {
    let room = snapshot
        .room
        .as_ref()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".into());
    println!(
        "{} {} in {} (epoch {})",
        "ℹ".cyan(),
        snapshot.state,
        room.as_str().bold(),
        snapshot.epoch
    );
    println!(
        "  video {} · audio {} · screen {}",
        on_off(snapshot.media.video.enabled),
        on_off(snapshot.media.audio.enabled),
        on_off(snapshot.screen_share)
    );
    for peer in &snapshot.peers {
        let state = match peer.state {
            LinkState::Connected => "connected".green(),
            LinkState::Closed => "closed".red(),
            other => format!("{:?}", other).to_lowercase().as_str().yellow(),
        };
        println!("  {} {:?} {}", peer.peer_id, peer.role, state);
    }
}

fn on_off(flag: bool) -> ColoredString {
    if flag { "on".green() } else { "off".red() }
}
