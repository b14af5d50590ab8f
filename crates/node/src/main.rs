mod config;
mod effects;
mod tui;

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::io::{AsyncBufReadExt, BufReader};

use config::NodeConfig;
use effects::ConsoleEffects;
use spellmesh::time::now_ms;
use spellmesh::{
    Engine, EngineEvent, Identity, MeshTransport, OfflineMesh, PacketLossSimulation,
    PhraseSource, Position, UdpMesh,
};
use tui::TuiState;

const UPDATE_INTERVAL_MS: u64 = 20;
const MOVE_STEP_METERS: f64 = 0.5;

#[derive(Parser)]
#[command(name = "spellmesh-node")]
#[command(about = "Presence and incantation mesh participant")]
struct Args {
    #[arg(short, long, help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(long)]
    channel: Option<String>,

    #[arg(short, long, help = "Display name announced to peers")]
    name: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long, help = "IPv4 multicast group")]
    group: Option<Ipv4Addr>,

    #[arg(long, allow_hyphen_values = true)]
    x: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    y: Option<f64>,

    #[arg(long, help = "File holding the persistent device id")]
    identity: Option<PathBuf>,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Run without a network medium")]
    offline: bool,

    #[arg(long, help = "Enable outbound packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

impl Args {
    fn into_config(self) -> Result<(NodeConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };

        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if self.name.is_some() {
            config.name = self.name;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(group) = self.group {
            config.group = group;
        }
        if let Some(x) = self.x {
            config.x = x;
        }
        if let Some(y) = self.y {
            config.y = y;
        }
        if let Some(path) = self.identity {
            config.identity_path = path;
        }
        if self.offline {
            config.offline = true;
        }
        if self.simulate_packet_loss {
            config.packet_loss = PacketLossSimulation::new(self.loss_percent);
        }

        Ok((config, self.headless))
    }
}

fn main() -> Result<()> {
    let (config, headless) = Args::parse().into_config()?;

    if headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let identity = Identity::load_or_create(&config.identity_path, config.name.clone())?;
    let (transport, fallback) = open_transport(&config, &identity);

    let mut engine = Engine::new(identity, transport, config.engine.clone(), now_ms())
        .with_position(Position::new(config.x, config.y));
    if let Some(reason) = fallback {
        engine.log_mut().error(now_ms(), reason);
    }

    if headless {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let mut engine = engine.with_effects(ConsoleEffects::new(io::stdout()));
        runtime.block_on(run_headless(&mut engine))?;
        engine.shutdown();
    } else {
        run_with_tui(&mut engine)?;
        engine.shutdown();
    }

    Ok(())
}

/// Joins the multicast mesh, or falls back to an offline medium with the
/// reason to show the user.
fn open_transport(
    config: &NodeConfig,
    identity: &Identity,
) -> (Box<dyn MeshTransport>, Option<String>) {
    if config.offline {
        return (Box::new(OfflineMesh::new(config.channel.clone())), None);
    }

    match UdpMesh::join(&config.mesh(), config.channel.clone(), identity.id.clone()) {
        Ok(mesh) => (Box::new(mesh), None),
        Err(e) => {
            log::warn!("mesh unavailable, running offline: {}", e);
            (
                Box::new(OfflineMesh::new(config.channel.clone())),
                Some(format!("Mesh unavailable ({}). Running offline.", e)),
            )
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Phrase(String),
    MoveTo(f64, f64),
    Peers,
    Quit,
}

fn parse_command(line: &str) -> Option<Result<Command, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(Command::Phrase(line.to_string())));
    };

    let mut parts = rest.split_whitespace();
    let command = match parts.next() {
        Some("quit") => Ok(Command::Quit),
        Some("peers") => Ok(Command::Peers),
        Some("pos") => match (
            parts.next().map(str::parse::<f64>),
            parts.next().map(str::parse::<f64>),
        ) {
            (Some(Ok(x)), Some(Ok(y))) => Ok(Command::MoveTo(x, y)),
            _ => Err("usage: /pos X Y".to_string()),
        },
        _ => Err(format!("unknown command: {}", line)),
    };
    Some(command)
}

async fn run_headless(engine: &mut Engine) -> Result<()> {
    let identity = engine.identity();
    log::info!(
        "{} [{}] listening on channel '{}'",
        identity.name,
        identity.short_id(),
        engine.channel()
    );

    let mut interval = tokio::time::interval(Duration::from_millis(UPDATE_INTERVAL_MS));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.update(now_ms());
                engine.drain_events().for_each(drop);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Some(Ok(Command::Phrase(text))) => {
                        engine.submit_phrase(&text, PhraseSource::Manual, now_ms());
                    }
                    Some(Ok(Command::MoveTo(x, y))) => {
                        engine.set_position(Position::new(x, y));
                        log::info!("moved to ({:.1}, {:.1})", x, y);
                    }
                    Some(Ok(Command::Peers)) => {
                        let origin = engine.position();
                        for peer in engine.peers() {
                            log::info!("{:<12} {:>6.1}m", peer.name, peer.distance_from(&origin));
                        }
                    }
                    Some(Ok(Command::Quit)) => break,
                    Some(Err(message)) => log::warn!("{}", message),
                    None => {}
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    log::info!("leaving mesh");
    Ok(())
}

fn run_with_tui(engine: &mut Engine) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut tui_state = TuiState::new();
    let mut running = true;

    while running {
        let now = now_ms();
        engine.update(now);

        for event in engine.drain_events() {
            if let EngineEvent::EffectReceived(effect) = event {
                tui_state.flash(effect.announcement(), now);
            }
        }

        if event::poll(Duration::from_millis(UPDATE_INTERVAL_MS))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let position = engine.position();
                    match key.code {
                        KeyCode::Esc => running = false,
                        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                            running = false;
                        }
                        KeyCode::Up => {
                            engine.set_position(position.offset(0.0, MOVE_STEP_METERS));
                        }
                        KeyCode::Down => {
                            engine.set_position(position.offset(0.0, -MOVE_STEP_METERS));
                        }
                        KeyCode::Left => {
                            engine.set_position(position.offset(-MOVE_STEP_METERS, 0.0));
                        }
                        KeyCode::Right => {
                            engine.set_position(position.offset(MOVE_STEP_METERS, 0.0));
                        }
                        KeyCode::F(2) => {
                            if engine.listener_state().is_active() {
                                engine.stop_listening();
                            } else {
                                engine.start_listening(now);
                            }
                        }
                        KeyCode::Enter => {
                            if let Some(text) = tui_state.take_input() {
                                engine.submit_phrase(&text, PhraseSource::Manual, now_ms());
                            }
                        }
                        KeyCode::Backspace => tui_state.pop_char(),
                        KeyCode::Char(c) => tui_state.push_char(c),
                        _ => {}
                    }
                }
            }
        }

        terminal.draw(|frame| {
            tui::render(frame, engine, &tui_state, now_ms());
        })?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_phrases() {
        assert_eq!(
            parse_command("  Bob, my power shoves thee "),
            Some(Ok(Command::Phrase("Bob, my power shoves thee".to_string())))
        );
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_command("/quit"), Some(Ok(Command::Quit)));
        assert_eq!(parse_command("/peers"), Some(Ok(Command::Peers)));
        assert_eq!(
            parse_command("/pos 1.5 -2"),
            Some(Ok(Command::MoveTo(1.5, -2.0)))
        );
        assert!(matches!(parse_command("/pos 1"), Some(Err(_))));
        assert!(matches!(parse_command("/dance"), Some(Err(_))));
    }

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "spellmesh-node",
            "--channel",
            "arena",
            "--name",
            "Alice",
            "--x",
            "-3.5",
            "--offline",
            "--simulate-packet-loss",
            "--loss-percent",
            "25",
        ]);
        let (config, headless) = args.into_config().unwrap();

        assert!(!headless);
        assert_eq!(config.channel, "arena");
        assert_eq!(config.name.as_deref(), Some("Alice"));
        assert_eq!(config.x, -3.5);
        assert!(config.offline);
        assert!(config.packet_loss.enabled);
        assert_eq!(config.packet_loss.loss_percent, 25.0);
    }
}
