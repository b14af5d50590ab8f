use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Circle, Points};
use ratatui::widgets::{Block, Borders, Paragraph};

use spellmesh::{Engine, ListenerState, LogKind};

const RADAR_HALF_WIDTH: f64 = 7.5;
const FLASH_MS: u64 = 1500;

#[derive(Debug, Default)]
pub struct TuiState {
    input: String,
    flash: Option<(String, u64)>,
}

impl TuiState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn push_char(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn pop_char(&mut self) {
        self.input.pop();
    }

    /// Returns the typed line and clears it, or `None` when only whitespace
    /// was typed.
    pub fn take_input(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.input);
        let line = line.trim();
        (!line.is_empty()).then(|| line.to_string())
    }

    pub fn flash(&mut self, text: String, now: u64) {
        self.flash = Some((text, now + FLASH_MS));
    }

    pub fn flash_text(&self, now: u64) -> Option<&str> {
        match &self.flash {
            Some((text, until)) if now < *until => Some(text),
            _ => None,
        }
    }
}

pub fn render(frame: &mut Frame, engine: &Engine, state: &TuiState, now: u64) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(12),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(5),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(body[1]);

    render_header(frame, rows[0], engine, state, now);
    render_radar(frame, body[0], engine);
    render_neighbors(frame, side[0], engine);
    render_charges(frame, side[1], engine);
    render_transcript(frame, side[2], engine);
    render_log(frame, side[3], engine);
    render_input(frame, rows[2], state);
}

fn render_header(frame: &mut Frame, area: Rect, engine: &Engine, state: &TuiState, now: u64) {
    let identity = engine.identity();
    let flash = state.flash_text(now);

    let block = Block::default()
        .title(format!(" SpellMesh - {} [{}] ", identity.name, identity.short_id()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if flash.is_some() {
            Color::Red
        } else {
            Color::Cyan
        }));

    let line = match flash {
        Some(text) => Line::from(Span::styled(
            text.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        None => {
            let position = engine.position();
            let stats = engine.stats();
            Line::from(format!(
                "Channel: {}  |  Pos: ({:.1}, {:.1})  |  Mic: {}  |  Peers: {}  |  Pkts: {} sent / {} recv",
                engine.channel(),
                position.x,
                position.y,
                mic_label(engine.listener_state()),
                engine.registry().len(),
                stats.packets_sent,
                stats.packets_received
            ))
        }
    };

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_radar(frame: &mut Frame, area: Rect, engine: &Engine) {
    let origin = engine.position();
    let range = engine.config().spell_range_meters;
    let peers = engine.peers();

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(" Radar ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        )
        .marker(Marker::Braille)
        .x_bounds([-RADAR_HALF_WIDTH, RADAR_HALF_WIDTH])
        .y_bounds([-RADAR_HALF_WIDTH, RADAR_HALF_WIDTH])
        .paint(move |ctx| {
            ctx.draw(&Circle {
                x: 0.0,
                y: 0.0,
                radius: range,
                color: Color::DarkGray,
            });
            ctx.draw(&Points {
                coords: &[(0.0, 0.0)],
                color: Color::Cyan,
            });

            for peer in &peers {
                let dx = peer.position.x - origin.x;
                let dy = peer.position.y - origin.y;
                let color = if peer.distance_from(&origin) <= range {
                    Color::Red
                } else {
                    Color::Yellow
                };
                ctx.draw(&Points {
                    coords: &[(dx, dy)],
                    color,
                });
                ctx.print(
                    dx,
                    dy,
                    Line::from(Span::styled(peer.name.clone(), Style::default().fg(color))),
                );
            }
        });

    frame.render_widget(canvas, area);
}

fn render_neighbors(frame: &mut Frame, area: Rect, engine: &Engine) {
    let origin = engine.position();
    let range = engine.config().spell_range_meters;

    let lines: Vec<Line> = engine
        .peers()
        .iter()
        .map(|peer| {
            let distance = peer.distance_from(&origin);
            let color = if distance <= range {
                Color::Red
            } else {
                Color::Gray
            };
            Line::from(vec![
                Span::styled(format!("{:<12}", peer.name), Style::default().fg(color)),
                Span::styled(
                    format!("{:>6.1}m", distance),
                    Style::default().fg(Color::White),
                ),
            ])
        })
        .collect();

    let block = Block::default()
        .title(" Neighbors ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_charges(frame: &mut Frame, area: Rect, engine: &Engine) {
    let required = engine.buffer().required();

    let lines: Vec<Line> = engine
        .charges()
        .iter()
        .map(|(target, count)| {
            let filled = count.min(required) as usize;
            let empty = required.saturating_sub(count) as usize;
            let color = if count >= required {
                Color::Red
            } else {
                Color::Magenta
            };
            Line::from(vec![
                Span::styled(format!("{:<12}", target), Style::default().fg(Color::White)),
                Span::styled("█".repeat(filled), Style::default().fg(color)),
                Span::styled("░".repeat(empty), Style::default().fg(Color::DarkGray)),
                Span::raw(format!(" {}/{}", count, required)),
            ])
        })
        .collect();

    let block = Block::default()
        .title(" Charges ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_transcript(frame: &mut Frame, area: Rect, engine: &Engine) {
    let block = Block::default()
        .title(" Heard ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new(engine.transcript().to_string())
        .block(block)
        .style(Style::default().add_modifier(Modifier::ITALIC));

    frame.render_widget(text, area);
}

fn render_log(frame: &mut Frame, area: Rect, engine: &Engine) {
    let visible = area.height.saturating_sub(2) as usize;

    let mut lines: Vec<Line> = engine
        .log()
        .entries()
        .rev()
        .take(visible)
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    format!("{} ", format_clock(entry.timestamp)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(kind_color(entry.kind))),
            ])
        })
        .collect();
    lines.reverse();

    let block = Block::default()
        .title(" Activity ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_input(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Speak (Enter)  |  Arrows move  |  F2 mic  |  Esc quit ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));

    let text = Paragraph::new(format!("> {}", state.input())).block(block);
    frame.render_widget(text, area);
}

fn mic_label(state: ListenerState) -> &'static str {
    match state {
        ListenerState::Stopped => "off",
        ListenerState::Starting => "starting",
        ListenerState::Listening => "LIVE",
        ListenerState::Restarting { .. } => "restarting",
    }
}

fn kind_color(kind: LogKind) -> Color {
    match kind {
        LogKind::Info => Color::White,
        LogKind::Combat => Color::Magenta,
        LogKind::System => Color::Cyan,
        LogKind::Error => Color::Red,
    }
}

fn format_clock(timestamp_ms: u64) -> String {
    let secs = (timestamp_ms / 1000) % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_input_trims_and_clears() {
        let mut state = TuiState::new();
        for c in "  Bob, my power shoves thee ".chars() {
            state.push_char(c);
        }

        assert_eq!(
            state.take_input().as_deref(),
            Some("Bob, my power shoves thee")
        );
        assert_eq!(state.input(), "");
        assert_eq!(state.take_input(), None);
    }

    #[test]
    fn flash_expires() {
        let mut state = TuiState::new();
        state.flash("You are shoved by Alice".to_string(), 1000);

        assert_eq!(state.flash_text(2499), Some("You are shoved by Alice"));
        assert_eq!(state.flash_text(2500), None);
    }

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(3_723_000), "01:02:03");
        assert_eq!(format_clock(86_400_000 + 61_000), "00:01:01");
    }
}
