//! Read-only status console.
//!
//! Renders the latest `FleetSnapshot`: listen address, pool counts, and one
//! row per agent. Launch with `courier-server serve --console`; `g` toggles
//! task generation, `q` or `Esc` quits.

use std::io::{self, Stdout};
use std::time::Duration;

use courier_fleet::FleetSnapshot;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};

use crate::simulation::SimulationHandle;

pub fn render(frame: &mut Frame, snap: &FleetSnapshot) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Status bar
            Constraint::Min(5),    // Agents
            Constraint::Length(1), // Help
        ])
        .split(frame.area());

    render_status_bar(frame, outer[0], snap);
    render_agents(frame, outer[1], snap);
    frame.render_widget(
        Paragraph::new(Span::styled(
            " g: toggle generation  |  q / Esc: quit",
            Style::default().fg(Color::DarkGray),
        )),
        outer[2],
    );
}

fn render_status_bar(frame: &mut Frame, area: Rect, snap: &FleetSnapshot) {
    let block = Block::default()
        .title(" Courier Dispatch ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let addr = snap
        .listen_addr
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".to_string());
    let generation = if snap.generation_enabled { "on" } else { "off" };

    let line = Line::from(vec![
        Span::styled("  Listening: ", Style::default().fg(Color::Gray)),
        Span::styled(addr, Style::default().fg(Color::White)),
        Span::styled("  |  Agents: ", Style::default().fg(Color::Gray)),
        Span::styled(snap.agent_count().to_string(), Style::default().fg(Color::Green)),
        Span::styled("  |  Open: ", Style::default().fg(Color::Gray)),
        Span::styled(snap.open_tasks.to_string(), Style::default().fg(Color::Yellow)),
        Span::styled("  |  Assigned: ", Style::default().fg(Color::Gray)),
        Span::styled(snap.assigned_tasks.to_string(), Style::default().fg(Color::Blue)),
        Span::styled("  |  Completed: ", Style::default().fg(Color::Gray)),
        Span::styled(snap.completed_tasks.to_string(), Style::default().fg(Color::Green)),
        Span::styled("  |  Generation: ", Style::default().fg(Color::Gray)),
        Span::styled(generation, Style::default().fg(Color::Magenta)),
    ]);
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_agents(frame: &mut Frame, area: Rect, snap: &FleetSnapshot) {
    let block = Block::default()
        .title(format!(" Agents ({}) ", snap.agent_count()))
        .borders(Borders::ALL);

    if snap.agents.is_empty() {
        let text = Paragraph::new(Line::from(Span::styled(
            "  No agents registered.",
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        frame.render_widget(text, area);
        return;
    }

    let rows: Vec<Row> = snap
        .agents
        .iter()
        .map(|agent| {
            let node = agent
                .last_node
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(Span::styled(
                    format!("  {}", agent.name),
                    Style::default().fg(agent_color(agent.color)),
                )),
                Cell::from(agent.agent_type.as_str()),
                Cell::from(node),
                Cell::from(format!("{:.1}, {:.1}", agent.position.x, agent.position.z)),
                Cell::from(agent.status.clone()),
                Cell::from(agent.tasks_completed.to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(16),
            Constraint::Percentage(20),
            Constraint::Percentage(8),
            Constraint::Percentage(14),
            Constraint::Percentage(32),
            Constraint::Percentage(10),
        ],
    )
    .block(block)
    .header(
        Row::new(vec!["  Name", "Type", "Node", "Position", "Status", "Done"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
    );
    frame.render_widget(table, area);
}

fn agent_color(color: courier_protocol::Rgb) -> Color {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color::Rgb(channel(color.r), channel(color.g), channel(color.b))
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the console until the operator quits.
pub async fn run_status_console(handle: SimulationHandle) -> anyhow::Result<()> {
    use std::io::IsTerminal;
    if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
        return Err(anyhow::anyhow!("Status console requires a terminal (TTY)."));
    }

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;
    let poll_rate = Duration::from_millis(100);

    loop {
        let snap = handle.snapshot();
        terminal.draw(|frame| render(frame, &snap))?;

        // crossterm polling blocks; keep it off the runtime threads.
        let key = tokio::task::block_in_place(|| -> io::Result<Option<event::KeyEvent>> {
            if event::poll(poll_rate)? {
                if let Event::Key(key) = event::read()? {
                    return Ok(Some(key));
                }
            }
            Ok(None)
        })?;

        if let Some(key) = key {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let quit = matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                || (key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL));
            if quit {
                break;
            }
            if key.code == KeyCode::Char('g') {
                handle.set_generation(!snap.generation_enabled).await?;
            }
        }
    }

    restore_terminal(&mut terminal)?;
    Ok(())
}
