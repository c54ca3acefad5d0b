//! Interactive TUI.
//!
//! Terminal input is read on its own thread and bridge events are forwarded
//! by a task on the engine's runtime; both feed one channel that the UI
//! thread blocks on between redraws.

mod app;
mod ui;

use std::io::{self, Stdout};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use kubeforward_core::{BridgeEvent, ForwardEngine, ForwardError, Subscriber};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use app::{App, Command};

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

enum UiEvent {
    Key(KeyEvent),
    Redraw,
    Bridge(BridgeEvent),
}

pub fn run(engine: &ForwardEngine, subscriber: Subscriber) -> Result<()> {
    let mut terminal = init_terminal()?;
    let result = run_loop(&mut terminal, engine, subscriber);
    let restored = restore_terminal(&mut terminal);

    // Report the loop's error first; a failed restore matters less
    result.and(restored)
}

fn run_loop(terminal: &mut TuiTerminal, engine: &ForwardEngine, mut subscriber: Subscriber) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let input_tx = tx.clone();
    std::thread::Builder::new()
        .name("kubeforward-input".to_string())
        .spawn(move || read_input(input_tx))
        .context("failed to spawn input thread")?;

    engine.spawn(async move {
        while let Some(event) = subscriber.recv().await {
            if tx.send(UiEvent::Bridge(event)).is_err() {
                break;
            }
        }
    });

    let mut app = App::new();
    execute_commands(&mut app, engine, vec![Command::RequestNamespaces]);

    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        let Some(event) = rx.blocking_recv() else {
            break;
        };
        let commands = match event {
            UiEvent::Key(key) => app.handle_key(key),
            UiEvent::Bridge(event) => app.handle_bridge(event),
            UiEvent::Redraw => Vec::new(),
        };
        execute_commands(&mut app, engine, commands);

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Forwards terminal events until the UI stops listening.
fn read_input(tx: mpsc::UnboundedSender<UiEvent>) {
    loop {
        let event = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => UiEvent::Key(key),
            Ok(Event::Resize(..)) => UiEvent::Redraw,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "failed to read terminal input");
                break;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}

fn execute_commands(app: &mut App, engine: &ForwardEngine, commands: Vec<Command>) {
    for command in commands {
        debug!(?command, "executing");
        match command {
            Command::RequestNamespaces => engine.request_namespaces(),
            Command::RequestResources(namespace, kind) => engine.request_resources(namespace, kind),
            Command::Start(id, spec) => match engine.start(id, spec) {
                Ok(()) => app.mark_connecting(id),
                Err(e) => app.show_error(&e),
            },
            Command::Stop(id) => match engine.stop(id) {
                Ok(()) => app.set_status(format!("row {}: stopping", id)),
                // Finished before the stop arrived; its event updates the row
                Err(ForwardError::NotRunning(_)) => {}
                Err(e) => app.show_error(&e),
            },
            Command::Remove(id) => match engine.remove(id) {
                Ok(()) | Err(ForwardError::NotRunning(_)) => {}
                Err(e) => app.show_error(&e),
            },
        }
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}
