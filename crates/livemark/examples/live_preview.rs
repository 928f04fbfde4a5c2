use crossterm::event::Event;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyEventKind;
use crossterm::event::KeyModifiers;
use crossterm::terminal::EnterAlternateScreen;
use crossterm::terminal::LeaveAlternateScreen;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use livemark::MarkdownWidget;
use livemark::MarkdownWidgetFactory;
use livemark::TextDocument;
use livemark::markdown::DocumentContext;
use livemark::markdown::MarkdownWidgetOptions;
use livemark::markdown::RenderMime;
use livemark::schedule::EventLoop;
use livemark::theme::Theme;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Constraint;
use ratatui::layout::Direction;
use ratatui::layout::Layout;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Block;
use ratatui::widgets::Borders;
use ratatui::widgets::Paragraph;
use ratatui::widgets::Wrap;
use std::fs::File;
use std::io;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SAMPLE_MARKDOWN: &str = r#"# Live Preview

Type on the left; the preview on the right re-renders once per loop iteration,
no matter how fast you type.

- `Ctrl-D`: detach / re-attach the preview
- `Ctrl-R`: rename the document
- `PgUp/PgDn`: scroll the preview
- `Esc`: quit

> Logs go to `livemark.log` (set `RUST_LOG` to tune them).

"#;

fn init_logging() -> io::Result<()> {
    let file = File::create("livemark.log")?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("livemark_core=debug,livemark_markdown=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> io::Result<()> {
    init_logging()?;

    let host = EventLoop::new();
    let factory = MarkdownWidgetFactory::with_options(
        Rc::new(RenderMime::new()),
        Rc::new(host.clone()),
        MarkdownWidgetOptions {
            padding_left: 1,
            padding_right: 1,
            ..Default::default()
        },
    );
    let doc = Rc::new(TextDocument::new("notes/live.md", SAMPLE_MARKDOWN));
    let mut widget = factory
        .create_new(doc.clone())
        .map_err(io::Error::other)?;
    widget.attach().map_err(io::Error::other)?;

    let mut stdout = io::stdout();
    enable_raw_mode()?;
    crossterm::execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run(&mut terminal, &host, &doc, &mut widget);

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

fn run<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    host: &EventLoop,
    doc: &TextDocument,
    widget: &mut MarkdownWidget,
) -> io::Result<()> {
    let theme = Theme::default();
    let mut renames = 0u32;
    loop {
        host.run_pending().map_err(io::Error::other)?;

        terminal.draw(|f| {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(1), Constraint::Length(1)])
                .split(f.area());
            let panes = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(rows[0]);

            let source = Paragraph::new(doc.current_text())
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title(" source "));
            f.render_widget(source, panes[0]);

            let title = format!(" {} ", widget.title());
            let block = Block::default().borders(Borders::ALL).title(title);
            let inner = block.inner(panes[1]);
            f.render_widget(block, panes[1]);
            widget.render_ref(inner, f.buffer_mut(), &theme);

            let status = format!(
                " {:?} | renders {} | pending {} | ",
                widget.lifecycle(),
                widget.render_count(),
                widget.is_update_pending(),
            );
            let outcome = match widget.last_error() {
                Some(err) => Span::styled(err.to_string(), theme.danger),
                None => Span::styled("ok", theme.status),
            };
            f.render_widget(
                Paragraph::new(Line::from(vec![Span::styled(status, theme.status), outcome])),
                rows[1],
            );
        })?;

        if crossterm::event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = crossterm::event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if handle_key(key, doc, widget, &mut renames) {
                return Ok(());
            }
        }
    }
}

/// Returns `true` when the app should quit.
fn handle_key(
    key: KeyEvent,
    doc: &TextDocument,
    widget: &mut MarkdownWidget,
    renames: &mut u32,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => return true,
        KeyCode::Char('d') if ctrl => {
            let res = if widget.is_attached() {
                widget.detach()
            } else {
                widget.attach()
            };
            if let Err(err) = res {
                tracing::warn!(error = %err, "toggle attach failed");
            }
        }
        KeyCode::Char('r') if ctrl => {
            *renames += 1;
            doc.set_path(format!("notes/live-{renames}.md"));
        }
        KeyCode::Char(c) if !ctrl => doc.append(&c.to_string()),
        KeyCode::Enter => doc.append("\n"),
        KeyCode::Tab => doc.append("    "),
        KeyCode::Backspace => {
            let mut text = doc.current_text();
            if text.pop().is_some() {
                doc.set_text(text);
            }
        }
        KeyCode::PageDown => widget.page_down(),
        KeyCode::PageUp => widget.page_up(),
        KeyCode::Down => widget.scroll_y_by(1),
        KeyCode::Up => widget.scroll_y_by(-1),
        KeyCode::Home => widget.to_top(),
        KeyCode::End => widget.to_bottom(),
        _ => {}
    }
    false
}
