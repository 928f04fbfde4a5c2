use livemark_core::schedule::EventLoop;
use livemark_markdown::MarkdownWidget;
use livemark_markdown::MarkdownWidgetOptions;
use livemark_markdown::RenderMime;
use livemark_markdown::TextDocument;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::Level;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Clone, Default)]
struct Captured {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl Captured {
    fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("capture lock")
            .iter()
            .filter(|(level, _)| *level == Level::WARN)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for Captured {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.events
                .lock()
                .expect("capture lock")
                .push((*event.metadata().level(), message));
        }
    }
}

fn with_capture(f: impl FnOnce()) -> Captured {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(captured.clone());
    let _guard = tracing::subscriber::set_default(subscriber);
    f();
    captured
}

fn widget(host: &EventLoop, doc: &Rc<TextDocument>) -> MarkdownWidget {
    MarkdownWidget::new(
        doc.clone(),
        Rc::new(RenderMime::new()),
        Rc::new(host.clone()),
        MarkdownWidgetOptions::default(),
    )
}

#[test]
fn render_failures_warn_by_default() {
    let captured = with_capture(|| {
        let host = EventLoop::new();
        let doc = Rc::new(TextDocument::new("a.md", "![x](data:image/png;base64,AAAA)"));
        let mut w = widget(&host, &doc);
        w.attach().unwrap();
        host.run_until_idle(8).unwrap();
    });
    assert_eq!(
        captured.warnings(),
        vec!["markdown render failed; keeping previous output".to_string()]
    );
}

#[test]
fn custom_reporter_replaces_the_warning() {
    let captured = with_capture(|| {
        let host = EventLoop::new();
        let doc = Rc::new(TextDocument::new("a.md", "![x](data:image/png;base64,AAAA)"));
        let mut w = widget(&host, &doc);
        w.set_error_reporter(|_| {});
        w.attach().unwrap();
        host.run_until_idle(8).unwrap();
    });
    assert!(captured.warnings().is_empty());
}

#[test]
fn stale_context_is_logged() {
    let captured = with_capture(|| {
        let host = EventLoop::new();
        let doc = Rc::new(TextDocument::new("a.md", "x"));
        let mut w = widget(&host, &doc);
        w.attach().unwrap();
        drop(doc);
        host.run_until_idle(8).unwrap();
    });
    assert_eq!(
        captured.warnings(),
        vec!["document context is gone; skipping render".to_string()]
    );
}
