//! The live rendering widget.
//!
//! A [`MarkdownWidget`] watches one [`DocumentContext`] and keeps a single rendered child in sync
//! with it. Change notifications only mark an update as pending; the actual render happens when
//! the host loop runs the flush queued by the widget's [`UpdateScheduler`], so a burst of edits
//! costs one render.
//!
//! Lifecycle:
//!
//! ```text
//! Detached --attach--> Attached --detach--> Detached
//!     \                   |
//!      `----dispose-------+-----> Disposed (terminal)
//! ```
//!
//! The first attach requests the initial render. Flushes run in any live state; once disposed
//! they do nothing.

use crate::context::DocumentContext;
use crate::error::RenderError;
use crate::error::WidgetError;
use crate::mime::MimeSet;
use crate::mime::OutputId;
use crate::mime::RenderedOutput;
use crate::mime::Renderer;
use livemark_core::render;
use livemark_core::render::inset_h;
use livemark_core::schedule::Scheduler;
use livemark_core::schedule::UpdateScheduler;
use livemark_core::signal::SubscriptionId;
use livemark_core::theme::Theme;
use livemark_core::viewport::ViewportState;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use std::cell::Ref;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::rc::Weak;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarkdownWidgetOptions {
    /// MIME types the renderer may produce for this widget.
    pub mimes: MimeSet,
    pub show_scrollbar: bool,
    pub padding_left: u16,
    pub padding_right: u16,
}

impl Default for MarkdownWidgetOptions {
    fn default() -> Self {
        Self {
            mimes: MimeSet::default_markdown(),
            show_scrollbar: true,
            padding_left: 0,
            padding_right: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Detached,
    Attached,
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The widget was disposed before the flush ran.
    Disposed,
    /// The document context was dropped or closed while the flush was pending.
    StaleContext,
    /// The flush was invoked while the widget was already running one of its own handlers.
    Busy,
}

/// What a flush did to the child slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A new output went in; `old` is the output it displaced, if any.
    Replaced { old: Option<OutputId>, new: OutputId },
    /// The renderer failed; the previous child (if any) is still displayed.
    Retained(RenderError),
    Skipped(SkipReason),
}

impl FlushOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

/// Events delivered to hooks registered with [`MarkdownWidget::add_hook`].
///
/// Hooks run after the widget's own handling of the event, in registration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    AfterAttach,
    BeforeDetach,
    UpdateRequest(FlushOutcome),
    Disposed,
}

type Hook = Box<dyn FnMut(&LifecycleEvent)>;
type ErrorReporter = Box<dyn FnMut(&RenderError)>;

/// Holds at most one rendered output.
#[derive(Debug, Default)]
pub struct ChildSlot {
    current: Option<RenderedOutput>,
}

impl ChildSlot {
    pub fn get(&self) -> Option<&RenderedOutput> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Puts `new` in the slot and hands back the output it displaced.
    pub fn replace(&mut self, new: RenderedOutput) -> Option<RenderedOutput> {
        self.current.replace(new)
    }

    pub fn take(&mut self) -> Option<RenderedOutput> {
        self.current.take()
    }
}

struct Subscriptions {
    content: SubscriptionId,
    path: SubscriptionId,
    disposed: SubscriptionId,
}

struct WidgetState {
    lifecycle: Lifecycle,
    attached_once: bool,
    context: Option<Weak<dyn DocumentContext>>,
    subscriptions: Option<Subscriptions>,
    renderer: Rc<dyn Renderer>,
    scheduler: UpdateScheduler,
    options: MarkdownWidgetOptions,
    child: ChildSlot,
    viewport: ViewportState,
    title: String,
    render_count: u64,
    last_error: Option<RenderError>,
    hooks: Vec<Hook>,
    firing: bool,
    disposed_while_firing: bool,
    reporter: Option<ErrorReporter>,
}

/// Live markdown preview of one document.
///
/// Dropping the widget disposes it.
pub struct MarkdownWidget {
    state: Rc<RefCell<WidgetState>>,
}

impl fmt::Debug for MarkdownWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(st) => f
                .debug_struct("MarkdownWidget")
                .field("title", &st.title)
                .field("lifecycle", &st.lifecycle)
                .field("pending", &st.scheduler.is_pending())
                .field("child", &st.child.get().map(RenderedOutput::id))
                .field("render_count", &st.render_count)
                .finish(),
            Err(_) => f.write_str("MarkdownWidget { <busy> }"),
        }
    }
}

impl MarkdownWidget {
    /// Binds a widget to `context`. Nothing is rendered until the first flush.
    pub fn new(
        context: Rc<dyn DocumentContext>,
        renderer: Rc<dyn Renderer>,
        host: Rc<dyn Scheduler>,
        options: MarkdownWidgetOptions,
    ) -> Self {
        let scheduler = UpdateScheduler::with_label(host, "markdown-widget");
        let state = Rc::new(RefCell::new(WidgetState {
            lifecycle: Lifecycle::Detached,
            attached_once: false,
            context: Some(Rc::downgrade(&context)),
            subscriptions: None,
            renderer,
            scheduler: scheduler.clone(),
            options,
            child: ChildSlot::default(),
            viewport: ViewportState::default(),
            title: title_for(&context.path()),
            render_count: 0,
            last_error: None,
            hooks: Vec::new(),
            firing: false,
            disposed_while_firing: false,
            reporter: None,
        }));

        let weak = Rc::downgrade(&state);
        scheduler.set_callback(move || match weak.upgrade() {
            Some(state) => {
                flush(&state)?;
                Ok(())
            }
            None => Ok(()),
        });

        let content = {
            let scheduler = scheduler.clone();
            context.content_changed().subscribe(move |_| {
                scheduler.request_update();
            })
        };
        let path = {
            let weak = Rc::downgrade(&state);
            context.path_changed().subscribe(move |path: &String| {
                if let Some(state) = weak.upgrade()
                    && let Ok(mut st) = state.try_borrow_mut()
                {
                    st.title = title_for(path);
                    tracing::debug!(title = %st.title, "document renamed");
                }
            })
        };
        let disposed = {
            let weak = Rc::downgrade(&state);
            context.disposed().subscribe(move |_| {
                if let Some(state) = weak.upgrade() {
                    tracing::debug!("document closed; disposing widget");
                    dispose(&state);
                }
            })
        };
        state.borrow_mut().subscriptions = Some(Subscriptions {
            content,
            path,
            disposed,
        });

        Self { state }
    }

    pub fn attach(&mut self) -> Result<(), WidgetError> {
        let first = {
            let mut st = self.state.borrow_mut();
            match st.lifecycle {
                Lifecycle::Disposed => return Err(WidgetError::Disposed),
                Lifecycle::Attached => return Err(WidgetError::AlreadyAttached),
                Lifecycle::Detached => {}
            }
            st.lifecycle = Lifecycle::Attached;
            !std::mem::replace(&mut st.attached_once, true)
        };
        if first {
            let scheduler = self.state.borrow().scheduler.clone();
            scheduler.request_update();
        }
        tracing::debug!(first, "attached");
        fire(&self.state, &LifecycleEvent::AfterAttach);
        Ok(())
    }

    pub fn detach(&mut self) -> Result<(), WidgetError> {
        match self.lifecycle() {
            Lifecycle::Disposed => return Err(WidgetError::Disposed),
            Lifecycle::Detached => return Err(WidgetError::NotAttached),
            Lifecycle::Attached => {}
        }
        fire(&self.state, &LifecycleEvent::BeforeDetach);
        self.state.borrow_mut().lifecycle = Lifecycle::Detached;
        tracing::debug!("detached");
        Ok(())
    }

    /// Releases the context, cancels any pending flush and drops the child. Safe to call twice.
    pub fn dispose(&mut self) {
        dispose(&self.state);
    }

    /// Asks for a re-render on the next loop iteration. Returns `false` if one is already pending.
    pub fn request_update(&self) -> bool {
        let scheduler = self.state.borrow().scheduler.clone();
        scheduler.request_update()
    }

    /// Re-renders right now, outside the scheduler.
    ///
    /// This is the body of every scheduled flush; a flush that is already queued still runs later.
    pub fn on_update_request(&mut self) -> FlushOutcome {
        flush(&self.state).unwrap_or(FlushOutcome::Skipped(SkipReason::Busy))
    }

    /// Registers a hook. Hooks run after the widget's own handling, in registration order.
    pub fn add_hook(&mut self, hook: impl FnMut(&LifecycleEvent) + 'static) {
        let mut st = self.state.borrow_mut();
        if st.lifecycle != Lifecycle::Disposed {
            st.hooks.push(Box::new(hook));
        }
    }

    /// Replaces the channel render failures are reported to (a `tracing` warning by default).
    pub fn set_error_reporter(&mut self, reporter: impl FnMut(&RenderError) + 'static) {
        self.state.borrow_mut().reporter = Some(Box::new(reporter));
    }

    /// Changes the permitted MIME types and schedules a re-render with them.
    pub fn set_mimes(&mut self, mimes: MimeSet) {
        let changed = {
            let mut st = self.state.borrow_mut();
            let changed = st.options.mimes != mimes;
            st.options.mimes = mimes;
            changed
        };
        if changed {
            self.request_update();
        }
    }

    pub fn options(&self) -> Ref<'_, MarkdownWidgetOptions> {
        Ref::map(self.state.borrow(), |st| &st.options)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.borrow().lifecycle
    }

    pub fn is_attached(&self) -> bool {
        self.lifecycle() == Lifecycle::Attached
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle() == Lifecycle::Disposed
    }

    pub fn is_update_pending(&self) -> bool {
        self.state.borrow().scheduler.is_pending()
    }

    /// The bound context, while it is alive and the widget is not disposed.
    pub fn context(&self) -> Option<Rc<dyn DocumentContext>> {
        self.state.borrow().context.as_ref().and_then(Weak::upgrade)
    }

    pub fn child(&self) -> Option<Ref<'_, RenderedOutput>> {
        Ref::filter_map(self.state.borrow(), |st| st.child.get()).ok()
    }

    pub fn child_id(&self) -> Option<OutputId> {
        self.state.borrow().child.get().map(RenderedOutput::id)
    }

    pub fn child_count(&self) -> usize {
        self.state.borrow().child.len()
    }

    /// File name of the document, kept current across renames.
    pub fn title(&self) -> String {
        self.state.borrow().title.clone()
    }

    /// Number of flushes that installed a new child.
    pub fn render_count(&self) -> u64 {
        self.state.borrow().render_count
    }

    /// The error from the most recent flush, cleared by the next successful one.
    pub fn last_error(&self) -> Option<RenderError> {
        self.state.borrow().last_error.clone()
    }

    pub fn viewport(&self) -> ViewportState {
        self.state.borrow().viewport
    }

    pub fn scroll_y_by(&mut self, delta: i32) {
        self.state.borrow_mut().viewport.scroll_y_by(delta);
    }

    pub fn scroll_x_by(&mut self, delta: i32) {
        self.state.borrow_mut().viewport.scroll_x_by(delta);
    }

    pub fn page_down(&mut self) {
        self.state.borrow_mut().viewport.page_down();
    }

    pub fn page_up(&mut self) {
        self.state.borrow_mut().viewport.page_up();
    }

    pub fn to_top(&mut self) {
        self.state.borrow_mut().viewport.to_top();
    }

    pub fn to_bottom(&mut self) {
        self.state.borrow_mut().viewport.to_bottom();
    }

    /// Draws the current child into `area`. Draws nothing unless attached.
    pub fn render_ref(&mut self, area: Rect, buf: &mut Buffer, theme: &Theme) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let mut guard = self.state.borrow_mut();
        let WidgetState {
            lifecycle,
            options,
            child,
            viewport,
            ..
        } = &mut *guard;
        if *lifecycle != Lifecycle::Attached {
            return;
        }

        let (content_area, scrollbar_x) = if options.show_scrollbar && area.width >= 2 {
            (
                Rect::new(area.x, area.y, area.width - 1, area.height),
                Some(area.x + area.width - 1),
            )
        } else {
            (area, None)
        };
        let inner = inset_h(content_area, options.padding_left, options.padding_right);
        viewport.set_viewport(inner.width, inner.height);
        buf.set_style(content_area, theme.text_primary);

        if let Some(output) = child.get() {
            let (w, h) = output.content_size(inner.width, theme);
            viewport.set_content(w, h);
            let vp = *viewport;
            output.with_layout(inner.width, theme, |rendered| {
                let lines = rendered.lines();
                for (row, idx) in vp.visible_rows().enumerate() {
                    let Some(line) = lines.get(idx) else {
                        break;
                    };
                    render::render_spans_clipped(
                        inner.x,
                        inner.y + row as u16,
                        vp.x,
                        inner.width,
                        buf,
                        &line.spans,
                        theme.text_primary,
                    );
                }
            });
        } else {
            viewport.set_content(0, 0);
        }

        if let Some(sb_x) = scrollbar_x {
            render::render_scrollbar(
                Rect::new(sb_x, area.y, 1, area.height),
                buf,
                viewport,
                theme.text_muted,
            );
        }
    }
}

impl Drop for MarkdownWidget {
    fn drop(&mut self) {
        dispose(&self.state);
    }
}

fn title_for(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// One flush: render the context's current text and swap it into the child slot.
fn flush(state: &Rc<RefCell<WidgetState>>) -> livemark_core::Result<FlushOutcome> {
    let outcome = {
        let Ok(mut st) = state.try_borrow_mut() else {
            return Err(livemark_core::Error::task_failed(
                "markdown-widget",
                "flush re-entered while the widget was in use",
            ));
        };
        render_into_slot(&mut st)
    };

    if let FlushOutcome::Retained(err) = &outcome {
        report(state, err);
    }
    fire(state, &LifecycleEvent::UpdateRequest(outcome.clone()));
    Ok(outcome)
}

fn render_into_slot(st: &mut WidgetState) -> FlushOutcome {
    if st.lifecycle == Lifecycle::Disposed {
        return FlushOutcome::Skipped(SkipReason::Disposed);
    }
    let Some(context) = st
        .context
        .as_ref()
        .and_then(Weak::upgrade)
        .filter(|ctx| !ctx.is_disposed())
    else {
        tracing::warn!(title = %st.title, "document context is gone; skipping render");
        return FlushOutcome::Skipped(SkipReason::StaleContext);
    };

    let text = context.current_text();
    match st.renderer.render(&text, &st.options.mimes) {
        Ok(output) => {
            let new = output.id();
            let old = st.child.replace(output).map(|old| old.id());
            st.render_count += 1;
            st.last_error = None;
            tracing::debug!(title = %st.title, %new, bytes = text.len(), "child replaced");
            FlushOutcome::Replaced { old, new }
        }
        Err(err) => {
            st.last_error = Some(err.clone());
            FlushOutcome::Retained(err)
        }
    }
}

fn report(state: &Rc<RefCell<WidgetState>>, err: &RenderError) {
    let reporter = state.try_borrow_mut().ok().and_then(|mut st| st.reporter.take());
    match reporter {
        Some(mut reporter) => {
            reporter(err);
            if let Ok(mut st) = state.try_borrow_mut()
                && st.reporter.is_none()
            {
                st.reporter = Some(reporter);
            }
        }
        None => tracing::warn!(error = %err, "markdown render failed; keeping previous output"),
    }
}

/// Runs every hook for `event`.
///
/// Hooks are moved out of the state while they run. A `Disposed` raised by a hook (for example by
/// closing the document) is held back and delivered to the same hooks once the current event is
/// done; they are dropped afterwards.
fn fire(state: &Rc<RefCell<WidgetState>>, event: &LifecycleEvent) {
    let mut hooks = match state.try_borrow_mut() {
        Ok(mut st) if st.firing => {
            if *event == LifecycleEvent::Disposed {
                st.disposed_while_firing = true;
            }
            return;
        }
        Ok(mut st) => {
            st.firing = true;
            std::mem::take(&mut st.hooks)
        }
        Err(_) => return,
    };
    for hook in hooks.iter_mut() {
        hook(event);
    }

    let deliver_disposed = match state.try_borrow_mut() {
        Ok(mut st) => {
            st.firing = false;
            if st.lifecycle != Lifecycle::Disposed {
                hooks.append(&mut st.hooks);
                st.hooks = hooks;
                return;
            }
            std::mem::take(&mut st.disposed_while_firing)
        }
        Err(_) => false,
    };
    if deliver_disposed {
        for hook in hooks.iter_mut() {
            hook(&LifecycleEvent::Disposed);
        }
    }
}

fn dispose(state: &Rc<RefCell<WidgetState>>) {
    {
        let Ok(mut st) = state.try_borrow_mut() else {
            tracing::warn!("dispose while the widget was in use; ignored");
            return;
        };
        if st.lifecycle == Lifecycle::Disposed {
            return;
        }
        st.lifecycle = Lifecycle::Disposed;
        st.scheduler.cancel();

        let context = st.context.take().and_then(|weak| weak.upgrade());
        if let (Some(context), Some(subs)) = (context, st.subscriptions.take()) {
            context.content_changed().unsubscribe(subs.content);
            context.path_changed().unsubscribe(subs.path);
            context.disposed().unsubscribe(subs.disposed);
        }
        st.child.take();
        st.reporter = None;
        tracing::debug!(title = %st.title, "disposed");
    }
    fire(state, &LifecycleEvent::Disposed);
}
