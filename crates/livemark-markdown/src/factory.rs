use crate::context::DocumentContext;
use crate::context::ModelKind;
use crate::error::WidgetError;
use crate::mime::Renderer;
use crate::widget::MarkdownWidget;
use crate::widget::MarkdownWidgetOptions;
use livemark_core::schedule::Scheduler;
use std::fmt;
use std::rc::Rc;

/// Creates [`MarkdownWidget`]s that share one renderer and one host loop.
///
/// The factory holds no per-widget state; every call to [`Self::create_new`] returns an
/// independent widget.
#[derive(Clone)]
pub struct MarkdownWidgetFactory {
    name: String,
    renderer: Rc<dyn Renderer>,
    host: Rc<dyn Scheduler>,
    options: MarkdownWidgetOptions,
}

impl fmt::Debug for MarkdownWidgetFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkdownWidgetFactory")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MarkdownWidgetFactory {
    pub const DEFAULT_NAME: &'static str = "Markdown Preview";

    pub fn new(renderer: Rc<dyn Renderer>, host: Rc<dyn Scheduler>) -> Self {
        Self::with_options(renderer, host, MarkdownWidgetOptions::default())
    }

    pub fn with_options(
        renderer: Rc<dyn Renderer>,
        host: Rc<dyn Scheduler>,
        options: MarkdownWidgetOptions,
    ) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            renderer,
            host,
            options,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &MarkdownWidgetOptions {
        &self.options
    }

    /// Builds a widget bound to `context`.
    ///
    /// Only text models can be previewed; closed documents are rejected too.
    pub fn create_new(
        &self,
        context: Rc<dyn DocumentContext>,
    ) -> Result<MarkdownWidget, WidgetError> {
        let found = context.model_kind();
        if found != ModelKind::Text {
            return Err(WidgetError::IncompatibleModel {
                expected: ModelKind::Text,
                found,
            });
        }
        if context.is_disposed() {
            return Err(WidgetError::ContextDisposed);
        }
        tracing::debug!(factory = %self.name, path = %context.path(), "creating widget");
        Ok(MarkdownWidget::new(
            context,
            Rc::clone(&self.renderer),
            Rc::clone(&self.host),
            self.options.clone(),
        ))
    }
}
