//! Call context carrying the caller's view of "now" and a trace span.
//!
//! Every component reads the current tick from the context it was handed
//! and derives child contexts with [`Context::with_tick`]. The span name
//! only feeds diagnostics; nothing functional depends on it.

use std::sync::Arc;

use crate::id::Tick;

/// Log target used by every simtime component.
pub const LOG_TARGET: &str = "simtime";

/// Immutable call context. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Context {
    tick: Option<Tick>,
    span: Option<Arc<str>>,
}

impl Context {
    /// A root context with no tick and no span.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tick carried by this context, if any.
    pub fn tick(&self) -> Option<Tick> {
        self.tick
    }

    /// A child context carrying `tick`.
    pub fn with_tick(&self, tick: Tick) -> Context {
        Context {
            tick: Some(tick),
            span: self.span.clone(),
        }
    }

    /// A child context labelled `span` for diagnostics.
    pub fn with_span(&self, span: &str) -> Context {
        Context {
            tick: self.tick,
            span: Some(Arc::from(span)),
        }
    }

    /// Span label, or `"-"` when none was set.
    pub fn span(&self) -> &str {
        self.span.as_deref().unwrap_or("-")
    }

    /// Emit a trace-level diagnostic tagged with this context.
    pub fn trace(&self, what: std::fmt::Arguments<'_>) {
        match self.tick {
            Some(t) => log::trace!(target: LOG_TARGET, "[{} @{}] {}", self.span(), t, what),
            None => log::trace!(target: LOG_TARGET, "[{}] {}", self.span(), what),
        }
    }
}

/// The tick carried by `ctx`, if any.
pub fn tick_from_context(ctx: &Context) -> Option<Tick> {
    ctx.tick()
}

/// A child of `ctx` carrying `tick`.
pub fn context_with_tick(ctx: &Context, tick: Tick) -> Context {
    ctx.with_tick(tick)
}
