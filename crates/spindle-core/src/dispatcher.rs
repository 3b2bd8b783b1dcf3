//! Event dispatcher for Spindle.
//!
//! This module provides the [`Dispatcher`], which owns one [`Route`] per
//! subscribed `(mode, event)` pair and produces the listener each route hands
//! to the event client.
//!
//! # Firing
//!
//! When the client fires a route's listener:
//!
//! 1. A [`Firing`] context is built from the event name, its payload and the
//!    route's handler paths
//! 2. Every registration callback runs in registration order and may append
//!    extra parameters with [`Firing::set`]
//! 3. Each handler runs with `payload ++ extra_params`, in cache order
//! 4. The first failing handler stops the firing; its error is returned as
//!    [`ErrorKind::Reading`]
//!
//! With the handler cache disabled, step 3 re-loads every path through the
//! loader instead of reading the cache.
//!
//! ```rust,ignore
//! use spindle_core::{Dispatcher, EventBus, Mode};
//!
//! let mut dispatcher = Dispatcher::new(Some(cache), loader, nomenclature);
//! let (route, created) = dispatcher.attach(Mode::On, "ping", paths, None);
//! if created {
//!     dispatcher.subscribe(&bus, route);
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{Instrument, Level, debug, info, span};

use crate::artifact::BoxedCode;
use crate::cache::{HandlerDescriptor, SharedCache};
use crate::emitter::{BoxedListener, Emitter, Mode, listener};
use crate::error::{ErrorKind, SpindleResult};
use crate::filter;
use crate::loader::BoxedLoader;
use crate::options::Nomenclature;

// ============================================================================
// Callbacks
// ============================================================================

/// A registration callback, run at every firing before the handlers.
pub type Callback = Arc<dyn Fn(&mut Firing<'_>) + Send + Sync>;

/// Converts a closure into a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&mut Firing<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-firing state handed to registration callbacks.
pub struct Firing<'a> {
    event: &'a str,
    data: &'a [Value],
    paths: &'a [PathBuf],
    cache: Option<&'a SharedCache>,
    params: Vec<Value>,
}

impl<'a> Firing<'a> {
    /// The event being fired.
    pub fn event(&self) -> &str {
        self.event
    }

    /// The payload the client fired with.
    pub fn data(&self) -> &[Value] {
        self.data
    }

    /// Handler paths discovered for this route.
    pub fn paths(&self) -> &[PathBuf] {
        self.paths
    }

    /// Appends extra parameters passed to every handler after the payload.
    pub fn set<I>(&mut self, params: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.params.extend(params);
    }

    /// Extra parameters collected so far.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The application's handler cache, if enabled.
    pub fn cache(&self) -> Option<&SharedCache> {
        self.cache
    }

    /// Cached handlers for `event`, checking `on` before `once`.
    pub fn handlers(&self, event: &str) -> Option<Vec<Arc<HandlerDescriptor>>> {
        self.cache.and_then(|cache| cache.read().get_any(event))
    }
}

// ============================================================================
// Route
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    /// Runs callbacks, then handlers.
    Handlers,
    /// Runs callbacks only.
    CallbackOnly,
}

/// One subscription to the event client.
pub struct Route {
    mode: Mode,
    event: String,
    kind: RouteKind,
    paths: RwLock<IndexSet<PathBuf>>,
    callbacks: RwLock<Vec<Callback>>,
}

impl Route {
    fn new(mode: Mode, event: &str, kind: RouteKind) -> Self {
        Self {
            mode,
            event: event.to_string(),
            kind,
            paths: RwLock::new(IndexSet::new()),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Subscription mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Handler paths in discovery order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.read().iter().cloned().collect()
    }

    /// Number of registration callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    fn add_paths(&self, paths: impl IntoIterator<Item = PathBuf>) {
        self.paths.write().extend(paths);
    }

    fn add_callback(&self, callback: Option<Callback>) {
        if let Some(callback) = callback {
            self.callbacks.write().push(callback);
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("mode", &self.mode)
            .field("event", &self.event)
            .field("kind", &self.kind)
            .field("paths", &self.paths.read().len())
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct Shared {
    cache: Option<SharedCache>,
    loader: BoxedLoader,
    nomenclature: Nomenclature,
}

impl Shared {
    /// Handlers to run for `route`, in dispatch order.
    fn resolve(&self, route: &Route, paths: &[PathBuf]) -> Result<Vec<(PathBuf, BoxedCode)>, ErrorKind> {
        if let Some(cache) = &self.cache {
            let handlers = cache.read().get(route.mode, &route.event).unwrap_or_default();
            return Ok(handlers
                .iter()
                .map(|handler| (handler.path.clone(), Arc::clone(&handler.code)))
                .collect());
        }

        let mut resolved = Vec::with_capacity(paths.len());
        for path in paths {
            let artifact = self.loader.load(path).map_err(|source| ErrorKind::Load {
                path: path.clone(),
                source,
            })?;
            match filter::code_of(&artifact, &self.nomenclature) {
                Some(code) => resolved.push((path.clone(), Arc::clone(code))),
                None => debug!(path = %path.display(), "File no longer exports a handler, skipping"),
            }
        }
        Ok(resolved)
    }
}

async fn fire(shared: Arc<Shared>, route: Arc<Route>, data: Vec<Value>) -> SpindleResult<()> {
    let paths = route.paths();
    let callbacks: Vec<Callback> = route.callbacks.read().clone();

    let mut firing = Firing {
        event: &route.event,
        data: &data,
        paths: &paths,
        cache: shared.cache.as_ref(),
        params: Vec::new(),
    };
    for callback in &callbacks {
        callback(&mut firing);
    }
    let params = firing.params;

    if route.kind == RouteKind::CallbackOnly {
        return Ok(());
    }

    let handlers = shared.resolve(&route, &paths)?;
    let mut args = data;
    args.extend(params);

    for (path, code) in &handlers {
        code.call(args.clone()).await.map_err(|source| ErrorKind::Reading {
            event: route.event.clone(),
            path: path.clone(),
            source,
        })?;
    }

    debug!(handlers = handlers.len(), "Dispatch complete");
    Ok(())
}

/// Owns the routes of one application.
pub struct Dispatcher {
    shared: Arc<Shared>,
    routes: IndexMap<(Mode, String), Arc<Route>>,
}

impl Dispatcher {
    /// Creates a dispatcher. `cache` is `None` when caching is disabled.
    pub fn new(cache: Option<SharedCache>, loader: BoxedLoader, nomenclature: Nomenclature) -> Self {
        Self {
            shared: Arc::new(Shared {
                cache,
                loader,
                nomenclature,
            }),
            routes: IndexMap::new(),
        }
    }

    /// The handler cache, if enabled.
    pub fn cache(&self) -> Option<&SharedCache> {
        self.shared.cache.as_ref()
    }

    /// The loader used for live re-loading.
    pub fn loader(&self) -> &BoxedLoader {
        &self.shared.loader
    }

    /// Whether `(mode, event)` already has a route.
    pub fn is_subscribed(&self, mode: Mode, event: &str) -> bool {
        self.routes.contains_key(&(mode, event.to_string()))
    }

    /// Looks up the route for `(mode, event)`.
    pub fn route(&self, mode: Mode, event: &str) -> Option<&Arc<Route>> {
        self.routes.get(&(mode, event.to_string()))
    }

    /// Routes in creation order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    /// Returns the route for `(mode, event)`, creating it if needed, and
    /// records the given paths and callback on it.
    ///
    /// The flag is `true` when the route was created and still has to be
    /// subscribed.
    pub fn attach(
        &mut self,
        mode: Mode,
        event: &str,
        paths: impl IntoIterator<Item = PathBuf>,
        callback: Option<Callback>,
    ) -> (Arc<Route>, bool) {
        let mut created = false;
        let route = self
            .routes
            .entry((mode, event.to_string()))
            .or_insert_with(|| {
                created = true;
                Arc::new(Route::new(mode, event, RouteKind::Handlers))
            });

        route.add_paths(paths);
        route.add_callback(callback);
        (Arc::clone(route), created)
    }

    /// Creates a route that only runs `callback`. It is not tracked and never
    /// shared with other registrations.
    pub fn detached(&self, mode: Mode, event: &str, callback: Callback) -> Arc<Route> {
        let route = Route::new(mode, event, RouteKind::CallbackOnly);
        route.add_callback(Some(callback));
        Arc::new(route)
    }

    /// Builds the listener for `route`.
    pub fn listener(&self, route: Arc<Route>) -> BoxedListener {
        let shared = Arc::clone(&self.shared);
        listener(move |data| {
            let span = span!(Level::DEBUG, "dispatch", event = %route.event, mode = %route.mode);
            fire(Arc::clone(&shared), Arc::clone(&route), data).instrument(span)
        })
    }

    /// Subscribes `route` with `client` using the route's mode.
    ///
    /// Returns `None` if the client cannot serve the mode.
    pub fn subscribe<E: Emitter>(&self, client: &E, route: Arc<Route>) -> Option<E::Subscription> {
        let mode = route.mode;
        let event = route.event.clone();
        let listener = self.listener(route);

        let subscription = match mode {
            Mode::On => Some(client.on(&event, listener)),
            Mode::Once => client.once(&event, listener),
        };
        if subscription.is_some() {
            info!(%mode, event = %event, "Subscribed route");
        }
        subscription
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes.len())
            .field("cache_enabled", &self.shared.cache.is_some())
            .finish()
    }
}
