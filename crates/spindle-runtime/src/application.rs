//! The application facade.
//!
//! An [`Application`] owns one event client, one loader, its options, the
//! handler cache and the dispatcher routes. Nothing is global: two
//! applications over the same directory keep separate caches and subscribe
//! separately.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use spindle_core::{EventBus, FunctionRegistry, ManifestLoader};
//! use spindle_runtime::Application;
//!
//! let bus = Arc::new(EventBus::new());
//! let mut app = Application::builder()
//!     .client(Arc::clone(&bus))
//!     .loader(ManifestLoader::new(registry))
//!     .options(json!({ "cache": { "driver": "sorted" } }))
//!     .build()?;
//!
//! app.on("ping", "handlers", None)?;
//! bus.emit("ping", vec![json!(42)]).await?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use spindle_core::{
    BoxedLoader, Callback, Dispatcher, Emitter, ErrorKind, EventCache, HandlerDescriptor, Loader,
    Mode, Options, Route, SharedCache, SpindleResult, discover, extract, resolve_target,
};
use tracing::{debug, warn};

use crate::config::SpindleConfig;

/// Builder for [`Application`].
pub struct ApplicationBuilder<E: Emitter> {
    client: Option<Arc<E>>,
    loader: Option<BoxedLoader>,
    options: OptionsSource,
}

enum OptionsSource {
    Raw(Value),
    Typed(Options),
}

impl<E: Emitter> Default for ApplicationBuilder<E> {
    fn default() -> Self {
        Self {
            client: None,
            loader: None,
            options: OptionsSource::Raw(Value::Object(Default::default())),
        }
    }
}

impl<E: Emitter> ApplicationBuilder<E> {
    /// Sets the event client.
    pub fn client(mut self, client: Arc<E>) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the handler loader.
    pub fn loader(mut self, loader: impl Loader) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Sets user options as JSON, deep-merged over the defaults at build time.
    pub fn options(mut self, options: Value) -> Self {
        self.options = OptionsSource::Raw(options);
        self
    }

    /// Sets fully-formed options, skipping the merge.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = OptionsSource::Typed(options);
        self
    }

    /// Builds the application.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::MissingClient`] if no client was set
    /// - [`ErrorKind::MissingLoader`] if no loader was set
    /// - any error of [`Options::from_value`]
    pub fn build(self) -> SpindleResult<Application<E>> {
        let client = self.client.ok_or(ErrorKind::MissingClient)?;
        let loader = self.loader.ok_or(ErrorKind::MissingLoader)?;
        let options = match self.options {
            OptionsSource::Raw(value) => Options::from_value(value)?,
            OptionsSource::Typed(options) => options,
        };

        let cache = options
            .cache
            .enable
            .then(|| EventCache::shared(options.cache.driver));
        let dispatcher = Dispatcher::new(cache, loader, options.nomenclature.clone());

        debug!(
            extension = %options.filter.extension,
            cache = options.cache.enable,
            driver = ?options.cache.driver,
            "Application built"
        );
        Ok(Application {
            client,
            options,
            dispatcher,
        })
    }
}

/// Wires handler directories to an event client.
pub struct Application<E: Emitter> {
    client: Arc<E>,
    options: Options,
    dispatcher: Dispatcher,
}

impl<E: Emitter> Application<E> {
    /// Starts building an application.
    pub fn builder() -> ApplicationBuilder<E> {
        ApplicationBuilder::default()
    }

    /// Builds an application from loaded configuration.
    pub fn from_config(client: Arc<E>, loader: impl Loader, config: &SpindleConfig) -> SpindleResult<Self> {
        Self::builder()
            .client(client)
            .loader(loader)
            .with_options(config.options.clone())
            .build()
    }

    /// The event client.
    pub fn client(&self) -> &Arc<E> {
        &self.client
    }

    /// The effective options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The handler cache, or `None` when caching is disabled.
    pub fn cache(&self) -> Option<&SharedCache> {
        self.dispatcher.cache()
    }

    /// The routes subscribed so far.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Registers the handlers under `path` for every firing of `event`.
    ///
    /// An empty `path` registers `callback` alone. The first registration of
    /// an event scans, fills the cache and subscribes; later ones reuse the
    /// cached handlers and the existing subscription and return `None`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::MissingEvent`] / [`ErrorKind::InvalidEventProvided`]
    /// - [`ErrorKind::MissingPath`] if there is neither a path nor a callback
    /// - [`ErrorKind::InvalidPathProvided`] if the directory cannot be scanned
    /// - [`ErrorKind::Load`] if a file cannot be loaded
    pub fn on(
        &mut self,
        event: &str,
        path: impl AsRef<Path>,
        callback: Option<Callback>,
    ) -> SpindleResult<Option<E::Subscription>> {
        self.register(Mode::On, event, path.as_ref(), callback)
    }

    /// Like [`on`](Self::on), for the next firing only.
    ///
    /// The route stays registered after it fires, so calling `once` again for
    /// the same event subscribes nothing and returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// As [`on`](Self::on), plus [`ErrorKind::InvalidClientProvided`] if the
    /// client has no native single-fire subscription.
    pub fn once(
        &mut self,
        event: &str,
        path: impl AsRef<Path>,
        callback: Option<Callback>,
    ) -> SpindleResult<Option<E::Subscription>> {
        self.register(Mode::Once, event, path.as_ref(), callback)
    }

    /// Registers files that declare their own target.
    ///
    /// Each qualifying file under `path` is routed to `event` and `mode` when
    /// given, otherwise to what the file declares in its data or top-level
    /// fields. Files without a usable target are skipped. One subscription is
    /// made per new `(mode, event)`; calling `run` again over the same files
    /// subscribes nothing.
    ///
    /// # Errors
    ///
    /// As [`on`](Self::on) and [`once`](Self::once).
    pub fn run(
        &mut self,
        event: Option<&str>,
        path: impl AsRef<Path>,
        mode: Option<Mode>,
        callback: Option<Callback>,
    ) -> SpindleResult<Vec<E::Subscription>> {
        let path = path.as_ref();
        if let Some(event) = event {
            validate_event(event)?;
        }

        if path.as_os_str().is_empty() {
            let event = event.ok_or(ErrorKind::MissingEvent)?;
            let subscription = self.register(mode.unwrap_or(Mode::On), event, path, callback)?;
            return Ok(subscription.into_iter().collect());
        }
        if mode == Some(Mode::Once) {
            self.ensure_once()?;
        }

        let nomenclature = &self.options.nomenclature;
        let found = discover(
            path,
            &self.options.filter.extension,
            self.dispatcher.loader(),
            nomenclature,
        )?;

        let mut groups: IndexMap<(Mode, String), Vec<HandlerDescriptor>> = IndexMap::new();
        for (file, artifact) in found {
            let Some((target, target_mode)) = resolve_target(event, mode, &artifact, nomenclature) else {
                debug!(path = %file.display(), "Handler declares no target, skipping");
                continue;
            };
            validate_event(&target)?;
            if let Some(descriptor) = extract(&file, &artifact, nomenclature, &target, target_mode) {
                groups.entry((target_mode, target)).or_default().push(descriptor);
            }
        }

        if groups.keys().any(|(mode, _)| *mode == Mode::Once) {
            self.ensure_once()?;
        }

        let mut subscriptions = Vec::new();
        for ((mode, event), descriptors) in groups {
            let paths: Vec<_> = descriptors.iter().map(|d| d.path.clone()).collect();
            if let Some(cache) = self.dispatcher.cache() {
                cache.write().absorb(descriptors);
            }

            let (route, created) = self.dispatcher.attach(mode, &event, paths, callback.clone());
            if created {
                subscriptions.extend(self.subscribe(route));
            }
        }
        Ok(subscriptions)
    }

    fn register(
        &mut self,
        mode: Mode,
        event: &str,
        path: &Path,
        callback: Option<Callback>,
    ) -> SpindleResult<Option<E::Subscription>> {
        validate_event(event)?;
        if mode == Mode::Once {
            self.ensure_once()?;
        }

        if path.as_os_str().is_empty() {
            let callback = callback.ok_or(ErrorKind::MissingPath)?;
            let route = self.dispatcher.detached(mode, event, callback);
            return Ok(self.subscribe(route));
        }

        let paths = self.collect(mode, event, path)?;
        let (route, created) = self.dispatcher.attach(mode, event, paths, callback);
        if !created {
            debug!(%mode, event, "Event already subscribed, reusing route");
            return Ok(None);
        }
        Ok(self.subscribe(route))
    }

    /// Handler paths for `(mode, event)`, scanning only on a cache miss.
    fn collect(&self, mode: Mode, event: &str, root: &Path) -> Result<Vec<PathBuf>, ErrorKind> {
        let nomenclature = &self.options.nomenclature;
        let build = || -> Result<Vec<HandlerDescriptor>, ErrorKind> {
            let found = discover(
                root,
                &self.options.filter.extension,
                self.dispatcher.loader(),
                nomenclature,
            )?;
            Ok(found
                .iter()
                .filter_map(|(file, artifact)| extract(file, artifact, nomenclature, event, mode))
                .collect())
        };

        let handlers = match self.dispatcher.cache() {
            Some(cache) => cache
                .write()
                .get_or_build(mode, event, build)?
                .iter()
                .map(|handler| handler.path.clone())
                .collect(),
            None => build()?.into_iter().map(|handler| handler.path).collect(),
        };
        Ok(handlers)
    }

    fn ensure_once(&self) -> Result<(), ErrorKind> {
        if self.client.supports_once() {
            Ok(())
        } else {
            Err(ErrorKind::InvalidClientProvided { mode: Mode::Once })
        }
    }

    fn subscribe(&self, route: Arc<Route>) -> Option<E::Subscription> {
        let (mode, event) = (route.mode(), route.event().to_string());
        let subscription = self.dispatcher.subscribe(&*self.client, route);
        if subscription.is_none() {
            warn!(%mode, event, "Client refused the subscription");
        }
        subscription
    }
}

impl<E: Emitter> fmt::Debug for Application<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("options", &self.options)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Checks an event name.
fn validate_event(event: &str) -> Result<(), ErrorKind> {
    if event.is_empty() {
        return Err(ErrorKind::MissingEvent);
    }

    let invalid = |reason| ErrorKind::InvalidEventProvided {
        event: event.to_string(),
        reason,
    };
    if event.trim().is_empty() {
        return Err(invalid("event name is blank"));
    }
    if event.chars().any(char::is_control) {
        return Err(invalid("event name contains control characters"));
    }
    Ok(())
}
