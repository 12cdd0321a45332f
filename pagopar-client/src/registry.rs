//! Application registry and session lifecycle.
//!
//! An [`Application`] bundles a commerce's credentials with a lazily created
//! HTTP session. Applications live in a [`Registry`] keyed by name; at most
//! one application per name exists in a registry at any time.
//!
//! Registries are ordinary values, so tests and multi-tenant services can own
//! as many as they need. [`Registry::global`] is a process-wide instance for
//! callers that want the single default application.
//!
//! # Examples
//!
//! ```
//! use pagopar_client::{config::ApplicationConfig, registry::Registry};
//!
//! # fn example() -> pagopar_client::error::Result<()> {
//! let registry = Registry::new();
//! let app = registry.initialize(ApplicationConfig::new("shop").with_credentials("priv", "pub"))?;
//! assert_eq!(app.name(), "shop");
//!
//! registry.close("shop")?;
//! assert!(registry.get("shop").is_err());
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt,
    ops::Deref,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use reqwest::{
    Client, Proxy,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use tracing::{debug, info};
use url::Url;
use zeroize::Zeroizing;

use crate::{
    config::{ApplicationConfig, DEFAULT_APP_NAME, HttpConfig},
    error::{PagoparError, Result},
    signer,
};

static GLOBAL_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Named applications.
#[derive(Default)]
pub struct Registry {
    apps: RwLock<HashMap<String, Arc<Application>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let apps = self.apps.read();
        let mut names: Vec<&String> = apps.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("apps", &names).finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_REGISTRY
    }

    /// Registers a new application.
    ///
    /// Credentials missing from `config` are read from the environment when
    /// the name is [`DEFAULT_APP_NAME`].
    ///
    /// # Errors
    ///
    /// - [`PagoparError::Configuration`] if the config is invalid or a
    ///   credential is empty
    /// - [`PagoparError::AlreadyInitialized`] if the name is taken
    pub fn initialize(&self, config: ApplicationConfig) -> Result<Arc<Application>> {
        config.validate()?;
        let (private_token, public_token) = config.resolve_credentials()?;
        let api_base = config.http.api_base()?;

        let mut apps = self.apps.write();
        if apps.contains_key(&config.name) {
            return Err(PagoparError::AlreadyInitialized(config.name));
        }

        let app = Arc::new(Application {
            name: config.name.clone(),
            private_token,
            public_token,
            proxy: config.proxy,
            http: config.http,
            api_base,
            session: Mutex::new(SessionState::Pending),
            sessions_opened: AtomicUsize::new(0),
        });
        apps.insert(config.name, Arc::clone(&app));
        drop(apps);

        info!(app = %app.name, "application initialized");
        Ok(app)
    }

    /// Looks up an application by name.
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::NotFound`] if no such application exists.
    pub fn get(&self, name: &str) -> Result<Arc<Application>> {
        self.apps.read().get(name).cloned().ok_or_else(|| PagoparError::NotFound(name.to_owned()))
    }

    /// The application registered under [`DEFAULT_APP_NAME`].
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::NotFound`] if it was never initialized.
    pub fn default_app(&self) -> Result<Arc<Application>> {
        self.get(DEFAULT_APP_NAME)
    }

    /// Removes an application and retires it.
    ///
    /// The entry leaves the registry before the session is released, so no
    /// caller can look it up mid-teardown. Handles still held elsewhere stop
    /// working: every later call through them fails with
    /// [`PagoparError::ForeignInstance`].
    ///
    /// # Errors
    ///
    /// Returns [`PagoparError::NotFound`] if no such application exists.
    pub fn close(&self, name: &str) -> Result<()> {
        let app = self.apps.write().remove(name).ok_or_else(|| PagoparError::NotFound(name.to_owned()))?;
        app.retire();
        info!(app = %name, "application closed");
        Ok(())
    }

    /// Picks the application a call should use.
    ///
    /// An explicit handle must be the exact instance currently registered
    /// under its name. `None` selects the default application.
    ///
    /// # Errors
    ///
    /// - [`PagoparError::ForeignInstance`] for a stale or unregistered handle
    /// - [`PagoparError::NotFound`] if `None` and no default application exists
    pub fn resolve(&self, app: Option<&Arc<Application>>) -> Result<Arc<Application>> {
        let Some(app) = app else {
            return self.default_app();
        };
        match self.apps.read().get(&app.name) {
            Some(registered) if Arc::ptr_eq(registered, app) => Ok(Arc::clone(app)),
            _ => Err(PagoparError::ForeignInstance(app.name.clone())),
        }
    }

    /// Number of registered applications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

/// Observable state of an application's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session was created yet.
    NotCreated,
    /// A session is open and reused by every call.
    Open,
    /// The session was closed; the next access creates a new one.
    Closed,
    /// The application was removed from its registry; no session can be
    /// created any more.
    Retired,
}

enum SessionState {
    Pending,
    Open(Client),
    Closed,
    Retired,
}

/// A commerce's credentials plus its HTTP session.
pub struct Application {
    name: String,
    private_token: Zeroizing<String>,
    public_token: String,
    proxy: Option<String>,
    http: HttpConfig,
    api_base: Url,
    session: Mutex<SessionState>,
    sessions_opened: AtomicUsize,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("public_token", &self.public_token)
            .field("proxy", &self.proxy)
            .field("api_base", &self.api_base.as_str())
            .field("session", &self.session_status())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public key sent with every call.
    #[must_use]
    pub fn public_token(&self) -> &str {
        &self.public_token
    }

    /// API base that endpoint paths are joined to.
    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Signature token for `seed` under this application's private key.
    #[must_use]
    pub fn sign(&self, seed: &str) -> String {
        signer::sign(seed, &self.private_token)
    }

    /// Checks the token Pagopar attaches to a payment confirmation.
    ///
    /// The service signs the order hash with the commerce's private key, so a
    /// genuine notification satisfies `token == sign(order_hash)`.
    #[must_use]
    pub fn verify_payment_token(&self, order_hash: &str, token: &str) -> bool {
        signer::tokens_match(&self.sign(order_hash), token)
    }

    /// Returns the session, creating it if none is open.
    ///
    /// The check and the creation happen under one per-application lock, so
    /// concurrent first accesses create a single session.
    ///
    /// # Errors
    ///
    /// - [`PagoparError::ForeignInstance`] if the application was closed in
    ///   its registry
    /// - [`PagoparError::Configuration`] if the HTTP client cannot be built
    ///   (for example an unusable proxy)
    pub fn session(&self) -> Result<Client> {
        let mut state = self.session.lock();
        match &*state {
            SessionState::Open(client) => return Ok(client.clone()),
            SessionState::Retired => return Err(PagoparError::ForeignInstance(self.name.clone())),
            SessionState::Pending | SessionState::Closed => {}
        }

        let client = self.build_client()?;
        *state = SessionState::Open(client.clone());
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        debug!(app = %self.name, "session opened");
        Ok(client)
    }

    /// Opens the session eagerly. No-op if one is already open.
    ///
    /// # Errors
    ///
    /// Same as [`session`](Self::session).
    pub fn open(&self) -> Result<()> {
        self.session().map(|_| ())
    }

    /// Closes the session. Closing a closed or never-opened session is a no-op.
    pub fn close_session(&self) {
        let mut state = self.session.lock();
        if matches!(*state, SessionState::Open(_)) {
            *state = SessionState::Closed;
            debug!(app = %self.name, "session closed");
        }
    }

    /// Drops the session for good. Called once the registry entry is gone.
    fn retire(&self) {
        let previous = std::mem::replace(&mut *self.session.lock(), SessionState::Retired);
        if matches!(previous, SessionState::Open(_)) {
            debug!(app = %self.name, "session closed");
        }
    }

    /// Opens the session and returns a guard that closes it when dropped.
    ///
    /// # Errors
    ///
    /// Same as [`session`](Self::session).
    pub fn acquire(&self) -> Result<SessionGuard<'_>> {
        self.open()?;
        Ok(SessionGuard { app: self })
    }

    /// Current session state.
    #[must_use]
    pub fn session_status(&self) -> SessionStatus {
        match &*self.session.lock() {
            SessionState::Pending => SessionStatus::NotCreated,
            SessionState::Open(_) => SessionStatus::Open,
            SessionState::Closed => SessionStatus::Closed,
            SessionState::Retired => SessionStatus::Retired,
        }
    }

    /// Number of sessions created over this application's lifetime.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened.load(Ordering::Relaxed)
    }

    fn build_client(&self) -> Result<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(self.http.pool_max_idle_per_host)
            .timeout(self.http.timeout())
            .connect_timeout(self.http.connect_timeout());

        if let Some(proxy) = &self.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| PagoparError::Configuration(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(|e| PagoparError::Configuration(format!("cannot build HTTP client: {e}")))
    }
}

/// Scoped session: opened by [`Application::acquire`], closed on drop.
///
/// Dereferences to the [`Application`], so calls can be made through it.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    app: &'a Application,
}

impl Deref for SessionGuard<'_> {
    type Target = Application;

    fn deref(&self) -> &Application {
        self.app
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.app.close_session();
    }
}
