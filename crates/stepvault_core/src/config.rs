//! Open options.

use crate::error::CoreResult;
use crate::schema::Schema;
use crate::upgrade::Upgrade;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use stepvault_engine::VersionChange;

/// Runs once when a database is opened at a newer version.
pub type UpgradeCallback<S> =
    Box<dyn FnOnce(Upgrade<S>) -> BoxFuture<'static, CoreResult<()>> + Send>;

/// Runs when this open is held up by an older open connection.
pub type BlockedCallback =
    Box<dyn FnOnce(VersionChange) -> BoxFuture<'static, CoreResult<()>> + Send>;

/// Runs on an open connection when a newer version is requested elsewhere.
pub type BlockingCallback = Arc<dyn Fn(VersionChange) -> CoreResult<()> + Send + Sync>;

/// Options for [`crate::Database::open`].
///
/// # Example
///
/// ```rust,ignore
/// let options = OpenOptions::<App>::new()
///     .upgrade(|upgrade| async move {
///         upgrade.create_store::<Users>().await?;
///         Ok(())
///     })
///     .auto_close_on_blocking(true);
/// ```
pub struct OpenOptions<S: Schema> {
    pub(crate) upgrade: Option<UpgradeCallback<S>>,
    pub(crate) blocked: Option<BlockedCallback>,
    pub(crate) blocking: Option<BlockingCallback>,

    /// Whether this connection closes itself once a newer version is
    /// requested, after the blocking callback ran (even if it failed).
    pub auto_close_on_blocking: bool,
}

impl<S: Schema> Default for OpenOptions<S> {
    fn default() -> Self {
        Self {
            upgrade: None,
            blocked: None,
            blocking: None,
            auto_close_on_blocking: false,
        }
    }
}

impl<S: Schema> OpenOptions<S> {
    /// Creates options with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upgrade callback.
    #[must_use]
    pub fn upgrade<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce(Upgrade<S>) -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<()>> + Send + 'static,
    {
        self.upgrade = Some(Box::new(move |upgrade| callback(upgrade).boxed()));
        self
    }

    /// Sets the blocked callback. Without one, a blocked open fails with
    /// [`crate::CoreError::Blocked`].
    #[must_use]
    pub fn blocked<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce(VersionChange) -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<()>> + Send + 'static,
    {
        self.blocked = Some(Box::new(move |change| callback(change).boxed()));
        self
    }

    /// Sets the blocking callback. Its errors are logged, never returned.
    #[must_use]
    pub fn blocking<F>(mut self, callback: F) -> Self
    where
        F: Fn(VersionChange) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.blocking = Some(Arc::new(callback));
        self
    }

    /// Sets whether the connection closes itself when blocking a newer open.
    #[must_use]
    pub fn auto_close_on_blocking(mut self, value: bool) -> Self {
        self.auto_close_on_blocking = value;
        self
    }
}

impl<S: Schema> fmt::Debug for OpenOptions<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("upgrade", &self.upgrade.is_some())
            .field("blocked", &self.blocked.is_some())
            .field("blocking", &self.blocking.is_some())
            .field("auto_close_on_blocking", &self.auto_close_on_blocking)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Demo;
    impl Schema for Demo {
        const DATABASE_NAMES: &'static [&'static str] = &["demo"];
        const STORE_NAMES: &'static [&'static str] = &[];
    }

    #[test]
    fn default_options() {
        let options = OpenOptions::<Demo>::default();
        assert!(options.upgrade.is_none());
        assert!(options.blocked.is_none());
        assert!(options.blocking.is_none());
        assert!(!options.auto_close_on_blocking);
    }

    #[test]
    fn builder_pattern() {
        let options = OpenOptions::<Demo>::new()
            .blocking(|_| Ok(()))
            .blocked(|_| async { Ok::<_, crate::CoreError>(()) })
            .auto_close_on_blocking(true);

        assert!(options.blocking.is_some());
        assert!(options.blocked.is_some());
        assert!(options.auto_close_on_blocking);
    }
}
