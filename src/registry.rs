//! Handler registry and URL dispatch.
//!
//! Handlers are registered as factory functions in two ordered groups:
//! album handlers first, then media handlers. Resolution walks both groups in
//! order and the first factory that accepts the URL wins.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use url::Url;

use crate::download::Transport;
use crate::handlers::{DirectMediaHandler, PageImageHandler};
use crate::ripper::{AlbumHandler, RipConfig, RipError, Ripper};

/// Builds a handler for `url`, or returns `None` if it cannot process it.
///
/// Must have no side effects when it returns `None`.
pub type HandlerFactory = fn(&Url) -> Option<Box<dyn AlbumHandler>>;

/// Priority group of a handler. Album handlers are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerGroup {
    /// Site or page handlers that discover many files.
    Album,
    /// Handlers for single media files or video hosts.
    Media,
}

/// Ordered collection of handler factories.
#[derive(Default)]
pub struct HandlerRegistry {
    album: Vec<(&'static str, HandlerFactory)>,
    media: Vec<(&'static str, HandlerFactory)>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a factory to the end of `group`.
    pub fn register(&mut self, group: HandlerGroup, name: &'static str, factory: HandlerFactory) {
        debug!(name, ?group, "registering handler");
        match group {
            HandlerGroup::Album => self.album.push((name, factory)),
            HandlerGroup::Media => self.media.push((name, factory)),
        }
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.album.len() + self.media.len()
    }

    /// True when no factory is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handler names in probe order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.candidates().map(|(name, _)| *name)
    }

    fn candidates(&self) -> impl Iterator<Item = &(&'static str, HandlerFactory)> {
        self.album.iter().chain(self.media.iter())
    }

    /// Returns the first handler that accepts `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RipError::NoCompatibleHandler`] if none does.
    pub fn resolve_handler(&self, url: &Url) -> Result<Box<dyn AlbumHandler>, RipError> {
        self.candidates()
            .find_map(|(name, factory)| {
                let handler = factory(url)?;
                debug!(name, %url, "handler accepted URL");
                Some(handler)
            })
            .ok_or_else(|| RipError::NoCompatibleHandler {
                url: url.to_string(),
            })
    }

    /// Builds a [`Ripper`] from the first handler that accepts `url`.
    ///
    /// A candidate whose factory accepts the URL but whose ripper cannot be
    /// built (for example, no album id) is skipped.
    ///
    /// # Errors
    ///
    /// - [`RipError::NoCompatibleHandler`] if no candidate succeeds
    /// - [`RipError::Pool`] if `config.concurrency` is invalid
    #[instrument(skip(self, config, transport), fields(url = %url))]
    pub fn ripper_for(
        &self,
        url: &Url,
        config: &RipConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Ripper, RipError> {
        for (name, factory) in self.candidates() {
            let Some(handler) = factory(url) else {
                continue;
            };
            match Ripper::new(handler, url.clone(), config, Arc::clone(&transport)) {
                Ok(ripper) => {
                    info!(handler = name, dir = %ripper.working_dir().display(), "using handler");
                    return Ok(ripper);
                }
                Err(e @ RipError::Pool(_)) => return Err(e),
                Err(e) => debug!(handler = name, error = %e, "handler rejected URL"),
            }
        }
        Err(RipError::NoCompatibleHandler {
            url: url.to_string(),
        })
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |group: &[(&'static str, HandlerFactory)]| -> Vec<&'static str> {
            group.iter().map(|(name, _)| *name).collect()
        };
        f.debug_struct("HandlerRegistry")
            .field("album", &names(&self.album))
            .field("media", &names(&self.media))
            .finish()
    }
}

/// Registry with the built-in handlers.
#[must_use]
pub fn build_default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(HandlerGroup::Album, "page", PageImageHandler::probe);
    registry.register(HandlerGroup::Media, "direct", DirectMediaHandler::probe);
    registry
}
