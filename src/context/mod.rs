//! Per-request context — the request plus the classification signals that
//! upstream middleware attach to it.
//!
//! A [`Context`] is built once at the entry point of request handling and
//! handed down the middleware chain by value. Its [`RequestFlags`] are never
//! mutated in place: middleware that wants to change a signal builds a new
//! context with [`Context::map_flags`] and passes that one on.

use crate::Request;

/// Request-scoped signals consumed by the caching layer.
///
/// These are produced by routing, authentication, and network detection
/// upstream of the cache and are read-only to it.
///
/// # Examples
///
/// ```
/// use render_cache::context::RequestFlags;
///
/// let flags = RequestFlags {
///     alternate_rendering: true,
///     ..RequestFlags::default()
/// };
/// assert!(!flags.logged_in);
/// assert_eq!(flags.expiration, 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RequestFlags {
    /// The request asks for the alternate (e.g. ActivityStreams) rendering.
    pub alternate_rendering: bool,
    /// The request arrived over an anonymizing network.
    pub anonymized_network: bool,
    /// The actor is authenticated.
    pub logged_in: bool,
    /// Take the caching path even for an authenticated actor, rendering anonymously.
    pub force_cache: bool,
    /// Per-route expiration override in seconds; `0` means the global default.
    pub expiration: u32,
}

/// Per-request context handed through the middleware chain.
#[derive(Debug, Clone)]
pub struct Context {
    request: Request,
    flags: RequestFlags,
}

impl Context {
    /// Create a context with default (all-off) flags.
    pub fn new(request: Request) -> Self {
        Self::with_flags(request, RequestFlags::default())
    }

    /// Create a context carrying the given flags.
    pub fn with_flags(request: Request, flags: RequestFlags) -> Self {
        Self { request, flags }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn flags(&self) -> &RequestFlags {
        &self.flags
    }

    /// Consume this context and return one whose flags were adjusted by `f`.
    ///
    /// # Examples
    ///
    /// ```
    /// use render_cache::{Method, Request, context::Context};
    ///
    /// let ctx = Context::new(Request::new(Method::Get, "/"))
    ///     .map_flags(|flags| flags.logged_in = true);
    /// assert!(ctx.flags().logged_in);
    /// ```
    #[must_use]
    pub fn map_flags(self, f: impl FnOnce(&mut RequestFlags)) -> Self {
        let mut flags = self.flags;
        f(&mut flags);
        Self {
            request: self.request,
            flags,
        }
    }

    /// Build a sibling context for `request` that keeps this context's flags.
    pub fn with_request(&self, request: Request) -> Self {
        Self::with_flags(request, self.flags)
    }

    pub fn into_request(self) -> Request {
        self.request
    }
}
