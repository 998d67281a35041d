use std::fmt;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use kasir_core::Resource;

use crate::router::AppState;

const HEADER_HTTPS: &str = "https";
const HEADER_FORWARDED_PROTO: &str = "x-forwarded-proto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds absolute URLs for the request being handled.
///
/// One generator is attached to every request by [`url_scheme`], so the
/// scheme decision never outlives the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlGenerator {
    scheme: Scheme,
    host: String,
}

impl UrlGenerator {
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Absolute URL for an application path such as `/admin/transaksi`.
    pub fn to(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}://{}/{}", self.scheme, self.host, path)
    }

    pub fn resource_index(&self, resource: Resource) -> String {
        self.to(&format!("/admin/{}", resource.slug()))
    }

    pub fn resource_create(&self, resource: Resource) -> String {
        self.to(&format!("/admin/{}/create", resource.slug()))
    }

    pub fn resource_record(&self, resource: Resource, id: i64) -> String {
        self.to(&format!("/admin/{}/{id}", resource.slug()))
    }

    pub fn resource_edit(&self, resource: Resource, id: i64) -> String {
        self.to(&format!("/admin/{}/{id}/edit", resource.slug()))
    }
}

/// Returns `true` when the proxy in front of the app flagged the connection as secure.
pub fn is_secure_request(headers: &HeaderMap) -> bool {
    let https_on = headers
        .get(HEADER_HTTPS)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().eq_ignore_ascii_case("on"))
        .unwrap_or(false);

    let forwarded_https = headers
        .get(HEADER_FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    https_on || forwarded_https
}

/// Hosts that may appear in generated URLs.
///
/// A `Host` header whose hostname is not listed is replaced by `fallback`, so
/// a forged header never ends up in a redirect `Location`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPolicy {
    trusted: Vec<String>,
    fallback: String,
}

impl HostPolicy {
    pub fn new(trusted: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            trusted,
            fallback: fallback.into(),
        }
    }

    pub fn resolve<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .filter(|host| self.is_trusted(host))
            .unwrap_or(self.fallback.as_str())
    }

    fn is_trusted(&self, host: &str) -> bool {
        let Some(name) = hostname(host) else {
            return false;
        };
        self.trusted
            .iter()
            .any(|trusted| trusted.eq_ignore_ascii_case(name))
    }
}

/// Hostname part of a `Host` value, without the port. `None` when the value
/// is malformed.
fn hostname(host: &str) -> Option<&str> {
    let (name, port) = if let Some(rest) = host.strip_prefix('[') {
        let end = rest.find(']')?;
        (&host[..end + 2], &rest[end + 1..])
    } else {
        match host.split_once(':') {
            Some((name, port)) => (name, &host[name.len()..]),
            None => (host, ""),
        }
    };

    let port_ok = port.is_empty()
        || port
            .strip_prefix(':')
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
    (!name.is_empty() && port_ok).then_some(name)
}

pub fn generator_for(headers: &HeaderMap, force_https: bool, hosts: &HostPolicy) -> UrlGenerator {
    let scheme = if force_https || is_secure_request(headers) {
        Scheme::Https
    } else {
        Scheme::Http
    };
    let requested = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());
    UrlGenerator::new(scheme, hosts.resolve(requested))
}

/// Attaches the request's [`UrlGenerator`] as an extension.
pub async fn url_scheme(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let generator = generator_for(request.headers(), state.force_https(), state.hosts());
    if generator.scheme() == Scheme::Https {
        tracing::trace!(stage = "http", uri = %request.uri(), "forcing https urls");
    }
    request.extensions_mut().insert(generator);
    next.run(request).await
}
