use std::collections::BTreeMap;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use kasir_core::{resource::page_for, PageKind, Resource};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const HEADER_INERTIA: &str = "x-inertia";
pub const HEADER_INERTIA_VERSION: &str = "x-inertia-version";
pub const HEADER_INERTIA_LOCATION: &str = "x-inertia-location";

const ASSET_VERSION: &str = env!("CARGO_PKG_VERSION");
const CLIENT_ENTRY: &str = "/build/app.js";

/// Applies the stored light/dark preference before the first paint.
const THEME_SCRIPT: &str = r#"(function () {
  var stored = localStorage.getItem('theme');
  var prefersDark = window.matchMedia('(prefers-color-scheme: dark)').matches;
  if (stored === 'dark' || (stored === null && prefersDark)) {
    document.documentElement.classList.add('dark');
  } else {
    document.documentElement.classList.remove('dark');
  }
})();"#;

/// Everything the client needs to mount a screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageObject {
    pub component: String,
    pub props: Value,
    pub url: String,
    pub version: &'static str,
}

impl PageObject {
    pub fn new(component: impl Into<String>, props: Value, url: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props,
            url: url.into(),
            version: ASSET_VERSION,
        }
    }
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("no client page registered under {0}")]
    UnknownPage(String),
    #[error("failed to encode page object: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Maps logical page names to client modules under `pages/`.
#[derive(Debug, Clone, Default)]
pub struct PageRegistry {
    pages: BTreeMap<String, String>,
}

impl PageRegistry {
    /// Registry holding the list/create/edit screen of every resource.
    pub fn with_resource_pages() -> Self {
        let mut registry = Self::default();
        for resource in Resource::ALL {
            for kind in [PageKind::List, PageKind::Create, PageKind::Edit] {
                registry.register(&page_for(resource, kind).component());
            }
        }
        registry
    }

    pub fn register(&mut self, name: &str) {
        self.pages
            .insert(name.to_string(), format!("./pages/{name}.tsx"));
    }

    pub fn resolve(&self, name: &str) -> Result<&str, ShellError> {
        self.pages
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ShellError::UnknownPage(name.to_string()))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pages.len()
    }
}

/// Wraps the mount element in the document body.
pub trait Layout: Send + Sync {
    fn wrap(&self, children: Markup) -> Markup;
}

/// Renders its children unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughLayout;

impl Layout for PassthroughLayout {
    fn wrap(&self, children: Markup) -> Markup {
        children
    }
}

/// Static pieces of the client shell shared by every response.
pub struct Shell {
    app_name: String,
    registry: PageRegistry,
    layout: Box<dyn Layout>,
}

impl Shell {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            registry: PageRegistry::with_resource_pages(),
            layout: Box::new(PassthroughLayout),
        }
    }

    pub fn document_title(&self, page_title: &str) -> String {
        if page_title.is_empty() {
            self.app_name.clone()
        } else {
            format!("{page_title} - {}", self.app_name)
        }
    }

    /// Full HTML document for a first visit.
    pub fn render_document(&self, title: &str, page: &PageObject) -> Result<String, ShellError> {
        let module = self.registry.resolve(&page.component)?;
        let encoded = serde_json::to_string(page)?;
        let mount = html! { div #app data-page=(encoded) {} };

        let document = html! {
            (DOCTYPE)
            html lang="id" {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    title { (self.document_title(title)) }
                    script { (PreEscaped(THEME_SCRIPT)) }
                    link rel="modulepreload" href=(module);
                    script type="module" src=(CLIENT_ENTRY) {}
                }
                body class="font-sans antialiased" {
                    (self.layout.wrap(mount))
                    div #toaster role="status" aria-live="polite" data-dismissible="true" {}
                }
            }
        };
        Ok(document.into_string())
    }

    /// Responds with JSON for client-side visits and the shell document otherwise.
    pub fn respond(&self, headers: &HeaderMap, title: &str, page: PageObject) -> Response {
        if is_inertia(headers) {
            if let Some(stale) = stale_version(headers) {
                tracing::debug!(stage = "shell", client_version = %stale, "asset version changed");
                let mut response = StatusCode::CONFLICT.into_response();
                if let Ok(location) = HeaderValue::from_str(&page.url) {
                    response
                        .headers_mut()
                        .insert(HEADER_INERTIA_LOCATION, location);
                }
                return response;
            }

            if let Err(err) = self.registry.resolve(&page.component) {
                return shell_failure(err);
            }
            let mut response = Json(page).into_response();
            let headers = response.headers_mut();
            headers.insert(HEADER_INERTIA, HeaderValue::from_static("true"));
            headers.insert(header::VARY, HeaderValue::from_static("X-Inertia"));
            return response;
        }

        match self.render_document(title, &page) {
            Ok(body) => {
                let mut response = Html(body).into_response();
                response
                    .headers_mut()
                    .insert(header::VARY, HeaderValue::from_static("X-Inertia"));
                response
            }
            Err(err) => shell_failure(err),
        }
    }
}

fn shell_failure(err: ShellError) -> Response {
    tracing::error!(stage = "shell", error = %err, "failed to render page");
    crate::problem::ProblemResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "render_failed",
        err.to_string(),
    )
    .into_response()
}

pub fn is_inertia(headers: &HeaderMap) -> bool {
    headers
        .get(HEADER_INERTIA)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn stale_version(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HEADER_INERTIA_VERSION)
        .and_then(|value| value.to_str().ok())
        .filter(|version| *version != ASSET_VERSION)
}
