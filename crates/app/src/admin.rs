use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use metrics::counter;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use kasir_core::resource::{page_for, resolve_tab, ResourcePage};
use kasir_core::types::{
    CashierReportInput, NoteCategoryInput, TransactionInput, ValidationErrors,
};
use kasir_core::widgets::HeaderWidget;
use kasir_core::{HeaderAction, PageKind, Resource, TransactionFilter};
use kasir_storage::{
    CashierReportError, NoteCategoryError, PageRequest, Paginated, TransactionError,
};

use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::shell::PageObject;
use crate::url::UrlGenerator;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    tab: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
    #[serde(default)]
    notice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    #[serde(default)]
    notice: Option<String>,
}

/// `GET /admin/:resource`
pub async fn index(
    State(state): State<AppState>,
    Extension(urls): Extension<UrlGenerator>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AdminError> {
    let Path(slug) = path?;
    let Query(query) = query?;
    let resource = parse_resource(&slug)?;
    let page = page_for(resource, PageKind::List);
    record_view(resource, PageKind::List);

    let request = PageRequest::new(query.page, query.per_page);
    let tabs = page.tabs();
    let active_tab = resolve_tab(&tabs, query.tab.as_deref());
    let filter = active_tab
        .map(|tab| tab.filter)
        .unwrap_or_else(TransactionFilter::all);

    let records = load_records(&state, &urls, resource, filter, request).await?;

    let index_url = urls.resource_index(resource);
    let tab_url = |key: Option<&str>| match key {
        Some(key) => format!("{index_url}?tab={key}"),
        None => index_url.clone(),
    };
    let tabs_json: Vec<Value> = tabs
        .iter()
        .map(|tab| {
            json!({
                "key": tab.key,
                "label": tab.label,
                "url": tab_url(tab.key),
                "active": active_tab.map(|active| active.key) == Some(tab.key),
            })
        })
        .collect();

    let mut widgets = Vec::new();
    for widget in page.header_widgets() {
        widgets.push(load_widget(&state, widget).await?);
    }

    let title = page.title();
    let props = json!({
        "title": title,
        "resource": resource,
        "header_actions": header_actions(page, &urls, None),
        "tabs": tabs_json,
        "active_tab": active_tab.and_then(|tab| tab.key),
        "widgets": widgets,
        "columns": resource.table_columns(),
        "records": records,
        "flash": flash(query.notice.as_deref()),
    });

    let current_url = urls.to(uri.path_and_query().map_or(uri.path(), |target| target.as_str()));
    Ok(state
        .shell()
        .respond(&headers, &title, PageObject::new(page.component(), props, current_url)))
}

/// `GET /admin/:resource/create`
pub async fn create(
    State(state): State<AppState>,
    Extension(urls): Extension<UrlGenerator>,
    path: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, AdminError> {
    let Path(slug) = path?;
    let resource = parse_resource(&slug)?;
    let page = page_for(resource, PageKind::Create);
    record_view(resource, PageKind::Create);

    let title = page.title();
    let props = json!({
        "title": title,
        "resource": resource,
        "header_actions": header_actions(page, &urls, None),
        "fields": resource.form_schema(),
        "options": relation_options(&state, resource).await?,
        "record": Value::Null,
        "submit": { "url": urls.resource_index(resource), "method": "post" },
    });

    Ok(state.shell().respond(
        &headers,
        &title,
        PageObject::new(page.component(), props, urls.resource_create(resource)),
    ))
}

/// `POST /admin/:resource`
pub async fn store(
    State(state): State<AppState>,
    Extension(urls): Extension<UrlGenerator>,
    path: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> Result<Response, AdminError> {
    let Path(slug) = path?;
    let resource = parse_resource(&slug)?;
    let outcome = create_record(&state, resource, &body).await;
    record_mutation(resource, "create", &outcome);
    let id = outcome?;

    info!(stage = "admin", resource = %resource, id, "record created");
    let location = format!("{}?notice=created", urls.resource_edit(resource, id));
    Ok(Redirect::to(&location).into_response())
}

/// `GET /admin/:resource/:id/edit`
pub async fn edit(
    State(state): State<AppState>,
    Extension(urls): Extension<UrlGenerator>,
    path: Result<Path<(String, i64)>, PathRejection>,
    query: Result<Query<NoticeQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, AdminError> {
    let Path((slug, id)) = path?;
    let Query(query) = query?;
    let resource = parse_resource(&slug)?;
    let page = page_for(resource, PageKind::Edit);
    record_view(resource, PageKind::Edit);

    let record = match resource {
        Resource::KategoriCatatan => to_json(&state.storage().note_categories().find(id).await?)?,
        Resource::LaporanKasir => {
            let (report, category_name) = state.storage().cashier_reports().find(id).await?;
            let mut value = to_json(&report)?;
            insert_field(&mut value, "category_name", Value::String(category_name));
            value
        }
        Resource::Transaksi => to_json(&state.storage().transactions().find(id).await?)?,
    };

    let title = page.title();
    let props = json!({
        "title": title,
        "resource": resource,
        "header_actions": header_actions(page, &urls, Some(id)),
        "fields": resource.form_schema(),
        "options": relation_options(&state, resource).await?,
        "record": record,
        "submit": { "url": urls.resource_record(resource, id), "method": "put" },
        "flash": flash(query.notice.as_deref()),
    });

    Ok(state.shell().respond(
        &headers,
        &title,
        PageObject::new(page.component(), props, urls.resource_edit(resource, id)),
    ))
}

/// `PUT /admin/:resource/:id`
pub async fn update(
    State(state): State<AppState>,
    Extension(urls): Extension<UrlGenerator>,
    path: Result<Path<(String, i64)>, PathRejection>,
    body: Bytes,
) -> Result<Response, AdminError> {
    let Path((slug, id)) = path?;
    let resource = parse_resource(&slug)?;
    let outcome = update_record(&state, resource, id, &body).await;
    record_mutation(resource, "update", &outcome);
    outcome?;

    info!(stage = "admin", resource = %resource, id, "record updated");
    let location = format!("{}?notice=updated", urls.resource_edit(resource, id));
    Ok(Redirect::to(&location).into_response())
}

/// `DELETE /admin/:resource/:id`
pub async fn destroy(
    State(state): State<AppState>,
    Extension(urls): Extension<UrlGenerator>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<Response, AdminError> {
    let Path((slug, id)) = path?;
    let resource = parse_resource(&slug)?;
    let storage = state.storage();
    let outcome: Result<(), AdminError> = match resource {
        Resource::KategoriCatatan => storage.note_categories().delete(id).await.map_err(Into::into),
        Resource::LaporanKasir => storage.cashier_reports().delete(id).await.map_err(Into::into),
        Resource::Transaksi => storage.transactions().delete(id).await.map_err(Into::into),
    };
    record_mutation(resource, "delete", &outcome);
    outcome?;

    info!(stage = "admin", resource = %resource, id, "record deleted");
    let location = format!("{}?notice=deleted", urls.resource_index(resource));
    Ok(Redirect::to(&location).into_response())
}

fn parse_resource(slug: &str) -> Result<Resource, AdminError> {
    Resource::from_slug(slug).ok_or_else(|| AdminError::UnknownResource(slug.to_string()))
}

async fn load_records(
    state: &AppState,
    urls: &UrlGenerator,
    resource: Resource,
    filter: TransactionFilter,
    request: PageRequest,
) -> Result<Value, AdminError> {
    let storage = state.storage();
    let page = match resource {
        Resource::KategoriCatatan => storage
            .note_categories()
            .list(request)
            .await?
            .map(|category| row_json(&category, urls.resource_edit(resource, category.id))),
        Resource::LaporanKasir => {
            storage
                .cashier_reports()
                .list(request)
                .await?
                .map(|(report, category_name)| -> Result<Value, AdminError> {
                    let mut row = row_json(&report, urls.resource_edit(resource, report.id))?;
                    insert_field(&mut row, "category_name", Value::String(category_name));
                    Ok(row)
                })
        }
        Resource::Transaksi => storage
            .transactions()
            .list(filter, request)
            .await?
            .map(|transaction| {
                row_json(&transaction, urls.resource_edit(resource, transaction.id))
            }),
    };
    paginated_json(page)
}

async fn load_widget(state: &AppState, widget: HeaderWidget) -> Result<Value, AdminError> {
    match widget {
        HeaderWidget::TransactionStats => {
            let stats = state.storage().transactions().stats().await?;
            Ok(json!({ "id": widget.id(), "data": stats }))
        }
    }
}

async fn relation_options(state: &AppState, resource: Resource) -> Result<Value, AdminError> {
    match resource {
        Resource::LaporanKasir => {
            let options = state
                .storage()
                .note_categories()
                .options()
                .await?
                .into_iter()
                .map(|(id, name)| json!({ "value": id, "label": name }))
                .collect::<Vec<_>>();
            Ok(json!({ "note_category_id": options }))
        }
        Resource::KategoriCatatan | Resource::Transaksi => Ok(Value::Object(Map::new())),
    }
}

async fn create_record(state: &AppState, resource: Resource, body: &[u8]) -> Result<i64, AdminError> {
    let storage = state.storage();
    let now = state.now();
    let id = match resource {
        Resource::KategoriCatatan => {
            let input = parse_input::<NoteCategoryInput>(body)?.validate()?;
            storage.note_categories().create(&input, now).await?.id
        }
        Resource::LaporanKasir => {
            let input = parse_input::<CashierReportInput>(body)?.validate()?;
            storage.cashier_reports().create(&input, now).await?.id
        }
        Resource::Transaksi => {
            let input = parse_input::<TransactionInput>(body)?.validate()?;
            storage.transactions().create(&input, now).await?.id
        }
    };
    Ok(id)
}

async fn update_record(
    state: &AppState,
    resource: Resource,
    id: i64,
    body: &[u8],
) -> Result<(), AdminError> {
    let storage = state.storage();
    let now = state.now();
    match resource {
        Resource::KategoriCatatan => {
            let input = parse_input::<NoteCategoryInput>(body)?.validate()?;
            storage.note_categories().update(id, &input, now).await?;
        }
        Resource::LaporanKasir => {
            let input = parse_input::<CashierReportInput>(body)?.validate()?;
            storage.cashier_reports().update(id, &input, now).await?;
        }
        Resource::Transaksi => {
            let input = parse_input::<TransactionInput>(body)?.validate()?;
            storage.transactions().update(id, &input, now).await?;
        }
    }
    Ok(())
}

fn parse_input<T: DeserializeOwned>(body: &[u8]) -> Result<T, AdminError> {
    serde_json::from_slice(body).map_err(|err| AdminError::InvalidPayload(err.to_string()))
}

fn header_actions(page: &dyn ResourcePage, urls: &UrlGenerator, record_id: Option<i64>) -> Vec<Value> {
    let resource = page.resource();
    page.header_actions()
        .into_iter()
        .filter_map(|action| {
            let (url, method) = match (action, record_id) {
                (HeaderAction::Create, _) => (urls.resource_create(resource), "get"),
                (HeaderAction::Delete, Some(id)) => (urls.resource_record(resource, id), "delete"),
                (HeaderAction::Delete, None) => return None,
            };
            Some(json!({
                "name": action,
                "label": action.label(),
                "url": url,
                "method": method,
                "confirm": action.requires_confirmation(),
            }))
        })
        .collect()
}

fn flash(notice: Option<&str>) -> Value {
    let message = match notice {
        Some("created") => "Data berhasil dibuat",
        Some("updated") => "Perubahan berhasil disimpan",
        Some("deleted") => "Data berhasil dihapus",
        _ => return Value::Null,
    };
    json!({ "type": "success", "message": message })
}

fn row_json<T: Serialize>(record: &T, edit_url: String) -> Result<Value, AdminError> {
    let mut value = to_json(record)?;
    insert_field(&mut value, "edit_url", Value::String(edit_url));
    Ok(value)
}

fn to_json<T: Serialize>(record: &T) -> Result<Value, AdminError> {
    serde_json::to_value(record).map_err(|err| AdminError::Internal(err.to_string()))
}

fn insert_field(value: &mut Value, key: &str, field: Value) {
    if let Value::Object(map) = value {
        map.insert(key.to_string(), field);
    }
}

fn paginated_json(page: Paginated<Result<Value, AdminError>>) -> Result<Value, AdminError> {
    let last_page = page.last_page();
    let data = page.items.into_iter().collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "data": data,
        "total": page.total,
        "page": page.page,
        "per_page": page.per_page,
        "last_page": last_page,
    }))
}

fn record_view(resource: Resource, kind: PageKind) {
    counter!("admin_requests_total", "resource" => resource.slug(), "page" => kind.as_str())
        .increment(1);
}

fn record_mutation<T>(resource: Resource, action: &'static str, outcome: &Result<T, AdminError>) {
    let result = match outcome {
        Ok(_) => "ok",
        Err(err) if err.is_client_error() => "rejected",
        Err(_) => "error",
    };
    counter!(
        "admin_mutations_total",
        "resource" => resource.slug(),
        "action" => action,
        "result" => result
    )
    .increment(1);
}

/// Failures surfaced by the admin screens.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl AdminError {
    fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl From<PathRejection> for AdminError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AdminError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<NoteCategoryError> for AdminError {
    fn from(err: NoteCategoryError) -> Self {
        match err {
            NoteCategoryError::NotFound => Self::NotFound("kategori catatan"),
            NoteCategoryError::DuplicateName | NoteCategoryError::InUse => {
                Self::Conflict(err.to_string())
            }
            NoteCategoryError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<CashierReportError> for AdminError {
    fn from(err: CashierReportError) -> Self {
        match err {
            CashierReportError::NotFound => Self::NotFound("laporan kasir"),
            CashierReportError::MissingCategory => Self::Validation(ValidationErrors::single(
                "note_category_id",
                "kategori catatan tidak ditemukan",
            )),
            CashierReportError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<TransactionError> for AdminError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::NotFound => Self::NotFound("transaksi"),
            TransactionError::DuplicateCode => Self::Conflict(err.to_string()),
            TransactionError::InvalidStatus(_) | TransactionError::Database(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        let problem = match self {
            Self::UnknownResource(_) => {
                ProblemResponse::new(StatusCode::NOT_FOUND, "unknown_resource", detail)
            }
            Self::NotFound(_) => ProblemResponse::new(StatusCode::NOT_FOUND, "not_found", detail),
            Self::Conflict(_) => ProblemResponse::new(StatusCode::CONFLICT, "conflict", detail),
            Self::Validation(errors) => ProblemResponse::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_failed",
                detail,
            )
            .with_field_errors(errors.fields),
            Self::BadRequest(_) => {
                ProblemResponse::new(StatusCode::BAD_REQUEST, "invalid_request", detail)
            }
            Self::InvalidPayload(_) => {
                warn!(stage = "admin", %detail, "rejected malformed payload");
                ProblemResponse::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_payload", detail)
            }
            Self::Internal(_) => {
                error!(stage = "admin", error = %detail, "admin request failed");
                ProblemResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "unexpected error while handling the request",
                )
            }
        };
        problem.into_response()
    }
}
