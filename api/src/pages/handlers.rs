//! Business handlers for the three page actions

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Form,
    extract::{FromRequest, Request},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, KeyValue};
use serde::Deserialize;
use tracing::error;

use super::render::{render_edit, render_view};
use crate::dispatch::PageHandler;
use crate::error::AppError;
use crate::routing::Action;
use crate::storage::{Page, PageStore, StorageError};

/// `302 Found`, the status browsers follow with a GET after a form post
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn storage_failure(cx: &Context, err: StorageError) -> Response {
    cx.span().record_error(&err);
    error!(error = %err, "Page storage failed");
    AppError::Storage(err).into_response()
}

/// Render a page, or send the caller to the editor if it does not exist yet
pub struct ViewHandler {
    store: Arc<dyn PageStore>,
}

impl ViewHandler {
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PageHandler for ViewHandler {
    async fn handle(&self, cx: &Context, _request: Request, title: &str) -> Response {
        match self.store.load(title).await {
            Ok(Some(page)) => render_view(&page).into_response(),
            Ok(None) => {
                cx.span()
                    .add_event("page missing", vec![KeyValue::new("wiki.page.title", title.to_string())]);
                found(Action::Edit.path_for(title))
            }
            Err(e) => storage_failure(cx, e),
        }
    }
}

/// Edit form for a page, blank when the page does not exist
pub struct EditHandler {
    store: Arc<dyn PageStore>,
}

impl EditHandler {
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PageHandler for EditHandler {
    async fn handle(&self, cx: &Context, _request: Request, title: &str) -> Response {
        match self.store.load(title).await {
            Ok(page) => render_edit(&page.unwrap_or_else(|| Page::empty(title))).into_response(),
            Err(e) => storage_failure(cx, e),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveForm {
    #[serde(default)]
    pub body: String,
}

/// Overwrite a page with the submitted form body
pub struct SaveHandler {
    store: Arc<dyn PageStore>,
}

impl SaveHandler {
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PageHandler for SaveHandler {
    async fn handle(&self, cx: &Context, request: Request, title: &str) -> Response {
        let Form(form) = match Form::<SaveForm>::from_request(request, &()).await {
            Ok(form) => form,
            Err(rejection) => return rejection.into_response(),
        };

        let page = Page::new(title, form.body);
        cx.span().set_attribute(KeyValue::new(
            "wiki.page.size",
            i64::try_from(page.body.len()).unwrap_or(i64::MAX),
        ));

        match self.store.save(&page).await {
            Ok(()) => found(Action::View.path_for(title)),
            Err(e) => storage_failure(cx, e),
        }
    }
}
