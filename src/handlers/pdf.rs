use crate::{errors::ServiceError, services::documents::Disposition, AppState};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PdfQuery {
    #[serde(default)]
    pub disposition: Disposition,
}

/// Purchase order as a PDF download or inline view
async fn order_pdf(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<PdfQuery>,
) -> Result<Response, ServiceError> {
    let pdf = state.services.documents.order_pdf(id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                query.disposition.header_value(&pdf.filename),
            ),
            (header::CONTENT_LENGTH, pdf.bytes.len().to_string()),
        ],
        pdf.bytes,
    )
        .into_response())
}

/// The HTML document the PDF is printed from
async fn order_preview(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Html<String>, ServiceError> {
    Ok(Html(state.services.documents.order_html(id).await?))
}

pub fn pdf_routes() -> Router<AppState> {
    Router::new()
        .route("/order/:id", get(order_pdf))
        .route("/order/:id/preview", get(order_preview))
}
