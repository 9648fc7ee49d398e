//! Registration code endpoint handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::pagination::PageInfo;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OptionalAdminAuth;
use crate::middleware::metrics::{
    record_code_redeemed, record_codes_generated, record_codes_skipped,
};
use domain::models::{
    BulkDeleteCodesRequest, Code, CodeStats, ExportQuery, GenerateCodesRequest, InvalidReason,
    ListCodesQuery, RedeemCodeRequest, ValidateCodeRequest,
};

/// Response for code validation.
#[derive(Debug, Serialize)]
pub struct ValidateCodeResponse {
    pub valid: bool,
    pub message: String,
    /// Only reported to admin callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
}

/// Response for batch generation.
#[derive(Debug, Serialize)]
pub struct GenerateCodesResponse {
    pub requested: u32,
    pub created: usize,
    pub codes: Vec<Code>,
}

/// Response for code listing.
#[derive(Debug, Serialize)]
pub struct ListCodesResponse {
    pub data: Vec<Code>,
    pub pagination: PageInfo,
}

/// Response for a redemption attempt.
#[derive(Debug, Serialize)]
pub struct RedeemCodeResponse {
    pub redeemed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Code>,
}

/// Response for bulk deletion.
#[derive(Debug, Serialize)]
pub struct BulkDeleteCodesResponse {
    pub requested: usize,
    pub deleted: u64,
}

/// Validate a registration code.
///
/// POST /api/v1/codes/validate
///
/// Anyone may call this. Failures carry the generic invalid message unless
/// the caller presents the admin key.
pub async fn validate_code(
    State(state): State<AppState>,
    admin: OptionalAdminAuth,
    payload: Result<Json<ValidateCodeRequest>, JsonRejection>,
) -> Result<Json<ValidateCodeResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let validation = state.service.validate_code(&request.code).await?;

    let response = if admin.is_admin() {
        ValidateCodeResponse {
            valid: validation.valid,
            message: validation.message,
            reason: validation.reason,
        }
    } else {
        let redacted = validation.redacted(state.service.messages());
        ValidateCodeResponse {
            valid: redacted.valid,
            message: redacted.message,
            reason: None,
        }
    };

    Ok(Json(response))
}

/// Generate a batch of codes.
///
/// POST /api/v1/admin/codes
pub async fn generate_codes(
    State(state): State<AppState>,
    payload: Result<Json<GenerateCodesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GenerateCodesResponse>), ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let codes = state.service.generate_codes(&request).await?;

    record_codes_generated(codes.len());
    record_codes_skipped((request.count as usize).saturating_sub(codes.len()));

    Ok((
        StatusCode::CREATED,
        Json(GenerateCodesResponse {
            requested: request.count,
            created: codes.len(),
            codes,
        }),
    ))
}

/// List codes with filters and pagination.
///
/// GET /api/v1/admin/codes?group_name=&course_id=&is_used=&role=&created_by=&order=&page=&per_page=
pub async fn list_codes(
    State(state): State<AppState>,
    query: Result<Query<ListCodesQuery>, QueryRejection>,
) -> Result<Json<ListCodesResponse>, ApiError> {
    let Query(query) = query?;
    let filter = query.filter();
    let page = state.service.normalize_page(query.page_request());

    let codes = state.service.get_codes(&filter, query.page_request()).await?;
    let total = state.service.count_codes(&filter).await?;

    Ok(Json(ListCodesResponse {
        data: codes,
        pagination: PageInfo::new(page, total),
    }))
}

/// Usage statistics for the codes matching the filters.
///
/// GET /api/v1/admin/codes/stats
pub async fn code_stats(
    State(state): State<AppState>,
    query: Result<Query<ListCodesQuery>, QueryRejection>,
) -> Result<Json<CodeStats>, ApiError> {
    let Query(query) = query?;
    let stats = state.service.code_stats(&query.filter()).await?;
    Ok(Json(stats))
}

/// Export codes matching the filters as CSV or JSON.
///
/// GET /api/v1/admin/codes/export?fields=code,role&format=csv&delimiter=;
pub async fn export_codes(
    State(state): State<AppState>,
    query: Result<Query<ListCodesQuery>, QueryRejection>,
    export_query: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let Query(export_query) = export_query?;
    let export = export_query.to_export()?;
    let body = state.service.export_codes(&query.filter(), &export).await?;

    let disposition = format!(
        "attachment; filename=\"registration-codes.{}\"",
        export.format.extension()
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, export.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// Look up a single code.
///
/// GET /api/v1/admin/codes/:code
pub async fn get_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Code>, ApiError> {
    state
        .service
        .find_code(&code)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Registration code not found".to_string()))
}

/// Redeem a code on behalf of a user.
///
/// POST /api/v1/admin/codes/redeem
///
/// Called by the host platform's registration flow. A code that cannot be
/// redeemed is a normal 200 response with `redeemed: false`.
pub async fn redeem_code(
    State(state): State<AppState>,
    payload: Result<Json<RedeemCodeRequest>, JsonRejection>,
) -> Result<Json<RedeemCodeResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let redemption = state
        .service
        .redeem_code(&request.code, request.user_id)
        .await?;

    if redemption.redeemed {
        record_code_redeemed();
    }

    Ok(Json(RedeemCodeResponse {
        redeemed: redemption.redeemed,
        message: redemption.validation.message,
        reason: redemption.validation.reason,
        code: redemption.code,
    }))
}

/// Delete a code by id.
///
/// DELETE /api/v1/admin/codes/:id
pub async fn delete_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: i64 = id
        .trim()
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid code id: {id}")))?;

    if state.service.delete_code(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Registration code not found".to_string()))
    }
}

/// Delete several codes by id.
///
/// POST /api/v1/admin/codes/bulk-delete
pub async fn bulk_delete_codes(
    State(state): State<AppState>,
    payload: Result<Json<BulkDeleteCodesRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteCodesResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let deleted = state.service.delete_codes(&request.ids).await?;

    Ok(Json(BulkDeleteCodesResponse {
        requested: request.ids.len(),
        deleted,
    }))
}
