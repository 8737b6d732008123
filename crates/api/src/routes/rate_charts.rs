//! Rate chart management routes.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    AppState,
    error::{app_error_response, bad_request, rate_chart_error_response},
};
use ratechart_core::ratechart::{Channel, ChartGroup, ChartHeader, ChartStatus, UploadInput};
use ratechart_shared::{
    AppError,
    types::{ChartId, MachineId, SocietyId},
};

/// Room for the non-file multipart fields on top of the file size limit.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates the rate chart routes.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route(
            "/rate-charts",
            post(upload_chart).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/rate-charts", get(list_charts))
        .route("/rate-charts/reset-downloads", post(reset_downloads))
        .route("/rate-charts/{chart_id}", get(get_chart))
        .route("/rate-charts/{chart_id}/rows", get(get_chart_rows))
        .route("/rate-charts/{chart_id}/societies", post(assign_societies))
        .route(
            "/rate-charts/{chart_id}/societies/{society_id}",
            delete(remove_society),
        )
        .route("/rate-charts/{chart_id}/toggle-status", post(toggle_status))
        .route(
            "/rate-charts/{chart_id}/download-status",
            get(download_status),
        )
        .route("/rate-charts/{chart_id}/downloads", post(record_download))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for assigning a chart to more societies.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// Societies to add to the group.
    pub society_ids: Vec<SocietyId>,
    /// Replace active charts the societies already hold.
    #[serde(default)]
    pub replace_existing: bool,
}

/// Request body for resetting machine downloads.
#[derive(Debug, Deserialize)]
pub struct ResetDownloadsRequest {
    /// Chart or header ids; references resolve to their master.
    pub chart_ids: Vec<ChartId>,
    /// Machines that must fetch again.
    pub machine_ids: Vec<MachineId>,
}

/// Response for a download reset.
#[derive(Debug, Serialize)]
pub struct ResetDownloadsResponse {
    /// Number of records cleared.
    pub cleared: u64,
}

/// Request body for recording a machine download.
#[derive(Debug, Deserialize)]
pub struct RecordDownloadRequest {
    /// Machine that fetched the chart.
    pub machine_id: MachineId,
}

/// Response for a recorded download.
#[derive(Debug, Serialize)]
pub struct RecordDownloadResponse {
    /// Master chart the download was recorded against.
    pub master_chart_id: ChartId,
    /// Machine that fetched the chart.
    pub machine_id: MachineId,
}

/// One header within a chart group response.
#[derive(Debug, Serialize)]
pub struct ChartMemberResponse {
    /// Header id.
    pub header_id: ChartId,
    /// Society id.
    pub society_id: SocietyId,
    /// Whether this header owns the rows.
    pub is_master: bool,
}

/// A chart group as presented to administrators.
#[derive(Debug, Serialize)]
pub struct ChartGroupResponse {
    /// Header that owns the rows.
    pub master_chart_id: ChartId,
    /// Milk channel.
    pub channel: Channel,
    /// Status shared by every header.
    pub status: ChartStatus,
    /// Uploaded file name.
    pub file_name: String,
    /// Uploading administrator.
    pub uploaded_by: String,
    /// Upload time (ISO 8601).
    pub uploaded_at: DateTime<Utc>,
    /// Number of rows.
    pub record_count: i64,
    /// Societies in the group, master's first.
    pub society_ids: Vec<SocietyId>,
    /// Every header in the group.
    pub members: Vec<ChartMemberResponse>,
}

impl From<ChartGroup> for ChartGroupResponse {
    fn from(group: ChartGroup) -> Self {
        let society_ids = group.society_ids();
        let members = group.members().map(member_response).collect();
        let ChartHeader {
            id,
            channel,
            status,
            provenance,
            ..
        } = group.master;

        Self {
            master_chart_id: id,
            channel,
            status,
            file_name: provenance.file_name,
            uploaded_by: provenance.uploaded_by,
            uploaded_at: provenance.uploaded_at,
            record_count: provenance.record_count,
            society_ids,
            members,
        }
    }
}

fn member_response(header: &ChartHeader) -> ChartMemberResponse {
    ChartMemberResponse {
        header_id: header.id,
        society_id: header.society_id,
        is_master: header.is_master(),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses a comma-separated society id list, ignoring blanks.
fn parse_society_ids(raw: &str) -> Result<Vec<SocietyId>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<SocietyId>()
                .map_err(|_| format!("invalid society id '{s}'"))
        })
        .collect()
}

fn multipart_error(err: &MultipartError) -> Response {
    let app_error = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::Validation(err.body_text())
    };
    app_error_response(&app_error, None)
}

/// Reads the upload form: `file`, `society_ids`, `channel`, `uploaded_by`.
async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadInput, Response> {
    let mut file = None;
    let mut society_ids = None;
    let mut channel = None;
    let mut uploaded_by = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(&e))?;
                file = Some((file_name, bytes.to_vec()));
            }
            "society_ids" => {
                society_ids = Some(field.text().await.map_err(|e| multipart_error(&e))?);
            }
            "channel" => channel = Some(field.text().await.map_err(|e| multipart_error(&e))?),
            "uploaded_by" => {
                uploaded_by = Some(field.text().await.map_err(|e| multipart_error(&e))?);
            }
            _ => {}
        }
    }

    let (file_name, content) = file.ok_or_else(|| bad_request("missing 'file' field"))?;
    let channel = channel
        .ok_or_else(|| bad_request("missing 'channel' field"))?
        .parse::<Channel>()
        .map_err(rate_chart_error_response)?;
    let society_ids = parse_society_ids(&society_ids.unwrap_or_default()).map_err(bad_request)?;
    let uploaded_by = uploaded_by
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "system".to_string());

    Ok(UploadInput {
        file_name,
        content,
        society_ids,
        channel,
        uploaded_by,
    })
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/rate-charts`
/// Upload a rate table for one or more societies.
async fn upload_chart(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let input = match read_upload_form(&mut multipart).await {
        Ok(input) => input,
        Err(response) => return response,
    };

    match state.charts.upload(input).await {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// GET `/rate-charts`
/// List every chart group.
async fn list_charts(State(state): State<AppState>) -> Response {
    match state.charts.list_groups().await {
        Ok(groups) => {
            let groups: Vec<ChartGroupResponse> = groups.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(groups)).into_response()
        }
        Err(e) => rate_chart_error_response(e),
    }
}

/// GET `/rate-charts/{chart_id}`
/// Fetch the group a header belongs to.
async fn get_chart(State(state): State<AppState>, Path(chart_id): Path<ChartId>) -> Response {
    match state.charts.get_group(chart_id).await {
        Ok(group) => (StatusCode::OK, Json(ChartGroupResponse::from(group))).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// GET `/rate-charts/{chart_id}/rows`
/// Rows served by a header, resolved through its master.
async fn get_chart_rows(State(state): State<AppState>, Path(chart_id): Path<ChartId>) -> Response {
    match state.charts.chart_rows(chart_id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// POST `/rate-charts/{chart_id}/societies`
/// Share a chart with more societies.
async fn assign_societies(
    State(state): State<AppState>,
    Path(chart_id): Path<ChartId>,
    Json(payload): Json<AssignRequest>,
) -> Response {
    match state
        .charts
        .assign(chart_id, &payload.society_ids, payload.replace_existing)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// DELETE `/rate-charts/{chart_id}/societies/{society_id}`
/// Remove one society's header from its group.
async fn remove_society(
    State(state): State<AppState>,
    Path((chart_id, society_id)): Path<(ChartId, SocietyId)>,
) -> Response {
    match state.charts.remove_society(chart_id, society_id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// POST `/rate-charts/{chart_id}/toggle-status`
/// Flip the status of every header in the group.
async fn toggle_status(State(state): State<AppState>, Path(chart_id): Path<ChartId>) -> Response {
    match state.charts.toggle_status(chart_id).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// GET `/rate-charts/{chart_id}/download-status`
/// Machine download progress for the group.
async fn download_status(
    State(state): State<AppState>,
    Path(chart_id): Path<ChartId>,
) -> Response {
    match state.charts.download_status(chart_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// POST `/rate-charts/reset-downloads`
/// Make machines fetch charts again.
async fn reset_downloads(
    State(state): State<AppState>,
    Json(payload): Json<ResetDownloadsRequest>,
) -> Response {
    match state
        .charts
        .reset_downloads(&payload.chart_ids, &payload.machine_ids)
        .await
    {
        Ok(cleared) => (StatusCode::OK, Json(ResetDownloadsResponse { cleared })).into_response(),
        Err(e) => rate_chart_error_response(e),
    }
}

/// POST `/rate-charts/{chart_id}/downloads`
/// Record that a machine fetched the chart.
async fn record_download(
    State(state): State<AppState>,
    Path(chart_id): Path<ChartId>,
    Json(payload): Json<RecordDownloadRequest>,
) -> Response {
    match state
        .charts
        .record_download(payload.machine_id, chart_id)
        .await
    {
        Ok(master_chart_id) => {
            info!(%master_chart_id, machine_id = %payload.machine_id, "Machine download recorded");
            (
                StatusCode::OK,
                Json(RecordDownloadResponse {
                    master_chart_id,
                    machine_id: payload.machine_id,
                }),
            )
                .into_response()
        }
        Err(e) => rate_chart_error_response(e),
    }
}
