//! File upload endpoints.
//!
//! Evidence and announcement photos are stored on local disk and served back
//! under the public upload prefix. Profile pictures are stored by the
//! upstream service instead, so that endpoint forwards the multipart body
//! untouched.

use std::io;
use std::path::{Path, PathBuf};

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use super::proxy::ProxyRequest;
use super::session::SessionToken;
use crate::config::UploadsConfig;
use crate::error::{method_not_allowed, ApiError};
use crate::AppState;

/// Upload routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/upload/evidence",
            post(upload_evidence).fallback(method_not_allowed),
        )
        .route(
            "/api/upload/announcement",
            post(upload_announcement).fallback(method_not_allowed),
        )
        .route(
            "/api/upload/profile-picture",
            post(upload_profile_picture).fallback(method_not_allowed),
        )
}

/// Generic owner field accepted by every category.
const ENTITY_FIELD: &str = "entityId";
const FILE_FIELD: &str = "file";

/// Locally stored upload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    /// Photos attached to a crime or facility report.
    Evidence,
    /// Images attached to an announcement.
    Announcement,
}

impl UploadCategory {
    /// Directory below the upload root, `/`-separated.
    #[must_use]
    pub fn directory(self) -> &'static str {
        match self {
            Self::Evidence => "reports/evidence",
            Self::Announcement => "announcements",
        }
    }

    #[must_use]
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Evidence => "evidence",
            Self::Announcement => "announcement",
        }
    }

    /// Form field naming the owning entity.
    #[must_use]
    pub fn entity_field(self) -> &'static str {
        match self {
            Self::Evidence => "reportId",
            Self::Announcement => "announcementId",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file provided")]
    MissingFile,
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("failed to store upload: {0}")]
    Io(#[from] io::Error),
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::MissingFile => Self::BadRequest(err.to_string()),
            UploadError::Multipart(e) => {
                tracing::debug!(error = %e, "Rejected multipart body");
                Self::BadRequest("Invalid multipart form data".to_string())
            }
            UploadError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Success envelope. Only public paths are exposed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub path: String,
    pub url: String,
    pub file_name: String,
}

struct FilePart {
    original_name: Option<String>,
    bytes: Bytes,
}

struct UploadForm {
    file: Option<FilePart>,
    entity_id: Option<String>,
}

async fn read_form(category: UploadCategory, mut multipart: Multipart) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm {
        file: None,
        entity_id: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        if name == FILE_FIELD {
            let original_name = field.file_name().map(str::to_owned);
            let bytes = field.bytes().await?;
            // Browsers send an empty, unnamed part when no file was picked.
            if original_name.as_deref().is_some_and(|n| !n.is_empty()) || !bytes.is_empty() {
                form.file = Some(FilePart {
                    original_name,
                    bytes,
                });
            }
        } else if name == category.entity_field() || name == ENTITY_FIELD {
            let value = field.text().await?;
            let value = value.trim();
            if !value.is_empty() {
                form.entity_id = Some(value.to_owned());
            }
        }
    }

    Ok(form)
}

/// Keep only characters that are safe in a file name.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// `<prefix>_<entityId|none>_<unix-millis>.<ext>`
#[must_use]
pub fn upload_file_name(
    category: UploadCategory,
    entity_id: Option<&str>,
    timestamp_ms: i64,
    original_name: Option<&str>,
) -> String {
    let entity = entity_id
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "none".to_string());

    let extension = original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ext.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "bin".to_string());

    format!("{}_{}_{}.{}", category.file_prefix(), entity, timestamp_ms, extension)
}

/// On-disk directory of a category.
#[must_use]
pub fn category_dir(root: &Path, category: UploadCategory) -> PathBuf {
    category
        .directory()
        .split('/')
        .fold(root.to_path_buf(), |dir, segment| dir.join(segment))
}

/// Attempts before giving up on finding a free name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// `name` with `_<n>` inserted before the extension.
fn numbered_name(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{n}.{ext}"),
        None => format!("{name}_{n}"),
    }
}

/// Write `bytes` to a file in `dir` that did not exist before, starting
/// with `name` and numbering on collision. Returns the name used.
pub async fn write_new_file(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<String> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            name.to_owned()
        } else {
            numbered_name(name, attempt)
        };

        let opened = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
            .await;

        match opened {
            Ok(mut file) => {
                file.write_all(bytes).await?;
                file.flush().await?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {name} after {MAX_NAME_ATTEMPTS} attempts"),
    ))
}

/// Read the form, write the file, and describe where it is served from.
/// Nothing touches the disk unless a file part was sent.
pub async fn store_upload(
    config: &UploadsConfig,
    category: UploadCategory,
    multipart: Multipart,
) -> Result<UploadResponse, UploadError> {
    let form = read_form(category, multipart).await?;
    let file = form.file.ok_or(UploadError::MissingFile)?;

    let dir = category_dir(&config.root_dir, category);
    // Concurrent first uploads may race here; create_dir_all treats an
    // existing directory as success.
    tokio::fs::create_dir_all(&dir).await?;

    let file_name = upload_file_name(
        category,
        form.entity_id.as_deref(),
        chrono::Utc::now().timestamp_millis(),
        file.original_name.as_deref(),
    );
    let file_name = write_new_file(&dir, &file_name, &file.bytes).await?;

    let path = format!(
        "{}/{}/{}",
        config.public_prefix.trim_end_matches('/'),
        category.directory(),
        file_name
    );
    let url = match config.public_base_url.as_deref() {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => path.clone(),
    };

    tracing::info!(
        category = category.file_prefix(),
        file_name = %file_name,
        size = file.bytes.len(),
        "Upload stored"
    );

    Ok(UploadResponse {
        success: true,
        path,
        url,
        file_name,
    })
}

async fn upload_evidence(
    State(state): State<AppState>,
    _session: SessionToken,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    Ok(Json(
        store_upload(&state.config.uploads, UploadCategory::Evidence, multipart).await?,
    ))
}

async fn upload_announcement(
    State(state): State<AppState>,
    _session: SessionToken,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    Ok(Json(
        store_upload(&state.config.uploads, UploadCategory::Announcement, multipart).await?,
    ))
}

/// Forward the multipart body, boundary and all, to the upstream.
async fn upload_profile_picture(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .filter(|ct| {
            ct.to_str()
                .is_ok_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
        })
        .cloned();

    let Some(content_type) = content_type else {
        return ApiError::BadRequest("Expected multipart form data".to_string()).into_response();
    };

    state
        .gateway
        .relay(
            ProxyRequest::post("/accounts/profile-picture")
                .with_auth()
                .raw(body, Some(content_type)),
            Some(&token),
            None,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_format() {
        assert_eq!(
            upload_file_name(UploadCategory::Evidence, Some("42"), 1_700_000_000_000, Some("photo.JPG")),
            "evidence_42_1700000000000.jpg"
        );
        assert_eq!(
            upload_file_name(UploadCategory::Announcement, None, 5, Some("banner.png")),
            "announcement_none_5.png"
        );
    }

    #[test]
    fn test_file_name_sanitizes_untrusted_parts() {
        assert_eq!(
            upload_file_name(UploadCategory::Evidence, Some("../../etc"), 7, Some("x.p/h?p")),
            "evidence_etc_7.bin"
        );
        assert_eq!(
            upload_file_name(UploadCategory::Evidence, Some("///"), 7, Some("noext")),
            "evidence_none_7.bin"
        );
        assert_eq!(
            upload_file_name(UploadCategory::Evidence, Some("rep-1_a"), 7, Some("a.tar.GZ")),
            "evidence_rep-1_a_7.gz"
        );
    }

    #[test]
    fn test_category_dir() {
        let root = Path::new("/srv/uploads");
        assert_eq!(
            category_dir(root, UploadCategory::Evidence),
            Path::new("/srv/uploads/reports/evidence")
        );
        assert_eq!(
            category_dir(root, UploadCategory::Announcement),
            Path::new("/srv/uploads/announcements")
        );
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("evidence_42_7.png", 3), "evidence_42_7_3.png");
        assert_eq!(numbered_name("plain", 1), "plain_1");
    }

    #[tokio::test]
    async fn test_write_new_file_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();

        let first = write_new_file(dir.path(), "evidence_42_7.png", b"one").await.unwrap();
        let second = write_new_file(dir.path(), "evidence_42_7.png", b"two").await.unwrap();
        let third = write_new_file(dir.path(), "evidence_42_7.png", b"three").await.unwrap();

        assert_eq!(first, "evidence_42_7.png");
        assert_eq!(second, "evidence_42_7_1.png");
        assert_eq!(third, "evidence_42_7_2.png");
        assert_eq!(std::fs::read(dir.path().join(&first)).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.path().join(&second)).unwrap(), b"two");
        assert_eq!(std::fs::read(dir.path().join(&third)).unwrap(), b"three");
    }

    #[test]
    fn test_missing_file_maps_to_bad_request() {
        let err = ApiError::from(UploadError::MissingFile);
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "No file provided"));
    }
}
