//! JSON endpoints called from the browser.
//!
//! `erifl_file` counts a download and hands back the file URL; it is open to
//! guests. `erifl_save_bulk_edit` rewrites requirements on many files and
//! needs an editor. Both check a nonce first. Responses use the
//! `{"success": bool, "data": ...}` envelope the front-end scripts expect.

mod client_ip;
mod nonce;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub use client_ip::{IP_HEADERS, UNKNOWN_IP, client_ip, is_public_ip};
pub use nonce::{BULK_EDIT_NONCE_ACTION, FILE_NONCE_ACTION, Nonces};

use crate::PLUGIN_NAME;
use crate::error::StoreError;
use crate::files::Files;
use crate::tracker::{DownloadError, DownloadTracker};
use crate::users::Requester;

/// Endpoint failures.
#[derive(Debug, Error)]
pub enum AjaxError {
    #[error("invalid or expired nonce")]
    InvalidNonce,

    #[error("you are not allowed to edit files")]
    Forbidden,

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AjaxError {
    /// The error envelope sent to the browser.
    #[must_use]
    pub fn to_response(&self) -> AjaxResponse {
        match self {
            Self::Download(
                DownloadError::MissingFileId | DownloadError::UnknownFile(_) | DownloadError::NotPublished(_),
            ) => {
                AjaxResponse::error(format!("{PLUGIN_NAME}: {self}"))
            }
            other => AjaxResponse::error(other.to_string()),
        }
    }
}

/// `{"success": .., "data": ..}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AjaxResponse {
    pub success: bool,
    pub data: Value,
}

impl AjaxResponse {
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self { success: true, data }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::String(message.into()),
        }
    }
}

/// Body of an `erifl_file` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileRequest {
    pub nonce: String,
    #[serde(rename = "fileID", default)]
    pub file_id: Option<i64>,
}

/// Body of an `erifl_save_bulk_edit` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkEditRequest {
    pub nonce: String,
    #[serde(default)]
    pub post_ids: Vec<i64>,
    #[serde(default)]
    pub required_roles: Option<Vec<String>>,
    #[serde(default)]
    pub required_meta_key: Option<String>,
}

/// Endpoint dispatcher.
#[derive(Debug, Clone)]
pub struct Ajax {
    files: Files,
    tracker: DownloadTracker,
    nonces: Nonces,
}

impl Ajax {
    #[must_use]
    pub fn new(files: Files, tracker: DownloadTracker, nonces: Nonces) -> Self {
        Self { files, tracker, nonces }
    }

    /// Runs an action by name with a JSON body; unknown actions answer `0`
    /// like an unregistered admin-ajax action.
    #[instrument(skip(self, body, requester))]
    pub async fn dispatch(&self, action: &str, body: &Value, requester: &Requester) -> AjaxResponse {
        let result = match action {
            "erifl_file" => match serde_json::from_value::<FileRequest>(body.clone()) {
                Ok(request) => self.file(&request, requester).await,
                Err(err) => return AjaxResponse::error(format!("{PLUGIN_NAME}: {err}")),
            },
            "erifl_save_bulk_edit" => match serde_json::from_value::<BulkEditRequest>(body.clone()) {
                Ok(request) => self.save_bulk_edit(&request, requester).await,
                Err(err) => return AjaxResponse::error(err.to_string()),
            },
            _ => {
                debug!(action, "unknown ajax action");
                return AjaxResponse::error("0");
            }
        };
        result.unwrap_or_else(|err| {
            warn!(action, error = %err, "ajax request failed");
            err.to_response()
        })
    }

    /// Counts a download and returns `{"type": "success", "url": ..}`.
    ///
    /// # Errors
    ///
    /// Returns [`AjaxError::InvalidNonce`] for a bad token and
    /// [`AjaxError::Download`] when the download cannot be recorded.
    pub async fn file(&self, request: &FileRequest, requester: &Requester) -> Result<AjaxResponse, AjaxError> {
        if !self
            .nonces
            .verify(&request.nonce, FILE_NONCE_ACTION, requester.user_id)
        {
            return Err(AjaxError::InvalidNonce);
        }
        let outcome = self
            .tracker
            .record_download(request.file_id.unwrap_or(0), requester)
            .await?;
        Ok(AjaxResponse::success(json!({
            "type": "success",
            "url": outcome.url,
        })))
    }

    /// Applies bulk requirement edits. An empty id list succeeds untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AjaxError::InvalidNonce`] for a bad token,
    /// [`AjaxError::Forbidden`] unless the requester may edit files.
    pub async fn save_bulk_edit(&self, request: &BulkEditRequest, requester: &Requester) -> Result<AjaxResponse, AjaxError> {
        if !self
            .nonces
            .verify(&request.nonce, BULK_EDIT_NONCE_ACTION, requester.user_id)
        {
            return Err(AjaxError::InvalidNonce);
        }
        if request.post_ids.is_empty() {
            return Ok(AjaxResponse::success(Value::Null));
        }
        if !requester.can_edit_files() {
            return Err(AjaxError::Forbidden);
        }

        let roles = request.required_roles.clone().unwrap_or_default();
        let meta_key = request.required_meta_key.as_deref().unwrap_or_default();
        self.files.bulk_edit(&request.post_ids, &roles, meta_key).await?;
        Ok(AjaxResponse::success(Value::Null))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::cache::CacheStore;
    use crate::db::Database;
    use crate::downloads::DownloadLog;
    use crate::files::NewFile;
    use crate::hooks::Hooks;
    use crate::users::ADMIN_ROLE;

    struct Setup {
        _tmp: TempDir,
        ajax: Ajax,
        files: Files,
        nonces: Nonces,
    }

    async fn setup() -> Setup {
        let tmp = TempDir::new().unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let cache = Arc::new(CacheStore::default());
        let log = Arc::new(DownloadLog::new(db.clone(), cache.clone(), ""));
        let files = Files::new(
            db,
            cache,
            log.clone(),
            Arc::new(Hooks::new()),
            tmp.path().to_path_buf(),
            "https://example.com/uploads".to_string(),
        );
        let nonces = Nonces::new("test-secret");
        let tracker = DownloadTracker::new(files.clone(), log);
        Setup {
            _tmp: tmp,
            ajax: Ajax::new(files.clone(), tracker, nonces.clone()),
            files,
            nonces,
        }
    }

    fn admin() -> Requester {
        Requester {
            user_id: 1,
            roles: vec![ADMIN_ROLE.to_string()],
            ip: None,
        }
    }

    #[tokio::test]
    async fn test_file_endpoint_envelopes() {
        let s = setup().await;
        let file = s
            .files
            .create(&NewFile {
                title: "Guide",
                ..NewFile::default()
            })
            .await
            .unwrap();
        let guest = Requester::guest(Some("203.0.113.5".to_string()));
        let nonce = s.nonces.create(FILE_NONCE_ACTION, 0);

        let ok = s
            .ajax
            .dispatch("erifl_file", &json!({"nonce": nonce, "fileID": file.id}), &guest)
            .await;
        assert!(ok.success);
        assert_eq!(ok.data["type"], "success");
        assert!(ok.data["url"].is_null());

        let missing = s
            .ajax
            .dispatch("erifl_file", &json!({"nonce": nonce}), &guest)
            .await;
        assert_eq!(
            missing,
            AjaxResponse::error("ERI File Library: No file ID found.")
        );

        let unknown = s
            .ajax
            .dispatch("erifl_file", &json!({"nonce": nonce, "fileID": 404}), &guest)
            .await;
        assert_eq!(unknown.data, "ERI File Library: File ID 404 does not exist.");

        let forged = s
            .ajax
            .dispatch("erifl_file", &json!({"nonce": "0000000000", "fileID": file.id}), &guest)
            .await;
        assert!(!forged.success);
        assert_eq!(s.files.require(file.id).await.unwrap().download_count, 1);

        let gated = s
            .files
            .create(&NewFile {
                title: "Members",
                required_meta_key: "is_member",
                ..NewFile::default()
            })
            .await
            .unwrap();
        let refused = s
            .ajax
            .dispatch("erifl_file", &json!({"nonce": nonce, "fileID": gated.id}), &guest)
            .await;
        assert_eq!(refused.data, "You do not have permission to access this file.");
        assert_eq!(s.files.require(gated.id).await.unwrap().download_count, 0);
    }

    #[tokio::test]
    async fn test_bulk_edit_requires_editor() {
        let s = setup().await;
        let file = s
            .files
            .create(&NewFile {
                title: "Guide",
                ..NewFile::default()
            })
            .await
            .unwrap();

        let subscriber = Requester {
            user_id: 9,
            roles: vec!["subscriber".to_string()],
            ip: None,
        };
        let body = json!({
            "nonce": s.nonces.create(BULK_EDIT_NONCE_ACTION, 9),
            "post_ids": [file.id],
            "required_roles": ["member"],
        });
        let denied = s.ajax.dispatch("erifl_save_bulk_edit", &body, &subscriber).await;
        assert!(!denied.success);

        let body = json!({
            "nonce": s.nonces.create(BULK_EDIT_NONCE_ACTION, 1),
            "post_ids": [file.id],
            "required_roles": ["member"],
            "required_meta_key": "",
        });
        let ok = s.ajax.dispatch("erifl_save_bulk_edit", &body, &admin()).await;
        assert!(ok.success);
        let stored = s.files.require(file.id).await.unwrap();
        assert_eq!(stored.required_roles, "member");
        assert_eq!(stored.required_meta_key, "");
    }

    #[tokio::test]
    async fn test_bulk_edit_with_no_ids_succeeds() {
        let s = setup().await;
        let body = json!({ "nonce": s.nonces.create(BULK_EDIT_NONCE_ACTION, 0) });
        let response = s
            .ajax
            .dispatch("erifl_save_bulk_edit", &body, &Requester::guest(None))
            .await;
        assert!(response.success);
        assert_eq!(s.ajax.dispatch("nope", &json!({}), &admin()).await.data, "0");
    }
}
