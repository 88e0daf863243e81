//! Multipart upload intake and file streaming shared by the handlers

use axum::{
    body::Body,
    extract::multipart::{Multipart, MultipartError},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::storage::{content_type_for, extension_of, is_supported_image, MediaStore, IMAGE_EXTENSIONS};

/// A media file written to `uploads/`
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercase, without the dot
    pub extension: String,
    pub size: u64,
}

/// Parsed multipart form: the `file` part plus any text fields
#[derive(Debug)]
pub struct UploadForm {
    pub file: UploadedFile,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Which files an endpoint accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    AnyMedia,
    ImagesOnly,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(format!("Failed to read multipart body: {}", err.body_text()))
    }
}

/// Stream the multipart body to disk
///
/// The file is written chunk by chunk and abandoned as soon as it
/// exceeds `max_bytes`. On any error the partial file is removed.
pub async fn receive_upload(
    store: &MediaStore,
    mut multipart: Multipart,
    max_bytes: usize,
    accept: Accept,
) -> ApiResult<UploadForm> {
    let mut file: Option<UploadedFile> = None;
    let mut fields = HashMap::new();

    let result = read_parts(store, &mut multipart, max_bytes, accept, &mut file, &mut fields).await;

    match (result, file) {
        (Ok(()), Some(file)) => Ok(UploadForm { file, fields }),
        (Ok(()), None) => Err(ApiError::BadRequest("Missing 'file' field".to_string())),
        (Err(e), file) => {
            if let Some(file) = file {
                store.discard_upload(&file.path).await;
            }
            Err(e)
        }
    }
}

async fn read_parts(
    store: &MediaStore,
    multipart: &mut Multipart,
    max_bytes: usize,
    accept: Accept,
    file: &mut Option<UploadedFile>,
    fields: &mut HashMap<String, String>,
) -> ApiResult<()> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name != "file" {
            let value = field.text().await.map_err(multipart_error)?;
            fields.insert(name, value);
            continue;
        }
        if file.is_some() {
            return Err(ApiError::BadRequest("Only one file may be uploaded".to_string()));
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let extension = extension_of(&file_name);
        if accept == Accept::ImagesOnly && !is_supported_image(&extension) {
            return Err(ApiError::BadRequest(format!(
                "Invalid image format. Supported: {}",
                IMAGE_EXTENSIONS.join(", ")
            )));
        }

        let path = store.upload_path(&extension);
        let mut out = tokio::fs::File::create(&path).await?;
        // Registered before writing so a failure below still cleans up
        *file = Some(UploadedFile {
            path: path.clone(),
            file_name: file_name.clone(),
            extension,
            size: 0,
        });

        let mut size: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            size += chunk.len() as u64;
            if size > max_bytes as u64 {
                return Err(ApiError::PayloadTooLarge(format!(
                    "Upload exceeds {} bytes",
                    max_bytes
                )));
            }
            out.write_all(&chunk).await?;
        }
        out.flush().await?;

        if size == 0 {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }
        if let Some(f) = file.as_mut() {
            f.size = size;
        }

        debug!(file_name = %file_name, path = %path.display(), size, "Upload stored");
    }
    Ok(())
}

/// Stream a file from disk with a content type from its extension
///
/// A missing file is a 404.
pub async fn stream_file(path: &Path, download_name: Option<&str>) -> ApiResult<Response> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File no longer exists".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let length = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = (
        [
            (header::CONTENT_TYPE, content_type_for(path).to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        body,
    )
        .into_response();

    if let Some(name) = download_name {
        if let Ok(value) = format!("inline; filename=\"{}\"", name.replace('"', "")).parse() {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
    }
    Ok(response)
}
