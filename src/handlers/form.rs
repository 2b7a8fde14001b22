use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::models::error::AppError;

pub const STYLE_RATIO_FIELD: &str = "styleRatio";

#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub file_name: Option<String>,
    pub data: Bytes,
}

/// A multipart upload read fully into memory.
///
/// Only the expected file parts and `styleRatio` are kept. Nothing touches
/// disk until the form has been validated.
#[derive(Debug, Default)]
pub struct UploadForm {
    parts: HashMap<String, UploadedPart>,
    style_ratio: Option<String>,
}

impl UploadForm {
    pub async fn read(
        mut multipart: Multipart,
        expected: &[&str],
        max_upload_bytes: u64,
    ) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_upload_bytes))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == STYLE_RATIO_FIELD {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_upload_bytes))?;
                form.style_ratio = Some(text);
                continue;
            }

            if !expected.contains(&name.as_str()) {
                tracing::debug!(field = %name, "Ignoring unexpected multipart field");
                continue;
            }
            if form.parts.contains_key(&name) {
                return Err(AppError::ValidationError(format!(
                    "Only one '{}' file may be uploaded",
                    name
                )));
            }

            let file_name = field.file_name().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, max_upload_bytes))?;
            if data.is_empty() {
                continue;
            }
            form.parts.insert(name, UploadedPart { file_name, data });
        }

        Ok(form)
    }

    pub fn take(&mut self, name: &str) -> Option<UploadedPart> {
        self.parts.remove(name)
    }

    pub fn style_ratio(&self, default: f32) -> Result<f32, AppError> {
        parse_style_ratio(self.style_ratio.as_deref(), default)
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError, max_upload_bytes: u64) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge {
            limit: max_upload_bytes,
        }
    } else {
        AppError::ValidationError(format!("Multipart error: {}", e))
    }
}

/// Absent or blank means `default`. Anything else must be a finite number;
/// values outside `[0, 1]` are accepted and extrapolate.
pub fn parse_style_ratio(raw: Option<&str>, default: f32) -> Result<f32, AppError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(default),
        Some(v) => v,
    };
    let ratio: f32 = raw
        .parse()
        .map_err(|_| AppError::ValidationError(format!("styleRatio must be a number, got '{}'", raw)))?;
    if !ratio.is_finite() {
        return Err(AppError::ValidationError("styleRatio must be finite".to_string()));
    }
    if !(0.0..=1.0).contains(&ratio) {
        tracing::warn!(ratio, "styleRatio outside [0, 1]; extrapolating");
    }
    Ok(ratio)
}
