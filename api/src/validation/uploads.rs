//! `multipart/form-data` bodies
//!
//! Text parts become strings, `name[]` parts are collected into lists, and
//! file parts become [`UploadedFile`] values. The MIME type is sniffed from
//! the file content; the client-declared type is only a fallback.

use axum::extract::multipart::{Field, Multipart, MultipartError};
use shared::{Dimensions, FieldMap, FieldValue, UploadedFile};

const OCTET_STREAM: &str = "application/octet-stream";

pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Metadata for an uploaded file; the bytes themselves are not kept.
pub fn describe_upload(original_name: &str, declared_type: Option<&str>, data: &[u8]) -> UploadedFile {
    let mime_type = infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| declared_type.map(str::to_string))
        .unwrap_or_else(|| OCTET_STREAM.to_string());

    let dimensions = if mime_type.starts_with("image/") {
        imagesize::blob_size(data).ok().and_then(|size| {
            Some(Dimensions {
                width: u32::try_from(size.width).ok()?,
                height: u32::try_from(size.height).ok()?,
            })
        })
    } else {
        None
    };

    UploadedFile {
        original_name: original_name.to_string(),
        mime_type,
        size_bytes: data.len() as u64,
        dimensions,
    }
}

async fn part_value(field: Field<'_>) -> Result<FieldValue, MultipartError> {
    match field.file_name().map(str::to_string) {
        Some(file_name) => {
            let declared = field.content_type().map(str::to_string);
            let data = field.bytes().await?;
            Ok(FieldValue::File(describe_upload(&file_name, declared.as_deref(), &data)))
        }
        None => Ok(FieldValue::String(field.text().await?)),
    }
}

fn insert_part(fields: &mut FieldMap, name: &str, value: FieldValue) {
    match name.strip_suffix("[]") {
        Some(list_name) => {
            let entry = fields
                .entry(list_name.to_string())
                .or_insert_with(|| FieldValue::List(Vec::new()));
            match entry {
                FieldValue::List(items) => items.push(value),
                other => *other = FieldValue::List(vec![value]),
            }
        }
        None => {
            fields.insert(name.to_string(), value);
        }
    }
}

/// Collect every named part; unnamed parts are skipped.
pub async fn read_multipart(mut multipart: Multipart) -> Result<FieldMap, MultipartError> {
    let mut fields = FieldMap::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = part_value(field).await?;
        insert_part(&mut fields, &name, value);
    }
    Ok(fields)
}
