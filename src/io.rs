use crate::{VerifyError, VerifyResult};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

#[derive(Debug, Clone)]
pub struct UploadMeta {
    /// e.g. "text/csv" or "application/gzip"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// original file name (used for extension checks)
    pub name_hint: String,
    /// Encoding assumed when the bytes carry no BOM (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for UploadMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl UploadMeta {
    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || self.name_hint.to_ascii_lowercase().ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type.eq_ignore_ascii_case("application/zstd")
            || self.name_hint.to_ascii_lowercase().ends_with(".zst")
    }

    /// Only delimited text is accepted; compressed CSV counts.
    pub fn is_csv(&self) -> bool {
        let name = self.name_hint.to_ascii_lowercase();
        let name = name
            .strip_suffix(".gz")
            .or_else(|| name.strip_suffix(".zst"))
            .unwrap_or(name.as_str());
        name.ends_with(".csv") || self.content_type.to_ascii_lowercase().starts_with("text/csv")
    }
}

/// A decoded upload ready for parsing.
#[derive(Debug, Clone)]
pub struct Upload {
    pub meta: UploadMeta,
    pub text: String,
    /// CRC32 of the decoded text, used to recognise repeat uploads.
    pub checksum: u32,
}

/// Decode raw upload bytes to text: BOM first, then the declared charset.
pub fn decode_text(bytes: &[u8], charset: &'static encoding_rs::Encoding) -> String {
    let (text, used, had_errors) = charset.decode(bytes);
    if had_errors {
        log::warn!("upload contained bytes invalid in {}", used.name());
    }
    text.into_owned()
}

/// Read a whole upload, decompressing and decoding it.
///
/// Rejects uploads that are not CSV before reading any content.
pub async fn read_upload<R>(raw: R, meta: UploadMeta) -> VerifyResult<Upload>
where
    R: AsyncRead + Unpin + Send,
{
    if !meta.is_csv() {
        return Err(VerifyError::UnsupportedUpload(meta.name_hint.clone()));
    }

    let buf = BufReader::with_capacity(1 << 16, raw);
    let mut reader: Box<dyn AsyncRead + Unpin + Send + '_> = if meta.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if meta.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await?;

    let text = decode_text(&bytes, meta.charset);
    let checksum = crc32fast::hash(text.as_bytes());
    Ok(Upload {
        meta,
        text,
        checksum,
    })
}

/// Read an upload from a local file, guessing its meta from the extension.
pub async fn upload_from_path(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> VerifyResult<Upload> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let mut meta = UploadMeta {
        name_hint: name,
        charset,
        ..Default::default()
    };
    match path.extension().and_then(|s| s.to_str()).unwrap_or_default() {
        "gz" => {
            meta.content_type = "application/gzip".into();
            meta.content_encoding = "gzip".into();
        }
        "zst" => {
            meta.content_type = "application/zstd".into();
            meta.content_encoding = "zstd".into();
        }
        "csv" => meta.content_type = "text/csv".into(),
        _ => {}
    }
    if !meta.is_csv() {
        return Err(VerifyError::UnsupportedUpload(meta.name_hint));
    }

    let file = File::open(path).await?;
    read_upload(file, meta).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> UploadMeta {
        UploadMeta {
            name_hint: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn csv_detection_looks_through_compression_suffixes() {
        assert!(meta("clients.csv").is_csv());
        assert!(meta("CLIENTS.CSV.GZ").is_csv());
        assert!(meta("clients.csv.zst").is_csv());
        assert!(!meta("clients.xlsx").is_csv());
        assert!(!meta("clients.gz").is_csv());
    }

    #[test]
    fn bom_overrides_declared_charset() {
        let bytes = b"\xEF\xBB\xBFABN\n";
        assert_eq!(decode_text(bytes, encoding_rs::WINDOWS_1252), "ABN\n");
        assert_eq!(decode_text(b"Caf\xE9", encoding_rs::WINDOWS_1252), "Café");
    }

    #[tokio::test]
    async fn rejects_non_csv_before_reading() {
        let result = read_upload(&b"PK\x03\x04"[..], meta("clients.xlsx")).await;
        assert!(matches!(result, Err(VerifyError::UnsupportedUpload(_))));
    }

    #[tokio::test]
    async fn plain_upload_is_decoded_and_fingerprinted() {
        let upload = read_upload(&b"ABN\n51824753556\n"[..], meta("a.csv"))
            .await
            .unwrap();
        assert_eq!(upload.text, "ABN\n51824753556\n");
        assert_eq!(upload.checksum, crc32fast::hash(b"ABN\n51824753556\n"));
    }
}
