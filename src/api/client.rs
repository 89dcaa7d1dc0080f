//! Knowledge-base REST client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::error::{ApiError, ApiResult};
use super::types::{
    Category, DocumentUpdate, Download, FileDetail, FileSummary, FileUpdate, KbDocument,
    NewDocument, NewFile,
};
use crate::render::{DocId, RenderError, RenderResult, SourceFetcher};

/// Client for the knowledge-base API
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn file_url(&self, id: &DocId, extra: &str) -> String {
        self.url(&format!("/file?id={}{}", urlencoding::encode(id.as_str()), extra))
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> ApiResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} returned {}", url, status);
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> ApiResult<T> {
        let response = self.send(self.http.get(&url), &url).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    /// Raw PDF bytes (`GET /file?id=..`)
    pub async fn fetch_file(&self, id: &DocId) -> ApiResult<Vec<u8>> {
        let url = self.file_url(id, "");
        let response = self.send(self.http.get(&url), &url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// File content for saving (`GET /file?id=..&download=1`)
    pub async fn download_file(&self, id: &DocId) -> ApiResult<Download> {
        let url = self.file_url(id, "&download=1");
        let response = self.send(self.http.get(&url), &url).await?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);

        Ok(Download {
            bytes: response.bytes().await?.to_vec(),
            filename,
            content_type,
        })
    }

    /// File metadata (`GET /file?id=..&detail=1`)
    pub async fn file_detail(&self, id: &DocId) -> ApiResult<FileDetail> {
        let mut detail: FileDetail = self.get_json(self.file_url(id, "&detail=1")).await?;
        if detail.id.is_none() {
            detail.id = Some(id.clone());
        }
        Ok(detail)
    }

    pub async fn categories(&self) -> ApiResult<Vec<Category>> {
        self.get_json(self.url("/category")).await
    }

    pub async fn document(&self, id: &DocId) -> ApiResult<KbDocument> {
        self.get_json(self.url(&format!(
            "/document?id={}",
            urlencoding::encode(id.as_str())
        )))
        .await
    }

    pub async fn search(&self, query: &str) -> ApiResult<Vec<FileSummary>> {
        self.get_json(self.url(&format!("/search?q={}", urlencoding::encode(query))))
            .await
    }

    /// Upload a new file (`POST /file`, multipart)
    pub async fn create_file(&self, file: NewFile) -> ApiResult<serde_json::Value> {
        let url = self.url("/file");

        let attachment = Part::bytes(file.attachment)
            .file_name(file.file_name)
            .mime_str("application/pdf")?;
        let mut form = Form::new().text("title", file.title);
        if let Some(cid) = file.cid {
            form = form.text("cid", cid.to_string());
        }
        if let Some(author) = file.author {
            form = form.text("author", author);
        }
        if let Some(did) = file.did {
            form = form.text("did", did.to_string());
        }
        if let Some(description) = file.description {
            form = form.text("description", description);
        }
        let form = form.part("attachment", attachment);

        let response = self.send(self.http.post(&url).multipart(form), &url).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    pub async fn update_file(&self, update: &FileUpdate) -> ApiResult<()> {
        let url = self.url("/file");
        self.send(self.http.put(&url).form(&update.form()), &url)
            .await?;
        Ok(())
    }

    pub async fn delete_file(&self, id: &DocId) -> ApiResult<()> {
        let url = self.url("/file");
        self.send(self.http.delete(&url).form(&[("id", id.as_str())]), &url)
            .await?;
        Ok(())
    }

    /// Increment the view counter of a file (`PATCH /file`)
    pub async fn record_view(&self, id: &DocId) -> ApiResult<()> {
        let url = self.url("/file");
        self.send(self.http.patch(&url).form(&[("id", id.as_str())]), &url)
            .await?;
        Ok(())
    }

    pub async fn create_document(&self, document: &NewDocument) -> ApiResult<()> {
        let url = self.url("/document");
        self.send(self.http.post(&url).form(&document.form()), &url)
            .await?;
        Ok(())
    }

    pub async fn update_document(&self, update: &DocumentUpdate) -> ApiResult<()> {
        let url = self.url("/document");
        self.send(self.http.put(&url).form(&update.form()), &url)
            .await?;
        Ok(())
    }

    pub async fn delete_document(&self, id: &DocId) -> ApiResult<()> {
        let url = self.url("/document");
        self.send(self.http.delete(&url).form(&[("id", id.as_str())]), &url)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SourceFetcher for ApiClient {
    async fn fetch_bytes(&self, id: &DocId) -> RenderResult<Vec<u8>> {
        self.fetch_file(id)
            .await
            .map_err(|e| RenderError::Fetch(e.to_string()))
    }
}

/// Filename from a `Content-Disposition` header value
fn disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';').map(str::trim) {
        if let Some(encoded) = param.strip_prefix("filename*=") {
            let encoded = encoded.split("''").nth(1).unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                return Some(decoded.into_owned());
            }
        } else if let Some(name) = param.strip_prefix("filename=") {
            plain = Some(name.trim_matches('"').to_string());
        }
    }
    plain.filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://kb.local/api/", 5).unwrap();
        assert_eq!(client.base_url(), "http://kb.local/api");
        assert_eq!(
            client.file_url(&DocId::from("a b"), "&detail=1"),
            "http://kb.local/api/file?id=a%20b&detail=1"
        );
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename(r#"attachment; filename="report.pdf""#),
            Some("report.pdf".to_string())
        );
        assert_eq!(
            disposition_filename("attachment; filename=\"x.pdf\"; filename*=UTF-8''b%C3%A1o%20c%C3%A1o.pdf"),
            Some("báo cáo.pdf".to_string())
        );
        assert_eq!(disposition_filename("inline"), None);
    }
}
