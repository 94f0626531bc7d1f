use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::{errors::Error, workflow::run::validate_run_id};

/// Where report artifacts live, one per workflow run
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// File name offered when the report is downloaded
    fn file_name(&self) -> &str;

    /// Stores the report for `run_id`, replacing any previous content, and
    /// returns its location
    async fn write(&self, run_id: &str, content: &str) -> Result<String, Error>;

    async fn read(&self, run_id: &str) -> Result<String, Error>;
}

fn not_found(run_id: &str) -> Error {
    Error::NotFound {
        entity: format!("report {}", run_id),
    }
}

/// `<root>/<run_id>/<file_name>` on the local filesystem
pub struct FsReportStore {
    root: PathBuf,
    file_name: String,
}

impl FsReportStore {
    pub fn new(root: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_name: file_name.into(),
        }
    }

    fn path(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id).join(&self.file_name)
    }
}

#[async_trait]
impl ReportStore for FsReportStore {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn write(&self, run_id: &str, content: &str) -> Result<String, Error> {
        validate_run_id(run_id)?;

        let path = self.path(run_id);
        let dir = self.root.join(run_id);
        tokio::fs::create_dir_all(&dir).await?;

        // Written aside and renamed so readers never see a partial report
        let staging = dir.join(format!(".{}.partial", self.file_name));
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, &path).await?;

        debug!(path = %path.display(), bytes = content.len(), "Report written");
        Ok(path.display().to_string())
    }

    async fn read(&self, run_id: &str) -> Result<String, Error> {
        validate_run_id(run_id)?;

        match tokio::fs::read_to_string(self.path(run_id)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(run_id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// `s3://<bucket>/reports/<run_id>/<file_name>`
pub struct S3ReportStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    file_name: String,
}

impl S3ReportStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            file_name: file_name.into(),
        }
    }

    pub fn key(&self, run_id: &str) -> String {
        format!("reports/{}/{}", run_id, self.file_name)
    }
}

#[async_trait]
impl ReportStore for S3ReportStore {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn write(&self, run_id: &str, content: &str) -> Result<String, Error> {
        validate_run_id(run_id)?;
        let key = self.key(run_id);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("text/markdown; charset=utf-8")
            .body(ByteStream::from(content.as_bytes().to_vec()))
            .send()
            .await
            .map_err(|e| {
                Error::io(format!(
                    "failed to write s3://{}/{}: {}",
                    self.bucket,
                    key,
                    e.into_service_error()
                ))
            })?;

        debug!(bucket = %self.bucket, key = %key, bytes = content.len(), "Report uploaded");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn read(&self, run_id: &str) -> Result<String, Error> {
        validate_run_id(run_id)?;
        let key = self.key(run_id);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_no_such_key() {
                    return Err(not_found(run_id));
                }
                return Err(Error::io(format!(
                    "failed to read s3://{}/{}: {}",
                    self.bucket, key, err
                )));
            }
        };

        let data = response.body.collect().await.map_err(Error::io)?;
        String::from_utf8(data.to_vec()).map_err(|e| Error::io(format!("report is not UTF-8: {}", e)))
    }
}
