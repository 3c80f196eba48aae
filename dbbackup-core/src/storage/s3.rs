/*!
S3-compatible object storage backend.

Artifacts are objects under `bucket` with an optional key prefix. The
backend exposes the synchronous [`StorageBackend`] interface and owns a
private tokio runtime it blocks on for every SDK call.

# Authentication
Explicit credentials from the configuration win; otherwise the SDK default
provider chain applies (environment, shared credentials file, instance
roles). A custom endpoint URL supports non-AWS S3-compatible providers.
*/

use super::StorageBackend;
use crate::config::S3Config;
use crate::{BackupError, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::{debug, info};

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    prefix: String,
    default_acl: Option<ObjectCannedAcl>,
    runtime: Runtime,
}

impl S3Storage {
    /// Create a backend for the configured bucket.
    ///
    /// Fails if no bucket is configured or the async runtime cannot be
    /// created; credential problems surface on the first operation.
    pub fn new(config: &S3Config) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| BackupError::config("s3 storage requires a bucket"))?;

        let runtime = Runtime::new().map_err(|e| {
            BackupError::storage(format!("failed to create async runtime for S3 client: {e}"))
        })?;

        let sdk_config = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &config.region {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(endpoint) = &config.endpoint_url {
                loader = loader.endpoint_url(endpoint.clone());
            }
            if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
                loader = loader.credentials_provider(Credentials::new(
                    key.clone(),
                    secret.clone(),
                    None,
                    None,
                    "dbbackup-config",
                ));
            }
            loader.load().await
        });

        let client = S3Client::new(&sdk_config);
        let prefix = config.prefix.trim_matches('/').to_string();
        let default_acl = config.default_acl.as_deref().map(ObjectCannedAcl::from);

        info!(bucket = %bucket, prefix = %prefix, "initialized S3 storage backend");

        Ok(S3Storage {
            client,
            bucket,
            prefix,
            default_acl,
            runtime,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key(&self, name: &str) -> String {
        prefixed_key(&self.prefix, name)
    }

    fn put_object(&self, body: ByteStream, key: &str) -> Result<()> {
        let result = self.runtime.block_on(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .set_acl(self.default_acl.clone())
                .body(body)
                .send()
                .await
        });

        match result {
            Ok(_) => {
                debug!(bucket = %self.bucket, key = %key, "uploaded artifact to S3");
                Ok(())
            }
            Err(e) => Err(map_s3_error("put_object", e, key)),
        }
    }
}

impl StorageBackend for S3Storage {
    fn upload_file(&self, local_path: &Path) -> Result<String> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BackupError::storage(format!("invalid artifact path: {}", local_path.display()))
            })?
            .to_string();
        let key = self.key(&name);

        let body = self
            .runtime
            .block_on(ByteStream::from_path(local_path))
            .map_err(|e| {
                BackupError::storage(format!("failed to read {}: {e}", local_path.display()))
            })?;
        self.put_object(body, &key)?;
        Ok(name)
    }

    fn upload_stream(&self, reader: &mut dyn Read, name: &str) -> Result<String> {
        // Drain the conduit into memory; the dump never touches local disk.
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| BackupError::storage(format!("failed to read dump stream: {e}")))?;

        let key = self.key(name);
        self.put_object(ByteStream::from(data), &key)?;
        Ok(name.to_string())
    }

    fn download(&self, name: &str, dest: &Path) -> Result<()> {
        let key = self.key(name);
        debug!(bucket = %self.bucket, key = %key, "downloading artifact from S3");

        let data = self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| map_s3_error("get_object", e, &key))?;
            output
                .body
                .collect()
                .await
                .map_err(|e| BackupError::storage(format!("failed to read S3 object stream: {e}")))
        })?;

        fs::write(dest, data.into_bytes())
            .map_err(|e| BackupError::storage(format!("failed to write {}: {e}", dest.display())))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        self.runtime.block_on(async {
            let mut names = Vec::new();
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix((!self.prefix.is_empty()).then(|| self.prefix.clone()))
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| map_s3_error("list_objects_v2", e, &self.prefix))?;
                for object in page.contents() {
                    if let Some(name) = object.key().and_then(|key| strip_key_prefix(&self.prefix, key)) {
                        names.push(name.to_string());
                    }
                }
            }
            Ok(names)
        })
    }

    fn delete(&self, name: &str) -> Result<()> {
        let key = self.key(name);
        info!(bucket = %self.bucket, key = %key, "deleting artifact from S3");

        self.runtime
            .block_on(async {
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .send()
                    .await
            })
            .map_err(|e| map_s3_error("delete_object", e, &key))?;
        Ok(())
    }
}

fn prefixed_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Strip the configured prefix from a listed key. Keys outside the prefix
/// (and bare "directory" markers) yield `None`.
fn strip_key_prefix<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let name = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix)?.strip_prefix('/')?
    };
    (!name.is_empty()).then_some(name)
}

/// Map AWS SDK errors to [`BackupError::Storage`] with the key attached.
fn map_s3_error<E, R>(op: &str, error: SdkError<E, R>, key: &str) -> BackupError
where
    E: ProvideErrorMetadata + fmt::Debug,
    R: fmt::Debug,
{
    match &error {
        SdkError::ServiceError(service_err) => match service_err.err().code() {
            Some("NoSuchBucket") => BackupError::storage(format!("S3 bucket not found ({op})")),
            Some("NoSuchKey") => BackupError::storage(format!("S3 object '{key}' not found")),
            Some("AccessDenied") | Some("Forbidden") => BackupError::storage(format!(
                "access denied to S3 (check credentials and permissions; key: {key})"
            )),
            Some(code) => BackupError::storage(format!(
                "S3 {op} failed ({code}): {} (key: {key})",
                service_err.err().message().unwrap_or("unknown error")
            )),
            None => BackupError::storage(format!("S3 {op} failed: {service_err:?} (key: {key})")),
        },
        SdkError::TimeoutError(_) => {
            BackupError::storage(format!("S3 {op} request timed out (key: {key})"))
        }
        SdkError::DispatchFailure(dispatch_err) => BackupError::storage(format!(
            "S3 {op} request failed to dispatch: {dispatch_err:?} (key: {key})"
        )),
        _ => BackupError::storage(format!("S3 {op} error: {error:?} (key: {key})")),
    }
}
