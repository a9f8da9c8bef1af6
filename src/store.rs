//! # Object Store Adapter
//!
//! Trait abstraction over the S3 API surface the distribution layer needs,
//! plus the AWS SDK implementation. Services depend on [`ObjectStore`] so
//! tests can substitute an in-memory store.
//!
//! ## Virtual-hosted endpoints
//!
//! Some S3-compatible providers hand out endpoints that embed the bucket as
//! the leading hostname label (`https://mybucket.s3.region.example.com`).
//! Most operations work against such an endpoint as-is, but `ListObjectsV2`
//! does not: the request must go to the base endpoint
//! (`https://s3.region.example.com`) with the bucket folded into the key
//! prefix. [`S3Store`] detects the `.s3.` marker, keeps a sibling client
//! configured with the base endpoint for listing, silently prepends
//! `{bucket}/` to every list prefix, and strips the same prefix from
//! returned keys. Both clients use path-style addressing.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::error::{Error, Result};
use crate::progress::{self, Reporter};

/// Boxed async reader returned by streaming downloads.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Blocking-style (await-based) object store operations.
///
/// All operations are safe to call concurrently. Not-found on `exists` is
/// normalized to `Ok(false)`; every other failure surfaces as
/// [`Error::Store`]. Retrying is the caller's concern.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads an object.
    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// Uploads an object, rendering byte progress under `label`.
    /// A negative `size` renders a spinner instead of a bar.
    async fn upload_with_progress(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        size: i64,
        label: &str,
    ) -> Result<()>;

    /// Returns whether an object exists. Not-found is not an error.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Downloads an object fully into memory. Intended for the small JSON
    /// documents; blobs go through [`ObjectStore::download_stream`].
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Opens a streaming read of an object.
    async fn download_stream(&self, bucket: &str, key: &str) -> Result<ObjectReader>;

    /// Server-side copy; the source object is retained.
    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()>;

    /// Deletes an object. Deleting a missing object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Lists all keys under a prefix, following pagination.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

/// AWS SDK implementation of [`ObjectStore`].
pub struct S3Store {
    client: Client,
    list_client: Client,
    /// `{bucket}/` when the endpoint embeds the bucket hostname, else empty.
    key_prefix: String,
    reporter: Reporter,
}

impl S3Store {
    /// Connects using resolved configuration (region, optional endpoint and
    /// static credentials).
    pub async fn connect(config: &ResolvedConfig, reporter: Reporter) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "s3dock-config",
            ));
        }

        let base = loader.load().await;

        let make_client = |endpoint: Option<&str>| {
            let mut builder = aws_sdk_s3::config::Builder::from(&base).force_path_style(true);
            if let Some(url) = endpoint {
                builder = builder.endpoint_url(url);
            }
            Client::from_conf(builder.build())
        };

        let client = make_client(config.endpoint.as_deref());

        // A bucket-subdomain endpoint needs a sibling client for listing.
        let (list_client, key_prefix) = match config
            .endpoint
            .as_deref()
            .and_then(extract_base_endpoint)
        {
            Some((base_endpoint, bucket)) => {
                debug!(
                    %base_endpoint,
                    %bucket,
                    "detected bucket-subdomain endpoint, using separate list client"
                );
                (make_client(Some(&base_endpoint)), format!("{bucket}/"))
            }
            None => (client.clone(), String::new()),
        };

        Ok(Self {
            client,
            list_client,
            key_prefix,
            reporter,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| store_error("put", key, &e))?;
        Ok(())
    }

    async fn upload_with_progress(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        size: i64,
        label: &str,
    ) -> Result<()> {
        let bar = self.reporter.bytes(size, label);

        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await;

        if let Some(bar) = &bar {
            if size >= 0 {
                bar.set_position(size as u64);
            }
        }
        progress::finish(bar);

        result.map_err(|e| store_error("put", key, &e))?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()) == Some(true) => Ok(false),
            Err(e) => Err(store_error("head", key, &e)),
        }
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error("get", key, &e))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Store(format!("get {key}: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn download_stream(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error("get", key, &e))?;
        Ok(Box::new(output.body.into_async_read()))
    }

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(format!("{bucket}/{src_key}"))
            .key(dst_key)
            .send()
            .await
            .map_err(|e| store_error("copy", src_key, &e))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error("delete", key, &e))?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = format!("{}{}", self.key_prefix, prefix);
        debug!(bucket, prefix, %full_prefix, "listing objects");

        let mut pages = self
            .list_client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(&full_prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| store_error("list", prefix, &e))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(strip_list_prefix(&self.key_prefix, key).to_string());
                }
            }
        }

        Ok(keys)
    }
}

/// Formats an SDK error with its full causal context.
fn store_error<E>(operation: &str, key: &str, err: &E) -> Error
where
    E: std::error::Error,
{
    Error::Store(format!("{operation} {key}: {}", DisplayErrorContext(err)))
}

/// Detects a bucket-subdomain endpoint and splits it into the base endpoint
/// and the bucket name. `https://mybucket.s3.us-east-1.example.com` yields
/// `("https://s3.us-east-1.example.com", "mybucket")`.
fn extract_base_endpoint(endpoint: &str) -> Option<(String, String)> {
    let (scheme, host) = endpoint
        .strip_prefix("https://")
        .map(|rest| ("https://", rest))
        .or_else(|| endpoint.strip_prefix("http://").map(|rest| ("http://", rest)))
        .unwrap_or(("", endpoint));

    let idx = host.find(".s3.")?;
    if idx == 0 {
        return None;
    }

    let bucket = &host[..idx];
    let rest = &host[idx + 1..];
    Some((format!("{scheme}{rest}"), bucket.to_string()))
}

/// Strips the virtual-host key prefix from a listed key, when present.
fn strip_list_prefix<'a>(key_prefix: &str, key: &'a str) -> &'a str {
    if key_prefix.is_empty() {
        return key;
    }
    key.strip_prefix(key_prefix).unwrap_or(key)
}
