//! # s3dock
//!
//! **Registry-less container image distribution over S3-compatible object
//! storage.**
//!
//! Instead of running a registry, s3dock persists images as
//! timestamp-normalized gzipped tars in an object store, next to a small
//! tree of JSON pointer documents that model semantic versions,
//! per-environment "current" pointers, and an append-only audit log.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              s3dock                                  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  Services                                                            │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌────────────┐  │
//! │  │ Pusher   │ │ Tagger   │ │ Promoter │ │ Puller   │ │ List /     │  │
//! │  │ export → │ │ ref →    │ │ env ptr  │ │ resolve →│ │ Current    │  │
//! │  │ dedup →  │ │ tag ptr  │ │ + audit  │ │ verify → │ │ queries    │  │
//! │  │ upload   │ │          │ │          │ │ import   │ │            │  │
//! │  └────┬─────┘ └────┬─────┘ └────┬─────┘ └────┬─────┘ └─────┬──────┘  │
//! ├───────┼────────────┼────────────┼────────────┼─────────────┼─────────┤
//! │  Adapters          │            │            │             │         │
//! │  ┌─────────────────┴────┐  ┌────┴─────────┐  ┌┴──────────────────┐   │
//! │  │ ObjectStore (S3)     │  │ Container    │  │ VcsClient (git2)  │   │
//! │  │ get/put/head/copy/   │  │ Runtime      │  │ hash / timestamp  │   │
//! │  │ delete/list          │  │ (docker CLI) │  │ dirty / root      │   │
//! │  └──────────────────────┘  └──────────────┘  └───────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Object Store Layout
//!
//! ```text
//! images/{app}/{YYYYMM}/{app}-{gitTime}-{gitHash}.tar.gz   image blob
//! images/{app}/{YYYYMM}/{app}-{gitTime}-{gitHash}.json     metadata sidecar
//! tags/{app}/{version}.json                                tag pointer
//! pointers/{app}/{environment}.json                        environment pointer
//! audit/{app}/{YYYYMM}/{ts}-{event}-{gitHash}.json         audit record
//! archive/{app}/{YYYYMM}/...-archived-on-{ts}.tar.gz       archived blob
//! ```
//!
//! # Determinism
//!
//! Deduplication hinges on byte-stable exports: the [`tarball`] pipeline
//! pins every tar header's mtime to the committer timestamp and the gzip
//! header's mtime to zero, so the same commit plus the same image content
//! always produces the same blob bytes and the same MD5. See
//! [`tarball::compress_export`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use s3dock::{
//!     config, DockerCli, GitRepo, ImagePusher, ImagePromoter, Reporter, S3Store,
//! };
//!
//! #[tokio::main]
//! async fn main() -> s3dock::Result<()> {
//!     let cfg = config::resolve(None, None, None)?;
//!     let reporter = Reporter::new(true);
//!     let store = Arc::new(S3Store::connect(&cfg, reporter).await?);
//!
//!     let pusher = ImagePusher::new(
//!         Arc::new(DockerCli::new()),
//!         store.clone(),
//!         Arc::new(GitRepo::new()),
//!         cfg.bucket.clone(),
//!         reporter,
//!     );
//!     let outcome = pusher.push("myapp:20250721-2118-f7a5a27").await?;
//!     println!("stored at {}", outcome.s3_key);
//!
//!     ImagePromoter::new(store, cfg.bucket)
//!         .promote("myapp:20250721-2118-f7a5a27", "production")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod builder;
pub mod config;
pub mod constants;
pub mod current;
pub mod docker;
pub mod error;
pub mod git;
pub mod keys;
pub mod list;
pub mod metadata;
pub mod output;
pub mod pointer;
pub mod progress;
pub mod promoter;
pub mod puller;
pub mod pusher;
pub mod store;
pub mod tagger;
pub mod tarball;

pub use audit::{AuditEvent, AuditLogger, EventDetails, EventType, StoreAuditLogger};
pub use builder::{BuildOutcome, ImageBuilder};
pub use config::{Config, ResolvedConfig};
pub use current::{CurrentOutcome, CurrentService};
pub use docker::{ContainerRuntime, DockerCli};
pub use error::{Error, Result};
pub use git::{GitRepo, VcsClient};
pub use list::{EnvEntry, ImageEntry, ListService, TagEntry};
pub use metadata::ImageMetadata;
pub use output::OutputFormat;
pub use pointer::{PointerMetadata, TargetType};
pub use progress::Reporter;
pub use promoter::{ImagePromoter, PromoteOutcome};
pub use puller::{ImagePuller, PullOutcome};
pub use pusher::{ImagePusher, PushOutcome};
pub use store::{ObjectStore, S3Store};
pub use tagger::{ImageTagger, TagOutcome};
pub use tarball::CompressedImage;
