//! # Deterministic Tar Export Pipeline
//!
//! Container runtimes stamp every `export` with fresh timestamps at two
//! levels: the per-entry `mtime` in tar headers and the `MTIME` field of the
//! gzip header. Two exports of the same image therefore differ byte-for-byte,
//! which defeats checksum-based deduplication in the object store.
//!
//! This module removes both sources of noise:
//!
//! - [`normalize_tar`] rewrites every tar header to a caller-supplied fixed
//!   modification time (the committer timestamp of the build) and zeroes the
//!   GNU access/change times, forwarding entry bodies untouched.
//! - [`compress_export`] chains the normalizer into a gzip encoder whose
//!   header `mtime` is pinned to zero, teeing the compressed bytes through
//!   an MD5 hasher into the upload buffer.
//!
//! With both in place, the same commit plus the same image content yields
//! the same blob bytes and the same checksum, so a re-push degrades to a
//! metadata comparison. The pipeline is streaming: the tar is never
//! materialized, only the final gzipped output is buffered because the
//! uploader needs a length and a rewindable body.

use std::io::{Read, Write};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use flate2::{Compression, GzBuilder};
use md5::{Digest, Md5};

use crate::constants::GIT_TIME_FORMAT;
use crate::error::{Error, Result};

/// A fully assembled, upload-ready compressed image.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    /// Gzipped, timestamp-normalized tar bytes.
    pub bytes: Vec<u8>,
    /// Hex MD5 of `bytes`.
    pub checksum: String,
    /// Length of `bytes`.
    pub size: i64,
}

/// Parses a git timestamp string (`YYYYMMDD-HHMM`) into a UTC wall-clock
/// time, the fixed time used for tar normalization.
pub fn parse_git_time(git_time: &str) -> Result<DateTime<Utc>> {
    // The format carries no seconds; parse date and time fields directly.
    let naive = NaiveDateTime::parse_from_str(&format!("{git_time}00"), "%Y%m%d-%H%M%S")
        .map_err(|_| Error::InvalidGitTime(git_time.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Rewrites a tar stream so that every header carries `mtime = fixed_time`
/// and zeroed access/change times, copying entry bodies verbatim in the
/// order read.
///
/// Idempotent: normalizing an already-normalized stream with the same
/// `fixed_time` reproduces it byte for byte. The output loads back into the
/// container runtime unchanged.
///
/// Returns the output writer so callers can finish chained encoders.
pub fn normalize_tar<R: Read, W: Write>(
    input: R,
    output: W,
    fixed_time: DateTime<Utc>,
) -> Result<W> {
    let mut archive = tar::Archive::new(input);
    let mut builder = tar::Builder::new(output);
    let mtime = fixed_time.timestamp().max(0) as u64;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let mut header = entry.header().clone();

        header.set_mtime(mtime);
        // Access/change times only exist in the GNU representation; the
        // USTAR layout produced by runtime exporters has no room for them.
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.set_atime(0);
            gnu.set_ctime(0);
        }
        header.set_cksum();

        builder.append(&header, &mut entry)?;
    }

    Ok(builder.into_inner()?)
}

/// Runs the full deterministic pipeline over an export stream:
/// normalize → gzip (header mtime zero) → tee into buffer + MD5.
pub fn compress_export<R: Read>(
    export: R,
    fixed_time: DateTime<Utc>,
) -> Result<CompressedImage> {
    let tee = Md5Writer::new(Vec::new());
    // An unset gzip mtime re-introduces nondeterminism; pin it to the epoch.
    let encoder = GzBuilder::new().mtime(0).write(tee, Compression::default());

    let encoder = normalize_tar(export, encoder, fixed_time)?;
    let tee = encoder.finish()?;
    let (bytes, digest) = tee.into_parts();

    Ok(CompressedImage {
        checksum: hex::encode(digest),
        size: bytes.len() as i64,
        bytes,
    })
}

/// Computes the hex MD5 of a byte slice.
pub fn checksum_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Computes the hex MD5 of a file's contents.
pub fn checksum_file(path: &std::path::Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Writer adapter that hashes everything written through it.
struct Md5Writer<W> {
    inner: W,
    hasher: Md5,
}

impl<W: Write> Md5Writer<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
        }
    }

    fn into_parts(self) -> (W, md5::digest::Output<Md5>) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for Md5Writer<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
