//! Purpose: Binary snapshot cache for evaluated values, keyed by the source file's fingerprint.
//! Exports: `CacheCodec`, `CacheOptions`, `CacheLookup`, `CacheMismatch`, `CacheHeader`,
//! `CacheInfo`, `Fingerprint`, `default_cache_path`.
//! Role: Lets `Loader::load_path` skip lexing, validation and evaluation for unchanged sources.
//! Invariants: Record = magic (8) | source mtime secs (u64 LE) | source size (u64 LE) | payload.
//! Invariants: Payload = version | optional source digest | flat post-order node stream.
//! Invariants: The magic is written last; a record without it never satisfies a read.
//! Invariants: A stale or corrupt record is a `CacheLookup::Stale`, never an `Err`.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bincode::{DefaultOptions, Options};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::error::{Error, ErrorKind, io_error};
use crate::core::format::{
    CACHE_HEADER_LEN, CACHE_MAGIC, CACHE_PAYLOAD_VERSION, MAX_CACHE_PAYLOAD_LEN,
    is_supported_payload_version, payload_version_error,
};
use crate::core::snapshot::{self, Node};
use crate::core::value::Value;

const CACHE_DIR_NAME: &str = "__litcache__";
const CACHE_EXTENSION: &str = "cache";

/// Modification time (whole seconds) and length of a source file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fingerprint {
    pub mtime_secs: u64,
    pub size: u64,
}

impl Fingerprint {
    pub fn of(path: &Path) -> Result<Self, Error> {
        let metadata = fs::metadata(path)
            .map_err(|err| io_error(err, path, "failed to stat source file"))?;
        let mtime_secs = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Ok(Self {
            mtime_secs,
            size: metadata.len(),
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheHeader {
    pub fingerprint: Fingerprint,
}

impl CacheHeader {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self { fingerprint }
    }

    pub fn encode(&self) -> [u8; CACHE_HEADER_LEN] {
        let mut buf = self.encode_uncommitted();
        buf[0..8].copy_from_slice(&CACHE_MAGIC);
        buf
    }

    /// Header with a zeroed magic, written before the payload.
    pub fn encode_uncommitted(&self) -> [u8; CACHE_HEADER_LEN] {
        let mut buf = [0u8; CACHE_HEADER_LEN];
        write_u64(&mut buf, 8, self.fingerprint.mtime_secs);
        write_u64(&mut buf, 16, self.fingerprint.size);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CacheMismatch> {
        if buf.len() < CACHE_MAGIC.len() || buf[0..8] != CACHE_MAGIC {
            return Err(CacheMismatch::UnexpectedMagic);
        }
        if buf.len() < CACHE_HEADER_LEN {
            return Err(CacheMismatch::Truncated);
        }
        Ok(Self::new(Fingerprint {
            mtime_secs: read_u64(buf, 8),
            size: read_u64(buf, 16),
        }))
    }
}

/// Why a cache record cannot stand in for its source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CacheMismatch {
    Missing,
    UnexpectedMagic,
    Truncated,
    SizeMismatch { cached: u64, current: u64 },
    TimestampMismatch { cached: u64, current: u64 },
    DigestMismatch,
    UnsupportedVersion(u32),
    Deserialize(String),
}

impl CacheMismatch {
    pub fn reason(&self) -> &'static str {
        match self {
            CacheMismatch::Missing => "cache file missing",
            CacheMismatch::UnexpectedMagic => "unexpected magic",
            CacheMismatch::Truncated => "truncated header",
            CacheMismatch::SizeMismatch { .. } => "size mismatch",
            CacheMismatch::TimestampMismatch { .. } => "timestamp mismatch",
            CacheMismatch::DigestMismatch => "digest mismatch",
            CacheMismatch::UnsupportedVersion(_) => "unsupported payload version",
            CacheMismatch::Deserialize(_) => "deserialization error",
        }
    }

    pub fn into_error(self) -> Error {
        match self {
            CacheMismatch::UnsupportedVersion(version) => payload_version_error(version),
            other => Error::new(ErrorKind::CacheMismatch).with_message(other.to_string()),
        }
    }
}

impl fmt::Display for CacheMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMismatch::SizeMismatch { cached, current } => {
                write!(f, "size mismatch (cached {cached}, source {current})")
            }
            CacheMismatch::TimestampMismatch { cached, current } => {
                write!(f, "timestamp mismatch (cached {cached}, source {current})")
            }
            CacheMismatch::UnsupportedVersion(version) => {
                write!(f, "unsupported payload version {version}")
            }
            CacheMismatch::Deserialize(detail) => write!(f, "deserialization error: {detail}"),
            other => f.write_str(other.reason()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CacheLookup {
    Fresh(Value),
    Stale(CacheMismatch),
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheOptions {
    /// Store a SHA-256 of the source and require it to match on read.
    pub verify_digest: bool,
}

/// Header facts of a committed record, for `safelit cache info`.
#[derive(Clone, Debug, Serialize)]
pub struct CacheInfo {
    pub path: PathBuf,
    pub source_mtime_secs: u64,
    pub source_size: u64,
    pub payload_version: u32,
    pub payload_len: u64,
    pub has_digest: bool,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    digest: Option<[u8; 32]>,
    nodes: &'a [Node],
}

struct Envelope {
    version: u32,
    digest: Option<[u8; 32]>,
    value: Value,
}

#[derive(Clone, Debug, Default)]
pub struct CacheCodec {
    options: CacheOptions,
}

impl CacheCodec {
    pub fn new(options: CacheOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> CacheOptions {
        self.options
    }

    /// Writes `value` as the snapshot of `source` and returns the cache path.
    pub fn write(&self, value: &Value, source: &Path, cache_path: &Path) -> Result<PathBuf, Error> {
        self.write_record(value, source, cache_path, true)
    }

    fn write_record(
        &self,
        value: &Value,
        source: &Path,
        cache_path: &Path,
        commit: bool,
    ) -> Result<PathBuf, Error> {
        let fingerprint = Fingerprint::of(source)?;
        let nodes = snapshot::flatten(value).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("value cannot be cached: {err}"))
                .with_path(cache_path)
        })?;
        let digest = if self.options.verify_digest {
            Some(source_digest(source)?)
        } else {
            None
        };

        if let Some(parent) = cache_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| io_error(err, parent, "failed to create cache directory"))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(cache_path)
            .map_err(|err| io_error(err, cache_path, "failed to open cache file"))?;
        let mut writer = BufWriter::new(file);
        let write_failed = |err: io::Error| io_error(err, cache_path, "failed to write cache file");

        writer
            .write_all(&CacheHeader::new(fingerprint).encode_uncommitted())
            .map_err(write_failed)?;
        let envelope = EnvelopeRef {
            version: CACHE_PAYLOAD_VERSION,
            digest,
            nodes: &nodes,
        };
        payload_codec()
            .serialize_into(&mut writer, &envelope)
            .map_err(|err| match *err {
                bincode::ErrorKind::Io(err) => write_failed(err),
                other => Error::new(ErrorKind::Internal)
                    .with_message("failed to encode cache payload")
                    .with_path(cache_path)
                    .with_source(other),
            })?;
        writer.flush().map_err(write_failed)?;
        let mut file = writer
            .into_inner()
            .map_err(|err| write_failed(err.into_error()))?;

        if commit {
            file.seek(SeekFrom::Start(0)).map_err(write_failed)?;
            file.write_all(&CACHE_MAGIC).map_err(write_failed)?;
            file.flush().map_err(write_failed)?;
        }
        debug!(
            source = %source.display(),
            cache = %cache_path.display(),
            committed = commit,
            "cache record written"
        );
        Ok(cache_path.to_path_buf())
    }

    /// Returns the cached value when the record still describes `source`.
    pub fn read(&self, source: &Path, cache_path: &Path) -> Result<CacheLookup, Error> {
        let current = Fingerprint::of(source)?;
        let bytes = match fs::read(cache_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(cache = %cache_path.display(), "cache miss");
                return Ok(CacheLookup::Stale(CacheMismatch::Missing));
            }
            Err(err) => return Err(io_error(err, cache_path, "failed to read cache file")),
        };

        let lookup = self.check_record(&bytes, current, source)?;
        match &lookup {
            CacheLookup::Fresh(_) => debug!(cache = %cache_path.display(), "cache hit"),
            CacheLookup::Stale(reason) => {
                debug!(cache = %cache_path.display(), reason = %reason, "cache stale")
            }
        }
        Ok(lookup)
    }

    fn check_record(
        &self,
        bytes: &[u8],
        current: Fingerprint,
        source: &Path,
    ) -> Result<CacheLookup, Error> {
        let header = match CacheHeader::decode(bytes) {
            Ok(header) => header,
            Err(mismatch) => return Ok(CacheLookup::Stale(mismatch)),
        };
        let cached = header.fingerprint;
        if cached.size != current.size {
            return Ok(CacheLookup::Stale(CacheMismatch::SizeMismatch {
                cached: cached.size,
                current: current.size,
            }));
        }
        if current.mtime_secs > cached.mtime_secs {
            return Ok(CacheLookup::Stale(CacheMismatch::TimestampMismatch {
                cached: cached.mtime_secs,
                current: current.mtime_secs,
            }));
        }

        let envelope = match decode_envelope(&bytes[CACHE_HEADER_LEN..]) {
            Ok(envelope) => envelope,
            Err(mismatch) => return Ok(CacheLookup::Stale(mismatch)),
        };
        if self.options.verify_digest {
            match envelope.digest {
                Some(stored) if stored == source_digest(source)? => {}
                _ => return Ok(CacheLookup::Stale(CacheMismatch::DigestMismatch)),
            }
        }
        Ok(CacheLookup::Fresh(envelope.value))
    }

    /// Reads the header and payload framing of a record without consulting its source.
    pub fn inspect(&self, cache_path: &Path) -> Result<CacheInfo, Error> {
        let bytes = fs::read(cache_path)
            .map_err(|err| io_error(err, cache_path, "failed to read cache file"))?;
        let header = CacheHeader::decode(&bytes)
            .map_err(|mismatch| mismatch.into_error().with_path(cache_path))?;
        let envelope = decode_envelope(&bytes[CACHE_HEADER_LEN..])
            .map_err(|mismatch| mismatch.into_error().with_path(cache_path))?;
        Ok(CacheInfo {
            path: cache_path.to_path_buf(),
            source_mtime_secs: header.fingerprint.mtime_secs,
            source_size: header.fingerprint.size,
            payload_version: envelope.version,
            payload_len: (bytes.len() - CACHE_HEADER_LEN) as u64,
            has_digest: envelope.digest.is_some(),
        })
    }
}

/// `<source dir>/__litcache__/<file name>.cache`
pub fn default_cache_path(source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "source".into());
    let mut cache_name = file_name;
    cache_name.push(".");
    cache_name.push(CACHE_EXTENSION);
    let dir = source.parent().unwrap_or_else(|| Path::new(""));
    dir.join(CACHE_DIR_NAME).join(cache_name)
}

pub fn source_digest(path: &Path) -> Result<[u8; 32], Error> {
    let mut file =
        File::open(path).map_err(|err| io_error(err, path, "failed to open source file"))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|err| io_error(err, path, "failed to read source file"))?;
    Ok(hasher.finalize().into())
}

fn payload_codec() -> impl Options {
    DefaultOptions::new().with_limit(MAX_CACHE_PAYLOAD_LEN)
}

fn decode_envelope(mut payload: &[u8]) -> Result<Envelope, CacheMismatch> {
    let malformed = |err: bincode::Error| CacheMismatch::Deserialize(err.to_string());
    let version: u32 = payload_codec()
        .deserialize_from(&mut payload)
        .map_err(malformed)?;
    if !is_supported_payload_version(version) {
        return Err(CacheMismatch::UnsupportedVersion(version));
    }
    let (digest, nodes): (Option<[u8; 32]>, Vec<Node>) = payload_codec()
        .deserialize_from(&mut payload)
        .map_err(malformed)?;
    if !payload.is_empty() {
        return Err(CacheMismatch::Deserialize(format!(
            "{} trailing bytes after payload",
            payload.len()
        )));
    }
    let value =
        snapshot::rebuild(nodes).map_err(|err| CacheMismatch::Deserialize(err.to_string()))?;
    Ok(Envelope {
        version,
        digest,
        value,
    })
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(read_8(buf, offset))
}

fn read_8(buf: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    out
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::{
        CacheCodec, CacheHeader, CacheLookup, CacheMismatch, CacheOptions, Fingerprint,
        default_cache_path, payload_codec,
    };
    use crate::core::error::ErrorKind;
    use crate::core::format::{
        CACHE_HEADER_LEN, CACHE_MAGIC, CACHE_PAYLOAD_VERSION, MAX_CACHE_VALUE_DEPTH,
    };
    use crate::core::snapshot::Node;
    use crate::core::value::Value;
    use bincode::Options;
    use std::fs::{self, File};
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    const BASE_SECS: u64 = 1_700_000_000;

    fn set_mtime(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).expect("open source");
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
            .expect("set mtime");
    }

    fn sample_value() -> Value {
        Value::Dict(vec![
            (Value::from("name"), Value::from("widget")),
            (
                Value::from("sizes"),
                Value::List(vec![Value::Int(1), Value::Int(2), Value::Float(2.5)]),
            ),
        ])
    }

    fn source_file(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("doc.lit");
        fs::write(&path, text).expect("write source");
        set_mtime(&path, BASE_SECS);
        path
    }

    #[test]
    fn header_encodes_little_endian_fields() {
        let header = CacheHeader::new(Fingerprint {
            mtime_secs: 0x0102,
            size: 7,
        });
        let buf = header.encode();
        assert_eq!(&buf[0..8], &CACHE_MAGIC);
        assert_eq!(&buf[8..16], &0x0102u64.to_le_bytes());
        assert_eq!(&buf[16..24], &7u64.to_le_bytes());
        assert_eq!(CacheHeader::decode(&buf), Ok(header));
        assert_eq!(
            CacheHeader::decode(&header.encode_uncommitted()),
            Err(CacheMismatch::UnexpectedMagic)
        );
        assert_eq!(
            CacheHeader::decode(&buf[..12]),
            Err(CacheMismatch::Truncated)
        );
    }

    #[test]
    fn round_trip_is_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "{'name': 'widget'}\n");
        let cache_path = dir.path().join("nested").join("doc.cache");
        let codec = CacheCodec::default();

        let written = codec
            .write(&sample_value(), &source, &cache_path)
            .expect("write");
        assert_eq!(written, cache_path);
        let lookup = codec.read(&source, &cache_path).expect("read");
        assert_eq!(lookup, CacheLookup::Fresh(sample_value()));
    }

    #[test]
    fn missing_cache_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "1\n");
        let lookup = CacheCodec::default()
            .read(&source, &dir.path().join("absent.cache"))
            .expect("read");
        assert_eq!(lookup, CacheLookup::Stale(CacheMismatch::Missing));
    }

    #[test]
    fn size_change_is_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "[1, 2]\n");
        let cache_path = dir.path().join("doc.cache");
        let codec = CacheCodec::default();
        codec
            .write(&Value::Int(1), &source, &cache_path)
            .expect("write");

        fs::write(&source, "[1, 2, 3]\n").expect("rewrite");
        set_mtime(&source, BASE_SECS);
        let lookup = codec.read(&source, &cache_path).expect("read");
        let CacheLookup::Stale(mismatch) = lookup else {
            panic!("expected stale lookup");
        };
        assert_eq!(mismatch.reason(), "size mismatch");
        assert!(mismatch.to_string().starts_with("size mismatch"));
    }

    #[test]
    fn newer_source_is_stale_but_equal_mtime_is_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let codec = CacheCodec::default();
        codec
            .write(&Value::Int(42), &source, &cache_path)
            .expect("write");

        set_mtime(&source, BASE_SECS);
        assert_eq!(
            codec.read(&source, &cache_path).expect("read"),
            CacheLookup::Fresh(Value::Int(42))
        );

        set_mtime(&source, BASE_SECS + 10);
        assert_eq!(
            codec.read(&source, &cache_path).expect("read"),
            CacheLookup::Stale(CacheMismatch::TimestampMismatch {
                cached: BASE_SECS,
                current: BASE_SECS + 10,
            })
        );

        set_mtime(&source, BASE_SECS - 10);
        assert_eq!(
            codec.read(&source, &cache_path).expect("read"),
            CacheLookup::Fresh(Value::Int(42))
        );
    }

    #[test]
    fn corrupted_magic_is_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let codec = CacheCodec::default();
        codec
            .write(&Value::Int(42), &source, &cache_path)
            .expect("write");

        let mut bytes = fs::read(&cache_path).expect("read cache");
        bytes[0] ^= 0xff;
        fs::write(&cache_path, &bytes).expect("corrupt");
        assert_eq!(
            codec.read(&source, &cache_path).expect("read"),
            CacheLookup::Stale(CacheMismatch::UnexpectedMagic)
        );
    }

    #[test]
    fn uncommitted_record_is_never_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let codec = CacheCodec::default();
        codec
            .write_record(&Value::Int(42), &source, &cache_path, false)
            .expect("write");

        let bytes = fs::read(&cache_path).expect("read cache");
        assert_eq!(&bytes[0..8], &[0u8; 8]);
        assert_eq!(
            codec.read(&source, &cache_path).expect("read"),
            CacheLookup::Stale(CacheMismatch::UnexpectedMagic)
        );
    }

    #[test]
    fn truncated_header_is_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let mut bytes = CACHE_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        fs::write(&cache_path, &bytes).expect("write");
        let lookup = CacheCodec::default()
            .read(&source, &cache_path)
            .expect("read");
        assert_eq!(lookup, CacheLookup::Stale(CacheMismatch::Truncated));
    }

    #[test]
    fn garbage_payload_is_a_deserialization_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let codec = CacheCodec::default();
        codec
            .write(&Value::Int(42), &source, &cache_path)
            .expect("write");

        let mut bytes = fs::read(&cache_path).expect("read cache");
        bytes.truncate(CACHE_HEADER_LEN + 1);
        fs::write(&cache_path, &bytes).expect("truncate payload");
        let CacheLookup::Stale(mismatch) = codec.read(&source, &cache_path).expect("read") else {
            panic!("expected stale lookup");
        };
        assert!(matches!(mismatch, CacheMismatch::Deserialize(_)));
        assert!(mismatch.to_string().starts_with("deserialization error"));
    }

    #[test]
    fn unknown_payload_version_is_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let fingerprint = Fingerprint::of(&source).expect("fingerprint");

        let mut bytes = CacheHeader::new(fingerprint).encode().to_vec();
        bytes.extend(payload_codec().serialize(&99u32).expect("encode version"));
        fs::write(&cache_path, &bytes).expect("write");
        assert_eq!(
            CacheCodec::default()
                .read(&source, &cache_path)
                .expect("read"),
            CacheLookup::Stale(CacheMismatch::UnsupportedVersion(99))
        );
    }

    fn record_with_nodes(source: &Path, nodes: &[Node]) -> Vec<u8> {
        let fingerprint = Fingerprint::of(source).expect("fingerprint");
        let mut bytes = CacheHeader::new(fingerprint).encode().to_vec();
        bytes.extend(
            payload_codec()
                .serialize(&CACHE_PAYLOAD_VERSION)
                .expect("encode version"),
        );
        bytes.extend(
            payload_codec()
                .serialize(&(None::<[u8; 32]>, nodes))
                .expect("encode nodes"),
        );
        bytes
    }

    #[test]
    fn hostile_nesting_in_payload_is_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let mut nodes = vec![Node::Int(0)];
        nodes.extend(std::iter::repeat_n(Node::Set(1), 2_000_000));
        fs::write(&cache_path, record_with_nodes(&source, &nodes)).expect("write");

        let CacheLookup::Stale(mismatch) = CacheCodec::default()
            .read(&source, &cache_path)
            .expect("read")
        else {
            panic!("expected stale lookup");
        };
        assert_eq!(
            mismatch,
            CacheMismatch::Deserialize(format!(
                "value nests deeper than {MAX_CACHE_VALUE_DEPTH} levels"
            ))
        );
    }

    #[test]
    fn dangling_container_in_payload_is_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        fs::write(
            &cache_path,
            record_with_nodes(&source, &[Node::Int(1), Node::List(3)]),
        )
        .expect("write");
        let CacheLookup::Stale(mismatch) = CacheCodec::default()
            .read(&source, &cache_path)
            .expect("read")
        else {
            panic!("expected stale lookup");
        };
        assert_eq!(mismatch.reason(), "deserialization error");
    }

    #[test]
    fn values_deeper_than_the_record_limit_are_not_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let mut value = Value::None;
        for _ in 0..MAX_CACHE_VALUE_DEPTH {
            value = Value::Tuple(vec![value]);
        }
        let err = CacheCodec::default()
            .write(&value, &source, &cache_path)
            .expect_err("too deep");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(!cache_path.exists());
    }

    #[test]
    fn digest_mode_catches_same_second_rewrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "'aaaa'\n");
        let cache_path = dir.path().join("doc.cache");
        let strict = CacheCodec::new(CacheOptions {
            verify_digest: true,
        });
        strict
            .write(&Value::from("aaaa"), &source, &cache_path)
            .expect("write");
        assert_eq!(
            strict.read(&source, &cache_path).expect("read"),
            CacheLookup::Fresh(Value::from("aaaa"))
        );

        fs::write(&source, "'bbbb'\n").expect("rewrite");
        set_mtime(&source, BASE_SECS);
        assert_eq!(
            CacheCodec::default()
                .read(&source, &cache_path)
                .expect("read"),
            CacheLookup::Fresh(Value::from("aaaa"))
        );
        assert_eq!(
            strict.read(&source, &cache_path).expect("read"),
            CacheLookup::Stale(CacheMismatch::DigestMismatch)
        );
    }

    #[test]
    fn digest_mode_rejects_records_written_without_digest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        CacheCodec::default()
            .write(&Value::Int(42), &source, &cache_path)
            .expect("write");
        let strict = CacheCodec::new(CacheOptions {
            verify_digest: true,
        });
        assert_eq!(
            strict.read(&source, &cache_path).expect("read"),
            CacheLookup::Stale(CacheMismatch::DigestMismatch)
        );
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = CacheCodec::default()
            .read(&dir.path().join("absent.lit"), &dir.path().join("x.cache"))
            .expect_err("missing source");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn full_device_write_fails_with_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let err = CacheCodec::default()
            .write(&Value::Int(42), &source, Path::new("/dev/full"))
            .expect_err("device full");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn inspect_reports_header_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let strict = CacheCodec::new(CacheOptions {
            verify_digest: true,
        });
        strict
            .write(&Value::Int(42), &source, &cache_path)
            .expect("write");
        let info = strict.inspect(&cache_path).expect("inspect");
        assert_eq!(info.source_mtime_secs, BASE_SECS);
        assert_eq!(info.source_size, 3);
        assert_eq!(info.payload_version, 1);
        assert!(info.has_digest);

        fs::write(&cache_path, b"not a cache").expect("clobber");
        let err = strict.inspect(&cache_path).expect_err("bad magic");
        assert_eq!(err.kind(), ErrorKind::CacheMismatch);
        assert_eq!(err.message(), Some("unexpected magic"));
    }

    #[test]
    fn inspect_lists_supported_versions_for_unknown_payloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_file(dir.path(), "42\n");
        let cache_path = dir.path().join("doc.cache");
        let fingerprint = Fingerprint::of(&source).expect("fingerprint");
        let mut bytes = CacheHeader::new(fingerprint).encode().to_vec();
        bytes.extend(payload_codec().serialize(&7u32).expect("encode version"));
        fs::write(&cache_path, &bytes).expect("write");

        let err = CacheCodec::default()
            .inspect(&cache_path)
            .expect_err("unknown version");
        assert_eq!(err.kind(), ErrorKind::CacheMismatch);
        assert_eq!(
            err.message(),
            Some("unsupported payload version 7 (supported: 1)")
        );
        assert!(err.hint().is_some());
        assert_eq!(err.path(), Some(cache_path.as_path()));
    }

    #[test]
    fn default_cache_path_sits_beside_source() {
        assert_eq!(
            default_cache_path(Path::new("/data/conf/app.lit")),
            Path::new("/data/conf/__litcache__/app.lit.cache")
        );
        assert_eq!(
            default_cache_path(Path::new("app.lit")),
            Path::new("__litcache__/app.lit.cache")
        );
    }

    #[test]
    fn fingerprint_truncates_to_seconds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.lit");
        fs::write(&path, "12345").expect("write");
        let file = File::options().write(true).open(&path).expect("open");
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_millis(5_900))
            .expect("set mtime");
        let fingerprint = Fingerprint::of(&path).expect("fingerprint");
        assert_eq!(fingerprint, Fingerprint { mtime_secs: 5, size: 5 });
    }
}
