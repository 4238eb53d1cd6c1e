//! Content-addressable hashing for run provenance.
//!
//! Every digest carries its algorithm (`sha256:<hex>`, `blake3:<hex>`,
//! `md5:<hex>`) so a consumer can recompute and compare without knowing
//! how the run was configured.

use crate::errors::HashError;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Cryptographic default.
    #[default]
    Sha256,
    /// Fast alternate for large datasets.
    Blake3,
    /// Legacy digests from older manifests. Not collision resistant.
    Md5,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
            HashAlgorithm::Md5 => "md5",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            "md5" => Ok(HashAlgorithm::Md5),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// An algorithm-tagged digest, printed and serialized as `<algorithm>:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alg, hex_part) = s
            .split_once(':')
            .ok_or_else(|| HashError::MalformedDigest(s.to_string()))?;
        if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::MalformedDigest(s.to_string()));
        }
        Ok(Digest {
            algorithm: alg.parse()?,
            hex: hex_part.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = HashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}

enum StreamHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
    Md5(md5::Context),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => StreamHasher::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Md5 => StreamHasher::Md5(md5::Context::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Sha256(h) => h.update(data),
            StreamHasher::Blake3(h) => {
                h.update(data);
            }
            StreamHasher::Md5(h) => h.consume(data),
        }
    }

    fn finish(self) -> String {
        match self {
            StreamHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamHasher::Blake3(h) => h.finalize().to_hex().to_string(),
            StreamHasher::Md5(h) => format!("{:x}", h.compute()),
        }
    }
}

/// Hashes files, strings, structured values and prompt templates with one
/// configured algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReproducibilityHasher {
    algorithm: HashAlgorithm,
}

impl ReproducibilityHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hash_bytes(&self, data: &[u8]) -> Digest {
        let mut h = StreamHasher::new(self.algorithm);
        h.update(data);
        self.digest(h)
    }

    /// Streams `reader` through the hasher in fixed-size chunks.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> std::io::Result<Digest> {
        let mut h = StreamHasher::new(self.algorithm);
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            h.update(&buf[..n]);
        }
        Ok(self.digest(h))
    }

    pub fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        if !path.exists() {
            return Err(HashError::FileNotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.hash_reader(std::io::BufReader::new(file))
            .map_err(|source| HashError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn hash_string(&self, content: &str) -> Digest {
        self.hash_bytes(content.as_bytes())
    }

    /// Hashes the canonical (RFC 8785, key-sorted) JSON form of `value`, so
    /// maps with the same entries hash the same regardless of insertion order.
    pub fn hash_dict<T: Serialize + ?Sized>(&self, value: &T) -> Result<Digest, HashError> {
        let canonical = serde_jcs::to_string(value)?;
        Ok(self.hash_string(&canonical))
    }

    pub fn hash_prompt(&self, template: &str, version: &str) -> Digest {
        self.hash_string(&format!("version:{version}\n{template}"))
    }

    /// Recomputes with the digest's own algorithm, whatever this hasher uses.
    pub fn verify_bytes(expected: &Digest, data: &[u8]) -> bool {
        ReproducibilityHasher::new(expected.algorithm).hash_bytes(data) == *expected
    }

    pub fn verify_file(expected: &Digest, path: &Path) -> Result<bool, HashError> {
        let actual = ReproducibilityHasher::new(expected.algorithm).hash_file(path)?;
        if actual != *expected {
            tracing::warn!(
                path = %path.display(),
                expected = %expected,
                actual = %actual,
                "digest mismatch"
            );
        }
        Ok(actual == *expected)
    }

    fn digest(&self, h: StreamHasher) -> Digest {
        Digest {
            algorithm: self.algorithm,
            hex: h.finish(),
        }
    }
}
