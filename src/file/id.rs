use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::codec;
use super::error::StoreError;

pub const TOKEN_LEN: usize = 32;
pub const BUCKET_LEN: usize = 12;
pub const FILE_ID_LEN: usize = TOKEN_LEN + BUCKET_LEN;

const BUCKET_FORMAT: &str = "%Y%m%d%H%M";

/// Public identifier of a stored object.
///
/// Rendered as the 32 hex characters of the upload token followed by the
/// encoded `YYYYMMDDhhmm` bucket. The bucket is held here in decoded form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId {
    token: String,
    bucket: String,
}

impl FileId {
    /// Allocates a new id for an upload accepted at `at`.
    pub fn generate(at: NaiveDateTime) -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            bucket: at.format(BUCKET_FORMAT).to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.len() != FILE_ID_LEN || !raw.is_ascii() {
            return Err(StoreError::InvalidId(raw.to_string()));
        }
        let (token, encoded_bucket) = raw.split_at(TOKEN_LEN);
        // The token becomes a path segment, so anything but hex is refused.
        if !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidId(raw.to_string()));
        }
        Ok(Self {
            token: token.to_string(),
            bucket: codec::decode(encoded_bucket),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `<root>/<bucket>/<token>`
    pub fn dir_in(&self, root: &Path) -> PathBuf {
        root.join(&self.bucket).join(&self.token)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.token, codec::encode(&self.bucket))
    }
}

impl FromStr for FileId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
