//! File taggers map file names to tags.
//!
//! A tagger carries case-sensitive wildcard patterns and a tag set; a file
//! name receives the union of the tags of all taggers with a matching
//! pattern. The compiled matcher is rebuilt on construction and on
//! deserialization, so only the pattern sources travel through the store.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::language::filetags::FileTags;

#[derive(Debug, Clone)]
pub struct FileTagger {
  patterns: Vec<String>,
  file_tags: FileTags,
  matcher: GlobSet,
}

impl FileTagger {
  pub fn new(patterns: Vec<String>, file_tags: FileTags) -> Result<Self, globset::Error> {
    let matcher = compile_patterns(&patterns)?;
    Ok(Self {
      patterns,
      file_tags,
      matcher,
    })
  }

  pub fn patterns(&self) -> &[String] {
    &self.patterns
  }

  pub fn file_tags(&self) -> &FileTags {
    &self.file_tags
  }

  pub fn matches(&self, file_name: &str) -> bool {
    self.matcher.is_match(file_name)
  }
}

fn compile_patterns(patterns: &[String]) -> Result<GlobSet, globset::Error> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    assert!(!pattern.is_empty());
    builder.add(GlobBuilder::new(pattern).case_insensitive(false).build()?);
  }
  builder.build()
}

impl PartialEq for FileTagger {
  fn eq(&self, other: &Self) -> bool {
    self.patterns == other.patterns && self.file_tags == other.file_tags
  }
}

#[derive(Serialize, Deserialize)]
struct FileTaggerData {
  patterns: Vec<String>,
  file_tags: FileTags,
}

impl Serialize for FileTagger {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    FileTaggerData {
      patterns: self.patterns.clone(),
      file_tags: self.file_tags.clone(),
    }
    .serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for FileTagger {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let data = FileTaggerData::deserialize(deserializer)?;
    FileTagger::new(data.patterns, data.file_tags).map_err(D::Error::custom)
  }
}
