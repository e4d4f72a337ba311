//! Candidate query names.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::Arc,
};

use domain::base::Name;

use crate::error::CorpusError;

/// Names used when no corpus file is given.
const BUILTIN: [&str; 10] = [
    "amazon.com.",
    "bing.com.",
    "ebay.com.",
    "facebook.com.",
    "google.com.",
    "instagram.com.",
    "linkedin.com.",
    "twitter.com.",
    "yahoo.com.",
    "youtube.com.",
];

/// Immutable, ordered, non-empty list of absolute domain names.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct Corpus {
    names: Arc<[String]>,
}

impl Corpus {
    /// Loads names from the given file, one per line.
    ///
    /// Blank lines are skipped, names without the trailing dot are made
    /// absolute.
    pub fn from_fs<P>(path: P) -> Result<Self, CorpusError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        log::debug!("loading domain names from '{}' ...", path.display());

        let io_err = |source| CorpusError::Io { path: path.to_path_buf(), source };
        let rd = BufReader::new(File::open(path).map_err(io_err)?);

        let mut names = Vec::new();
        for (idx, line) in rd.lines().enumerate() {
            let line = line.map_err(io_err)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut name = line.to_string();
            if !name.ends_with('.') {
                name.push('.');
            }

            if let Err(err) = Name::<Vec<u8>>::vec_from_str(&name) {
                return Err(CorpusError::InvalidName {
                    line: idx + 1,
                    name,
                    reason: err.to_string(),
                });
            }

            names.push(name);
        }

        if names.is_empty() {
            return Err(CorpusError::Empty(path.to_path_buf()));
        }
        log::debug!("loaded {} domain names", names.len());

        Ok(Self { names: names.into() })
    }

    /// Returns the name for the given sequence number, cycling over the
    /// corpus.
    #[inline]
    pub fn get(&self, seq: u64) -> &str {
        let idx = (seq % self.names.len() as u64) as usize;
        &self.names[idx]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`: a corpus can not be constructed empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for Corpus {
    fn default() -> Self {
        let names: Vec<String> = BUILTIN.iter().map(|v| v.to_string()).collect();

        Self { names: names.into() }
    }
}
