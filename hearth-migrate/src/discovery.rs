//! Migration file discovery.

use std::path::{Path, PathBuf};

use hearth_core::{HearthResult, MigrationError};
use once_cell::sync::Lazy;
use regex::Regex;

static FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_(.+)\.sql$").expect("Invalid migration filename regex"));

/// A migration script on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Digits exactly as written in the filename (`"001"`).
    pub version: String,
    pub name: String,
    pub filename: String,
    pub path: PathBuf,
}

impl MigrationFile {
    /// Parse a filename. `None` if it does not look like a migration.
    pub fn parse(dir: &Path, filename: &str) -> Option<Self> {
        let caps = FILENAME.captures(filename)?;
        Some(Self {
            version: caps[1].to_string(),
            name: caps[2].to_string(),
            filename: filename.to_string(),
            path: dir.join(filename),
        })
    }

    /// Version digits without leading zeros; `"001"` and `"1"` are the same
    /// version.
    pub fn canonical_version(&self) -> &str {
        let trimmed = self.version.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }

    /// Numeric value of the version, used for ordering.
    pub fn ordinal(&self) -> u128 {
        // Digits only; values too large to parse sort last.
        self.version.parse().unwrap_or(u128::MAX)
    }

    pub fn read_sql(&self) -> HearthResult<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            MigrationError::Discovery {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// List migrations in `dir`, ordered by numeric version.
///
/// Files that do not match `<digits>_<name>.sql` are skipped. Two files
/// sharing a version are a discovery error.
pub fn discover(dir: &Path) -> HearthResult<Vec<MigrationFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| MigrationError::Discovery {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MigrationError::Discovery {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        match MigrationFile::parse(dir, &filename) {
            Some(file) => files.push(file),
            None => tracing::debug!(file = %filename, "skipping non-migration file"),
        }
    }

    files.sort_by(|a, b| {
        a.ordinal()
            .cmp(&b.ordinal())
            .then_with(|| a.filename.cmp(&b.filename))
    });

    if let Some(pair) = files
        .windows(2)
        .find(|pair| pair[0].canonical_version() == pair[1].canonical_version())
    {
        return Err(MigrationError::Discovery {
            path: dir.display().to_string(),
            reason: format!(
                "duplicate migration version {}: {} and {}",
                pair[1].canonical_version(),
                pair[0].filename,
                pair[1].filename
            ),
        }
        .into());
    }
    Ok(files)
}
