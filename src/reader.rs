/*!
 * Readers for pharmacy, claim and revert input files
 *
 * Pharmacies come from a CSV file; claims and reverts come from a directory
 * of JSON files, each holding an array of events. Event files are read in
 * parallel and concatenated in file-name order, so a given directory always
 * loads the same way.
 */

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{error, info, warn};

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    Result, ClaimsError, ErrorContext,
    config::{AnalyticsConfig, ValidationLevel},
    data_types::*,
    schema::*,
};

/// Invalid records reported individually per file before going quiet
const MAX_REPORTED_INVALID: usize = 10;

/// Records read from one event file
#[derive(Debug, Clone)]
pub struct FileLoad<T> {
    pub path: PathBuf,
    pub records: Vec<T>,
    /// Records rejected by validation
    pub skipped: usize,
}

/// Reader for the three input collections
#[derive(Debug, Clone)]
pub struct ClaimsReader {
    /// Validation applied to every record
    validation_level: ValidationLevel,
    /// Whether to skip invalid records (true) or fail on first error (false)
    skip_invalid_records: bool,
    /// Whether to show progress bar
    #[cfg(feature = "progress")]
    show_progress_bar: bool,
}

impl Default for ClaimsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimsReader {
    /// Create a new reader with default settings
    pub fn new() -> Self {
        Self {
            validation_level: ValidationLevel::Standard,
            skip_invalid_records: true,
            #[cfg(feature = "progress")]
            show_progress_bar: false,
        }
    }

    /// Create a reader configured from an `AnalyticsConfig`
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new()
            .with_validation_level(config.validation_level)
            .with_skip_invalid_records(config.skip_invalid_records)
            .with_progress_bar(config.enable_progress_bar)
    }

    pub fn with_validation_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = level;
        self
    }

    /// Enable or disable skipping invalid records
    pub fn with_skip_invalid_records(mut self, skip: bool) -> Self {
        self.skip_invalid_records = skip;
        self
    }

    /// Enable or disable the progress bar; a no-op without the `progress` feature
    #[allow(unused_mut, unused_variables)]
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        #[cfg(feature = "progress")]
        {
            self.show_progress_bar = show;
        }
        self
    }

    /// List files in `dir` with the given extension, sorted by path
    pub fn discover_files<P: AsRef<Path>>(dir: P, extension: &str) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ClaimsError::file_not_found_with_suggestion(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load pharmacies from the first CSV file in `dir`
    ///
    /// Returns an empty collection when the directory holds no CSV file.
    pub fn load_pharmacies<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<Pharmacy>> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "loading pharmacies");

        let files = Self::discover_files(dir, "csv")?;
        let Some(path) = files.first() else {
            error!(dir = %dir.display(), "no CSV file found in pharmacy directory");
            return Ok(Vec::new());
        };
        if files.len() > 1 {
            warn!(used = %path.display(), found = files.len(), "several pharmacy files found, using the first");
        }

        let pharmacies = self.load_pharmacy_file(path)?;
        info!(count = pharmacies.len(), "loaded pharmacy records");
        Ok(pharmacies)
    }

    /// Load pharmacies from a CSV file with `chain` and `npi` columns
    pub fn load_pharmacy_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Pharmacy>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClaimsError::file_not_found_with_suggestion(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(file);

        let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
        PharmacySchema::validate_headers(&headers)?;

        let mut pharmacies = Vec::new();
        let mut invalid_count = 0;
        for (row, result) in reader.deserialize::<Pharmacy>().enumerate() {
            let outcome = result
                .map_err(ClaimsError::from)
                .and_then(|p| {
                    if self.validation_level >= ValidationLevel::Standard && (p.npi.is_empty() || p.chain.is_empty()) {
                        Err(ClaimsError::invalid_field("npi", Some(p.npi.clone()), "pharmacy row has an empty npi or chain"))
                    } else {
                        Ok(p)
                    }
                });

            match outcome {
                Ok(pharmacy) => pharmacies.push(pharmacy),
                Err(e) => {
                    let e = e.with_context(ErrorContext {
                        file_path: Some(path.to_path_buf()),
                        record_index: Some(row),
                        record_id: None,
                    });
                    invalid_count += 1;
                    if !self.skip_invalid_records {
                        return Err(e);
                    }
                    if invalid_count <= MAX_REPORTED_INVALID {
                        warn!(file = %path.display(), row, error = %e, "skipping invalid pharmacy row");
                    }
                }
            }
        }

        if invalid_count > 0 {
            warn!(file = %path.display(), skipped = invalid_count, "skipped invalid pharmacy rows");
        }
        Ok(pharmacies)
    }

    /// Load claims from every JSON file in `dir`
    ///
    /// When `valid_npis` is given, claims from unknown pharmacies are dropped.
    pub fn load_claims<P: AsRef<Path>>(&self, dir: P, valid_npis: Option<&HashSet<String>>) -> Result<Vec<Claim>> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "loading claims");

        let mut claims = self.load_events::<ClaimSchema, Claim>(dir)?;
        if let Some(npis) = valid_npis {
            let before = claims.len();
            claims.retain(|c| npis.contains(&c.npi));
            let dropped = before - claims.len();
            if dropped > 0 {
                info!(dropped, "dropped claims from unknown pharmacies");
            }
        }

        info!(count = claims.len(), "loaded valid claims from known pharmacies");
        Ok(claims)
    }

    /// Load reverts from every JSON file in `dir`
    pub fn load_reverts<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<Revert>> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "loading reverts");

        let reverts = self.load_events::<RevertSchema, Revert>(dir)?;
        info!(count = reverts.len(), "loaded reverts");
        Ok(reverts)
    }

    /// Read all event files of a directory, skipping corrupt files
    fn load_events<S, T>(&self, dir: &Path) -> Result<Vec<T>>
    where
        S: RecordSchema,
        T: DeserializeOwned + Send,
    {
        let files = Self::discover_files(dir, "json")?;
        if files.is_empty() {
            warn!(dir = %dir.display(), "no JSON files found");
            return Ok(Vec::new());
        }

        let start_time = Instant::now();

        #[cfg(feature = "progress")]
        let progress_bar = if self.show_progress_bar {
            let pb = ProgressBar::new(files.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        let read = |path: &PathBuf| {
            let result = self.read_event_file::<S, T>(path);
            #[cfg(feature = "progress")]
            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
            result
        };

        #[cfg(feature = "parallel")]
        let results: Vec<Result<FileLoad<T>>> = {
            use rayon::prelude::*;
            files.par_iter().map(read).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<Result<FileLoad<T>>> = files.iter().map(read).collect();

        #[cfg(feature = "progress")]
        if let Some(pb) = progress_bar {
            pb.finish_and_clear();
        }

        let mut records = Vec::new();
        let mut skipped_records = 0;
        let mut skipped_files = 0;
        for (path, result) in files.iter().zip(results) {
            match result {
                Ok(load) => {
                    skipped_records += load.skipped;
                    records.extend(load.records);
                }
                Err(e @ ClaimsError::JsonParse { .. }) => {
                    skipped_files += 1;
                    warn!(file = %path.display(), error = %e, "skipping corrupt or invalid file");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            kind = S::NAME,
            files = files.len(),
            records = records.len(),
            skipped_records,
            skipped_files,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "finished reading event files"
        );
        Ok(records)
    }

    /// Read one JSON event file
    ///
    /// A file that is not valid JSON or not an array is a `JsonParse` error.
    /// Invalid records inside a valid file are skipped or fail the read,
    /// depending on `skip_invalid_records`.
    pub fn read_event_file<S, T>(&self, path: &Path) -> Result<FileLoad<T>>
    where
        S: RecordSchema,
        T: DeserializeOwned,
    {
        let context = || ErrorContext {
            file_path: Some(path.to_path_buf()),
            ..Default::default()
        };

        let file = File::open(path).map_err(|e| ClaimsError::from(e).with_context(context()))?;
        let value: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ClaimsError::from(e).with_context(context()))?;

        let Value::Array(items) = value else {
            return Err(ClaimsError::JsonParse {
                message: "JSON content is not a list of events".to_string(),
                context: context(),
            });
        };

        let mut records = Vec::with_capacity(items.len());
        let mut skipped = 0;
        for (index, item) in items.into_iter().enumerate() {
            let record_id = item.get("id").map(|id| id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string()));
            match parse_record::<S, T>(item, self.validation_level) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let e = e.with_context(ErrorContext {
                        file_path: Some(path.to_path_buf()),
                        record_index: Some(index),
                        record_id,
                    });
                    if !self.skip_invalid_records {
                        return Err(e);
                    }
                    skipped += 1;
                    if skipped <= MAX_REPORTED_INVALID {
                        warn!(file = %path.display(), index, error = %e, "skipping invalid {} record", S::NAME);
                    }
                }
            }
        }

        Ok(FileLoad {
            path: path.to_path_buf(),
            records,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_discover_files_sorted_by_extension() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.json", "[]");
        write(dir.path(), "a.json", "[]");
        write(dir.path(), "notes.txt", "");
        let files = ClaimsReader::discover_files(dir.path(), "json").unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_missing_directory() {
        let err = ClaimsReader::discover_files("/no/such/claims", "json").unwrap_err();
        assert!(matches!(err, ClaimsError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_claims_skips_corrupt_files_and_invalid_records() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "1.json", r#"[
            {"id": "c1", "npi": "1", "ndc": "d1", "price": 10.0, "quantity": 2, "timestamp": "2024-01-01T00:00:00"},
            {"id": "c2", "npi": "1", "ndc": "d1", "price": 10.0}
        ]"#);
        write(dir.path(), "2.json", "{not json");
        write(dir.path(), "3.json", r#"{"id": "c3"}"#);
        write(dir.path(), "4.json", r#"[
            {"id": "c4", "npi": "2", "ndc": "d1", "price": 5.0, "quantity": 1, "timestamp": "2024-01-01T00:00:00"},
            {"id": "c5", "npi": "9", "ndc": "d1", "price": 5.0, "quantity": 1, "timestamp": "2024-01-01T00:00:00"}
        ]"#);

        let npis: HashSet<String> = ["1", "2"].iter().map(|s| s.to_string()).collect();
        let claims = ClaimsReader::new().load_claims(dir.path(), Some(&npis)).unwrap();
        let ids: Vec<_> = claims.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c4"]);
    }

    #[test]
    fn test_invalid_record_fails_when_not_skipping() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "1.json", r#"[{"id": "r1", "timestamp": "2024-01-01T00:00:00"}]"#);
        let reader = ClaimsReader::new().with_skip_invalid_records(false);
        let err = reader.load_reverts(dir.path()).unwrap_err();
        match err {
            ClaimsError::DataValidation { context, .. } => {
                assert_eq!(context.record_index, Some(0));
                assert_eq!(context.record_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_load_pharmacies() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pharmacies.csv", "chain,npi\nhealth,0001\nsaint, 0002 \n,0003\n");
        let pharmacies = ClaimsReader::new().load_pharmacies(dir.path()).unwrap();
        assert_eq!(pharmacies, vec![
            Pharmacy::new("", "health", "0001"),
            Pharmacy::new("", "saint", "0002"),
        ]);
    }

    #[test]
    fn test_pharmacy_file_missing_column() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pharmacies.csv", "id,npi\np1,0001\n");
        let err = ClaimsReader::new().load_pharmacies(dir.path()).unwrap_err();
        assert!(matches!(err, ClaimsError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_empty_pharmacy_directory() {
        let dir = TempDir::new().unwrap();
        assert!(ClaimsReader::new().load_pharmacies(dir.path()).unwrap().is_empty());
    }
}
