use crate::config::ArchiveConfig;
use crate::error::{ChatMatchError, Result};
use regex::Regex;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipArchive;

/// A content file found inside a nested archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// File stem of the nested archive that contained this entry.
    pub archive_name: String,
    /// Path of the entry inside the nested archive.
    pub entry_name: String,
    pub contents: Vec<u8>,
}

impl ArchiveEntry {
    /// Output file name: the containing archive's stem, not the entry's own name.
    pub fn output_name(&self, content_extension: &str) -> String {
        format!("{}.{}", self.archive_name, content_extension.trim_start_matches('.'))
    }

    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }
}

#[derive(Debug, Clone)]
pub struct NestedArchive {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub name: String,
}

pub struct ArchiveWalker {
    archive_extension: String,
    content_extension: String,
    exclude_patterns: Vec<Regex>,
    max_entry_size: u64,
}

impl ArchiveWalker {
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ChatMatchError::Config {
                    message: format!("Invalid exclude pattern '{}': {}", pattern, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            archive_extension: normalize_extension(&config.archive_extension),
            content_extension: normalize_extension(&config.content_extension),
            exclude_patterns,
            max_entry_size: config.max_entry_size,
        })
    }

    /// Unpack the outer archive into scratch storage and list the nested
    /// archives it contains. Entries are read lazily from the returned walk.
    pub fn open<P: AsRef<Path>>(&self, archive_path: P) -> Result<ArchiveWalk> {
        let archive_path = archive_path.as_ref();
        let display = archive_path.display().to_string();

        let file = File::open(archive_path)
            .map_err(|e| ChatMatchError::archive_corrupt(display.clone(), e))?;
        let mut outer = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ChatMatchError::archive_corrupt(display.clone(), e))?;

        let scratch = TempDir::new()?;
        let mut failures = VecDeque::new();
        let extracted = self.extract_outer(&mut outer, &display, scratch.path(), &mut failures)?;
        let nested = self.find_nested_archives(scratch.path());

        let statistics = WalkStatistics {
            outer_entries_extracted: extracted,
            nested_archives_found: nested.len(),
            ..WalkStatistics::default()
        };

        Ok(ArchiveWalk {
            scratch,
            nested: nested.into(),
            current: None,
            failures,
            content_extension: self.content_extension.clone(),
            max_entry_size: self.max_entry_size,
            statistics,
        })
    }

    fn extract_outer(
        &self,
        outer: &mut ZipArchive<BufReader<File>>,
        display: &str,
        dest: &Path,
        failures: &mut VecDeque<ChatMatchError>,
    ) -> Result<usize> {
        let mut extracted = 0;

        for index in 0..outer.len() {
            let mut entry = match outer.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    failures.push_back(ChatMatchError::archive_corrupt(
                        format!("{} (entry #{})", display, index),
                        e,
                    ));
                    continue;
                }
            };

            // Entries that would escape the scratch directory are ignored.
            let relative = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => continue,
            };
            let output_path = dest.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&output_path)?;
                continue;
            }

            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&output_path)?;
            if let Err(e) = std::io::copy(&mut entry, &mut outfile) {
                drop(outfile);
                let _ = fs::remove_file(&output_path);
                failures.push_back(ChatMatchError::archive_corrupt(
                    format!("{}:{}", display, relative.display()),
                    e,
                ));
                continue;
            }
            extracted += 1;
        }

        Ok(extracted)
    }

    fn find_nested_archives(&self, root: &Path) -> Vec<NestedArchive> {
        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| has_extension(entry.path(), &self.archive_extension))
            .filter_map(|entry| {
                let relative_path = entry.path().strip_prefix(root).ok()?.to_path_buf();
                if self.is_excluded(&relative_path) {
                    return None;
                }
                let name = entry.path().file_stem()?.to_string_lossy().to_string();
                Some(NestedArchive {
                    path: entry.path().to_path_buf(),
                    relative_path,
                    name,
                })
            })
            .collect()
    }

    fn is_excluded(&self, relative_path: &Path) -> bool {
        let path_str = relative_path.to_string_lossy().replace('\\', "/");
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(&path_str))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalkStatistics {
    pub outer_entries_extracted: usize,
    pub nested_archives_found: usize,
    pub nested_archives_opened: usize,
    pub nested_archives_failed: usize,
    pub entries_yielded: usize,
}

impl WalkStatistics {
    pub fn display_summary(&self) -> String {
        format!(
            "Archive Walk:\n  Outer entries extracted: {}\n  Nested archives found: {}\n  Nested archives opened: {}\n  Nested archives failed: {}\n  Content entries yielded: {}\n",
            self.outer_entries_extracted,
            self.nested_archives_found,
            self.nested_archives_opened,
            self.nested_archives_failed,
            self.entries_yielded
        )
    }
}

struct OpenNested {
    name: String,
    display: String,
    archive: ZipArchive<BufReader<File>>,
    pending: VecDeque<usize>,
}

/// Lazy sequence of content entries two levels deep. Consumed once; the
/// scratch directory is deleted when the walk is dropped.
pub struct ArchiveWalk {
    scratch: TempDir,
    nested: VecDeque<NestedArchive>,
    current: Option<OpenNested>,
    failures: VecDeque<ChatMatchError>,
    content_extension: String,
    max_entry_size: u64,
    statistics: WalkStatistics,
}

impl ArchiveWalk {
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn nested_archive_count(&self) -> usize {
        self.statistics.nested_archives_found
    }

    pub fn statistics(&self) -> &WalkStatistics {
        &self.statistics
    }

    fn open_nested(&self, nested: &NestedArchive) -> Result<OpenNested> {
        let display = nested.relative_path.display().to_string();
        let file = File::open(&nested.path)
            .map_err(|e| ChatMatchError::archive_corrupt(display.clone(), e))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ChatMatchError::archive_corrupt(display.clone(), e))?;

        let mut pending = VecDeque::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| ChatMatchError::archive_corrupt(display.clone(), e))?;
            if !entry.is_dir() && name_has_extension(entry.name(), &self.content_extension) {
                pending.push_back(index);
            }
        }

        Ok(OpenNested {
            name: nested.name.clone(),
            display,
            archive,
            pending,
        })
    }
}

impl Iterator for ArchiveWalk {
    type Item = Result<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(failure) = self.failures.pop_front() {
            return Some(Err(failure));
        }

        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some(index) = current.pending.pop_front() {
                    let result = read_entry(current, index, self.max_entry_size);
                    if result.is_ok() {
                        self.statistics.entries_yielded += 1;
                    }
                    return Some(result);
                }
                self.current = None;
            }

            let nested = self.nested.pop_front()?;
            match self.open_nested(&nested) {
                Ok(open) => {
                    self.statistics.nested_archives_opened += 1;
                    self.current = Some(open);
                }
                Err(e) => {
                    self.statistics.nested_archives_failed += 1;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn read_entry(current: &mut OpenNested, index: usize, max_entry_size: u64) -> Result<ArchiveEntry> {
    let mut file = current
        .archive
        .by_index(index)
        .map_err(|e| ChatMatchError::archive_corrupt(current.display.clone(), e))?;
    let entry_name = file.name().to_string();
    let source = format!("{}:{}", current.display, entry_name);

    if file.size() > max_entry_size {
        return Err(ChatMatchError::archive_corrupt(
            source,
            format!("entry is {} bytes (max: {} bytes)", file.size(), max_entry_size),
        ));
    }

    let mut contents = Vec::with_capacity(file.size() as usize);
    file.by_ref()
        .take(max_entry_size + 1)
        .read_to_end(&mut contents)
        .map_err(|e| ChatMatchError::archive_corrupt(source.clone(), e))?;

    if contents.len() as u64 > max_entry_size {
        return Err(ChatMatchError::archive_corrupt(
            source,
            format!("entry exceeds {} bytes", max_entry_size),
        ));
    }

    Ok(ArchiveEntry {
        archive_name: current.name.clone(),
        entry_name,
        contents,
    })
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.to_lowercase() == extension)
}

fn name_has_extension(name: &str, extension: &str) -> bool {
    name.to_lowercase().ends_with(&format!(".{}", extension))
}
