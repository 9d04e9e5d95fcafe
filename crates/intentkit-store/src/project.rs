//! File-backed resource loader over a project directory.
//!
//! Layout:
//!
//! ```text
//! <root>/domains/<domain>/<intent>/<label_set>*.txt   one markup query per line
//! <root>/entities/<entity_type>/gazetteer.txt        one phrase per line
//! <root>/word_freq.txt                               optional `word count` lines
//! ```
//!
//! Blank lines and lines starting with `#` are ignored everywhere. Domains,
//! intents and files are visited in sorted order so loading is deterministic.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use intentkit_core::digest::Fingerprint;
use intentkit_core::markup;
use intentkit_core::query::normalize;
use intentkit_core::resource::{GAZETTEERS, WORD_FREQ};
use intentkit_core::{ProcessedQuery, Resource, ResourceError, ResourceLoader};
use tracing::{debug, info};

/// Label set used to derive word frequencies when no `word_freq.txt` exists.
const DEFAULT_LABEL_SET: &str = "train";

/// Loads labeled queries and resources from a project directory.
#[derive(Debug, Clone)]
pub struct ProjectLoader {
    root: PathBuf,
}

impl ProjectLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Query files of a label set as `(domain, intent, path)`, sorted.
    fn label_set_files(&self, label_set: &str) -> Result<Vec<(String, String, PathBuf)>, ResourceError> {
        let domains_dir = self.root.join("domains");
        let mut files = Vec::new();
        for domain_dir in sorted_dirs(&domains_dir)? {
            let domain = file_name(&domain_dir);
            for intent_dir in sorted_dirs(&domain_dir)? {
                let intent = file_name(&intent_dir);
                for path in sorted_entries(&intent_dir)? {
                    let name = file_name(&path);
                    if path.is_file() && name.starts_with(label_set) && name.ends_with(".txt") {
                        files.push((domain.clone(), intent.clone(), path));
                    }
                }
            }
        }
        Ok(files)
    }

    fn load_gazetteers(&self) -> Result<Resource, ResourceError> {
        let entities_dir = self.root.join("entities");
        let mut gazetteers = BTreeMap::new();
        if !entities_dir.is_dir() {
            debug!(dir = %entities_dir.display(), "no entities directory, empty gazetteers");
            return Ok(Resource::Gazetteer(gazetteers));
        }
        for entity_dir in sorted_dirs(&entities_dir)? {
            let path = entity_dir.join("gazetteer.txt");
            if !path.is_file() {
                continue;
            }
            let phrases = content_lines(&path)?
                .into_iter()
                .map(|(_, line)| normalize(&line))
                .filter(|phrase| !phrase.is_empty())
                .collect();
            gazetteers.insert(file_name(&entity_dir), phrases);
        }
        Ok(Resource::Gazetteer(gazetteers))
    }

    fn load_word_freq(&self) -> Result<Resource, ResourceError> {
        let path = self.root.join("word_freq.txt");
        let mut table: BTreeMap<String, u64> = BTreeMap::new();

        if path.is_file() {
            for (line_no, line) in content_lines(&path)? {
                let mut parts = line.split_whitespace();
                let (Some(word), Some(count), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(ResourceError::Parse {
                        path: path.clone(),
                        line: line_no,
                        message: "expected `word count`".into(),
                    });
                };
                let count = count.parse::<u64>().map_err(|_| ResourceError::Parse {
                    path: path.clone(),
                    line: line_no,
                    message: format!("invalid count {count:?}"),
                })?;
                *table.entry(normalize(word)).or_default() += count;
            }
        } else {
            debug!("no word_freq.txt, counting tokens of the training set");
            for query in self.get_labeled_queries(DEFAULT_LABEL_SET)? {
                for token in query.query.tokens() {
                    *table.entry(token.to_string()).or_default() += 1;
                }
            }
        }
        Ok(Resource::WordFreq(table))
    }
}

impl ResourceLoader for ProjectLoader {
    fn get_labeled_queries(&self, label_set: &str) -> Result<Vec<ProcessedQuery>, ResourceError> {
        let mut queries = Vec::new();
        for (domain, intent, path) in self.label_set_files(label_set)? {
            for (line_no, line) in content_lines(&path)? {
                let query = markup::load_query(&line, &domain, &intent).map_err(|source| {
                    ResourceError::Markup {
                        path: path.clone(),
                        line: line_no,
                        source,
                    }
                })?;
                queries.push(query);
            }
        }
        info!(label_set, count = queries.len(), root = %self.root.display(), "loaded labeled queries");
        Ok(queries)
    }

    /// Digest over file paths and raw contents, without parsing.
    fn hash_labeled_queries(&self, label_set: &str) -> Result<String, ResourceError> {
        let mut fp = Fingerprint::new();
        fp.update_str(label_set);
        for (domain, intent, path) in self.label_set_files(label_set)? {
            let bytes = fs::read(&path).map_err(|source| ResourceError::Io {
                path: path.clone(),
                source,
            })?;
            fp.update_str(&domain);
            fp.update(b"/");
            fp.update_str(&intent);
            fp.update(b"/");
            fp.update_str(&file_name(&path));
            fp.update(b"\0");
            fp.update(&bytes);
            fp.update(b"\0");
        }
        Ok(fp.hex())
    }

    fn feature_resource(&self, name: &str) -> Result<Resource, ResourceError> {
        match name {
            GAZETTEERS => self.load_gazetteers(),
            WORD_FREQ => self.load_word_freq(),
            other => Err(ResourceError::UnknownResource(other.to_string())),
        }
    }
}

// ── Filesystem helpers ──

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ResourceError + '_ {
    move |source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ResourceError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        entries.push(entry.map_err(io_err(dir))?.path());
    }
    entries.sort();
    Ok(entries)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>, ResourceError> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Non-blank, non-comment lines with 1-based line numbers, trimmed.
fn content_lines(path: &Path) -> Result<Vec<(usize, String)>, ResourceError> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    Ok(text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(i, line)| (i, line.to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "domains/travel/book/train.txt", "book a flight\n# comment\n\nfly to {boston|city}\n");
        write(root, "domains/travel/cancel/train.txt", "cancel my flight\n");
        write(root, "domains/music/play/train.txt", "play jazz\n");
        write(root, "domains/music/play/test.txt", "play rock\n");
        write(root, "entities/city/gazetteer.txt", "Boston\nNew York\n");
        tmp
    }

    #[test]
    fn loads_label_set_in_sorted_order() {
        let tmp = project();
        let loader = ProjectLoader::new(tmp.path());

        let train = loader.get_labeled_queries("train").unwrap();
        let labels: Vec<_> = train
            .iter()
            .map(|q| (q.domain.as_str(), q.intent.as_str(), q.text()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("music", "play", "play jazz"),
                ("travel", "book", "book a flight"),
                ("travel", "book", "fly to boston"),
                ("travel", "cancel", "cancel my flight"),
            ]
        );
        assert_eq!(train[2].entities.len(), 1);

        let test = loader.get_labeled_queries("test").unwrap();
        assert_eq!(test.len(), 1);
        assert!(loader.get_labeled_queries("holdout").unwrap().is_empty());
    }

    #[test]
    fn missing_domains_dir_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let loader = ProjectLoader::new(tmp.path());
        assert!(matches!(
            loader.get_labeled_queries("train"),
            Err(ResourceError::Io { .. })
        ));
    }

    #[test]
    fn bad_markup_reports_line() {
        let tmp = project();
        write(tmp.path(), "domains/music/stop/train.txt", "stop\nstop {the music\n");
        let loader = ProjectLoader::new(tmp.path());
        match loader.get_labeled_queries("train") {
            Err(ResourceError::Markup { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected markup error, got {other:?}"),
        }
    }

    #[test]
    fn label_set_hash_tracks_file_contents() {
        let tmp = project();
        let loader = ProjectLoader::new(tmp.path());
        let before = loader.hash_labeled_queries("train").unwrap();
        assert_eq!(before, loader.hash_labeled_queries("train").unwrap());
        assert_ne!(before, loader.hash_labeled_queries("test").unwrap());

        write(tmp.path(), "domains/music/play/train.txt", "play jazz\nplay blues\n");
        assert_ne!(before, loader.hash_labeled_queries("train").unwrap());
    }

    #[test]
    fn loads_gazetteers() {
        let tmp = project();
        let loader = ProjectLoader::new(tmp.path());
        let Resource::Gazetteer(gaz) = loader.feature_resource(GAZETTEERS).unwrap() else {
            panic!("expected gazetteer");
        };
        let cities: Vec<_> = gaz["city"].iter().map(String::as_str).collect();
        assert_eq!(cities, vec!["boston", "new york"]);
    }

    #[test]
    fn word_freq_from_file_or_training_set() {
        let tmp = project();
        let loader = ProjectLoader::new(tmp.path());

        let Resource::WordFreq(derived) = loader.feature_resource(WORD_FREQ).unwrap() else {
            panic!("expected word freq");
        };
        assert_eq!(derived["flight"], 2);
        assert_eq!(derived["jazz"], 1);

        write(tmp.path(), "word_freq.txt", "flight 40\nJazz 7\n");
        let Resource::WordFreq(table) = loader.feature_resource(WORD_FREQ).unwrap() else {
            panic!("expected word freq");
        };
        assert_eq!(table.len(), 2);
        assert_eq!(table["jazz"], 7);
    }

    #[test]
    fn word_freq_parse_error() {
        let tmp = project();
        write(tmp.path(), "word_freq.txt", "flight forty\n");
        let loader = ProjectLoader::new(tmp.path());
        assert!(matches!(
            loader.feature_resource(WORD_FREQ),
            Err(ResourceError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn unknown_resource() {
        let tmp = project();
        let loader = ProjectLoader::new(tmp.path());
        assert!(matches!(
            loader.feature_resource("embeddings"),
            Err(ResourceError::UnknownResource(_))
        ));
    }
}
