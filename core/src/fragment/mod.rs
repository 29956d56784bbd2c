//! Multi-part file detection and grouping.
//!
//! A title split across several files (`SSIS-001-cd1.mp4`, `SSIS-001-cd2.mp4`)
//! is grouped so that it is identified once, through its first part.

use crate::error::classification::FaultClass;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartLabel {
    Digits,
    /// A=1, B=2, ...
    Letter,
}

struct Convention {
    name: &'static str,
    pattern: Regex,
    label: PartLabel,
}

fn convention(name: &'static str, pattern: &str, label: PartLabel) -> Convention {
    Convention {
        name,
        pattern: Regex::new(pattern).expect("valid fragment pattern"),
        label,
    }
}

lazy_static! {
    /// Suffix conventions, tried in order on the extension-less file name
    static ref CONVENTIONS: Vec<Convention> = vec![
        convention("cd", r"(?i)[-_.]cd(\d+)$", PartLabel::Digits),
        convention("part", r"(?i)[-_]part(\d+)$", PartLabel::Digits),
        convention("part_n", r"(?i)_part_(\d+)$", PartLabel::Digits),
        convention("disc", r"(?i)[-_]disc(\d+)$", PartLabel::Digits),
        convention("bracket", r"\[(\d+)\]$", PartLabel::Digits),
        convention("letter", r"(?i)[-_]([a-z])$", PartLabel::Letter),
        convention("digit", r"[-_]([1-9])$", PartLabel::Digits),
    ];
}

/// One part of a multi-part title
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentFile {
    pub path: PathBuf,
    /// File name with the part suffix and extension removed
    pub base_name: String,
    pub part_number: u32,
    /// The matched suffix, e.g. `-cd2`
    pub part_suffix: String,
    /// Final extension including the dot, empty when absent
    pub extension: String,
}

/// Two or more fragments sharing a base name, ordered by part number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentGroup {
    base_name: String,
    fragments: Vec<FragmentFile>,
}

impl FragmentGroup {
    /// Base name as spelled by the first part
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn fragments(&self) -> &[FragmentFile] {
        &self.fragments
    }

    /// The file the whole group is identified through
    pub fn main_file(&self) -> &Path {
        &self.fragments[0].path
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.fragments.iter().map(|f| f.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Whether part numbers differ from `1..=len`
    pub fn has_missing_parts(&self) -> bool {
        self.fragments
            .iter()
            .zip(1u32..)
            .any(|(fragment, expected)| fragment.part_number != expected)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentDetector;

impl FragmentDetector {
    pub fn new() -> Self {
        Self
    }

    /// Whether the file name carries a recognised, well-formed part suffix
    pub fn is_fragment(&self, path: &Path) -> bool {
        self.parse(path).is_some()
    }

    /// Fragment details for `path`, or `None` for ordinary and malformed names
    pub fn parse(&self, path: &Path) -> Option<FragmentFile> {
        let file_name = path.file_name()?.to_string_lossy();
        let (stem, extension) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => (&file_name[..dot], &file_name[dot..]),
            _ => (file_name.as_ref(), ""),
        };

        let (convention, caps) = CONVENTIONS
            .iter()
            .find_map(|c| c.pattern.captures(stem).map(|caps| (c, caps)))?;

        let suffix = caps.get(0)?;
        let label = &caps[1];
        let base_name = &stem[..suffix.start()];

        let part_number = match convention.label {
            PartLabel::Digits => label.parse::<u32>().ok(),
            PartLabel::Letter => label
                .chars()
                .next()
                .map(|c| u32::from(c.to_ascii_uppercase()) - u32::from('A') + 1),
        };

        match part_number {
            Some(part_number) if part_number > 0 && !base_name.is_empty() => {
                Some(FragmentFile {
                    path: path.to_path_buf(),
                    base_name: base_name.to_string(),
                    part_number,
                    part_suffix: suffix.as_str().to_string(),
                    extension: extension.to_string(),
                })
            }
            _ => {
                tracing::warn!(
                    path = %path.display(),
                    convention = convention.name,
                    label,
                    class = %FaultClass::MalformedFragment,
                    "Ignoring malformed part suffix"
                );
                None
            }
        }
    }

    /// Split `paths` into fragment groups and single files.
    ///
    /// Groups come out in order of their first part's appearance; singles
    /// (ordinary files and parts without siblings) keep input order.
    pub fn group<P: AsRef<Path>>(&self, paths: &[P]) -> (Vec<FragmentGroup>, Vec<PathBuf>) {
        let mut buckets: Vec<Vec<(usize, FragmentFile)>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut singles: Vec<(usize, PathBuf)> = Vec::new();

        for (position, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            match self.parse(path) {
                Some(fragment) => {
                    let key = fragment.base_name.to_lowercase();
                    let slot = *index.entry(key).or_insert_with(|| {
                        buckets.push(Vec::new());
                        buckets.len() - 1
                    });
                    buckets[slot].push((position, fragment));
                }
                None => singles.push((position, path.to_path_buf())),
            }
        }

        let mut groups = Vec::new();
        for mut bucket in buckets {
            if bucket.len() < 2 {
                singles.extend(bucket.into_iter().map(|(position, f)| (position, f.path)));
                continue;
            }

            bucket.sort_by(|(_, a), (_, b)| {
                a.part_number
                    .cmp(&b.part_number)
                    .then_with(|| a.path.cmp(&b.path))
            });
            let fragments: Vec<FragmentFile> = bucket.into_iter().map(|(_, f)| f).collect();
            let group = FragmentGroup {
                base_name: fragments[0].base_name.clone(),
                fragments,
            };

            tracing::info!(
                base_name = %group.base_name,
                parts = group.len(),
                main_file = %group.main_file().display(),
                missing_parts = group.has_missing_parts(),
                "Found fragment group"
            );
            for fragment in &group.fragments {
                tracing::debug!(part = fragment.part_number, path = %fragment.path.display(), "Fragment");
            }
            groups.push(group);
        }

        singles.sort_by_key(|(position, _)| *position);
        (groups, singles.into_iter().map(|(_, path)| path).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn detector() -> FragmentDetector {
        FragmentDetector::new()
    }

    #[test_case("SSIS-001-cd1.mp4", "SSIS-001", 1, "-cd1" ; "cd dash")]
    #[test_case("SSIS-001.CD2.mkv", "SSIS-001", 2, ".CD2" ; "cd dot upper")]
    #[test_case("movie_part3.avi", "movie", 3, "_part3" ; "part")]
    #[test_case("movie_part_12.avi", "movie", 12, "_part_12" ; "part with underscores")]
    #[test_case("movie-DISC2.iso", "movie", 2, "-DISC2" ; "disc")]
    #[test_case("movie[4].mp4", "movie", 4, "[4]" ; "bracket")]
    #[test_case("rctd-461-C.mp4", "rctd-461", 3, "-C" ; "letter")]
    #[test_case("movie_b.mp4", "movie", 2, "_b" ; "lowercase letter")]
    #[test_case("movie-7.mp4", "movie", 7, "-7" ; "single digit")]
    fn test_parse(name: &str, base: &str, part: u32, suffix: &str) {
        let fragment = detector().parse(Path::new(name)).unwrap();
        assert_eq!(fragment.base_name, base);
        assert_eq!(fragment.part_number, part);
        assert_eq!(fragment.part_suffix, suffix);
    }

    #[test_case("ABC-123.mp4" ; "plain identifier")]
    #[test_case("movie-10.mp4" ; "two digits")]
    #[test_case("movie-0.mp4" ; "zero digit")]
    #[test_case("movie.mp4" ; "no suffix")]
    #[test_case("movie-cd0.mp4" ; "cd zero")]
    #[test_case("movie-cd99999999999.mp4" ; "overflow")]
    #[test_case("-cd1.mp4" ; "empty base")]
    fn test_not_fragment(name: &str) {
        assert!(!detector().is_fragment(Path::new(name)));
    }

    #[test]
    fn test_extension_and_directory() {
        let fragment = detector()
            .parse(Path::new("/library/in/SSIS-001-cd1.mp4"))
            .unwrap();
        assert_eq!(fragment.extension, ".mp4");
        assert_eq!(fragment.path, PathBuf::from("/library/in/SSIS-001-cd1.mp4"));

        let fragment = detector().parse(Path::new("SSIS-001-cd1")).unwrap();
        assert_eq!(fragment.extension, "");
    }

    #[test]
    fn test_group_cd_parts() {
        let paths = ["SSIS-001-cd2.mp4", "SSIS-001-cd1.mp4", "SSIS-001-cd3.mp4"];
        let (groups, singles) = detector().group(&paths);

        assert!(singles.is_empty());
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.base_name(), "SSIS-001");
        assert_eq!(group.len(), 3);
        assert_eq!(group.main_file(), Path::new("SSIS-001-cd1.mp4"));
        let parts: Vec<u32> = group.fragments().iter().map(|f| f.part_number).collect();
        assert_eq!(parts, vec![1, 2, 3]);
        assert!(!group.has_missing_parts());
    }

    #[test]
    fn test_single_file() {
        let (groups, singles) = detector().group(&["ABC-123.mp4"]);
        assert!(groups.is_empty());
        assert_eq!(singles, vec![PathBuf::from("ABC-123.mp4")]);
    }

    #[test]
    fn test_lone_fragment_demoted_in_order() {
        let paths = ["a.mp4", "LONE-1-cd1.mp4", "b.mp4", "X-cd1.mp4", "X-cd2.mp4"];
        let (groups, singles) = detector().group(&paths);

        assert_eq!(groups.len(), 1);
        assert_eq!(
            singles,
            vec![
                PathBuf::from("a.mp4"),
                PathBuf::from("LONE-1-cd1.mp4"),
                PathBuf::from("b.mp4"),
            ]
        );
    }

    #[test]
    fn test_base_name_case_insensitive() {
        let paths = ["ssis-001-cd2.mp4", "SSIS-001-CD1.mkv"];
        let (groups, singles) = detector().group(&paths);
        assert!(singles.is_empty());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].main_file(), Path::new("SSIS-001-CD1.mkv"));
        assert_eq!(groups[0].base_name(), "SSIS-001");
    }

    #[test]
    fn test_groups_in_first_encounter_order() {
        let paths = [
            "B-cd2.mp4",
            "A-cd1.mp4",
            "B-cd1.mp4",
            "A-cd2.mp4",
        ];
        let (groups, _) = detector().group(&paths);
        let bases: Vec<&str> = groups.iter().map(|g| g.base_name()).collect();
        assert_eq!(bases, vec!["B", "A"]);
    }

    #[test]
    fn test_missing_parts_and_ties() {
        let paths = ["show-cd1.mp4", "show-cd3.mp4", "show-part3.mp4"];
        let (groups, _) = detector().group(&paths);
        let group = &groups[0];
        assert!(group.has_missing_parts());
        // equal part numbers fall back to path order
        assert_eq!(
            group.paths(),
            vec![
                PathBuf::from("show-cd1.mp4"),
                PathBuf::from("show-cd3.mp4"),
                PathBuf::from("show-part3.mp4"),
            ]
        );
    }

    #[test]
    fn test_malformed_is_single() {
        let (groups, singles) = detector().group(&["X-cd0.mp4", "X-cd1.mp4"]);
        assert!(groups.is_empty());
        assert_eq!(singles.len(), 2);
    }
}
