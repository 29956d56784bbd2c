// Fragment grouping and work planning over realistic listings

mod common;

use mdc_core::pipeline::WorkItemKind;
use mdc_core::{plan, FragmentDetector, IdentifierParser};
use std::path::{Path, PathBuf};

#[test]
fn test_three_part_title_grouped() {
    let paths = [
        "SSIS-001-cd1.mp4",
        "SSIS-001-cd2.mp4",
        "SSIS-001-cd3.mp4",
    ];
    let (groups, singles) = FragmentDetector::new().group(&paths);

    assert!(singles.is_empty());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].base_name(), "SSIS-001");
    assert_eq!(groups[0].main_file(), Path::new("SSIS-001-cd1.mp4"));
    let parts: Vec<u32> = groups[0].fragments().iter().map(|f| f.part_number).collect();
    assert_eq!(parts, vec![1, 2, 3]);
}

#[test]
fn test_single_file_not_grouped() {
    let (groups, singles) = FragmentDetector::new().group(&["ABC-123.mp4"]);
    assert!(groups.is_empty());
    assert_eq!(singles, vec![PathBuf::from("ABC-123.mp4")]);
}

#[test]
fn test_mixed_library_grouping() {
    let library = common::mixed_library();
    let (groups, singles) = FragmentDetector::new().group(&library);

    let bases: Vec<&str> = groups.iter().map(|g| g.base_name()).collect();
    assert_eq!(bases, vec!["SSIS-001", "MIDE-500"]);
    assert_eq!(groups[1].main_file(), Path::new("/library/MIDE-500_part1.mp4"));
    assert_eq!(
        singles,
        vec![
            PathBuf::from("/library/ABC-123.mp4"),
            PathBuf::from("/library/caribean-020317_001.mkv"),
            PathBuf::from("/library/.mp4"),
        ]
    );
}

#[test]
fn test_plan_resolves_each_group_once() {
    let library = common::mixed_library();
    let plan = plan(&library, &IdentifierParser::default(), &FragmentDetector::new());

    let ids: Vec<&str> = plan.items.iter().map(|i| i.identifier.value()).collect();
    assert_eq!(ids, vec!["SSIS-001", "MIDE-500", "ABC-123", "020317-001"]);
    assert_eq!(plan.skipped, vec![PathBuf::from("/library/.mp4")]);

    match &plan.items[0].kind {
        WorkItemKind::Group {
            main_file,
            fragments,
            ..
        } => {
            assert_eq!(main_file, Path::new("/library/SSIS-001-cd1.mp4"));
            assert_eq!(fragments.len(), 3);
        }
        other => panic!("expected a group, got {other:?}"),
    }

    assert!(plan.items[3].identifier.is_uncensored());
    assert!(!plan.items[2].identifier.is_uncensored());
}

#[test]
fn test_covered_paths_partition_the_input() {
    let library = common::mixed_library();
    let plan = plan(&library, &IdentifierParser::default(), &FragmentDetector::new());

    let mut covered: Vec<PathBuf> = plan.items.iter().flat_map(|i| i.paths()).collect();
    covered.extend(plan.skipped.iter().cloned());
    covered.sort();

    let mut expected: Vec<PathBuf> = library.iter().map(PathBuf::from).collect();
    expected.sort();
    assert_eq!(covered, expected);
}
