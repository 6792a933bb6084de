//! Tests for the section-aware knowledge-base store.

mod common;

use std::fs;

use common::{write_kb, SAMPLE_KB};
use kb_mcp_server::store::{
    AddEntryOutcome, HeaderMode, KnowledgeBase, SectionLookup, NOT_FOUND_TEXT, UPDATED_TEXT,
};

fn contents(kb: &KnowledgeBase) -> String {
    fs::read_to_string(kb.path()).unwrap()
}

// ---------------------------------------------------------------------------
// read / write
// ---------------------------------------------------------------------------

#[test]
fn read_missing_file_returns_sentinel() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = KnowledgeBase::new(tmp.path().join("absent.txt"), HeaderMode::Strict);

    assert_eq!(kb.read().unwrap(), NOT_FOUND_TEXT);
}

#[test]
fn read_is_stable_without_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    let a = kb.read().unwrap();
    let b = kb.read().unwrap();
    assert_eq!(a, b);
    assert_eq!(a, SAMPLE_KB);
}

#[test]
fn write_overwrites_whole_file() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    assert_eq!(kb.write("1. NEW").unwrap(), UPDATED_TEXT);
    assert_eq!(contents(&kb), "1. NEW");
}

#[test]
fn write_into_missing_directory_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = KnowledgeBase::new(tmp.path().join("no/such/dir/kb.txt"), HeaderMode::Strict);

    assert!(kb.write("1. X").is_err());
}

// ---------------------------------------------------------------------------
// get_section
// ---------------------------------------------------------------------------

#[test]
fn get_section_returns_block_verbatim() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    assert_eq!(
        kb.get_section("2").unwrap(),
        SectionLookup::Found("2. ENEMIES\n- Jerry".to_string())
    );
    assert_eq!(kb.get_section(" 1 ").unwrap().to_string(), "1. GADGETS\n- Portal gun");
}

#[test]
fn get_section_absent_index_is_not_found_text() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    for index in ["0", "3", "-1", "12"] {
        let lookup = kb.get_section(index).unwrap();
        assert_eq!(lookup.to_string(), format!("Section {index} not found"));
    }
}

#[test]
fn get_section_rejects_non_integer() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    let lookup = kb.get_section("two").unwrap();
    assert_eq!(lookup, SectionLookup::InvalidNumber("two".to_string()));
    assert_eq!(lookup.to_string(), "Invalid section number: two");
}

#[test]
fn get_section_on_missing_file_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = KnowledgeBase::new(tmp.path().join("absent.txt"), HeaderMode::Strict);

    assert_eq!(kb.get_section("1").unwrap(), SectionLookup::NotFound(1));
}

#[test]
fn get_section_does_not_confuse_one_with_eleven() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), "11. ELEVEN\n- x\n\n1. ONE\n- y");

    assert_eq!(kb.get_section("1").unwrap().to_string(), "1. ONE\n- y");
}

// ---------------------------------------------------------------------------
// add_entry
// ---------------------------------------------------------------------------

#[test]
fn add_entry_inserts_before_next_section() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    let outcome = kb.add_entry(1, "Interdimensional cable box").unwrap();

    assert_eq!(
        outcome.to_string(),
        "Added entry to section 1: Interdimensional cable box"
    );
    assert_eq!(
        contents(&kb),
        "1. GADGETS\n- Portal gun\n- Interdimensional cable box\n\n2. ENEMIES\n- Jerry"
    );
}

#[test]
fn add_entry_to_last_section_appends_at_end() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    kb.add_entry(2, "Cromulons").unwrap();

    assert_eq!(
        contents(&kb),
        "1. GADGETS\n- Portal gun\n\n2. ENEMIES\n- Jerry\n- Cromulons"
    );
}

#[test]
fn add_entry_to_header_only_section_appends() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), "1. QUOTES");

    kb.add_entry(1, "Wubba lubba dub dub").unwrap();

    assert_eq!(contents(&kb), "1. QUOTES\n- Wubba lubba dub dub");
}

#[test]
fn add_entry_keeps_trailing_newline_after_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), "1. QUOTES\n- one\n");

    kb.add_entry(1, "two").unwrap();

    assert_eq!(contents(&kb), "1. QUOTES\n- one\n- two\n");
}

#[test]
fn add_entry_grows_document_by_exactly_one_line() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    for (section, entry) in [(1, "a"), (2, "b"), (1, "c")] {
        let before: Vec<String> = contents(&kb).split('\n').map(str::to_string).collect();
        kb.add_entry(section, entry).unwrap();
        let after: Vec<String> = contents(&kb).split('\n').map(str::to_string).collect();

        assert_eq!(after.len(), before.len() + 1);
        assert!(after.contains(&format!("- {entry}")));
    }

    let text = contents(&kb);
    let entry_c = text.find("- c").unwrap();
    let header_2 = text.find("2. ENEMIES").unwrap();
    assert!(entry_c < header_2, "entry must stay inside section 1");
}

#[test]
fn add_entry_to_missing_section_leaves_file_unchanged() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    let outcome = kb.add_entry(7, "Szechuan sauce").unwrap();

    assert_eq!(outcome, AddEntryOutcome::SectionNotFound(7));
    assert_eq!(outcome.to_string(), "Section 7 not found");
    assert_eq!(contents(&kb), SAMPLE_KB);
}

#[test]
fn add_entry_on_missing_file_does_not_create_it() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = KnowledgeBase::new(tmp.path().join("absent.txt"), HeaderMode::Strict);

    assert_eq!(kb.add_entry(1, "x").unwrap(), AddEntryOutcome::SectionNotFound(1));
    assert!(!kb.path().exists());
}

// ---------------------------------------------------------------------------
// create_section
// ---------------------------------------------------------------------------

#[test]
fn create_section_appends_numbered_uppercase_header() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    let created = kb.create_section("Quotes").unwrap();

    assert_eq!(created.number, 3);
    assert_eq!(created.to_string(), "Created new section: 3. QUOTES");
    assert_eq!(contents(&kb), format!("{SAMPLE_KB}\n\n3. QUOTES"));
}

#[test]
fn create_section_then_get_section_round_trips_header() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    let created = kb.create_section("Family members").unwrap();
    let lookup = kb.get_section(&created.number.to_string()).unwrap();

    assert_eq!(lookup, SectionLookup::Found("3. FAMILY MEMBERS".to_string()));
}

#[test]
fn create_section_on_missing_file_starts_at_one() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = KnowledgeBase::new(tmp.path().join("new.txt"), HeaderMode::Strict);

    let created = kb.create_section("first").unwrap();

    assert_eq!(created.number, 1);
    assert_eq!(contents(&kb), "1. FIRST");
}

#[test]
fn new_section_accepts_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), SAMPLE_KB);

    kb.create_section("Quotes").unwrap();
    kb.add_entry(3, "Get schwifty").unwrap();
    kb.add_entry(2, "Tammy").unwrap();

    assert_eq!(
        contents(&kb),
        "1. GADGETS\n- Portal gun\n\n2. ENEMIES\n- Jerry\n- Tammy\n\n3. QUOTES\n- Get schwifty"
    );
}

// ---------------------------------------------------------------------------
// header modes
// ---------------------------------------------------------------------------

const DIGIT_BODY_KB: &str = "1. FACTS\n42 is. the answer\n\n2. MORE\n- x";

#[test]
fn strict_mode_ignores_body_lines_that_look_like_headers() {
    let tmp = tempfile::tempdir().unwrap();
    let kb = write_kb(tmp.path(), DIGIT_BODY_KB);

    assert_eq!(kb.create_section("next").unwrap().number, 3);
}

#[test]
fn legacy_mode_counts_any_digit_line_containing_dot_space() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("kb.txt");
    fs::write(&path, DIGIT_BODY_KB).unwrap();
    let kb = KnowledgeBase::new(&path, HeaderMode::Legacy);

    assert_eq!(kb.create_section("next").unwrap().number, 4);
}

#[test]
fn legacy_mode_matches_indented_headers() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("kb.txt");
    fs::write(&path, "  1. INDENTED\n- a\n\n2. NEXT").unwrap();

    let legacy = KnowledgeBase::new(&path, HeaderMode::Legacy);
    assert_eq!(legacy.get_section("1").unwrap().to_string(), "  1. INDENTED\n- a");

    let strict = KnowledgeBase::new(&path, HeaderMode::Strict);
    assert_eq!(strict.add_entry(1, "b").unwrap(), AddEntryOutcome::SectionNotFound(1));
}

#[test]
fn legacy_mode_adds_entry_under_indented_header() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("kb.txt");
    fs::write(&path, "  1. INDENTED\n- a\n\n2. NEXT").unwrap();
    let kb = KnowledgeBase::new(&path, HeaderMode::Legacy);

    let outcome = kb.add_entry(1, "b").unwrap();

    assert_eq!(
        outcome,
        AddEntryOutcome::Added {
            section: 1,
            entry: "b".to_string()
        }
    );
    assert_eq!(contents(&kb), "  1. INDENTED\n- a\n- b\n\n2. NEXT");
}

#[test]
fn header_mode_parses_from_config_strings() {
    assert_eq!("strict".parse::<HeaderMode>().unwrap(), HeaderMode::Strict);
    assert_eq!("LEGACY".parse::<HeaderMode>().unwrap(), HeaderMode::Legacy);
    assert!("fuzzy".parse::<HeaderMode>().is_err());
}
