//! Integration tests for silkpatch
//!
//! These run the normalizer over scratch directories of layout files and
//! check the properties the rewrite has to hold across whole files.

use std::{fs, path::Path};
use tempfile::TempDir;
use silkpatch::{
    config::NormalizeConfig,
    normalizer::{FileStatus, Normalizer},
    progress::ProgressTracker,
    record::{self, TextRecord},
};

/// A trimmed KiCad 6 layout with a resistor, a test point and board text
const LAYOUT: &str = r#"(kicad_pcb (version 20211014) (generator pcbnew)
  (footprint "Resistor_SMD:R_0603_1608Metric" (layer "F.Cu")
    (at 120 80)
    (fp_text reference "R101" (at 0 -1.43) (layer "F.SilkS")
      (effects (font (size 1 1) (thickness 0.15)))
      (tstamp 1b6e1f6a-5d0b-4c1e-9c9e-0a3c7e1d2f01)
    )
    (fp_text value "10k" (at 0 1.43) (layer "F.Fab")
      (effects (font (size 1 1) (thickness 0.15)))
    )
    (fp_text user "${REFERENCE}" (at 0 0) (layer "F.Fab")
      (effects (font (size 0.4 0.4) (thickness 0.06)))
    )
    (pad "1" smd roundrect (at -0.825 0) (size 0.8 0.95) (layers "F.Cu" "F.Paste" "F.Mask"))
    (pad "2" smd roundrect (at 0.825 0) (size 1 1) (layers "F.Cu" "F.Paste" "F.Mask"))
  )
  (footprint "TestPoint:TestPoint_Pad_D1.0mm" (layer "B.Cu")
    (at 130 85)
    (fp_text reference "TP1002" (at 0 1.648) (layer "B.SilkS") hide
      (effects (font (size 0.7 0.7) (thickness 0.15)) (justify mirror))
    )
    (fp_text value "TestPoint" (at 0 -1.55) (layer "B.Fab")
      (effects (font (size 1 1) (thickness 0.15)) (justify mirror))
    )
  )
  (footprint "Capacitor_SMD:C_0402_1005Metric" (layer "F.Cu")
    (at 110 70 90)
    (fp_text reference "C7" (at 0 -1.16 90) (layer "F.SilkS") hide
      (effects (font (size 0.6 0.6) (thickness 0.15)))
    )
  )
  (gr_text "ppk-pd v1" (at 100 100) (layer "F.SilkS")
    (effects (font (size 1.5 1.5) (thickness 0.3)))
  )
)
"#;

fn normalize_config(root: &Path, check: bool) -> NormalizeConfig {
    NormalizeConfig {
        root: root.to_path_buf(),
        extension: "kicad_pcb".to_string(),
        check,
        test_point_prefix: "TP".to_string(),
        rotation: 90.0,
    }
}

fn run(root: &Path, check: bool) -> silkpatch::normalizer::NormalizeReport {
    Normalizer::new(normalize_config(root, check), ProgressTracker::new(false))
        .run()
        .expect("normalizer run")
}

/// Every text record of a document, keyed by identifier
fn records(text: &str) -> Vec<(String, String)> {
    record::lists_named(text, "fp_text")
        .into_iter()
        .filter_map(|span| {
            let rec = TextRecord::parse(&text[span])?;
            Some((rec.identifier().to_string(), rec.text().to_string()))
        })
        .collect()
}

fn record_text<'a>(all: &'a [(String, String)], id: &str) -> &'a str {
    all.iter()
        .find(|(name, _)| name == id)
        .map(|(_, text)| text.as_str())
        .unwrap_or_else(|| panic!("record {} missing", id))
}

fn hide_count(record_text: &str) -> usize {
    record::hide_markers(record_text).len()
}

#[test]
fn test_layout_is_normalized_in_place() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("ppk_pd.kicad_pcb");
    fs::write(&path, LAYOUT).expect("write layout");

    let report = run(dir.path(), false);
    assert_eq!(report.modified(), vec![path.as_path()]);

    let output = fs::read_to_string(&path).expect("read layout");
    let all = records(&output);

    let r101 = record_text(&all, "R101");
    assert_eq!(hide_count(r101), 1);
    assert!(r101.contains(r#"(layer "F.SilkS") hide"#));
    assert!(r101.contains("(size 0.6 0.6)"));
    assert!(r101.contains("(at 0 -1.43)"));

    let tp = record_text(&all, "TP1002");
    assert_eq!(hide_count(tp), 0);
    assert!(tp.contains("(at 0 1.648 90)"));
    assert!(tp.contains(r#"(layer "B.SilkS")"#));
    assert!(tp.contains("(size 0.6 0.6)"));

    let c7 = record_text(&all, "C7");
    assert_eq!(hide_count(c7), 1);
    assert!(c7.contains("(at 0 -1.16 90)"));

    // value and user text only see the font rule
    assert!(record_text(&all, "10k").contains("(size 0.6 0.6)"));
    assert!(record_text(&all, "${REFERENCE}").contains("(size 0.4 0.4)"));
    assert!(!record_text(&all, "TestPoint").contains("hide"));

    // pads and board text are outside font blocks or not oversized
    assert!(output.contains(r#"(pad "2" smd roundrect (at 0.825 0) (size 1 1)"#));
    assert!(output.contains("(size 1.5 1.5)"));
    assert!(output.contains("(tstamp 1b6e1f6a-5d0b-4c1e-9c9e-0a3c7e1d2f01)"));
}

#[test]
fn test_second_run_changes_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("board.kicad_pcb");
    fs::write(&path, LAYOUT).expect("write layout");

    run(dir.path(), false);
    let once = fs::read_to_string(&path).expect("read once");

    let report = run(dir.path(), false);
    let twice = fs::read_to_string(&path).expect("read twice");

    assert_eq!(once, twice);
    assert_eq!(report.outcomes[0].status, FileStatus::Unchanged);
}

#[test]
fn test_parenthesis_nesting_is_preserved() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("board.kicad_pcb");
    fs::write(&path, LAYOUT).expect("write layout");

    run(dir.path(), false);
    let output = fs::read_to_string(&path).expect("read layout");

    let depth = |text: &str| {
        (
            text.matches('(').count(),
            text.matches(')').count(),
        )
    };
    assert_eq!(depth(&output), depth(LAYOUT));
    assert_eq!(record::list_end(&output, 0), Some(output.trim_end().len()));
}

#[test]
fn test_check_mode_does_not_write() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("board.kicad_pcb");
    fs::write(&path, LAYOUT).expect("write layout");

    let report = run(dir.path(), true);

    assert_eq!(report.modified(), vec![path.as_path()]);
    assert!(!report.is_success());
    assert_eq!(fs::read_to_string(&path).expect("read"), LAYOUT);
}

#[test]
fn test_failing_file_does_not_stop_batch() {
    let dir = TempDir::new().expect("temp dir");
    let good = dir.path().join("a_good.kicad_pcb");
    let bad = dir.path().join("b_bad.kicad_pcb");
    let other = dir.path().join("c_other.kicad_pcb");

    fs::write(&good, LAYOUT).expect("write good");
    fs::write(&bad, [0xff, 0xfe, 0x28, 0x00]).expect("write invalid utf-8");
    fs::write(&other, "(kicad_pcb (version 20211014))\n").expect("write other");

    let report = run(dir.path(), false);

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.modified(), vec![good.as_path()]);
    assert_eq!(report.unchanged(), vec![other.as_path()]);

    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, bad.as_path());
    assert!(failed[0].1.contains("b_bad.kicad_pcb"));
    assert!(!report.is_success());
}

#[test]
fn test_nested_directories_and_other_files() {
    let dir = TempDir::new().expect("temp dir");
    let nested = dir.path().join("hardware/rev2");
    fs::create_dir_all(&nested).expect("mkdir");

    let layout = nested.join("ppk_pd.kicad_pcb");
    let backup = nested.join("ppk_pd.kicad_pcb.bak");
    fs::write(&layout, LAYOUT).expect("write layout");
    fs::write(&backup, LAYOUT).expect("write backup");

    let report = run(dir.path(), false);

    assert_eq!(report.modified(), vec![layout.as_path()]);
    assert_eq!(fs::read_to_string(&backup).expect("read backup"), LAYOUT);
}
