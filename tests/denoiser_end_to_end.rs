//! End-to-end pipeline coverage over real files on disk: each case
//! writes a target and its references into a temp directory, runs the
//! denoiser, and compares the emitted lines.

use denoiser_rs::{ArtifactConfig, Config, Denoiser, Pattern, Rules};
use std::fs;
use std::path::Path;

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.display().to_string()
}

fn artifact(target: String, reference: Vec<String>, rules: Rules) -> ArtifactConfig {
    ArtifactConfig {
        alias: "job".into(),
        target,
        reference,
        rules,
    }
}

fn run(config: ArtifactConfig) -> Vec<String> {
    let mut denoiser = Denoiser::with_threads(config, 2);
    let mut emitted = Vec::new();
    denoiser
        .run(&mut |line| emitted.push(line.text().to_owned()))
        .unwrap();
    emitted
}

#[test]
fn pure_filter_suppression() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "a\nb\nc\n");

    let rules = Rules {
        filters: vec![Pattern::literal("b")],
        normalizers: vec![],
    };
    assert_eq!(run(artifact(target, vec![], rules)), vec!["a", "c"]);
}

#[test]
fn diff_against_one_reference() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "x\ny\nz\n");
    let reference = write(dir.path(), "ref.log", "y\nq\n");

    assert_eq!(
        run(artifact(target, vec![reference], Rules::default())),
        vec!["x", "z"]
    );
}

#[test]
fn normalization_collapses_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(
        dir.path(),
        "target.log",
        "INFO 10:00:00 started\nINFO 10:00:01 done\n",
    );
    let reference = write(
        dir.path(),
        "ref.log",
        "INFO 09:30:00 started\nINFO 09:30:01 done\n",
    );

    let rules = Rules {
        filters: vec![],
        normalizers: vec![Pattern::compile(r"\d{2}:\d{2}:\d{2}").unwrap()],
    };
    let emitted = run(artifact(target, vec![reference], rules));
    assert!(emitted.is_empty(), "unexpected lines: {emitted:?}");
}

#[test]
fn normalizer_order_is_semantic() {
    // "[a-z]+ \d+" then "\d+" consumes "foo 12" entirely; the reversed
    // order first deletes the digits, leaving nothing for the compound
    // pattern, so "foo" survives normalization.
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "foo 12\n");
    let reference = write(dir.path(), "ref.log", "bar\n");

    let forward = Rules {
        filters: vec![],
        normalizers: vec![
            Pattern::compile(r"[a-z]+ \d+").unwrap(),
            Pattern::compile(r"\d+").unwrap(),
        ],
    };
    let reversed = Rules {
        filters: vec![],
        normalizers: vec![
            Pattern::compile(r"\d+").unwrap(),
            Pattern::compile(r"[a-z]+ \d+").unwrap(),
        ],
    };

    // Forward: the line normalizes to the empty extent and is dropped.
    let emitted = run(artifact(target.clone(), vec![reference.clone()], forward));
    assert!(emitted.is_empty(), "unexpected lines: {emitted:?}");

    // Reversed: "foo" survives and differs from the reference.
    let emitted = run(artifact(target, vec![reference], reversed));
    assert_eq!(emitted, vec!["foo 12"]);
}

#[test]
fn missing_reference_is_fatal_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "a\n");
    let missing = dir.path().join("nope.log").display().to_string();

    let mut denoiser = Denoiser::with_threads(
        artifact(target, vec![missing], Rules::default()),
        2,
    );
    let mut count = 0usize;
    let err = denoiser.run(&mut |_| count += 1).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(count, 0);
}

#[test]
fn empty_reference_list_is_verbatim_modulo_own_rules() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "keep\ndrop this\nkeep too\n");

    let rules = Rules {
        filters: vec![Pattern::literal("drop")],
        normalizers: vec![],
    };
    assert_eq!(
        run(artifact(target, vec![], rules)),
        vec!["keep", "keep too"]
    );
}

#[test]
fn emitted_lines_keep_numbers_and_display_text() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(
        dir.path(),
        "target.log",
        "ok 11:11:11\nfail 22:22:22\nok 33:33:33\n",
    );
    let reference = write(dir.path(), "ref.log", "ok 44:44:44\n");

    let rules = Rules {
        filters: vec![],
        normalizers: vec![Pattern::compile(r"\d{2}:\d{2}:\d{2}").unwrap()],
    };
    let mut denoiser = Denoiser::with_threads(artifact(target, vec![reference], rules), 2);
    let mut emitted = Vec::new();
    denoiser
        .run(&mut |line| emitted.push((line.number(), line.text().to_owned())))
        .unwrap();
    // Both "ok" lines match the normalized reference; only the "fail"
    // line survives, with its original timestamp intact for display.
    assert_eq!(emitted, vec![(2, "fail 22:22:22".to_owned())]);
}

#[test]
fn multiple_references_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "a\nb\nc\nd\ne\n");
    let refs = vec![
        write(dir.path(), "r1.log", "a\nb\n"),
        write(dir.path(), "r2.log", "d\n"),
    ];

    assert_eq!(
        run(artifact(target, refs, Rules::default())),
        vec!["c", "e"]
    );
}

#[test]
fn file_uri_scheme_works_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "only\n");
    let uri = format!("file://{target}");

    assert_eq!(run(artifact(uri, vec![], Rules::default())), vec!["only"]);
}

/// The data-driven shape: configuration from YAML, expected output from
/// a file, both living next to the logs.
#[test]
fn yaml_configured_run_matches_expectation() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(
        dir.path(),
        "current.log",
        "[DEBUG] tracing junk\nbuild #4121 of thing\nnew failure here\nfinished at 10:31:07\n",
    );
    let reference = write(
        dir.path(),
        "good.log",
        "build #4019 of thing\nfinished at 09:02:44\n",
    );
    write(dir.path(), "expect.log", "new failure here\n");

    let yaml = format!(
        r##"
artifacts:
  - alias: nightly
    target: {target}
    reference:
      - {reference}
filters:
  - s: "[DEBUG]"
normalizers:
  - r: "#\\d+"
  - r: "\\d{{2}}:\\d{{2}}:\\d{{2}}"
"##
    );
    let config = Config::from_str(&yaml).unwrap();
    assert_eq!(config.len(), 1);

    let expected: Vec<String> = fs::read_to_string(dir.path().join("expect.log"))
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();

    let mut denoiser = Denoiser::new(config.artifacts.into_iter().next().unwrap());
    let mut emitted = Vec::new();
    denoiser
        .run(&mut |line| emitted.push(line.text().to_owned()))
        .unwrap();
    assert_eq!(emitted, expected);
}

#[test]
fn utf8_content_round_trips_through_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let target = write(dir.path(), "target.log", "héllo wörld\nsame\n\u{2764} new\n");
    let reference = write(dir.path(), "ref.log", "same\n");

    assert_eq!(
        run(artifact(target, vec![reference], Rules::default())),
        vec!["héllo wörld", "\u{2764} new"]
    );
}
