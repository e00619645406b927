/// Integration tests for mediaprep
///
/// These tests run the complete pipeline over temporary card dumps, with the
/// external tools replaced by a recording runner.
///
/// Test categories:
/// 1. Legacy and dated-card layouts
/// 2. Idempotence and resumption
/// 3. Failure isolation
/// 4. Dry-run mode verification
/// 5. Configuration and job selection
/// 6. Edge cases and error scenarios
use mediaprep::{
    ClassifyError, ConfigError, MediaConfig, MediaPipeline, PipelineError, ProcessingOutcome,
    RunOptions, RunSummary, ToolInvocation, ToolOutput, ToolRunner,
};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A test fixture that sets up a temporary base directory with a
/// configurable card dump for testing.
struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new test fixture with a temporary directory.
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        TestFixture { temp_dir }
    }

    /// Get the path to the base directory.
    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file with content, creating parent directories as needed.
    fn create_file(&self, rel_path: &str, content: &[u8]) {
        let file_path = self.path().join(rel_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content)
            .expect("Failed to write file content");
    }

    /// Create several files with their path as content.
    fn create_files(&self, rel_paths: &[&str]) {
        for rel_path in rel_paths {
            self.create_file(rel_path, rel_path.as_bytes());
        }
    }

    /// Assert that a file exists at the given relative path.
    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(
            path.exists() && path.is_file(),
            "File should exist: {}",
            path.display()
        );
    }

    /// Assert that a file does NOT exist at the given relative path.
    fn assert_file_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }

    /// All files below the base directory with their contents, sorted by path.
    fn snapshot(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.list_files_recursive()
            .into_iter()
            .map(|path| {
                let content = fs::read(&path).expect("Failed to read file");
                (path, content)
            })
            .collect()
    }

    /// List all files in the directory recursively.
    fn list_files_recursive(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        Self::walk_dir(self.path(), &mut files);
        files.sort();
        files
    }

    fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    Self::walk_dir(&path, files);
                } else {
                    files.push(path);
                }
            }
        }
    }

    /// Run the pipeline with the given configuration and runner.
    fn run(
        &self,
        config: MediaConfig,
        runner: &RecordingRunner,
        dry_run: bool,
    ) -> Result<RunSummary, PipelineError> {
        let compiled = config.compile().expect("Configuration should compile");
        MediaPipeline::new(&compiled, runner).run(self.path(), RunOptions { dry_run })
    }

    /// Run with the default configuration.
    fn run_default(&self, runner: &RecordingRunner) -> RunSummary {
        self.run(MediaConfig::default(), runner, false)
            .expect("Run should succeed")
    }
}

/// Records every invocation and writes the target like a real tool would.
/// Invocations whose target contains `fail_on` exit with status 1; those
/// containing `missing_on` cannot be started at all.
#[derive(Default)]
struct RecordingRunner {
    calls: RefCell<Vec<ToolInvocation>>,
    fail_on: Option<String>,
    missing_on: Option<String>,
}

impl RecordingRunner {
    fn failing_on(needle: &str) -> Self {
        RecordingRunner {
            fail_on: Some(needle.to_string()),
            ..RecordingRunner::default()
        }
    }

    fn unlaunchable_on(needle: &str) -> Self {
        RecordingRunner {
            missing_on: Some(needle.to_string()),
            ..RecordingRunner::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|call| call.program.clone())
            .collect()
    }
}

impl ToolRunner for RecordingRunner {
    fn run(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        self.calls.borrow_mut().push(invocation.clone());
        let target = invocation.args.last().cloned().unwrap_or_default();

        if self
            .missing_on
            .as_deref()
            .is_some_and(|needle| target.contains(needle))
        {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            ));
        }

        if self
            .fail_on
            .as_deref()
            .is_some_and(|needle| target.contains(needle))
        {
            return Ok(ToolOutput {
                success: false,
                exit_code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }

        let mut content = fs::read(&target).unwrap_or_default();
        content.extend_from_slice(format!(" | {}", invocation.args.join(" ")).as_bytes());
        fs::write(&target, content)?;

        Ok(ToolOutput {
            success: true,
            exit_code: Some(0),
            stderr: String::new(),
        })
    }
}

/// A typical camera dump: legacy jpg/ plus one dated card.
fn typical_dump(fixture: &TestFixture) {
    fixture.create_files(&[
        "jpg/img001.jpg",
        "jpg/img002.JPG",
        "jpg/img001.cr2",
        "jpg/clip.mov",
        "jpg/readme.txt",
        "raw-media/2020-01-01_card1/DCIM/100/img101.jpg",
        "raw-media/2020-01-01_card1/DCIM/100/img101.nef",
        "raw-media/2020-01-01_card1/clip.mov",
    ]);
}

// ============================================================================
// Test Suite 1: Legacy and Dated-Card Layouts
// ============================================================================

#[test]
fn test_legacy_non_images_are_relocated() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    fixture.assert_file_exists("raw/img001.cr2");
    fixture.assert_file_exists("vid/clip.mov");
    fixture.assert_file_exists("misc/readme.txt");
    fixture.assert_file_not_exists("jpg/img001.cr2");
    fixture.assert_file_not_exists("jpg/clip.mov");
    fixture.assert_file_not_exists("jpg/readme.txt");
    assert_eq!(summary.count(ProcessingOutcome::Moved), 3);
}

#[test]
fn test_dated_card_files_stay_in_place() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    fixture.assert_file_exists("raw-media/2020-01-01_card1/DCIM/100/img101.nef");
    fixture.assert_file_exists("raw-media/2020-01-01_card1/clip.mov");
    fixture.assert_file_not_exists("raw/img101.nef");
    assert_eq!(summary.count(ProcessingOutcome::LeftInPlace), 2);
}

#[test]
fn test_images_get_previews_and_sources_are_kept() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    fixture.assert_file_exists("0800/img001.jpg");
    fixture.assert_file_exists("0800/img002.JPG");
    fixture.assert_file_exists("0800/img101.jpg");
    fixture.assert_file_exists("jpg/img001.jpg");
    fixture.assert_file_exists("raw-media/2020-01-01_card1/DCIM/100/img101.jpg");

    let preview = fs::read_to_string(fixture.path().join("0800/img001.jpg")).unwrap();
    assert!(preview.starts_with("jpg/img001.jpg"));
    assert!(preview.contains("-resize 800x800"));
    assert!(preview.contains("-quality 50"));
    assert_eq!(summary.files_by_category[&mediaprep::Category::Image], 3);
}

#[test]
fn test_video_output_named_from_card_directory() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);
    let runner = RecordingRunner::default();

    fixture.run_default(&runner);

    fixture.assert_file_exists("vid-sm/2020-01-01_clip.webm");
    let ffmpeg_calls: Vec<_> = runner
        .calls
        .borrow()
        .iter()
        .filter(|call| call.program == "ffmpeg")
        .cloned()
        .collect();
    assert_eq!(ffmpeg_calls.len(), 1);
    assert!(ffmpeg_calls[0].args.contains(&"scale=640:360".to_string()));
}

#[test]
fn test_no_work_files_left_behind() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);
    let runner = RecordingRunner::default();

    fixture.run_default(&runner);

    assert!(
        fixture
            .list_files_recursive()
            .iter()
            .all(|path| !path.to_string_lossy().contains(".partial-"))
    );
}

// ============================================================================
// Test Suite 2: Idempotence and Resumption
// ============================================================================

#[test]
fn test_second_run_changes_nothing_and_invokes_no_tool() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);

    let first = RecordingRunner::default();
    let first_summary = fixture.run_default(&first);
    let converted = first_summary.count(ProcessingOutcome::Converted);
    assert_eq!(converted, 4);
    let after_first = fixture.snapshot();

    let second = RecordingRunner::default();
    let summary = fixture.run_default(&second);

    assert_eq!(second.call_count(), 0);
    assert_eq!(fixture.snapshot(), after_first);
    assert_eq!(summary.count(ProcessingOutcome::Converted), 0);
    assert_eq!(summary.count(ProcessingOutcome::Moved), 0);
    assert_eq!(summary.count(ProcessingOutcome::SkippedExists), converted);
    assert_eq!(summary.failure_count(), 0);
}

#[test]
fn test_deleted_preview_is_rebuilt() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);
    fixture.run_default(&RecordingRunner::default());
    fs::remove_file(fixture.path().join("0800/img002.JPG")).unwrap();

    let runner = RecordingRunner::default();
    let summary = fixture.run_default(&runner);

    fixture.assert_file_exists("0800/img002.JPG");
    assert_eq!(runner.call_count(), 1);
    assert_eq!(summary.count(ProcessingOutcome::Converted), 1);
    assert_eq!(summary.count(ProcessingOutcome::SkippedExists), 3);
}

// ============================================================================
// Test Suite 3: Failure Isolation
// ============================================================================

#[test]
fn test_single_tool_failure_does_not_stop_batch() {
    let fixture = TestFixture::new();
    fixture.create_files(&["jpg/a.jpg", "jpg/broken.jpg", "jpg/c.jpg"]);
    let runner = RecordingRunner::failing_on("broken");

    let summary = fixture.run_default(&runner);

    assert_eq!(summary.failure_count(), 1);
    assert_eq!(summary.count(ProcessingOutcome::FailedExternalTool), 1);
    assert_eq!(summary.count(ProcessingOutcome::Converted), 2);
    assert_eq!(runner.call_count(), 3);

    fixture.assert_file_exists("0800/a.jpg");
    fixture.assert_file_exists("0800/c.jpg");
    fixture.assert_file_not_exists("0800/broken.jpg");
    fixture.assert_file_not_exists("0800/.partial-broken.jpg");

    let failure = &summary.failures[0];
    assert!(failure.path.ends_with("jpg/broken.jpg"));
    assert_eq!(failure.job.as_deref(), Some("800"));
    assert!(failure.reason.contains("exit code 1"));
    assert!(failure.reason.contains("simulated failure"));
}

#[test]
fn test_missing_tool_fails_file_and_batch_continues() {
    let fixture = TestFixture::new();
    fixture.create_files(&["jpg/a.jpg", "jpg/nogm.jpg", "jpg/c.jpg"]);
    let runner = RecordingRunner::unlaunchable_on("nogm");

    let summary = fixture.run_default(&runner);

    assert_eq!(summary.count(ProcessingOutcome::Failed), 1);
    assert_eq!(summary.count(ProcessingOutcome::Converted), 2);
    assert_eq!(summary.failure_count(), 1);
    assert_eq!(runner.call_count(), 3);

    fixture.assert_file_exists("0800/a.jpg");
    fixture.assert_file_exists("0800/c.jpg");
    fixture.assert_file_not_exists("0800/nogm.jpg");
    assert!(
        fixture
            .list_files_recursive()
            .iter()
            .all(|path| !path.to_string_lossy().contains(".partial-"))
    );

    let failure = &summary.failures[0];
    assert!(failure.path.ends_with("jpg/nogm.jpg"));
    assert_eq!(failure.outcome, ProcessingOutcome::Failed);
    assert!(failure.reason.contains("gm"));
}

#[test]
fn test_failed_output_is_retried_on_next_run() {
    let fixture = TestFixture::new();
    fixture.create_files(&["jpg/broken.jpg"]);
    fixture.run_default(&RecordingRunner::failing_on("broken"));

    let runner = RecordingRunner::default();
    let summary = fixture.run_default(&runner);

    assert_eq!(summary.count(ProcessingOutcome::Converted), 1);
    fixture.assert_file_exists("0800/broken.jpg");
}

#[test]
fn test_video_without_card_directory_is_skipped() {
    let fixture = TestFixture::new();
    fixture.create_files(&["raw-media/clip.mov", "raw-media/2021-06-30_b/ok.mts"]);
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    assert_eq!(summary.count(ProcessingOutcome::SkippedUnderivablePath), 1);
    assert_eq!(summary.count(ProcessingOutcome::Converted), 1);
    fixture.assert_file_exists("vid-sm/2021-06-30_ok.webm");
    assert_eq!(runner.programs(), ["ffmpeg"]);
}

// ============================================================================
// Test Suite 4: Dry-Run Mode Verification
// ============================================================================

#[test]
fn test_dry_run_changes_nothing() {
    let fixture = TestFixture::new();
    typical_dump(&fixture);
    let before = fixture.snapshot();
    let runner = RecordingRunner::default();

    let summary = fixture
        .run(MediaConfig::default(), &runner, true)
        .expect("Dry run should succeed");

    assert_eq!(fixture.snapshot(), before);
    assert_eq!(runner.call_count(), 0);
    assert!(summary.dry_run);
    assert_eq!(summary.count(ProcessingOutcome::Moved), 3);
    assert_eq!(summary.count(ProcessingOutcome::Converted), 4);
}

#[test]
fn test_dry_run_reports_the_same_outcomes_as_real_run() {
    let dry_fixture = TestFixture::new();
    typical_dump(&dry_fixture);
    let dry = dry_fixture
        .run(MediaConfig::default(), &RecordingRunner::default(), true)
        .expect("Dry run should succeed");

    let real_fixture = TestFixture::new();
    typical_dump(&real_fixture);
    let real = real_fixture.run_default(&RecordingRunner::default());

    assert_eq!(dry.counts, real.counts);
    assert_eq!(dry.files_by_category, real.files_by_category);
    let outcomes = |summary: &RunSummary| -> Vec<_> {
        summary
            .failures
            .iter()
            .map(|failure| (failure.outcome, failure.job.clone()))
            .collect()
    };
    assert_eq!(outcomes(&dry), outcomes(&real));
    assert_eq!(dry.count(ProcessingOutcome::SkippedUnderivablePath), 1);
    assert!(dry.failures[0].path.ends_with("vid/clip.mov"));
}

// ============================================================================
// Test Suite 5: Configuration and Job Selection
// ============================================================================

#[test]
fn test_multiple_jobs_fan_out_one_source() {
    let fixture = TestFixture::new();
    fixture.create_files(&["jpg/a.jpg"]);
    let config = MediaConfig::from_toml(
        r#"
        [[jobs]]
        name = "800"
        destination_subdir = "0800"
        applies_to = "image"
        resize_dimensions = "800x800"

        [[jobs]]
        name = "200"
        destination_subdir = "0200"
        applies_to = "image"
        resize_dimensions = "200x200"
        "#,
    )
    .unwrap();
    let runner = RecordingRunner::default();

    let summary = fixture.run(config, &runner, false).unwrap();

    fixture.assert_file_exists("0800/a.jpg");
    fixture.assert_file_exists("0200/a.jpg");
    assert_eq!(summary.count(ProcessingOutcome::Converted), 2);
}

#[test]
fn test_selected_crop_job_runs_two_invocations() {
    let fixture = TestFixture::new();
    fixture.create_files(&["jpg/a.jpg"]);
    let compiled = MediaConfig::default()
        .compile()
        .unwrap()
        .restrict_jobs(&["1080"])
        .unwrap();
    let runner = RecordingRunner::default();

    let summary = MediaPipeline::new(&compiled, &runner)
        .run(fixture.path(), RunOptions::default())
        .unwrap();

    fixture.assert_file_exists("1080/a.jpg");
    fixture.assert_file_not_exists("0800/a.jpg");
    assert_eq!(runner.call_count(), 2);
    assert_eq!(summary.count(ProcessingOutcome::Converted), 1);
    let content = fs::read_to_string(fixture.path().join("1080/a.jpg")).unwrap();
    assert!(content.contains("-resize 2000x2000^"));
    assert!(content.contains("-gravity center -extent 1920x1080"));
}

#[test]
fn test_unknown_job_name_fails_fast() {
    let compiled = MediaConfig::default().compile().unwrap();
    assert!(matches!(
        compiled.restrict_jobs(&["800", "thumbnail"]),
        Err(ConfigError::UnknownJobSpec(name)) if name == "thumbnail"
    ));
}

#[test]
fn test_skip_policy_keeps_existing_relocation_target() {
    let fixture = TestFixture::new();
    fixture.create_file("jpg/notes.txt", b"new");
    fixture.create_file("misc/notes.txt", b"old");
    let config = MediaConfig::from_toml("[relocate]\non_existing = \"skip\"\n").unwrap();
    let runner = RecordingRunner::default();

    let summary = fixture.run(config, &runner, false).unwrap();

    assert_eq!(summary.count(ProcessingOutcome::SkippedExists), 1);
    assert_eq!(fs::read(fixture.path().join("misc/notes.txt")).unwrap(), b"old");
    fixture.assert_file_exists("jpg/notes.txt");
}

#[test]
fn test_default_policy_overwrites_relocation_target() {
    let fixture = TestFixture::new();
    fixture.create_file("jpg/notes.txt", b"new");
    fixture.create_file("misc/notes.txt", b"old");
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    assert_eq!(summary.count(ProcessingOutcome::Moved), 1);
    assert_eq!(fs::read(fixture.path().join("misc/notes.txt")).unwrap(), b"new");
    fixture.assert_file_not_exists("jpg/notes.txt");
}

#[test]
fn test_hidden_and_excluded_files_are_ignored() {
    let fixture = TestFixture::new();
    fixture.create_files(&[
        "jpg/.DS_Store",
        "jpg/Thumbs.db",
        "jpg/._img001.jpg",
        "raw-media/.Trashes/501/lost.jpg",
        "jpg/img001.jpg",
    ]);
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    assert_eq!(summary.files_by_category.values().sum::<usize>(), 1);
    fixture.assert_file_exists("jpg/Thumbs.db");
    fixture.assert_file_not_exists("misc/Thumbs.db");
    fixture.assert_file_not_exists("0800/lost.jpg");
}

// ============================================================================
// Test Suite 6: Edge Cases and Error Scenarios
// ============================================================================

#[test]
fn test_missing_base_directory_is_fatal() {
    let runner = RecordingRunner::default();
    let compiled = MediaConfig::default().compile().unwrap();

    let result = MediaPipeline::new(&compiled, &runner)
        .run(Path::new("/non/existent/path"), RunOptions::default());

    assert!(matches!(
        result,
        Err(PipelineError::Classify(ClassifyError::DirectoryNotFound(_)))
    ));
}

#[test]
fn test_base_without_input_layout_is_fatal() {
    let fixture = TestFixture::new();
    fixture.create_files(&["photos/a.jpg"]);
    let runner = RecordingRunner::default();

    let result = fixture.run(MediaConfig::default(), &runner, false);

    assert!(matches!(result, Err(PipelineError::MissingInputLayout { .. })));
    fixture.assert_file_exists("photos/a.jpg");
}

#[test]
fn test_organized_output_is_never_moved_or_reprocessed() {
    let fixture = TestFixture::new();
    fixture.create_files(&[
        "jpg/keep.jpg",
        "0800/old.jpg",
        "vid/old.mov",
        "misc/old.txt",
        "work/edit.tif",
    ]);
    let before: Vec<_> = ["0800/old.jpg", "vid/old.mov", "misc/old.txt", "work/edit.tif"]
        .iter()
        .map(|rel| fs::read(fixture.path().join(rel)).unwrap())
        .collect();
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    let after: Vec<_> = ["0800/old.jpg", "vid/old.mov", "misc/old.txt", "work/edit.tif"]
        .iter()
        .map(|rel| fs::read(fixture.path().join(rel)).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(summary.count(ProcessingOutcome::Moved), 0);
    assert_eq!(summary.count(ProcessingOutcome::LeftInPlace), 3);
    assert_eq!(summary.count(ProcessingOutcome::SkippedUnderivablePath), 1);
    assert!(summary.failures[0].path.ends_with("vid/old.mov"));
    assert_eq!(runner.call_count(), 1);
    fixture.assert_file_not_exists("0800/0800/old.jpg");
    fixture.assert_file_not_exists("vid-sm/old.webm");
}

#[test]
fn test_empty_legacy_directory_runs_cleanly() {
    let fixture = TestFixture::new();
    fs::create_dir(fixture.path().join("jpg")).unwrap();
    let runner = RecordingRunner::default();

    let summary = fixture.run_default(&runner);

    assert_eq!(summary.total(), 0);
    assert_eq!(runner.call_count(), 0);
}

#[test]
fn test_summary_json_reports_counts_and_failures() {
    let fixture = TestFixture::new();
    fixture.create_files(&["jpg/a.jpg", "jpg/broken.jpg"]);
    let runner = RecordingRunner::failing_on("broken");

    let summary = fixture.run_default(&runner);
    let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();

    assert_eq!(json["counts"]["converted"], 1);
    assert_eq!(json["counts"]["failed_external_tool"], 1);
    assert_eq!(json["files_by_category"]["image"], 2);
    assert_eq!(json["failures"][0]["outcome"], "failed_external_tool");
    assert_eq!(json["failures"][0]["job"], "800");
}
