use super::*;
use crate::project::model::{OutputKind, Track};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("moozic_{name}_{}_{nanos}", std::process::id()))
}

fn one_track_project() -> ModProject {
    let mut p = ModProject::new("Unit", "Unit");
    p.tracks.push(Track {
        id: "a".to_string(),
        title: None,
        artist: None,
        source: PathBuf::from("a.wav"),
        outputs: vec![OutputKind::Cassette],
        b_side: None,
        cover: Default::default(),
        status: TrackStatus::Converted,
    });
    p
}

#[test]
fn zero_worker_pool_is_rejected() {
    assert!(matches!(
        build_thread_pool(0),
        Err(MoozicError::Validation(_))
    ));
    assert_eq!(build_thread_pool(2).unwrap().current_num_threads(), 2);
}

#[test]
fn invalid_project_fails_in_validation_without_writes() {
    let root = temp_dir("orch_invalid");
    let cfg = BuildConfig {
        output_dir: root.join("out"),
        cache_dir: root.join("cache"),
        ..BuildConfig::default()
    };
    let mut project = one_track_project();
    project.mod_id = "has space".to_string();

    let (tx, rx) = mpsc::channel();
    let result = BuildOrchestrator::new(cfg).with_events(tx).run(&mut project);

    assert_eq!(result.stage, BuildStage::Failed);
    assert!(matches!(result.status, BuildStatus::Failed(ref r) if r.contains("validation")));
    assert!(!result.tree_ready);
    assert!(!root.exists());
    assert_eq!(project.tracks[0].status, TrackStatus::Pending);

    let stages: Vec<BuildStage> = rx
        .try_iter()
        .filter_map(|e| match e {
            BuildEvent::Stage(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![BuildStage::Idle, BuildStage::Validating, BuildStage::Failed]
    );
}

#[test]
fn cancelled_before_start_writes_nothing() {
    let root = temp_dir("orch_cancel");
    let cfg = BuildConfig {
        output_dir: root.join("out"),
        cache_dir: root.join("cache"),
        ..BuildConfig::default()
    };
    let orch = BuildOrchestrator::new(cfg);
    orch.cancel_token().cancel();
    let result = orch.run(&mut one_track_project());
    assert_eq!(result.status, BuildStatus::Cancelled);
    assert_eq!(result.stage, BuildStage::Failed);
    assert!(!root.exists());
}

#[test]
fn summary_lines_report_every_entry() {
    let result = BuildResult {
        status: BuildStatus::PartiallySucceeded { failed: 1 },
        stage: BuildStage::Done,
        tracks: vec![
            TrackOutcome {
                index: 0,
                track_id: "a".to_string(),
                result: Ok(TrackAudio {
                    output: PathBuf::from("x/a.ogg"),
                    cache_path: PathBuf::from("c/a.ogg"),
                    backend: BackendKind::Native,
                    cached: true,
                }),
            },
            TrackOutcome {
                index: 1,
                track_id: "b".to_string(),
                result: Err("conversion error: boom".to_string()),
            },
        ],
        covers: vec![CoverOutcome {
            target: CoverTarget::Track {
                index: 0,
                track_id: "a".to_string(),
                variant: MaskVariant::CassetteFront,
            },
            result: Ok(PathBuf::from("x/TMCassette_a.png")),
        }],
        items: vec!["Cassettea".to_string()],
        skipped: vec![SkippedItem {
            track_id: "b".to_string(),
            item: "Cassetteb".to_string(),
            reason: "audio not converted".to_string(),
        }],
        tree: Some(PathBuf::from("out/Unit")),
        tree_ready: true,
    };

    assert_eq!(result.failure_count(), 1);
    assert!(!result.is_success());
    let lines = result.summary_lines();
    assert_eq!(
        lines[0],
        "build partially succeeded (1 failed): 2 track(s), 1 cover(s), 1 item(s)"
    );
    assert!(lines.contains(&"  ok   track 'a' -> x/a.ogg (native, cached)".to_string()));
    assert!(lines.contains(&"  FAIL track 'b': conversion error: boom".to_string()));
    assert!(lines.contains(&"  ok   cover 'a' cassette-front -> x/TMCassette_a.png".to_string()));
    assert!(lines.contains(&"  skip item Cassetteb: audio not converted".to_string()));
    assert_eq!(lines.last().map(String::as_str), Some("tree ready: out/Unit"));
}

#[test]
fn swap_in_replaces_tree_and_drops_previous() {
    let root = temp_dir("orch_swap");
    let (staging, tree, retired) = (root.join("staging"), root.join("tree"), root.join("old"));
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::create_dir_all(&tree).unwrap();
    std::fs::write(staging.join("new.txt"), b"new").unwrap();
    std::fs::write(tree.join("old.txt"), b"old").unwrap();

    swap_in(&staging, &tree, &retired).unwrap();
    assert!(tree.join("new.txt").is_file());
    assert!(!tree.join("old.txt").exists());
    assert!(!staging.exists());
    assert!(!retired.exists());
    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn failed_swap_restores_previous_tree() {
    let root = temp_dir("orch_swap_fail");
    let (staging, tree, retired) = (root.join("staging"), root.join("tree"), root.join("old"));
    std::fs::create_dir_all(&tree).unwrap();
    std::fs::write(tree.join("old.txt"), b"old").unwrap();

    assert!(swap_in(&staging, &tree, &retired).is_err());
    assert_eq!(std::fs::read(tree.join("old.txt")).unwrap(), b"old");
    assert!(!retired.exists());
    std::fs::remove_dir_all(&root).ok();
}
