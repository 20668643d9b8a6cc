mod common;

use std::cell::Cell;

use common::RecordingRunner;
use fdm::docker::Docker;
use fdm::prompt::{Confirm, FixedAnswer};
use fdm::{ContainerSpec, DeployError, DeployResult, ImageProvider, ImageTag};

fn web() -> ContainerSpec {
    ContainerSpec::new("web")
        .source("git@example.com:acme/web.git", "main", "/srv/web")
        .build_arg("--pull")
}

#[test]
fn fixed_image_is_pulled_and_returned() {
    let runner = RecordingRunner::new();
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);
    let spec = ContainerSpec::new("cache").image("redis:6");

    let tag = provider.resolve_image(&spec, "staging").unwrap();

    assert_eq!(tag, ImageTag::new("redis:6"));
    assert_eq!(runner.lines(), vec!["docker pull redis:6"]);
    assert_eq!(runner.count(&["git"]), 0);
}

#[test]
fn image_wins_over_build_source() {
    let runner = RecordingRunner::new();
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);
    let spec = web().image("nginx:1.27");

    let tag = provider.resolve_image(&spec, "staging").unwrap();

    assert_eq!(tag.as_str(), "nginx:1.27");
    assert_eq!(runner.calls().len(), 1);
}

#[test]
fn missing_image_source_issues_no_commands() {
    let runner = RecordingRunner::new();
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    let err = provider
        .resolve_image(&ContainerSpec::new("ghost"), "staging")
        .unwrap_err();

    assert!(matches!(err, DeployError::MissingImageSource(ref name) if name == "ghost"));
    assert!(err.is_configuration());
    assert!(runner.calls().is_empty());
}

#[test]
fn builds_with_revision_and_latest_tags() {
    let runner = RecordingRunner::new();
    runner.respond(&["git", "describe"], "a1b2c3d\n");
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    let tag = provider.resolve_image(&web(), "staging").unwrap();

    assert_eq!(tag.as_str(), "web/staging:a1b2c3d");
    let lines = runner.lines();
    assert!(lines.contains(
        &"cd /srv/web && docker build --tag web/staging:a1b2c3d --tag web/staging:latest --pull ."
            .to_string()
    ));

    let sync = runner.position(&["git", "pull"]).unwrap();
    let describe = runner.position(&["git", "describe"]).unwrap();
    let build = runner.position(&["docker", "build"]).unwrap();
    assert!(sync < describe && describe < build);
}

#[test]
fn existing_checkout_is_synced_not_cloned() {
    let runner = RecordingRunner::new();
    runner.respond(&["git", "describe"], "a1b2c3d");
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    provider.resolve_image(&web(), "staging").unwrap();

    assert_eq!(runner.count(&["git", "clone"]), 0);
    let lines = runner.lines();
    for expected in [
        "cd /srv/web && git fetch origin",
        "cd /srv/web && git checkout main",
        "cd /srv/web && git reset --hard",
        "cd /srv/web && git clean -d -x -f",
        "cd /srv/web && git pull origin main",
    ] {
        assert!(lines.contains(&expected.to_string()), "missing {expected}");
    }
}

#[test]
fn missing_checkout_is_cloned_shallow() {
    let runner = RecordingRunner::new();
    runner
        .fail(&["test", "-d"], 1)
        .respond(&["git", "describe"], "a1b2c3d");
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    provider.resolve_image(&web(), "staging").unwrap();

    assert!(runner.lines().contains(
        &"git clone --branch=main --depth=1 git@example.com:acme/web.git /srv/web".to_string()
    ));
    let clone = runner.position(&["git", "clone"]).unwrap();
    let sync = runner.position(&["git", "fetch"]).unwrap();
    assert!(clone < sync);
}

#[test]
fn existing_image_skips_build_when_confirmed() {
    let runner = RecordingRunner::new();
    runner
        .respond(&["git", "describe"], "a1b2c3d")
        .respond(&["docker", "images"], "")
        .respond(&["docker", "images"], "sha256:1234");
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    let first = provider.resolve_image(&web(), "staging").unwrap();
    assert_eq!(runner.count(&["docker", "build"]), 1);

    let second = provider.resolve_image(&web(), "staging").unwrap();

    assert_eq!(first, second);
    assert_eq!(runner.count(&["docker", "build"]), 1);
    // The checkout is still synced before the revision is read.
    assert_eq!(runner.count(&["git", "pull"]), 2);
}

#[test]
fn existing_image_is_rebuilt_when_declined() {
    let runner = RecordingRunner::new();
    runner
        .respond(&["git", "describe"], "a1b2c3d")
        .respond(&["docker", "images"], "sha256:1234");
    let confirm = FixedAnswer(false);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    provider.resolve_image(&web(), "staging").unwrap();

    assert_eq!(runner.count(&["docker", "build"]), 1);
}

#[test]
fn build_path_changes_build_directory() {
    let runner = RecordingRunner::new();
    runner.respond(&["git", "describe"], "a1b2c3d");
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);
    let spec = web().build_path("services/api");

    provider.resolve_image(&spec, "production").unwrap();

    let build = runner
        .calls()
        .into_iter()
        .find(|c| c.starts_with(&["docker", "build"]))
        .unwrap();
    assert_eq!(build.dir.as_deref(), Some("/srv/web/services/api"));
}

#[test]
fn build_failure_propagates() {
    let runner = RecordingRunner::new();
    runner
        .respond(&["git", "describe"], "a1b2c3d")
        .fail(&["docker", "build"], 1);
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    let err = provider.resolve_image(&web(), "staging").unwrap_err();

    assert!(matches!(err, DeployError::CommandFailed { code: Some(1), .. }));
    // The lock is still released.
    assert_eq!(runner.count(&["rmdir", "/srv/web.fdm-lock"]), 1);
}

#[test]
fn held_lock_aborts_before_touching_checkout() {
    let runner = RecordingRunner::new();
    runner.fail(&["mkdir", "/srv/web.fdm-lock"], 1);
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    let err = provider.resolve_image(&web(), "staging").unwrap_err();

    assert!(matches!(
        err,
        DeployError::BuildLocked { ref code_dir, ref lock }
            if code_dir == "/srv/web" && lock == "/srv/web.fdm-lock"
    ));
    assert!(err.to_string().contains("remove /srv/web.fdm-lock"));
    assert_eq!(runner.count(&["git"]), 0);
    assert_eq!(runner.count(&["rmdir"]), 0);
}

/// Answers `answer`, recording whether the build lock was held at
/// the time of the question.
struct LockAwarePrompt<'a> {
    runner: &'a RecordingRunner,
    answer: bool,
    held: Cell<Option<bool>>,
}

impl Confirm for LockAwarePrompt<'_> {
    fn confirm(&self, _question: &str) -> DeployResult<bool> {
        let taken = self.runner.count(&["mkdir", "/srv/web.fdm-lock"]);
        let released = self.runner.count(&["rmdir", "/srv/web.fdm-lock"]);
        self.held.set(Some(taken > released));
        Ok(self.answer)
    }
}

#[test]
fn lock_is_released_while_prompting() {
    let runner = RecordingRunner::new();
    runner
        .respond(&["git", "describe"], "a1b2c3d")
        .respond(&["docker", "images"], "sha256:1234");
    let confirm = LockAwarePrompt {
        runner: &runner,
        answer: true,
        held: Cell::new(None),
    };
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    provider.resolve_image(&web(), "staging").unwrap();

    assert_eq!(confirm.held.get(), Some(false));
    assert_eq!(runner.count(&["docker", "build"]), 0);
}

#[test]
fn declined_prompt_relocks_before_building() {
    let runner = RecordingRunner::new();
    runner
        .respond(&["git", "describe"], "a1b2c3d")
        .respond(&["docker", "images"], "sha256:1234");
    let confirm = LockAwarePrompt {
        runner: &runner,
        answer: false,
        held: Cell::new(None),
    };
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    provider.resolve_image(&web(), "staging").unwrap();

    assert_eq!(confirm.held.get(), Some(false));
    let relock = runner
        .calls()
        .iter()
        .rposition(|c| c.starts_with(&["mkdir", "/srv/web.fdm-lock"]))
        .unwrap();
    let build = runner.position(&["docker", "build"]).unwrap();
    assert!(relock < build);
    assert_eq!(runner.count(&["rmdir", "/srv/web.fdm-lock"]), 2);
}

#[test]
fn checkout_moving_during_prompt_aborts() {
    let runner = RecordingRunner::new();
    runner
        .respond(&["git", "describe"], "a1b2c3d")
        .respond(&["git", "describe"], "e4f5a6b")
        .respond(&["docker", "images"], "sha256:1234");
    let confirm = FixedAnswer(false);
    let provider = ImageProvider::new(&runner, Docker::default(), &confirm);

    let err = provider.resolve_image(&web(), "staging").unwrap_err();

    assert!(matches!(err, DeployError::Other(ref msg) if msg.contains("moved")));
    assert_eq!(runner.count(&["docker", "build"]), 0);
    assert_eq!(runner.count(&["rmdir", "/srv/web.fdm-lock"]), 2);
}

#[test]
fn sudo_prefixes_docker() {
    let runner = RecordingRunner::new();
    let confirm = FixedAnswer(true);
    let provider = ImageProvider::new(&runner, Docker::new(true), &confirm);

    provider
        .resolve_image(&ContainerSpec::new("cache").image("redis:6"), "staging")
        .unwrap();

    assert_eq!(runner.lines(), vec!["sudo docker pull redis:6"]);
}
