use std::fs;

use fdm::config::StageConfig;
use fdm::error::DeployError;
use fdm::hook::Hooks;

const STAGING: &str = r#"
[server]
host = "${DEPLOY_HOST}"
user = "deploy"
sudo = true

[containers.app_1]
build = "git@example.com:acme/app.git"
branch = "main"
code_dir = "$HOME/app"
build_path = "docker"
build_args = ["--build-arg=VERSION=${VERSION}"]
environments = ["SECRET=${SECRET}", "UNSET=${NOT_DEFINED}"]
ports = ["80:80"]
cmds = ["--network=web"]
hook_before_deploy = "migrate"

[containers.cache]
name = "redis"
image = "redis:6"
display_name = "staging_redis"

[hooks.migrate]
command = ["docker", "run", "--rm", "{image}", "./migrate"]

[database.main]
user = "app"
name = "app_production"
local_database = "app_dev"

[[redirects]]
from = "http://example.com"
to = "https://example.com/"
"#;

fn env(name: &str) -> Option<String> {
    match name {
        "DEPLOY_HOST" => Some("app.example.com".into()),
        "HOME" => Some("/home/deploy".into()),
        "VERSION" => Some("1.2.3".into()),
        "SECRET" => Some("s3cret".into()),
        _ => None,
    }
}

#[test]
fn parses_full_stage() {
    let config = StageConfig::parse("staging", STAGING, &Hooks::new(), env).unwrap();

    let server = config.server.as_ref().unwrap();
    assert_eq!(server.host, "app.example.com");
    assert_eq!(server.port, 22);
    assert!(server.sudo);
    assert!(config.is_remote());

    let app = config.container_spec("app_1").unwrap();
    assert_eq!(app.name, "app_1");
    let source = app.source.as_ref().unwrap();
    assert_eq!(source.url, "git@example.com:acme/app.git");
    assert_eq!(source.code_dir, "/home/deploy/app");
    assert_eq!(source.build_dir(), "/home/deploy/app/docker");
    assert_eq!(source.build_args, vec!["--build-arg=VERSION=1.2.3"]);
    assert_eq!(
        app.environments,
        vec!["SECRET=s3cret", "UNSET=${NOT_DEFINED}"]
    );
    assert_eq!(app.extra_args, vec!["--network=web"]);
    assert_eq!(
        app.hook_before_deploy.as_ref().map(|h| h.name.as_str()),
        Some("migrate")
    );
    assert!(app.hook_after_deploy.is_none());

    let cache = config.container_spec("cache").unwrap();
    assert_eq!(cache.name, "redis");
    assert_eq!(cache.image.as_deref(), Some("redis:6"));
    assert_eq!(cache.display_name.as_deref(), Some("staging_redis"));

    let keys: Vec<&String> = config.containers.keys().collect();
    assert_eq!(keys, vec!["app_1", "cache"]);

    let db = config.database("main").unwrap();
    assert_eq!(db.host, "localhost");
    assert_eq!(db.port, 5432);
    assert_eq!(db.backup_dir, ".");
    assert_eq!(db.local_database.as_deref(), Some("app_dev"));

    assert_eq!(config.redirects.len(), 1);
    assert_eq!(config.redirects[0].status, 301);
    assert_eq!(config.redirects[0].warn_days, 14);
}

#[test]
fn no_server_means_local() {
    let config = StageConfig::parse(
        "local",
        "[containers.cache]\nimage = \"redis:6\"\n",
        &Hooks::new(),
        env,
    )
    .unwrap();

    assert!(!config.is_remote());
    assert_eq!(config.runner().target(), "localhost");
}

#[test]
fn container_without_image_or_source_is_rejected() {
    let err = StageConfig::parse(
        "staging",
        "[containers.empty]\nports = [\"80:80\"]\n",
        &Hooks::new(),
        env,
    )
    .unwrap_err();

    assert!(matches!(err, DeployError::MissingImageSource(ref key) if key == "empty"));
    assert!(err.is_configuration());
}

#[test]
fn partial_build_source_is_rejected() {
    let err = StageConfig::parse(
        "staging",
        "[containers.app]\nbuild = \"git@example.com:a.git\"\nbranch = \"main\"\n",
        &Hooks::new(),
        env,
    )
    .unwrap_err();

    assert!(matches!(err, DeployError::Config(_)));
}

#[test]
fn unknown_hook_is_rejected() {
    let err = StageConfig::parse(
        "staging",
        "[containers.cache]\nimage = \"redis:6\"\nhook_after_deploy = \"typo\"\n",
        &Hooks::new(),
        env,
    )
    .unwrap_err();

    assert!(matches!(err, DeployError::HookNotFound(ref name) if name == "typo"));
}

#[test]
fn registered_hook_resolves() {
    let hooks = Hooks::new().register("notify", |_, _| Ok(()));

    let config = StageConfig::parse(
        "staging",
        "[containers.cache]\nimage = \"redis:6\"\nhook_after_deploy = \"notify\"\n",
        &hooks,
        env,
    )
    .unwrap();

    let cache = config.container_spec("cache").unwrap();
    assert_eq!(
        cache.hook_after_deploy.as_ref().map(|h| h.name.as_str()),
        Some("notify")
    );
}

#[test]
fn unknown_container_and_database() {
    let config = StageConfig::parse("staging", "", &Hooks::new(), env).unwrap();

    assert!(matches!(
        config.container_spec("web"),
        Err(DeployError::ContainerNotFound(_))
    ));
    assert!(matches!(
        config.database("main"),
        Err(DeployError::DatabaseNotFound(_))
    ));
}

#[test]
fn invalid_toml_is_configuration_error() {
    let err = StageConfig::parse("staging", "[server\nhost=", &Hooks::new(), env).unwrap_err();

    assert!(matches!(err, DeployError::Toml(_)));
    assert!(err.is_configuration());
}

#[test]
fn loads_stage_file_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("production.toml"),
        "[containers.cache]\nimage = \"redis:7\"\n",
    )
    .unwrap();

    let hooks = Hooks::new();
    let config = StageConfig::load(dir.path(), "production", &hooks).unwrap();

    assert_eq!(config.stage, "production");
    assert_eq!(
        config.container_spec("cache").unwrap().image.as_deref(),
        Some("redis:7")
    );
}

#[test]
fn missing_stage_file() {
    let dir = tempfile::tempdir().unwrap();

    let hooks = Hooks::new();
    let err = StageConfig::load(dir.path(), "qa", &hooks).unwrap_err();

    assert!(matches!(err, DeployError::StageNotFound { ref stage, .. } if stage == "qa"));
    assert!(err.to_string().contains("qa.toml"));
}

#[test]
fn display_name_must_contain_instance_prefix() {
    let err = StageConfig::parse(
        "staging",
        "[containers.cache]\nimage = \"redis:6\"\ndisplay_name = \"redis\"\n",
        &Hooks::new(),
        env,
    )
    .unwrap_err();

    assert!(matches!(err, DeployError::Config(ref msg) if msg.contains("staging_cache")));
    assert!(err.is_configuration());
}
