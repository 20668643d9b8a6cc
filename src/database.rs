use std::path::Path;

use tracing::{info, warn};

use crate::cmd;
use crate::command::CommandLine;
use crate::config::DatabaseSpec;
use crate::deploy::epoch_millis;
use crate::docker::Docker;
use crate::error::DeployResult;
use crate::prompt::Confirm;
use crate::runner::Runner;

/// What a backup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Local path of the downloaded tarball.
    pub archive: String,
    pub restored_into: Option<String>,
}

/// Dumps a Postgres database on the target host and downloads the
/// dump.
pub struct DatabaseBackup<'a> {
    runner: &'a dyn Runner,
    docker: Docker,
    confirm: &'a dyn Confirm,
}

impl<'a> DatabaseBackup<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn Runner, docker: Docker, confirm: &'a dyn Confirm) -> Self {
        Self {
            runner,
            docker,
            confirm,
        }
    }

    /// Dump `db` with `pg_dump`, pack it into a tarball and fetch it
    /// into `db.backup_dir`. When a local database is configured and
    /// the operator agrees, restore the dump into it.
    pub fn backup(&self, stage: &str, db: &DatabaseSpec) -> DeployResult<BackupReport> {
        let base = format!("{}_{stage}_{}", db.name, epoch_millis());
        let dump_name = format!("{base}.dump");
        let archive_name = format!("{base}.tar.gz");
        let remote_dump = format!("/tmp/{dump_name}");
        let remote_archive = format!("/tmp/{archive_name}");

        eprintln!("Dumping {} on {}...", db.name, self.runner.target());
        self.dump(db, &remote_dump)?;

        let pack = CommandLine::new("tar").args([
            "-czf",
            remote_archive.as_str(),
            "-C",
            "/tmp",
            dump_name.as_str(),
        ]);
        self.runner.run(&pack)?;

        let local_archive = Path::new(&db.backup_dir)
            .join(&archive_name)
            .to_string_lossy()
            .into_owned();
        self.runner.fetch(&remote_archive, &local_archive)?;
        eprintln!("Backup saved to {local_archive}");

        let cleanup = CommandLine::new("rm")
            .arg("-f")
            .args([&remote_dump, &remote_archive]);
        if let Err(e) = self.runner.run(&cleanup) {
            warn!(error = %e, "could not remove temporary dump files");
        }

        let mut report = BackupReport {
            archive: local_archive,
            restored_into: None,
        };

        if let Some(local_db) = &db.local_database {
            let question = format!("Restore the backup into local database '{local_db}'?");
            if self.confirm.confirm(&question)? {
                restore_local(&report.archive, &db.backup_dir, &dump_name, local_db)?;
                report.restored_into = Some(local_db.clone());
            }
        }

        Ok(report)
    }

    fn dump(&self, db: &DatabaseSpec, output: &str) -> DeployResult<()> {
        let password: Vec<String> = db
            .password
            .iter()
            .map(|p| format!("PGPASSWORD={p}"))
            .collect();

        let dump = match &db.container {
            Some(container) => self.docker.exec(container, &password),
            None => CommandLine::new("env").args(password),
        };
        let dump = dump
            .args(["pg_dump", "-Fc", "-h", db.host.as_str(), "-p"])
            .arg(db.port.to_string())
            .args(["-U", db.user.as_str()])
            .args(["-d", db.name.as_str()])
            .args(["-f", output]);
        self.runner.run(&dump)?;

        // The dump was written inside the container; copy it out to
        // the host so it can be packed and fetched.
        if let Some(container) = &db.container {
            let copy = self
                .docker
                .command()
                .arg("cp")
                .arg(format!("{container}:{output}"))
                .arg(output);
            self.runner.run(&copy)?;
            let remove = self.docker.exec(container, &[]).args(["rm", "-f", output]);
            if let Err(e) = self.runner.run(&remove) {
                warn!(error = %e, "could not remove dump inside container");
            }
        }
        Ok(())
    }
}

fn restore_local(archive: &str, dir: &str, dump_name: &str, database: &str) -> DeployResult<()> {
    eprintln!("Restoring into {database}...");
    cmd::run(&CommandLine::new("tar").args(["-xzf", archive, "-C", dir]))?;

    let dump = Path::new(dir).join(dump_name);
    let dump = dump.to_string_lossy().into_owned();
    cmd::run(&CommandLine::new("pg_restore").args([
        "--clean",
        "--if-exists",
        "--no-owner",
        "-d",
        database,
        dump.as_str(),
    ]))?;

    if let Err(e) = std::fs::remove_file(&dump) {
        warn!(error = %e, "could not remove extracted dump");
    }
    info!(database, "restore complete");
    Ok(())
}
