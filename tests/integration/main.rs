//! Integration tests for Shipyard

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command pinned to a config path that does not exist, so defaults apply
    fn shipyard(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("shipyard");
        cmd.current_dir(temp.path())
            .env("SHIPYARD_CONFIG", temp.path().join("missing.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        shipyard(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Cache-aware multi-stage container image build pipeline",
            ));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        shipyard(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("shipyard"));
    }

    #[test]
    fn plan_lists_stages() {
        let temp = TempDir::new().unwrap();
        shipyard(&temp).arg("plan").assert().success().stdout(
            predicate::str::contains("source")
                .and(predicate::str::contains("legacy-assets"))
                .and(predicate::str::contains("mix deps.get")),
        );
    }

    #[test]
    fn plan_json() {
        let temp = TempDir::new().unwrap();
        let output = shipyard(&temp)
            .args(["plan", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(plan["stages"].as_array().unwrap().len(), 5);
        assert_eq!(plan["env"]["MIX_ENV"], "prod");
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        shipyard(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[caches]"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        shipyard(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("missing.toml"));
    }

    #[test]
    fn config_init_then_local_file_is_used() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shipyard.toml");

        shipyard(&temp)
            .args(["--config", path.to_str().unwrap(), "config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(path.exists());

        let mut cmd = cargo_bin_cmd!("shipyard");
        cmd.current_dir(temp.path())
            .env_remove("SHIPYARD_CONFIG")
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("shipyard.toml"));
    }

    #[test]
    fn local_config_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[caches]\nprefix = \"ci-\"\n").unwrap();

        shipyard(&temp)
            .args(["--config", path.to_str().unwrap(), "build", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ci-app-deps"));
    }

    #[test]
    fn invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "[caches\n").unwrap();

        shipyard(&temp)
            .args(["--config", path.to_str().unwrap(), "plan"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn dry_run_build_completes() {
        let temp = TempDir::new().unwrap();
        shipyard(&temp)
            .args(["build", "--dry-run"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("Dry run complete")
                    .and(predicate::str::contains("release")),
            );
    }

    #[test]
    fn dry_run_build_json_report() {
        let temp = TempDir::new().unwrap();
        let output = shipyard(&temp)
            .args(["build", "--dry-run", "--until", "deps", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let stages = report["stages"].as_array().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(report["final_state"]["workdir"], "/app");
    }

    #[test]
    fn until_unknown_stage_fails() {
        let temp = TempDir::new().unwrap();
        shipyard(&temp)
            .args(["build", "--dry-run", "--until", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("nope"));
    }
}
