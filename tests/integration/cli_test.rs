use std::path::Path;
use std::process::{Command, Output};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BINARY: &str = env!("CARGO_BIN_EXE_testpilot");

fn testpilot_command(args: &[&str]) -> Command {
    let mut cmd = Command::new(BINARY);
    cmd.args(args)
        .env("NO_COLOR", "1")
        .env("RUST_LOG", "error")
        .env_remove("TESTPILOT_SERVER_URL")
        .env_remove("TESTPILOT_LOG_LEVEL");
    cmd
}

fn run_testpilot(args: &[&str]) -> Output {
    testpilot_command(args)
        .output()
        .expect("Failed to execute testpilot command")
}

fn run_testpilot_in(dir: &Path, args: &[&str]) -> Output {
    testpilot_command(args)
        .current_dir(dir)
        .output()
        .expect("Failed to execute testpilot command")
}

fn output_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let output = run_testpilot(&["version"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(stdout.contains("testpilot"));
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_version_command_detailed() {
        let output = run_testpilot(&["version", "--detailed"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        assert!(stdout.contains("Version"));
        assert!(stdout.contains("Apache-2.0"));
        assert!(stdout.contains("End-User Testing"));
    }
}

mod help_tests {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = run_testpilot(&["--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        for command in ["run", "steps", "config", "version"] {
            assert!(stdout.contains(command), "help should mention '{}'", command);
        }
    }

    #[test]
    fn test_run_requires_identifiers() {
        let output = run_testpilot(&["run"]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_invalid_command() {
        let output = run_testpilot(&["teleport"]);
        assert!(!output.status.success());
    }

    #[test]
    fn test_verbose_flag_accepted() {
        let output = run_testpilot(&["-v", "version"]);
        assert!(output.status.success());
    }
}

mod steps_command_tests {
    use super::*;

    #[test]
    fn test_steps_table() {
        let output = run_testpilot(&["steps"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        assert!(stdout.contains("deploy-sandbox"));
        assert!(stdout.contains("user-test"));
        assert!(stdout.contains("Total: 12 stages"));
    }

    #[test]
    fn test_steps_json() {
        let output = run_testpilot(&["steps", "--format", "json"]);
        let steps: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

        let steps = steps.as_array().unwrap();
        assert_eq!(steps.len(), 12);
        assert_eq!(steps[0]["id"], "input");
        assert_eq!(steps[5]["ordinal"], 5);
        assert_eq!(steps[11]["id"], "user-test");
    }
}

mod config_command_tests {
    use super::*;

    #[test]
    fn test_config_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("testpilot.toml"),
            "[server]\nbase_url = \"https://pipeline.example.com\"\n",
        )
        .unwrap();

        let output = run_testpilot_in(dir.path(), &["config", "--format", "json"]);
        let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

        assert!(output.status.success());
        assert_eq!(config["server"]["base_url"], "https://pipeline.example.com");
        assert_eq!(config["stream"]["event_prefix"], "data:");
    }

    #[test]
    fn test_config_accepts_rust_log_filters() {
        let dir = tempfile::tempdir().unwrap();

        for filter in ["off", "testpilot_core"] {
            let output = testpilot_command(&["config", "--format", "json"])
                .current_dir(dir.path())
                .env("RUST_LOG", filter)
                .output()
                .expect("Failed to execute testpilot command");
            let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

            assert!(output.status.success(), "RUST_LOG={} was rejected", filter);
            assert_eq!(config["logging"]["level"], filter);
        }
    }

    #[test]
    fn test_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("testpilot.toml"),
            "[server]\nbase_url = \"ftp://pipeline.example.com\"\n",
        )
        .unwrap();

        let output = run_testpilot_in(dir.path(), &["config"]);

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E2002"));
    }
}

mod run_command_tests {
    use super::*;

    #[test]
    fn test_blank_identifiers_rejected() {
        let output = run_testpilot(&["run", " ", "--server", "http://127.0.0.1:9"]);
        let stderr = stderr_to_string(&output);

        assert!(!output.status.success());
        assert!(stderr.contains("E1001"), "stderr was: {}", stderr);
        assert!(stderr.contains("Suggestion"));
    }

    #[test]
    fn test_invalid_server_rejected() {
        let output = run_testpilot(&["run", "u1", "--server", "not-a-url"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("server.base_url"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_json_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pipeline/start"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "cli00001"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/pipeline/stream/cli00001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                "data: {\"step\":\"clone\",\"status\":\"done\",\"items\":[\"cloned\"]}\n\n",
                "data: {\"step\":\"pipeline\",\"status\":\"done\",\"items\":[\"Repos scanned: 1\"]}\n\n",
            )))
            .mount(&server)
            .await;

        let uri = server.uri();
        let output = tokio::task::spawn_blocking(move || {
            run_testpilot(&["run", "https://github.com/acme/petstore", "--server", &uri, "--json"])
        })
        .await
        .unwrap();

        assert!(output.status.success(), "stderr: {}", stderr_to_string(&output));
        let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(snapshot["phase"], "completed");
        assert_eq!(snapshot["run_handle"], "cli00001");
        assert_eq!(snapshot["active_ordinal"], 2);
        assert_eq!(snapshot["step_data"]["1"]["status"], "done");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_failure_exit_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pipeline/start"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"run_id": "cli00002"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/pipeline/stream/cli00002"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "data: {\"step\":\"pipeline\",\"status\":\"error\",\"items\":[\"disk full\"]}\n\n",
            ))
            .mount(&server)
            .await;

        let uri = server.uri();
        let output = tokio::task::spawn_blocking(move || {
            run_testpilot(&["run", "u1", "--server", &uri])
        })
        .await
        .unwrap();

        assert!(!output.status.success());
        assert!(output_to_string(&output).contains("disk full"));
    }
}
