//! Integration tests for modeltier

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated to a temp cache-tier root and config file
    fn modeltier(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("modeltier");
        cmd.env_remove("MODELTIER_ROOT")
            .env_remove("MODELTIER_CONFIG")
            .arg("--root")
            .arg(dir.path().join("nvme"))
            .arg("--config")
            .arg(dir.path().join("config.toml"));
        cmd
    }

    /// Create an artifact at the default location for an Ollama model
    fn ollama_artifact(dir: &TempDir, sanitized: &str) {
        let path = dir.path().join("nvme").join("models").join("ollama").join(sanitized);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("model.gguf"), b"GGUF").unwrap();
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("modeltier")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("model artifact cache tier"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("modeltier")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("modeltier"));
    }

    #[test]
    fn validate_accepts_huggingface_id() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["validate", "huggingface", "meta-llama/Llama-2-7b"])
            .assert()
            .success()
            .stdout(predicate::str::contains("valid"));
    }

    #[test]
    fn validate_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["validate", "huggingface", "../../etc/passwd"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("traversal"));
    }

    #[test]
    fn validate_rejects_injection() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["validate", "ollama", "model;rm -rf /"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("dangerous character"));
    }

    #[test]
    fn validate_unknown_provider_hints() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["validate", "pytorch", "org/model"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown provider"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn sanitize_prints_safe_name() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["sanitize", "my model!.bin"])
            .assert()
            .success()
            .stdout("my_model_.bin\n");
    }

    #[test]
    fn stats_empty() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .arg("stats")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached models"));
    }

    #[test]
    fn access_persists_between_runs() {
        let dir = TempDir::new().unwrap();
        ollama_artifact(&dir, "llama2_7b");
        for _ in 0..2 {
            modeltier(&dir)
                .args(["access", "ollama", "llama2:7b", "--size-gb", "3.8"])
                .assert()
                .success()
                .stdout(predicate::str::contains("llama2:7b"));
        }

        let output = modeltier(&dir)
            .args(["stats", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let stats: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(stats["num_cached_models"], 1);
        assert_eq!(stats["total_accesses"], 2);
        assert_eq!(stats["most_recently_used"][0]["model_id"], "llama2:7b");
    }

    #[test]
    fn access_rejects_path_outside_root() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["access", "huggingface", "org/model", "--path"])
            .arg(dir.path().join("elsewhere"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("escapes"));
    }

    #[test]
    fn access_without_artifact_is_dropped_on_reload() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["access", "ollama", "phi3"])
            .assert()
            .success();

        modeltier(&dir)
            .arg("stats")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached models"));
    }

    #[test]
    fn estimate_uses_parameter_tiers() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["estimate", "meta-llama/Llama-2-70b"])
            .assert()
            .success()
            .stdout(predicate::str::contains("30000 ms"));
    }

    #[test]
    fn evict_on_empty_cache() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .arg("evict")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to evict"));
    }

    #[test]
    fn clear_then_reclaim_dry_run() {
        let dir = TempDir::new().unwrap();
        ollama_artifact(&dir, "llama2_7b");
        ollama_artifact(&dir, "mistral_7b");
        for id in ["llama2:7b", "mistral:7b"] {
            modeltier(&dir)
                .args(["access", "ollama", id])
                .assert()
                .success();
        }

        modeltier(&dir)
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared 1 model(s)"));

        modeltier(&dir)
            .args(["reclaim", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dry run"));

        modeltier(&dir)
            .args(["clear", "--force", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("kept 0"));
    }

    #[test]
    fn clean_removes_staging_and_backups() {
        let dir = TempDir::new().unwrap();
        ollama_artifact(&dir, "llama2_7b");
        ollama_artifact(&dir, "llama2_7b.backup.20260302T091500000000");
        let staging = dir.path().join("nvme").join(".tmp_crashed");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("partial.bin"), b"half").unwrap();
        let backup = dir
            .path()
            .join("nvme/models/ollama/llama2_7b.backup.20260302T091500000000");

        modeltier(&dir)
            .args(["clean", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains(".tmp_crashed"))
            .stdout(predicate::str::contains("llama2_7b.backup."))
            .stdout(predicate::str::contains("Dry run"));
        assert!(staging.exists());
        assert!(backup.exists());

        modeltier(&dir)
            .args(["clean", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("removed 2 item(s)"));
        assert!(!staging.exists());
        assert!(!backup.exists());
        assert!(dir.path().join("nvme/models/ollama/llama2_7b/model.gguf").is_file());

        modeltier(&dir)
            .arg("clean")
            .assert()
            .success()
            .stdout(predicate::str::contains("No leftover"));
    }

    #[test]
    fn config_path_and_show() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));

        modeltier(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_set_round_trip() {
        let dir = TempDir::new().unwrap();
        modeltier(&dir)
            .args(["config", "set", "cache.max_size_gb", "64"])
            .assert()
            .success();

        modeltier(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_size_gb = 64.0"));

        modeltier(&dir)
            .args(["config", "set", "vm.name", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_config_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[cache]\ntarget_free_fraction = 2.0\n",
        )
        .unwrap();

        modeltier(&dir)
            .arg("stats")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

mod placement_tests {
    use async_trait::async_trait;
    use modeltier::config::PlacementSettings;
    use modeltier::placement::{FetcherRegistry, PlacementCoordinator, ProviderFetcher};
    use modeltier::provider::Provider;
    use modeltier::{TierError, TierResult};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Writes an artifact then waits until released
    struct GatedFetcher {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ProviderFetcher for GatedFetcher {
        async fn estimate_size_gb(&self, _model_id: &str) -> TierResult<f64> {
            Ok(0.000_001)
        }

        async fn fetch_to_path(&self, _model_id: &str, staging: &Path) -> TierResult<bool> {
            tokio::fs::write(staging.join("weights.bin"), b"weights")
                .await
                .map_err(|e| TierError::io("writing weights", e))?;
            self.started.notify_one();
            self.release.notified().await;
            Ok(true)
        }
    }

    fn gated(root: &TempDir) -> (Arc<PlacementCoordinator>, Arc<Notify>, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let fetcher = Arc::new(GatedFetcher {
            started: started.clone(),
            release: release.clone(),
        });
        let coordinator = PlacementCoordinator::new(
            &PlacementSettings {
                root: root.path().to_path_buf(),
                lock_file: ".placement.lock".to_string(),
                staging_prefix: ".tmp_".to_string(),
            },
            FetcherRegistry::new().with(Provider::HuggingFace, fetcher),
        )
        .unwrap();
        (Arc::new(coordinator), started, release)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_placement_contends_then_succeeds() {
        let root = TempDir::new().unwrap();
        let (coordinator, started, release) = gated(&root);
        let first_target = root.path().join("models").join("first");
        let second_target = root.path().join("models").join("second");

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            let target = first_target.clone();
            async move { coordinator.place_atomic("huggingface", "org/first", &target).await }
        });
        started.notified().await;

        let err = coordinator
            .place_atomic("huggingface", "org/second", &second_target)
            .await
            .unwrap_err();
        assert!(matches!(err, TierError::LockContention(_)));
        assert!(err.is_retryable());
        assert!(!second_target.exists());

        release.notify_one();
        first.await.unwrap().unwrap();
        assert!(first_target.join("weights.bin").is_file());

        // Lock released: the retry goes through
        release.notify_one();
        coordinator
            .place_atomic("huggingface", "org/second", &second_target)
            .await
            .unwrap();
        assert!(second_target.join("weights.bin").is_file());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drain_waits_for_inflight_placement() {
        let root = TempDir::new().unwrap();
        let (coordinator, started, release) = gated(&root);
        let target = root.path().join("models").join("model");

        let placement = tokio::spawn({
            let coordinator = coordinator.clone();
            let target = target.clone();
            async move { coordinator.place_atomic("huggingface", "org/model", &target).await }
        });
        started.notified().await;

        let pending = tokio::time::timeout(Duration::from_millis(100), coordinator.drain()).await;
        assert!(pending.is_err(), "drain returned while a placement was in flight");

        release.notify_one();
        coordinator.drain().await;
        placement.await.unwrap().unwrap();
        assert!(target.join("weights.bin").is_file());
    }
}
