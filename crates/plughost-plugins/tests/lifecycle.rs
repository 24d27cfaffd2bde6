//! Integration tests for the plugin lifecycle loader

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use plughost_core::{Error, HostConfig};
    use plughost_plugins::builtin::{register_builtins, ECHO_ENTRY_POINT};
    use plughost_plugins::capabilities::contributions::MenuItem;
    use plughost_plugins::prelude::*;
    use plughost_plugins::{Capabilities, EntryPointRegistry, PluginEvent};
    use plughost_tools::FnTool;
    use plughost_workflows::WorkflowEngine;
    use serde_json::{json, Value};
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const PROBE: &str = "test:probe";

    /// Shared record of hook calls, with injectable faults
    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<String>>,
        faults: Mutex<HashSet<String>>,
    }

    impl Probe {
        fn fail(&self, plugin: &str, hook: &str) {
            self.faults.lock().unwrap().insert(format!("{plugin}:{hook}"));
        }

        fn heal(&self) {
            self.faults.lock().unwrap().clear();
        }

        fn hit(&self, plugin: &str, hook: &str) -> anyhow::Result<()> {
            let key = format!("{plugin}:{hook}");
            self.calls.lock().unwrap().push(key.clone());
            if self.faults.lock().unwrap().contains(&key) {
                anyhow::bail!("{hook} exploded");
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    struct ProbePlugin {
        probe: Arc<Probe>,
        context: Arc<PluginContext>,
    }

    #[async_trait]
    impl Plugin for ProbePlugin {
        async fn on_load(&mut self) -> anyhow::Result<()> {
            let id = self.context.plugin_id.clone();
            let tool = FnTool::sync(&format!("{id}.ping"), "ping", |_| Ok(json!("pong")));
            self.context.tools.register(tool.boxed()).await;
            self.context
                .menus
                .register(MenuItem {
                    id: format!("{id}.menu"),
                    label: id.clone(),
                    location: "toolbar".into(),
                    command: None,
                })
                .await;
            self.context.events.on("tick", |_| Ok(())).await;
            self.probe.hit(&id, "on_load")
        }

        async fn on_enable(&mut self) -> anyhow::Result<()> {
            self.probe.hit(&self.context.plugin_id, "on_enable")
        }

        async fn on_disable(&mut self) -> anyhow::Result<()> {
            self.probe.hit(&self.context.plugin_id, "on_disable")
        }

        async fn on_unload(&mut self) -> anyhow::Result<()> {
            self.probe.hit(&self.context.plugin_id, "on_unload")
        }

        async fn on_config_change(&mut self, config: &Value) -> anyhow::Result<()> {
            self.probe
                .hit(&self.context.plugin_id, &format!("on_config_change={config}"))
        }
    }

    struct Harness {
        dir: TempDir,
        loader: PluginLoader,
        engine: Arc<WorkflowEngine>,
        probe: Arc<Probe>,
    }

    impl Harness {
        async fn new(enforce_dependencies: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = HostConfig::with_data_dir(dir.path());
            let engine = Arc::new(WorkflowEngine::new());
            let capabilities = Capabilities::new(&config, engine.clone()).unwrap();

            let entry_points = Arc::new(EntryPointRegistry::new());
            register_builtins(&entry_points).await;
            let probe = Arc::new(Probe::default());
            let shared = probe.clone();
            entry_points
                .register(
                    PROBE,
                    Arc::new(move |context: Arc<PluginContext>| -> anyhow::Result<BoxedPlugin> {
                        Ok(Box::new(ProbePlugin {
                            probe: shared.clone(),
                            context,
                        }))
                    }),
                )
                .await;

            let loader = PluginLoader::new(config.plugins_dir.clone(), Arc::new(capabilities), entry_points)
                .with_enforce_dependencies(enforce_dependencies);

            Self {
                dir,
                loader,
                engine,
                probe,
            }
        }

        fn plugins_dir(&self) -> std::path::PathBuf {
            self.dir.path().join("plugins")
        }

        fn install(&self, metadata: PluginMetadata) {
            install(&self.plugins_dir(), &metadata);
        }
    }

    fn install(plugins_dir: &Path, metadata: &PluginMetadata) {
        let dir = plugins_dir.join(&metadata.id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("plugin.json"),
            serde_json::to_vec_pretty(metadata).unwrap(),
        )
        .unwrap();
    }

    fn probe_plugin(id: &str) -> PluginMetadata {
        PluginMetadata::new(id, "1.0.0").with_main(PROBE)
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));

        h.loader.load_plugin("alpha").await.unwrap();
        h.loader.load_plugin("alpha").await.unwrap();

        assert_eq!(h.probe.calls(), vec!["alpha:on_load", "alpha:on_enable"]);
        assert_eq!(h.loader.state("alpha").await, PluginState::Enabled);
        assert_eq!(h.loader.loaded_plugins().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unload_is_unconditional_when_on_disable_faults() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.loader.load_plugin("alpha").await.unwrap();
        h.probe.fail("alpha", "on_disable");

        let err = h.loader.unload_plugin("alpha").await.unwrap_err();
        match err {
            Error::LifecycleHookFault { plugin, hook, .. } => {
                assert_eq!(plugin, "alpha");
                assert_eq!(hook, "on_disable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.probe.calls().contains(&"alpha:on_unload".to_string()));
        assert!(!h.loader.is_loaded("alpha").await);

        // The id is not blocked
        h.loader.load_plugin("alpha").await.unwrap();
        assert!(h.loader.is_loaded("alpha").await);
    }

    #[tokio::test]
    async fn test_unload_unknown_is_noop() {
        let h = Harness::new(false).await;
        h.loader.unload_plugin("ghost").await.unwrap();
        assert!(h.probe.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let h = Harness::new(false).await;
        std::fs::create_dir_all(h.plugins_dir().join("empty")).unwrap();

        let err = h.loader.load_plugin("empty").await.unwrap_err();
        assert!(matches!(err, Error::ManifestMissing(id) if id == "empty"));
        assert_eq!(h.loader.state("empty").await, PluginState::Unloaded);
    }

    #[tokio::test]
    async fn test_invalid_plugin_id_rejected() {
        let h = Harness::new(false).await;
        let err = h.loader.load_plugin("../etc").await.unwrap_err();
        assert!(matches!(err, Error::InvalidPluginId(_)));
        assert!(matches!(
            h.loader.save_config("a/b", json!({})).await,
            Err(Error::InvalidPluginId(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_entry_point() {
        let h = Harness::new(false).await;
        h.install(PluginMetadata::new("native", "1.0.0").with_main("libnative.so"));
        let err = h.loader.load_plugin("native").await.unwrap_err();
        assert!(matches!(err, Error::EntryPointNotFound(_)));
    }

    #[tokio::test]
    async fn test_on_load_fault_leaves_plugin_absent_and_retryable() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.probe.fail("alpha", "on_load");

        let err = h.loader.load_plugin("alpha").await.unwrap_err();
        assert!(matches!(err, Error::LifecycleHookFault { hook: "on_load", .. }));
        assert!(!h.loader.is_loaded("alpha").await);
        // Registrations made before the fault are withdrawn
        assert!(h.engine.list_tools().await.is_empty());

        h.probe.heal();
        h.loader.load_plugin("alpha").await.unwrap();
        assert!(h.loader.is_loaded("alpha").await);
        assert_eq!(h.engine.list_tools().await.len(), 1);
    }

    #[tokio::test]
    async fn test_on_enable_fault_propagates() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.probe.fail("alpha", "on_enable");

        let err = h.loader.load_plugin("alpha").await.unwrap_err();
        assert!(matches!(err, Error::LifecycleHookFault { hook: "on_enable", .. }));
        assert!(!h.loader.is_loaded("alpha").await);
    }

    #[tokio::test]
    async fn test_initialize_isolates_failures_and_orders_dependencies() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("app").with_dependency("base", "^1.0.0"));
        h.install(probe_plugin("base"));
        h.install(probe_plugin("faulty"));
        std::fs::create_dir_all(h.plugins_dir().join("broken")).unwrap();
        std::fs::write(h.plugins_dir().join("registry.json"), "{}").unwrap();
        h.probe.fail("faulty", "on_load");

        let report = h.loader.initialize().await.unwrap();

        assert_eq!(report.loaded, vec!["base", "app"]);
        let failed: Vec<&str> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["faulty", "broken"]);
        assert!(h.dir.path().join("plugin-storage").is_dir());
    }

    #[tokio::test]
    async fn test_manifest_id_follows_directory() {
        let h = Harness::new(false).await;
        let dir = h.plugins_dir().join("renamed");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("plugin.json"),
            serde_json::to_vec(&probe_plugin("original")).unwrap(),
        )
        .unwrap();

        let metadata = h.loader.read_manifest("renamed").await.unwrap();
        assert_eq!(metadata.id, "renamed");
    }

    #[tokio::test]
    async fn test_config_defaults_and_save_config() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        assert_eq!(h.loader.load_config("alpha").await, json!({}));

        h.loader.load_plugin("alpha").await.unwrap();
        h.probe.clear();

        let config = json!({"units": "metric"});
        h.loader.save_config("alpha", config.clone()).await.unwrap();

        assert_eq!(
            h.probe.calls(),
            vec![format!("alpha:on_config_change={config}")]
        );
        let plugin = h.loader.get_plugin("alpha").await.unwrap();
        assert_eq!(plugin.context.config().await, config);

        let raw = std::fs::read_to_string(h.plugins_dir().join("alpha/config.json")).unwrap();
        assert_eq!(raw, serde_json::to_string_pretty(&config).unwrap());
        assert_eq!(h.loader.load_config("alpha").await, config);
    }

    #[tokio::test]
    async fn test_save_config_hook_fault_propagates() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.loader.load_plugin("alpha").await.unwrap();
        h.probe.fail("alpha", "on_config_change={}");

        let err = h.loader.save_config("alpha", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::LifecycleHookFault { hook: "on_config_change", .. }));
        // Persisted regardless
        assert_eq!(h.loader.load_config("alpha").await, json!({}));
    }

    #[tokio::test]
    async fn test_save_config_without_loaded_plugin() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.loader.save_config("alpha", json!({"level": 3})).await.unwrap();
        assert!(h.probe.calls().is_empty());

        h.loader.load_plugin("alpha").await.unwrap();
        let plugin = h.loader.get_plugin("alpha").await.unwrap();
        assert_eq!(plugin.context.config().await, json!({"level": 3}));
    }

    #[tokio::test]
    async fn test_reload_runs_full_cycle() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.loader.load_plugin("alpha").await.unwrap();

        h.loader.reload_plugin("alpha").await.unwrap();
        assert_eq!(
            h.probe.calls(),
            vec![
                "alpha:on_load",
                "alpha:on_enable",
                "alpha:on_disable",
                "alpha:on_unload",
                "alpha:on_load",
                "alpha:on_enable",
            ]
        );
    }

    #[tokio::test]
    async fn test_reload_failure_leaves_plugin_unloaded() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.loader.load_plugin("alpha").await.unwrap();
        h.probe.fail("alpha", "on_load");

        assert!(h.loader.reload_plugin("alpha").await.is_err());
        assert_eq!(h.loader.state("alpha").await, PluginState::Unloaded);
    }

    #[tokio::test]
    async fn test_unload_releases_registrations() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.install(probe_plugin("beta"));
        h.loader.load_plugin("alpha").await.unwrap();
        h.loader.load_plugin("beta").await.unwrap();

        let caps = h.loader.capabilities();
        assert_eq!(h.engine.list_tools().await.len(), 2);
        assert_eq!(caps.contributions().menus.list().await.len(), 2);
        assert_eq!(caps.events().listener_count("tick").await, 2);
        assert_eq!(
            h.engine.execute_tool("alpha.ping", json!({})).await.unwrap(),
            json!("pong")
        );

        h.loader.unload_plugin("alpha").await.unwrap();

        let tools: Vec<String> = h.engine.list_tools().await.into_iter().map(|t| t.name).collect();
        assert_eq!(tools, vec!["beta.ping"]);
        assert_eq!(caps.contributions().menus.list().await.len(), 1);
        assert_eq!(caps.events().listener_count("tick").await, 1);
        assert!(matches!(
            h.engine.execute_tool("alpha.ping", json!({})).await,
            Err(Error::UnknownTool(_))
        ));
    }

    #[tokio::test]
    async fn test_enforced_dependencies() {
        let h = Harness::new(true).await;
        h.install(probe_plugin("base").with_dependency("root", "1.0.0"));
        h.install(probe_plugin("root"));
        h.install(probe_plugin("app").with_dependency("base", "^2.0.0"));

        let err = h.loader.load_plugin("app").await.unwrap_err();
        assert!(matches!(err, Error::DependencyNotFound(dep) if dep == "base"));

        h.loader.load_plugin("root").await.unwrap();
        h.loader.load_plugin("base").await.unwrap();
        let err = h.loader.load_plugin("app").await.unwrap_err();
        assert_eq!(err.to_string(), "Version mismatch: base@^2.0.0");
        assert!(!h.loader.is_loaded("app").await);
    }

    #[tokio::test]
    async fn test_enable_and_disable() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        h.loader.load_plugin("alpha").await.unwrap();
        h.probe.clear();

        h.loader.disable_plugin("alpha").await.unwrap();
        h.loader.disable_plugin("alpha").await.unwrap();
        assert_eq!(h.loader.state("alpha").await, PluginState::Disabled);

        h.loader.enable_plugin("alpha").await.unwrap();
        assert_eq!(h.loader.state("alpha").await, PluginState::Enabled);

        h.loader.disable_plugin("alpha").await.unwrap();
        h.loader.unload_plugin("alpha").await.unwrap();
        assert_eq!(
            h.probe.calls(),
            vec![
                "alpha:on_disable",
                "alpha:on_enable",
                "alpha:on_disable",
                "alpha:on_unload",
            ]
        );

        assert!(matches!(
            h.loader.enable_plugin("alpha").await,
            Err(Error::NotLoaded(_))
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_events_in_order() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("alpha"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        h.loader
            .events()
            .subscribe(move |event: &PluginEvent| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            })
            .await;

        h.loader.load_plugin("alpha").await.unwrap();
        h.loader.save_config("alpha", json!({"a": 1})).await.unwrap();
        h.loader.unload_plugin("alpha").await.unwrap();

        let id = || "alpha".to_string();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                PluginEvent::Loaded { plugin_id: id() },
                PluginEvent::ConfigChanged { plugin_id: id() },
                PluginEvent::Unloaded { plugin_id: id() },
            ]
        );
    }

    #[tokio::test]
    async fn test_unload_all_reverse_order() {
        let h = Harness::new(false).await;
        h.install(probe_plugin("first"));
        h.install(probe_plugin("second"));
        h.loader.load_plugin("first").await.unwrap();
        h.loader.load_plugin("second").await.unwrap();
        h.probe.clear();

        h.loader.unload_all().await;

        assert_eq!(
            h.probe.calls(),
            vec![
                "second:on_disable",
                "second:on_unload",
                "first:on_disable",
                "first:on_unload",
            ]
        );
        assert!(h.loader.loaded_plugins().await.is_empty());
    }

    #[tokio::test]
    async fn test_market_events_drive_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::with_data_dir(dir.path());
        for id in ["echo-a", "echo-b"] {
            install(
                &config.plugins_dir,
                &PluginMetadata::new(id, "1.0.0").with_main(ECHO_ENTRY_POINT),
            );
        }
        let system = PluginSystem::new(config).await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let task = system.attach_market(rx);
        tx.send(MarketEvent::Installed("echo-a".into())).await.unwrap();
        tx.send(MarketEvent::Installed("echo-b".into())).await.unwrap();
        tx.send(MarketEvent::Uninstalled("echo-a".into())).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let loaded: Vec<String> = system
            .loader()
            .loaded_plugins()
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(loaded, vec!["echo-b"]);

        // echo-b re-registered the shared names last, so they survive echo-a's unload
        let mut inputs = HashMap::new();
        inputs.insert("message".to_string(), json!("hi"));
        let result = system.engine().execute("echo", inputs).await.unwrap();
        assert!(result.success);
        assert_eq!(result.results["say"]["echo"]["message"], json!("hi"));
        assert!(system.loader().resolver().read().await.get("echo-a").is_none());

        system.shutdown().await;
        assert!(system.engine().list_tools().await.is_empty());
    }
}
